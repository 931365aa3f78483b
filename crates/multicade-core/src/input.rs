use log::trace;
use std::collections::HashMap;

use crate::core::{Button, Core};

/// One physical input source feeding the router. Each source gets its own
/// edge-tracking mask so simultaneous sources never swallow each other's
/// transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceId {
    Keyboard,
    /// The on-screen pad, sampled once per frame.
    Touch,
    /// A game controller slot; the slot doubles as the player index.
    Pad(usize),
}

impl SourceId {
    fn player(self) -> usize {
        match self {
            SourceId::Keyboard | SourceId::Touch => 0,
            SourceId::Pad(slot) => slot,
        }
    }
}

/// Translates heterogeneous physical input into canonical button edges on
/// the active core.
///
/// Event-driven sources report individual presses and releases; polled
/// sources report a whole mask per refresh and the router diffs it against
/// the previous poll. Either way the core only ever sees genuine 0-to-1
/// and 1-to-0 transitions, and it sees the union of all sources.
#[derive(Default)]
pub struct InputRouter {
    held: HashMap<SourceId, u8>,
}

impl InputRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Route one press/release event. A repeated press for a button that
    /// is already down (keyboard auto-repeat) is dropped here.
    pub fn key_event(&mut self, core: &mut dyn Core, source: SourceId, button: Button, pressed: bool) {
        let mask = self.held.entry(source).or_insert(0);
        let bit = button.mask();
        if pressed {
            if *mask & bit != 0 {
                return;
            }
            *mask |= bit;
            trace!("{source:?} {button:?} down");
            core.button_down(source.player(), button);
        } else {
            if *mask & bit == 0 {
                return;
            }
            *mask &= !bit;
            trace!("{source:?} {button:?} up");
            core.button_up(source.player(), button);
        }
    }

    /// Route one poll of a level-sampled source: emit a down for every bit
    /// that rose since the previous poll and an up for every bit that
    /// fell. A held button produces no further calls.
    pub fn poll(&mut self, core: &mut dyn Core, source: SourceId, mask: u8) {
        let prev = self.held.insert(source, mask).unwrap_or(0);
        let changed = prev ^ mask;
        if changed == 0 {
            return;
        }
        let player = source.player();
        for button in Button::ALL {
            let bit = button.mask();
            if changed & bit == 0 {
                continue;
            }
            if mask & bit != 0 {
                trace!("{source:?} {button:?} down");
                core.button_down(player, button);
            } else {
                trace!("{source:?} {button:?} up");
                core.button_up(player, button);
            }
        }
    }

    /// Forget all tracked state, typically after a core swap. Held polled
    /// buttons re-edge into the core on their next poll; held keys re-edge
    /// on their next auto-repeat.
    pub fn reset(&mut self) {
        self.held.clear();
    }
}
