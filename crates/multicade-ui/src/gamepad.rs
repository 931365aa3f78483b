use gilrs::Gilrs;
use log::{info, warn};
use multicade_core::core::Button;

/// Polled game-controller source. Every refresh the shell asks for one
/// canonical button mask per connected pad and hands them to the input
/// router, which turns level state into edges.
pub struct GamepadPoller {
    /// None if initialization failed; polling then reports nothing.
    gilrs: Option<Gilrs>,
}

impl GamepadPoller {
    pub fn new() -> Self {
        let gilrs = match Gilrs::new() {
            Ok(g) => Some(g),
            Err(e) => {
                warn!("Failed to initialize gamepad support: {e}");
                None
            }
        };
        Self { gilrs }
    }

    /// Drain connection events, then read the current pressed state of
    /// every pad. The returned slot index doubles as the player index.
    pub fn poll(&mut self, out: &mut Vec<(usize, u8)>) {
        out.clear();
        let Some(gilrs) = self.gilrs.as_mut() else {
            return;
        };

        while let Some(event) = gilrs.next_event() {
            match event.event {
                gilrs::EventType::Connected => {
                    info!("gamepad connected: {}", gilrs.gamepad(event.id).name());
                }
                gilrs::EventType::Disconnected => {
                    info!("gamepad disconnected");
                }
                _ => {}
            }
        }

        for (slot, (_, gamepad)) in gilrs.gamepads().enumerate() {
            out.push((slot, pad_mask(&gamepad)));
        }
    }
}

impl Default for GamepadPoller {
    fn default() -> Self {
        Self::new()
    }
}

/// Standard-mapping read: face south/east for A/B, Select/Start, d-pad.
fn pad_mask(gamepad: &gilrs::Gamepad) -> u8 {
    let btn = |button: gilrs::Button| -> bool { gamepad.is_pressed(button) };

    let mut mask = 0u8;
    if btn(gilrs::Button::South) {
        mask |= Button::A.mask();
    }
    if btn(gilrs::Button::East) {
        mask |= Button::B.mask();
    }
    if btn(gilrs::Button::Select) {
        mask |= Button::Select.mask();
    }
    if btn(gilrs::Button::Start) {
        mask |= Button::Start.mask();
    }
    if btn(gilrs::Button::DPadUp) {
        mask |= Button::Up.mask();
    }
    if btn(gilrs::Button::DPadDown) {
        mask |= Button::Down.mask();
    }
    if btn(gilrs::Button::DPadLeft) {
        mask |= Button::Left.mask();
    }
    if btn(gilrs::Button::DPadRight) {
        mask |= Button::Right.mask();
    }
    mask
}
