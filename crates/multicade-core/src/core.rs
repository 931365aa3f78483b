use thiserror::Error;

use crate::audio_queue::StereoFrame;

/// Number of buttons in the canonical pad layout.
pub const BUTTON_COUNT: usize = 8;

/// Console-agnostic pad button, shared by every core. A core remaps these
/// to whatever its emulated hardware calls them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Button {
    A = 0,
    B = 1,
    Select = 2,
    Start = 3,
    Up = 4,
    Down = 5,
    Left = 6,
    Right = 7,
}

impl Button {
    pub const ALL: [Button; BUTTON_COUNT] = [
        Button::A,
        Button::B,
        Button::Select,
        Button::Start,
        Button::Up,
        Button::Down,
        Button::Left,
        Button::Right,
    ];

    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }

    /// Bit for this button in a tracked button mask.
    #[inline]
    pub fn mask(self) -> u8 {
        1 << (self as u8)
    }

    pub fn from_index(index: usize) -> Option<Button> {
        Self::ALL.get(index).copied()
    }
}

/// Static description of a core: identity, the ROM types it accepts, and
/// its native output formats.
#[derive(Debug, Clone, Copy)]
pub struct CoreSpec {
    pub id: &'static str,
    pub name: &'static str,
    /// Accepted file extensions, lowercase, without the dot.
    pub extensions: &'static [&'static str],
    /// Native audio sample rate in Hz.
    pub sample_rate: u32,
    /// Native framebuffer size in pixels.
    pub width: usize,
    pub height: usize,
}

/// ROM image rejected by a core.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("ROM image is empty")]
    Empty,
    #[error("ROM image is {size} bytes, larger than the {max} byte limit")]
    TooLarge { size: usize, max: usize },
    #[error("bad ROM image: {0}")]
    BadImage(String),
}

/// Save state rejected during restore. The core's state is unchanged.
#[derive(Debug, Error)]
#[error("save state rejected: {0}")]
pub struct RestoreError(pub String);

/// Unrecoverable failure inside a core during a frame. Stops the pump;
/// the core stays installed so the host can reset or reload it.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct CoreFault(pub String);

/// The contract every emulation core implements. The pump, the audio
/// bridge and the input router only ever see this trait.
///
/// `button_down`/`button_up` must be idempotent: repeating a call for a
/// button already in that state has no observable effect. `load_state`
/// must never panic; a rejected state leaves the core unmodified.
pub trait Core: Send {
    /// Static identity and output formats.
    fn spec(&self) -> &'static CoreSpec;

    /// Validate and install a ROM image. A core whose load failed must
    /// not be stepped.
    fn load_rom(&mut self, bytes: &[u8]) -> Result<(), LoadError>;

    /// Advance emulation by one logical video frame.
    ///
    /// Cores that pace themselves (an internal thread or timer) may treat
    /// this as a no-op and deposit output on their own schedule; the pump
    /// tolerates both models.
    fn run_frame(&mut self) -> Result<(), CoreFault>;

    /// Return to the post-load initial state, keeping the loaded ROM.
    fn reset(&mut self);

    fn button_down(&mut self, player: usize, button: Button);

    fn button_up(&mut self, player: usize, button: Button);

    /// Serialize the full machine state, or `None` if unsupported.
    fn save_state(&self) -> Option<Vec<u8>>;

    /// Restore a previously saved state.
    fn load_state(&mut self, bytes: &[u8]) -> Result<(), RestoreError>;

    /// The most recent completed frame as 0x00RRGGBB pixels at the
    /// declared resolution, if one completed since the last take.
    fn take_frame(&mut self) -> Option<&[u32]>;

    /// Move all pending stereo samples out of the core, oldest first.
    fn drain_audio(&mut self, out: &mut Vec<StereoFrame>);
}
