use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use multicade_core::audio_queue::StereoFrame;
use multicade_core::core::{Button, Core, CoreFault, CoreSpec, LoadError, RestoreError};

pub static FAKE_SPEC: CoreSpec = CoreSpec {
    id: "fake",
    name: "Fake",
    extensions: &["fak"],
    sample_rate: 44100,
    width: 4,
    height: 4,
};

/// Shared tally a test keeps after handing the core to the pump.
#[derive(Default)]
pub struct Tally {
    pub frames: AtomicU64,
    pub downs: AtomicU64,
    pub ups: AtomicU64,
    pub resets: AtomicU64,
}

/// A core that counts what is done to it and emits a deterministic sample
/// ramp: the n-th pair ever produced is `[(n+1)/1024, -(n+1)/1024]`.
pub struct FakeCore {
    pub tally: Arc<Tally>,
    samples_per_frame: usize,
    next_sample: usize,
    pending: Vec<StereoFrame>,
    rom: Vec<u8>,
}

impl FakeCore {
    pub fn new(samples_per_frame: usize) -> Self {
        Self {
            tally: Arc::new(Tally::default()),
            samples_per_frame,
            next_sample: 0,
            pending: Vec::new(),
            rom: Vec::new(),
        }
    }

    pub fn tally(&self) -> Arc<Tally> {
        Arc::clone(&self.tally)
    }
}

pub fn ramp(n: usize, base: usize) -> Vec<StereoFrame> {
    (0..n)
        .map(|i| {
            let v = (base + i + 1) as f32 / 1024.0;
            [v, -v]
        })
        .collect()
}

impl Core for FakeCore {
    fn spec(&self) -> &'static CoreSpec {
        &FAKE_SPEC
    }

    fn load_rom(&mut self, bytes: &[u8]) -> Result<(), LoadError> {
        if bytes.is_empty() {
            return Err(LoadError::Empty);
        }
        self.rom = bytes.to_vec();
        Ok(())
    }

    fn run_frame(&mut self) -> Result<(), CoreFault> {
        self.tally.frames.fetch_add(1, Ordering::Relaxed);
        let burst = ramp(self.samples_per_frame, self.next_sample);
        self.next_sample += self.samples_per_frame;
        self.pending.extend(burst);
        Ok(())
    }

    fn reset(&mut self) {
        self.tally.resets.fetch_add(1, Ordering::Relaxed);
        self.next_sample = 0;
        self.pending.clear();
    }

    fn button_down(&mut self, _player: usize, _button: Button) {
        self.tally.downs.fetch_add(1, Ordering::Relaxed);
    }

    fn button_up(&mut self, _player: usize, _button: Button) {
        self.tally.ups.fetch_add(1, Ordering::Relaxed);
    }

    fn save_state(&self) -> Option<Vec<u8>> {
        None
    }

    fn load_state(&mut self, _bytes: &[u8]) -> Result<(), RestoreError> {
        Err(RestoreError("unsupported".into()))
    }

    fn take_frame(&mut self) -> Option<&[u32]> {
        None
    }

    fn drain_audio(&mut self, out: &mut Vec<StereoFrame>) {
        out.append(&mut self.pending);
    }
}
