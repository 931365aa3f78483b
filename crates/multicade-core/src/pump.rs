use std::time::Instant;

use log::{debug, info, warn};

use crate::audio_bridge::AudioProducer;
use crate::audio_queue::StereoFrame;
use crate::core::{Core, CoreFault};

/// Run state of the frame pump.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PumpState {
    #[default]
    Stopped,
    Running,
}

/// Drives the active core once per display refresh and moves its audio
/// into the bridge. One pump per session; it owns the active core and the
/// producer half of the bridge.
///
/// The host calls [`tick`](FramePump::tick) on every refresh regardless of
/// state; the pump gates the work internally, so a paused session or one
/// with no core installed costs nothing.
pub struct FramePump {
    core: Option<Box<dyn Core>>,
    state: PumpState,
    audio: AudioProducer,
    frame_counter: u64,
    fps_window: Instant,
    fps_frames: u32,
    fps: f32,
    scratch: Vec<StereoFrame>,
}

impl FramePump {
    pub fn new(audio: AudioProducer) -> Self {
        Self {
            core: None,
            state: PumpState::Stopped,
            audio,
            frame_counter: 0,
            fps_window: Instant::now(),
            fps_frames: 0,
            fps: 0.0,
            scratch: Vec::with_capacity(2048),
        }
    }

    pub fn state(&self) -> PumpState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.state == PumpState::Running
    }

    pub fn start(&mut self) {
        if self.state != PumpState::Running {
            debug!("pump started");
            self.state = PumpState::Running;
            self.fps_window = Instant::now();
            self.fps_frames = 0;
        }
    }

    /// Gate ticks off. The refresh schedule itself keeps going; ticks
    /// while stopped do nothing.
    pub fn pause(&mut self) {
        if self.state == PumpState::Running {
            debug!("pump paused");
        }
        self.state = PumpState::Stopped;
    }

    /// Return the active core to its post-load state. Valid whether
    /// running or stopped.
    pub fn reset(&mut self) {
        if let Some(core) = self.core.as_deref_mut() {
            core.reset();
        }
    }

    /// Install a new active core. The previous core is dropped along with
    /// all its volatile state; the run state is left unchanged.
    pub fn swap_core(&mut self, core: Box<dyn Core>) {
        info!("active core: {}", core.spec().name);
        self.core = Some(core);
    }

    pub fn core(&self) -> Option<&dyn Core> {
        self.core.as_deref()
    }

    // The trait-object lifetime must be spelled out: with `&mut` the
    // stored `dyn Core + 'static` cannot shorten to the borrow on its own.
    pub fn core_mut(&mut self) -> Option<&mut (dyn Core + '_)> {
        self.core.as_deref_mut().map(|c| c as _)
    }

    pub fn has_core(&self) -> bool {
        self.core.is_some()
    }

    /// One display-refresh tick: step the core one frame and drain its
    /// pending audio into the bridge.
    ///
    /// A fault from the core stops the pump and is handed back to the
    /// caller; the faulted core stays installed for inspection or reset.
    pub fn tick(&mut self) -> Result<(), CoreFault> {
        if self.state != PumpState::Running {
            return Ok(());
        }

        if let Some(core) = self.core.as_deref_mut() {
            if let Err(fault) = core.run_frame() {
                warn!("core fault after {} frames: {fault}", self.frame_counter);
                self.state = PumpState::Stopped;
                return Err(fault);
            }
            self.scratch.clear();
            core.drain_audio(&mut self.scratch);
            self.audio.push(&self.scratch);

            self.frame_counter += 1;
            self.fps_frames += 1;
        }

        let elapsed = self.fps_window.elapsed();
        if elapsed.as_secs() >= 1 {
            self.fps = self.fps_frames as f32 / elapsed.as_secs_f32();
            self.fps_frames = 0;
            self.fps_window = Instant::now();
        }
        Ok(())
    }

    /// Frames executed since the pump was created.
    pub fn frame_counter(&self) -> u64 {
        self.frame_counter
    }

    /// Observed frame rate, published once per wall-clock second. A
    /// diagnostic figure; nothing paces itself off it.
    pub fn fps(&self) -> f32 {
        self.fps
    }

    /// Mute or unmute sample forwarding into the bridge (fast-forward).
    pub fn set_audio_muted(&mut self, muted: bool) {
        self.audio.set_muted(muted);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio_bridge::{Transport, audio_bridge};
    use crate::core::{Button, CoreSpec, LoadError, RestoreError};
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::{Arc, Mutex, mpsc};

    static SPEC: CoreSpec = CoreSpec {
        id: "scripted",
        name: "Scripted",
        extensions: &["scr"],
        sample_rate: 44100,
        width: 2,
        height: 2,
    };

    /// Deterministic core: counts frames, emits a fixed number of ramp
    /// samples per frame, faults on request.
    struct ScriptedCore {
        frames: Arc<AtomicU64>,
        fault_on: Option<u64>,
        samples_per_frame: usize,
        next: usize,
    }

    impl ScriptedCore {
        fn new(samples_per_frame: usize) -> Self {
            Self {
                frames: Arc::new(AtomicU64::new(0)),
                fault_on: None,
                samples_per_frame,
                next: 0,
            }
        }

        fn frame_count(&self) -> Arc<AtomicU64> {
            Arc::clone(&self.frames)
        }
    }

    impl Core for ScriptedCore {
        fn spec(&self) -> &'static CoreSpec {
            &SPEC
        }
        fn load_rom(&mut self, _bytes: &[u8]) -> Result<(), LoadError> {
            Ok(())
        }
        fn run_frame(&mut self) -> Result<(), CoreFault> {
            let done = self.frames.load(Ordering::Relaxed);
            if self.fault_on == Some(done) {
                return Err(CoreFault("scripted fault".into()));
            }
            self.frames.store(done + 1, Ordering::Relaxed);
            Ok(())
        }
        fn reset(&mut self) {
            self.next = 0;
        }
        fn button_down(&mut self, _player: usize, _button: Button) {}
        fn button_up(&mut self, _player: usize, _button: Button) {}
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
            for _ in 0..self.samples_per_frame {
                let v = (self.next + 1) as f32 / 1024.0;
                out.push([v, -v]);
                self.next += 1;
            }
        }
    }

    fn pump() -> (FramePump, crate::audio_bridge::AudioConsumer) {
        let (tx, rx) = audio_bridge(Transport::Direct);
        (FramePump::new(tx), rx)
    }

    #[test]
    fn sixty_ticks_step_sixty_frames() {
        let (mut pump, _rx) = pump();
        let core = ScriptedCore::new(0);
        let frames = core.frame_count();
        pump.swap_core(Box::new(core));
        pump.start();
        for _ in 0..60 {
            pump.tick().expect("no fault scripted");
        }
        assert_eq!(frames.load(Ordering::Relaxed), 60);
        assert_eq!(pump.frame_counter(), 60);
    }

    #[test]
    fn pause_gates_ticks_off() {
        let (mut pump, _rx) = pump();
        let core = ScriptedCore::new(0);
        let frames = core.frame_count();
        pump.swap_core(Box::new(core));
        pump.start();
        for _ in 0..30 {
            pump.tick().expect("no fault scripted");
        }
        pump.pause();
        for _ in 0..10 {
            pump.tick().expect("paused ticks are no-ops");
        }
        assert_eq!(frames.load(Ordering::Relaxed), 30);

        pump.start();
        pump.tick().expect("no fault scripted");
        assert_eq!(frames.load(Ordering::Relaxed), 31);
    }

    #[test]
    fn tick_without_core_is_a_noop() {
        let (mut pump, rx) = pump();
        pump.start();
        for _ in 0..10 {
            pump.tick().expect("nothing to fault");
        }
        assert_eq!(pump.frame_counter(), 0);
        assert_eq!(rx.queued(), 0);
        assert!(pump.is_running());
    }

    #[test]
    fn swap_discards_previous_core_and_keeps_run_state() {
        let (mut pump, _rx) = pump();
        let old = ScriptedCore::new(0);
        let old_frames = old.frame_count();
        pump.swap_core(Box::new(old));
        pump.start();
        pump.tick().expect("no fault scripted");
        assert_eq!(old_frames.load(Ordering::Relaxed), 1);

        let new = ScriptedCore::new(0);
        let new_frames = new.frame_count();
        pump.swap_core(Box::new(new));
        assert!(pump.is_running());

        for _ in 0..5 {
            pump.tick().expect("no fault scripted");
        }
        assert_eq!(old_frames.load(Ordering::Relaxed), 1);
        assert_eq!(new_frames.load(Ordering::Relaxed), 5);
    }

    #[test]
    fn fault_stops_pump_and_keeps_the_core() {
        let (mut pump, _rx) = pump();
        let mut core = ScriptedCore::new(0);
        core.fault_on = Some(3);
        let frames = core.frame_count();
        pump.swap_core(Box::new(core));
        pump.start();

        let mut fault = None;
        for _ in 0..10 {
            if let Err(e) = pump.tick() {
                fault = Some(e);
                break;
            }
        }
        assert_eq!(fault.expect("fault surfaces").0, "scripted fault");
        assert!(!pump.is_running());
        assert_eq!(frames.load(Ordering::Relaxed), 3);
        // The faulted core is retained for inspection.
        assert!(pump.has_core());

        // Ticks stay gated until the host restarts the pump.
        pump.tick().expect("stopped ticks are no-ops");
        assert_eq!(frames.load(Ordering::Relaxed), 3);
    }

    #[test]
    fn core_audio_reaches_the_bridge_in_order() {
        let (mut pump, mut rx) = pump();
        pump.swap_core(Box::new(ScriptedCore::new(100)));
        pump.start();
        for _ in 0..3 {
            pump.tick().expect("no fault scripted");
        }
        assert_eq!(rx.queued(), 300);
        let mut out = [[0.0f32; 2]; 300];
        rx.pull(&mut out);
        for (i, frame) in out.iter().enumerate() {
            assert_eq!(frame[0], (i + 1) as f32 / 1024.0);
        }
    }

    #[test]
    fn muted_pump_keeps_stepping_but_drops_audio() {
        let (mut pump, rx) = pump();
        let core = ScriptedCore::new(100);
        let frames = core.frame_count();
        pump.swap_core(Box::new(core));
        pump.start();
        pump.set_audio_muted(true);
        for _ in 0..4 {
            pump.tick().expect("no fault scripted");
        }
        assert_eq!(frames.load(Ordering::Relaxed), 4);
        assert_eq!(rx.queued(), 0);
    }

    /// A core whose engine runs elsewhere: `run_frame` is a no-op and the
    /// output shows up through a shared buffer on its own schedule.
    struct SelfPacedCore {
        feed: Arc<Mutex<Vec<StereoFrame>>>,
    }

    impl Core for SelfPacedCore {
        fn spec(&self) -> &'static CoreSpec {
            &SPEC
        }
        fn load_rom(&mut self, _bytes: &[u8]) -> Result<(), LoadError> {
            Ok(())
        }
        fn run_frame(&mut self) -> Result<(), CoreFault> {
            Ok(())
        }
        fn reset(&mut self) {}
        fn button_down(&mut self, _player: usize, _button: Button) {}
        fn button_up(&mut self, _player: usize, _button: Button) {}
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
            if let Ok(mut feed) = self.feed.lock() {
                out.append(&mut feed);
            }
        }
    }

    #[test]
    fn self_paced_core_output_still_drains() {
        let (mut pump, mut rx) = pump();
        let feed = Arc::new(Mutex::new(Vec::new()));
        pump.swap_core(Box::new(SelfPacedCore {
            feed: Arc::clone(&feed),
        }));
        pump.start();

        pump.tick().expect("no-op frame");
        assert_eq!(rx.queued(), 0);

        // The engine deposits samples between ticks.
        feed.lock().expect("test feed").extend([[0.5, -0.5]; 7]);
        pump.tick().expect("no-op frame");
        assert_eq!(rx.queued(), 7);
        let mut out = [[0.0f32; 2]; 7];
        rx.pull(&mut out);
        assert!(out.iter().all(|f| *f == [0.5, -0.5]));
    }

    #[test]
    fn host_can_reach_the_installed_core_directly() {
        let (mut pump, _rx) = pump();
        assert!(pump.core_mut().is_none());

        let core = ScriptedCore::new(0);
        let frames = core.frame_count();
        pump.swap_core(Box::new(core));

        // A host drives the core through the pump's borrow, repeatedly.
        for _ in 0..2 {
            let core = pump.core_mut().expect("core is installed");
            core.run_frame().expect("no fault scripted");
        }
        assert_eq!(frames.load(Ordering::Relaxed), 2);
        assert_eq!(pump.core().expect("core is installed").spec().id, "scripted");
    }

    #[test]
    fn cores_remain_send() {
        let (tx, rx) = mpsc::channel::<Box<dyn Core>>();
        tx.send(Box::new(ScriptedCore::new(0))).expect("send works");
        let core = rx.recv().expect("recv works");
        assert_eq!(core.spec().id, "scripted");
    }
}
