use std::collections::VecDeque;

/// One left/right sample pair, both in [-1.0, 1.0].
pub type StereoFrame = [f32; 2];

/// FIFO of stereo sample pairs between an emulation core (producer) and an
/// audio sink (consumer).
///
/// Pushes always succeed; the frame pump's pacing is the flow control.
/// Pops past the end produce silence, so a real-time caller always gets a
/// full buffer back. Queuing pairs rather than two parallel sequences
/// keeps the left and right streams the same length.
pub struct SampleQueue {
    frames: VecDeque<StereoFrame>,
}

impl SampleQueue {
    pub fn new() -> Self {
        Self {
            frames: VecDeque::with_capacity(4096),
        }
    }

    #[inline]
    pub fn push(&mut self, left: f32, right: f32) {
        self.frames.push_back([left, right]);
    }

    pub fn extend(&mut self, frames: &[StereoFrame]) {
        self.frames.extend(frames.iter().copied());
    }

    #[inline]
    pub fn pop(&mut self) -> Option<StereoFrame> {
        self.frames.pop_front()
    }

    /// Fill `out` from the front of the queue, oldest first, zero-filling
    /// whatever the queue cannot cover.
    pub fn pop_stereo(&mut self, out: &mut [StereoFrame]) {
        for slot in out.iter_mut() {
            *slot = self.frames.pop_front().unwrap_or([0.0, 0.0]);
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn clear(&mut self) {
        self.frames.clear();
    }
}

impl Default for SampleQueue {
    fn default() -> Self {
        Self::new()
    }
}
