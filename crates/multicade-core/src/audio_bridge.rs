use crossbeam_channel as cb;
use std::sync::{Arc, Mutex};

use crate::audio_queue::{SampleQueue, StereoFrame};

/// Largest number of sample pairs carried by one chunked-transport
/// message. Smaller chunks lower latency; larger ones lower messaging
/// overhead.
pub const CHUNK_FRAMES: usize = 128;

/// How producer and consumer are wired together, decided once per
/// session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transport {
    /// Samples cross to a dedicated audio thread as discrete chunk
    /// messages; no queue is shared.
    Chunked,
    /// Producer and consumer share one locked queue. Fallback when no
    /// real-time audio thread exists.
    Direct,
}

enum ProducerLink {
    Chunked(cb::Sender<Vec<StereoFrame>>),
    Direct(Arc<Mutex<SampleQueue>>),
}

/// Producer half of the bridge, owned by the frame pump.
pub struct AudioProducer {
    link: ProducerLink,
    muted: bool,
}

enum ConsumerLink {
    Chunked {
        rx: cb::Receiver<Vec<StereoFrame>>,
        /// Local to the consumer context, fed only by received messages.
        queue: SampleQueue,
    },
    Direct(Arc<Mutex<SampleQueue>>),
}

/// Consumer half of the bridge, owned by the audio callback (chunked) or
/// by the host loop (direct).
pub struct AudioConsumer {
    link: ConsumerLink,
}

/// Build a connected producer/consumer pair over the given transport.
/// Both transports expose identical push/pull semantics.
pub fn audio_bridge(transport: Transport) -> (AudioProducer, AudioConsumer) {
    match transport {
        Transport::Chunked => {
            let (tx, rx) = cb::unbounded();
            (
                AudioProducer {
                    link: ProducerLink::Chunked(tx),
                    muted: false,
                },
                AudioConsumer {
                    link: ConsumerLink::Chunked {
                        rx,
                        queue: SampleQueue::new(),
                    },
                },
            )
        }
        Transport::Direct => {
            let shared = Arc::new(Mutex::new(SampleQueue::new()));
            (
                AudioProducer {
                    link: ProducerLink::Direct(Arc::clone(&shared)),
                    muted: false,
                },
                AudioConsumer {
                    link: ConsumerLink::Direct(shared),
                },
            )
        }
    }
}

impl AudioProducer {
    /// Append sample pairs in order. Never blocks.
    pub fn push(&mut self, frames: &[StereoFrame]) {
        if self.muted || frames.is_empty() {
            return;
        }
        match &self.link {
            ProducerLink::Chunked(tx) => {
                for chunk in frames.chunks(CHUNK_FRAMES) {
                    // Send only fails once the consumer is gone; the
                    // samples have nowhere to go then anyway.
                    let _ = tx.send(chunk.to_vec());
                }
            }
            ProducerLink::Direct(shared) => {
                if let Ok(mut queue) = shared.lock() {
                    queue.extend(frames);
                }
            }
        }
    }

    /// While muted, pushed samples are dropped (fast-forward).
    pub fn set_muted(&mut self, muted: bool) {
        self.muted = muted;
    }

    pub fn is_muted(&self) -> bool {
        self.muted
    }
}

impl AudioConsumer {
    /// Remove exactly `out.len()` pairs from the head, oldest first,
    /// zero-filling past the end. Never blocks.
    pub fn pull(&mut self, out: &mut [StereoFrame]) {
        match &mut self.link {
            ConsumerLink::Chunked { rx, queue } => {
                while let Ok(chunk) = rx.try_recv() {
                    queue.extend(&chunk);
                }
                queue.pop_stereo(out);
            }
            ConsumerLink::Direct(shared) => match shared.lock() {
                Ok(mut queue) => queue.pop_stereo(out),
                Err(_) => out.fill([0.0, 0.0]),
            },
        }
    }

    /// Interleaved variant for audio callbacks: writes `channels`-wide
    /// frames into `data`, left then right, silencing any further
    /// channels. Device buffers are reused, so stale slots would be
    /// audible.
    pub fn fill_interleaved(&mut self, data: &mut [f32], channels: usize) {
        match &mut self.link {
            ConsumerLink::Chunked { rx, queue } => {
                while let Ok(chunk) = rx.try_recv() {
                    queue.extend(&chunk);
                }
                for frame in data.chunks_mut(channels) {
                    let [left, right] = queue.pop().unwrap_or([0.0, 0.0]);
                    frame[0] = left;
                    if channels > 1 {
                        frame[1] = right;
                    }
                    for extra in frame.iter_mut().skip(2) {
                        *extra = 0.0;
                    }
                }
            }
            ConsumerLink::Direct(shared) => {
                let Ok(mut queue) = shared.lock() else {
                    data.fill(0.0);
                    return;
                };
                for frame in data.chunks_mut(channels) {
                    let [left, right] = queue.pop().unwrap_or([0.0, 0.0]);
                    frame[0] = left;
                    if channels > 1 {
                        frame[1] = right;
                    }
                    for extra in frame.iter_mut().skip(2) {
                        *extra = 0.0;
                    }
                }
            }
        }
    }

    /// Pairs currently queued on the consumer side. Chunked transport
    /// counts only what has already crossed the channel.
    pub fn queued(&self) -> usize {
        match &self.link {
            ConsumerLink::Chunked { queue, .. } => queue.len(),
            ConsumerLink::Direct(shared) => shared.lock().map(|q| q.len()).unwrap_or(0),
        }
    }
}
