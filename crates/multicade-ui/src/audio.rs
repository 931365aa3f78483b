use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use log::{info, warn};
use multicade_core::audio_bridge::{AudioConsumer, AudioProducer, Transport, audio_bridge};
use multicade_core::audio_queue::StereoFrame;

/// Where the consumer half of the bridge ended up after the probe.
pub enum AudioSink {
    /// A live cpal stream owns the consumer and pulls on its own thread.
    /// Dropping the stream stops playback.
    Stream(cpal::Stream),
    /// No usable output device: the shell holds the consumer and drains
    /// it itself so the queue stays bounded.
    Drain(AudioConsumer),
}

/// Capability probe, run once per session: build a real-time stream at the
/// core's sample rate if the platform can, otherwise fall back to a
/// directly shared queue. Either way the caller gets one producer with
/// identical push semantics.
pub fn setup(sample_rate: u32) -> (AudioProducer, AudioSink) {
    let (producer, consumer) = audio_bridge(Transport::Chunked);
    match start_stream(consumer, sample_rate) {
        Ok(stream) => {
            info!("audio: chunked transport, device stream at {sample_rate} Hz");
            (producer, AudioSink::Stream(stream))
        }
        Err(consumer) => {
            // The chunked pair is discarded along with `consumer`.
            drop(consumer);
            info!("audio: no output stream, direct transport fallback");
            let (producer, consumer) = audio_bridge(Transport::Direct);
            (producer, AudioSink::Drain(consumer))
        }
    }
}

/// Start playback pulling from `consumer`. Prefers a device configuration
/// at exactly `sample_rate` (the bridge never resamples) and warns when
/// the device cannot honor it. Gives the consumer back on failure.
pub fn start_stream(
    consumer: AudioConsumer,
    sample_rate: u32,
) -> Result<cpal::Stream, AudioConsumer> {
    let host = cpal::default_host();
    let Some(device) = host.default_output_device() else {
        warn!("no audio output device");
        return Err(consumer);
    };

    let supported = match preferred_config(&device, sample_rate) {
        Some(c) => c,
        None => {
            warn!("no supported output config");
            return Err(consumer);
        }
    };
    let sample_format = supported.sample_format();
    let config: cpal::StreamConfig = supported.into();
    if config.sample_rate.0 != sample_rate {
        warn!(
            "audio device runs at {} Hz, core produces {} Hz; playback pitch will be off",
            config.sample_rate.0, sample_rate
        );
    }
    let channels = config.channels as usize;
    let err_fn = |err| warn!("cpal stream error: {err}");

    // The callback has a hard deadline: pull never blocks and zero-fills
    // underruns, so every invocation returns a full buffer on time.
    let mut consumer = consumer;
    let mut scratch: Vec<StereoFrame> = Vec::new();
    let built = match sample_format {
        cpal::SampleFormat::I16 => device.build_output_stream(
            &config,
            move |data: &mut [i16], _| {
                scratch.resize(data.len().div_ceil(channels), [0.0, 0.0]);
                consumer.pull(&mut scratch);
                for (frame, &[left, right]) in data.chunks_mut(channels).zip(scratch.iter()) {
                    frame[0] = (left * 32767.0) as i16;
                    if channels > 1 {
                        frame[1] = (right * 32767.0) as i16;
                    }
                    for extra in frame.iter_mut().skip(2) {
                        *extra = 0;
                    }
                }
            },
            err_fn,
            None,
        ),
        cpal::SampleFormat::U16 => device.build_output_stream(
            &config,
            move |data: &mut [u16], _| {
                scratch.resize(data.len().div_ceil(channels), [0.0, 0.0]);
                consumer.pull(&mut scratch);
                for (frame, &[left, right]) in data.chunks_mut(channels).zip(scratch.iter()) {
                    frame[0] = ((left * 32767.0) as i32 + 32768) as u16;
                    if channels > 1 {
                        frame[1] = ((right * 32767.0) as i32 + 32768) as u16;
                    }
                    // Offset encoding: 32768 is zero amplitude.
                    for extra in frame.iter_mut().skip(2) {
                        *extra = 32768;
                    }
                }
            },
            err_fn,
            None,
        ),
        cpal::SampleFormat::F32 => device.build_output_stream(
            &config,
            move |data: &mut [f32], _| {
                consumer.fill_interleaved(data, channels);
            },
            err_fn,
            None,
        ),
        other => {
            warn!("unsupported sample format {other:?}");
            return Err(consumer);
        }
    };

    let stream = match built {
        Ok(s) => s,
        Err(e) => {
            warn!("failed to build audio stream: {e}");
            // The consumer moved into the dead callback; the caller falls
            // back to a fresh direct-transport pair.
            let (_tx, replacement) = audio_bridge(Transport::Direct);
            return Err(replacement);
        }
    };
    if let Err(e) = stream.play() {
        warn!("failed to start audio stream: {e}");
        let (_tx, replacement) = audio_bridge(Transport::Direct);
        return Err(replacement);
    }
    Ok(stream)
}

/// Pick an output configuration: exact sample-rate stereo match first,
/// then whatever the device calls its default.
fn preferred_config(
    device: &cpal::Device,
    sample_rate: u32,
) -> Option<cpal::SupportedStreamConfig> {
    let wanted = cpal::SampleRate(sample_rate);
    if let Ok(ranges) = device.supported_output_configs() {
        for range in ranges {
            if range.channels() >= 2
                && range.min_sample_rate() <= wanted
                && wanted <= range.max_sample_rate()
            {
                return Some(range.with_sample_rate(wanted));
            }
        }
    }
    device.default_output_config().ok()
}
