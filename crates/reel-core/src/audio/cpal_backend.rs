//! CPAL output stream construction
//!
//! Device negotiation prefers f32 stereo at the configured sample rate and
//! falls back to whatever the device offers, logging the compromise. The
//! callback owns its scratch buffers; the mixer is shared and lock-free.

use std::sync::Arc;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{BufferSize as CpalBufferSize, SampleFormat, StreamConfig};

use super::AudioHandle;
use crate::config::{BufferSizePolicy, EngineConfig};
use crate::engine::{MixScratch, Mixer, MAX_BUFFER_SIZE};
use crate::error::{EngineError, EngineResult};

/// Buffer size used when the config leaves the choice to us
const DEFAULT_BUFFER_SIZE: u32 = 1024;

/// Known-good responsive size for the low-latency policy
const LOW_LATENCY_BUFFER_SIZE: u32 = 256;

pub(super) fn start_stream(mixer: Arc<Mixer>, config: &EngineConfig) -> EngineResult<AudioHandle> {
    let host = cpal::default_host();
    let device = match &config.output_device {
        Some(name) => find_device_by_name(&host, name)?,
        None => host
            .default_output_device()
            .ok_or_else(|| EngineError::DriverFailure("no default output device".into()))?,
    };

    let device_name = device.name().unwrap_or_else(|_| "Unknown".to_string());
    log::info!("Using audio device: {}", device_name);

    let (stream_config, buffer_size) = output_config(&device, config)?;
    let sample_rate = stream_config.sample_rate.0;
    if sample_rate != mixer.sample_rate() {
        log::warn!(
            "Device runs at {}Hz but the session is {}Hz; playback will be detuned until the session is resampled",
            sample_rate,
            mixer.sample_rate()
        );
    }
    log::info!(
        "Audio config: {} channels, {}Hz, {} frames (~{:.1}ms latency)",
        stream_config.channels,
        sample_rate,
        buffer_size,
        (buffer_size as f32 / sample_rate as f32) * 1000.0
    );

    let channels = stream_config.channels as usize;
    let mut scratch = MixScratch::new();
    let stream = device
        .build_output_stream(
            &stream_config,
            move |data: &mut [f32], _info: &cpal::OutputCallbackInfo| {
                let nframes = data.len() / channels;
                mixer.mix_stereo_interleaved(nframes, channels, data, &mut scratch);
            },
            |err| log::error!("Audio stream error: {}", err),
            None,
        )
        .map_err(|e| EngineError::DriverFailure(e.to_string()))?;

    stream
        .play()
        .map_err(|e| EngineError::DriverFailure(e.to_string()))?;

    log::info!("Audio stream started");

    Ok(AudioHandle {
        _stream: stream,
        sample_rate,
        buffer_size,
    })
}

fn find_device_by_name(host: &cpal::Host, name: &str) -> EngineResult<cpal::Device> {
    let devices = host
        .output_devices()
        .map_err(|e| EngineError::DriverFailure(e.to_string()))?;
    for device in devices {
        if device.name().map(|n| n == name).unwrap_or(false) {
            return Ok(device);
        }
    }
    Err(EngineError::DriverFailure(format!(
        "audio device not found: {}",
        name
    )))
}

/// Pick the best output configuration for a device
///
/// Returns the stream config plus the buffer size in frames.
fn output_config(
    device: &cpal::Device,
    config: &EngineConfig,
) -> EngineResult<(StreamConfig, u32)> {
    let supported: Vec<_> = device
        .supported_output_configs()
        .map_err(|e| EngineError::DriverFailure(e.to_string()))?
        .collect();
    if supported.is_empty() {
        return Err(EngineError::DriverFailure(
            "no supported output configurations".into(),
        ));
    }

    let target_rate = config.sample_rate;

    // Prefer f32 stereo with the session rate in range, then anything stereo
    let best = supported
        .iter()
        .filter(|c| c.sample_format() == SampleFormat::F32)
        .filter(|c| c.channels() >= 2)
        .find(|c| target_rate >= c.min_sample_rate().0 && target_rate <= c.max_sample_rate().0)
        .or_else(|| supported.iter().find(|c| c.channels() >= 2))
        .or_else(|| supported.first())
        .ok_or_else(|| EngineError::DriverFailure("no usable output configuration".into()))?;

    let sample_rate =
        if target_rate >= best.min_sample_rate().0 && target_rate <= best.max_sample_rate().0 {
            cpal::SampleRate(target_rate)
        } else {
            let fallback = best.max_sample_rate();
            log::warn!(
                "Audio device doesn't support {}Hz, falling back to {}Hz",
                target_rate,
                fallback.0
            );
            fallback
        };

    let buffer_size = match config.buffer_size {
        BufferSizePolicy::Default => DEFAULT_BUFFER_SIZE,
        BufferSizePolicy::Fixed(frames) => frames.clamp(64, MAX_BUFFER_SIZE as u32),
        BufferSizePolicy::LowLatency => LOW_LATENCY_BUFFER_SIZE,
    };

    let stream_config = StreamConfig {
        channels: best.channels(),
        sample_rate,
        buffer_size: CpalBufferSize::Fixed(buffer_size),
    };
    Ok((stream_config, buffer_size))
}
