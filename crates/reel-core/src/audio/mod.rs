//! Audio driver shim
//!
//! Thin cpal front-end: the device callback calls
//! [`crate::engine::Mixer::mix_stereo_interleaved`] with a scratch buffer
//! owned by the callback closure, so the real-time path never allocates.
//!
//! The underlying drivers tolerate one client per process, so stream
//! startup is guarded by a process-wide flag: a second
//! [`start_stream`] while a handle is alive fails with
//! `SingletonViolation`, and dropping the handle releases the slot.

mod cpal_backend;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::config::EngineConfig;
use crate::engine::Mixer;
use crate::error::{EngineError, EngineResult};

static DRIVER_ACTIVE: AtomicBool = AtomicBool::new(false);

/// Handle to the running audio stream
///
/// Keeps the stream alive; drop it to stop audio and release the
/// process-wide driver slot.
pub struct AudioHandle {
    _stream: cpal::Stream,
    sample_rate: u32,
    buffer_size: u32,
}

impl AudioHandle {
    /// Sample rate the device is running at
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Negotiated buffer size in frames
    pub fn buffer_size(&self) -> u32 {
        self.buffer_size
    }

    /// Output latency in milliseconds (one buffer)
    pub fn latency_ms(&self) -> f32 {
        (self.buffer_size as f32 / self.sample_rate as f32) * 1000.0
    }
}

impl Drop for AudioHandle {
    fn drop(&mut self) {
        DRIVER_ACTIVE.store(false, Ordering::SeqCst);
        log::info!("Audio stream stopped");
    }
}

/// Start the output stream and begin calling the mixer
///
/// Fails with `SingletonViolation` if a stream is already running in this
/// process and with `DriverFailure` when device negotiation or stream
/// startup fails.
pub fn start_stream(mixer: Arc<Mixer>, config: &EngineConfig) -> EngineResult<AudioHandle> {
    if DRIVER_ACTIVE.swap(true, Ordering::SeqCst) {
        return Err(EngineError::SingletonViolation);
    }
    match cpal_backend::start_stream(mixer, config) {
        Ok(handle) => Ok(handle),
        Err(e) => {
            DRIVER_ACTIVE.store(false, Ordering::SeqCst);
            Err(e)
        }
    }
}
