//! Engine error types

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur in the sequence and mixing engine
#[derive(Error, Debug)]
pub enum EngineError {
    /// Slice or edit indices out of bounds; the target is unchanged
    #[error("range {lo}..{hi} out of bounds (length {len})")]
    InvalidRange { lo: usize, hi: usize, len: usize },

    /// Requested export or buffer format unsupported
    #[error("unsupported format: {0}")]
    InvalidFormat(String),

    /// Conversion ratio outside the resampler's accepted range
    #[error("unsupported sample-rate conversion: {from}Hz -> {to}Hz")]
    InvalidSampleRate { from: u32, to: u32 },

    /// Audio driver init/start failed; fatal to the session
    #[error("audio driver failure: {0}")]
    DriverFailure(String),

    /// File could not be opened or decoded
    #[error("failed to decode {}: {reason}", path.display())]
    DecoderFailure { path: PathBuf, reason: String },

    /// Progress callback requested cancellation; partial buffers were freed
    #[error("operation cancelled")]
    Cancelled,

    /// A second driver instance was requested in the same process
    #[error("an audio driver instance is already active in this process")]
    SingletonViolation,
}

impl EngineError {
    /// Shorthand for an out-of-bounds range error
    pub fn range(lo: usize, hi: usize, len: usize) -> Self {
        EngineError::InvalidRange { lo, hi, len }
    }
}

/// Result type for engine operations
pub type EngineResult<T> = Result<T, EngineError>;
