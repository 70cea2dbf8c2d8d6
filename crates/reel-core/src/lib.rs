//! Reel Core - non-destructive audio sequence editing and real-time mixing
//!
//! The editing side is a persistent piece table over immutable audio
//! segments with unlimited undo; the playback side is a lock-free stereo
//! mixer driven from the audio callback. The two meet through atomically
//! published snapshots, so edits land mid-playback without glitches.

pub mod audio;
pub mod config;
pub mod engine;
pub mod error;
pub mod gc;
pub mod history;
pub mod load;
pub mod meter;
pub mod onset;
pub mod piece_table;
pub mod region;
pub mod segment;
pub mod sequence;
pub mod stretch;
pub mod types;
pub mod waveform;

pub use error::{EngineError, EngineResult};
pub use types::*;
