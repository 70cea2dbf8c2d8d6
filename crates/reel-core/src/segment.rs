//! Immutable audio segments
//!
//! An [`AudioSegment`] is a reference into an interleaved sample buffer plus
//! a channel count and a waveform cache. The buffer is never mutated after
//! construction; every edit in the engine produces new segments referencing
//! new buffers, which is what makes undo restore bit-exact audio and lets
//! the audio thread read segments without synchronization.

use std::sync::Arc;

use crate::error::{EngineError, EngineResult};
use crate::types::Sample;
use crate::waveform::WaveformCache;

/// An immutable slice of interleaved audio with its overview cache
///
/// Cloning and slicing are cheap: both share the underlying buffer. Slicing
/// also slices the cache so overview queries keep working on the sub-range.
#[derive(Clone)]
pub struct AudioSegment {
    samples: Arc<Vec<Sample>>,
    /// Start of this segment within `samples`, in samples
    offset: usize,
    /// Length in samples (always a multiple of `channels`)
    len: usize,
    channels: usize,
    cache: Arc<WaveformCache>,
}

impl AudioSegment {
    /// Take ownership of an interleaved buffer and compute its cache
    pub fn new(samples: Vec<Sample>, channels: usize) -> EngineResult<Self> {
        if channels == 0 || samples.len() % channels != 0 {
            return Err(EngineError::InvalidFormat(format!(
                "buffer of {} samples is not interleaved {}-channel audio",
                samples.len(),
                channels
            )));
        }
        let cache = Arc::new(WaveformCache::build(&samples, channels));
        let len = samples.len();
        Ok(Self {
            samples: Arc::new(samples),
            offset: 0,
            len,
            channels,
            cache,
        })
    }

    /// Length in samples
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    /// True when the segment holds no samples
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Length in frames
    #[inline]
    pub fn nframes(&self) -> usize {
        self.len / self.channels
    }

    /// Number of interleaved channels
    #[inline]
    pub fn channels(&self) -> usize {
        self.channels
    }

    /// Read one sample; `i` must be below `len`
    #[inline]
    pub fn sample(&self, i: usize) -> Sample {
        self.samples[self.offset + i]
    }

    /// The segment's samples as a slice
    #[inline]
    pub fn as_slice(&self) -> &[Sample] {
        &self.samples[self.offset..self.offset + self.len]
    }

    /// The waveform cache covering exactly this segment's range
    pub fn cache(&self) -> &WaveformCache {
        &self.cache
    }

    /// A segment covering the sample range `[lo, hi)` of this one
    ///
    /// Shares the sample buffer; the cache is sliced to match. Both bounds
    /// must be multiples of the channel count.
    pub fn slice(&self, lo: usize, hi: usize) -> EngineResult<Self> {
        if lo > hi || hi > self.len || lo % self.channels != 0 || hi % self.channels != 0 {
            return Err(EngineError::range(lo, hi, self.len));
        }
        Ok(Self {
            samples: Arc::clone(&self.samples),
            offset: self.offset + lo,
            len: hi - lo,
            channels: self.channels,
            cache: Arc::new(self.cache.slice(lo / self.channels, hi / self.channels)),
        })
    }
}
