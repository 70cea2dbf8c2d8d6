//! Multi-resolution min/max waveform envelopes
//!
//! Every audio segment carries a [`WaveformCache`]: per-channel min/max
//! envelopes at a few fixed binning levels, so overview drawing never has to
//! touch the raw samples. Caches are built once per segment (off the
//! real-time path), derived coarse-from-fine where bin sizes divide, and
//! sliced along with their segment.

use rayon::prelude::*;

use crate::types::Sample;

/// The fixed bin sizes, in frames, from finest to coarsest
pub const BIN_SIZES: [usize; 4] = [10, 20, 50, 100];

/// One binning level of the cache
///
/// Bin `j` covers the frames `[lead + j*bin, lead + (j+1)*bin)` of the
/// slice the cache describes. `lead` is zero for freshly built caches and
/// becomes nonzero when a slice boundary falls inside a bin (only whole
/// bins survive slicing).
#[derive(Debug, Clone)]
struct CacheLevel {
    bin: usize,
    lead: usize,
    /// Per-channel min values, one entry per bin
    min: Vec<Vec<Sample>>,
    /// Per-channel max values, one entry per bin
    max: Vec<Vec<Sample>>,
}

impl CacheLevel {
    fn bin_count(&self) -> usize {
        self.min.first().map(|c| c.len()).unwrap_or(0)
    }

    /// Build a level directly from interleaved samples
    fn build(samples: &[Sample], channels: usize, bin: usize) -> Self {
        let nframes = samples.len() / channels;
        let nbins = nframes / bin;

        // Channels are independent, so envelope extraction parallelizes
        // cleanly for long recordings.
        let per_channel: Vec<(Vec<Sample>, Vec<Sample>)> = (0..channels)
            .into_par_iter()
            .map(|ch| {
                let mut min = Vec::with_capacity(nbins);
                let mut max = Vec::with_capacity(nbins);
                for j in 0..nbins {
                    let mut lo = Sample::MAX;
                    let mut hi = Sample::MIN;
                    for f in j * bin..(j + 1) * bin {
                        let s = samples[f * channels + ch];
                        lo = lo.min(s);
                        hi = hi.max(s);
                    }
                    min.push(lo);
                    max.push(hi);
                }
                (min, max)
            })
            .collect();

        let (min, max) = per_channel.into_iter().unzip();
        Self { bin, lead: 0, min, max }
    }

    /// Derive a coarser level from a finer one whose bin size divides ours
    fn derive(finer: &CacheLevel, bin: usize) -> Self {
        debug_assert_eq!(bin % finer.bin, 0);
        let group = bin / finer.bin;
        let nbins = finer.bin_count() / group;

        let min = finer
            .min
            .iter()
            .map(|chan| {
                (0..nbins)
                    .map(|j| {
                        chan[j * group..(j + 1) * group]
                            .iter()
                            .copied()
                            .fold(Sample::MAX, Sample::min)
                    })
                    .collect()
            })
            .collect();
        let max = finer
            .max
            .iter()
            .map(|chan| {
                (0..nbins)
                    .map(|j| {
                        chan[j * group..(j + 1) * group]
                            .iter()
                            .copied()
                            .fold(Sample::MIN, Sample::max)
                    })
                    .collect()
            })
            .collect();

        Self { bin, lead: finer.lead, min, max }
    }

    /// Keep only the bins lying entirely inside `[frame_lo, frame_hi)`
    fn slice(&self, frame_lo: usize, frame_hi: usize) -> Self {
        let bin = self.bin;
        // First bin starting at or after frame_lo
        let first = if frame_lo <= self.lead {
            0
        } else {
            (frame_lo - self.lead).div_ceil(bin)
        };
        // One past the last bin ending at or before frame_hi
        let last = if frame_hi < self.lead {
            0
        } else {
            (frame_hi - self.lead) / bin
        };
        let (first, last) = (first.min(self.bin_count()), last.min(self.bin_count()));

        if first >= last {
            return Self {
                bin,
                lead: 0,
                min: vec![Vec::new(); self.min.len()],
                max: vec![Vec::new(); self.max.len()],
            };
        }

        Self {
            bin,
            lead: self.lead + first * bin - frame_lo,
            min: self.min.iter().map(|c| c[first..last].to_vec()).collect(),
            max: self.max.iter().map(|c| c[first..last].to_vec()).collect(),
        }
    }
}

/// Multi-resolution min/max envelopes of an interleaved buffer
#[derive(Debug, Clone)]
pub struct WaveformCache {
    channels: usize,
    levels: Vec<CacheLevel>,
}

impl WaveformCache {
    /// Build the full cache for an interleaved buffer
    ///
    /// The finest level is computed from the samples; 20-frame bins derive
    /// from 10, 50 from 10, and 100 from 50.
    pub fn build(samples: &[Sample], channels: usize) -> Self {
        debug_assert!(channels > 0);
        debug_assert_eq!(samples.len() % channels, 0);

        let l10 = CacheLevel::build(samples, channels, 10);
        let l20 = CacheLevel::derive(&l10, 20);
        let l50 = CacheLevel::derive(&l10, 50);
        let l100 = CacheLevel::derive(&l50, 100);

        Self {
            channels,
            levels: vec![l10, l20, l50, l100],
        }
    }

    /// Number of channels this cache describes
    pub fn channels(&self) -> usize {
        self.channels
    }

    /// Number of whole bins stored at the level with the given bin size
    pub fn bin_count(&self, bin_size: usize) -> usize {
        self.level(bin_size).map(|l| l.bin_count()).unwrap_or(0)
    }

    /// Frames skipped before the first whole bin at the given bin size
    pub fn lead(&self, bin_size: usize) -> Option<usize> {
        self.level(bin_size).map(|l| l.lead)
    }

    fn level(&self, bin_size: usize) -> Option<&CacheLevel> {
        self.levels.iter().find(|l| l.bin == bin_size)
    }

    /// Envelope of the whole bin starting exactly at `frame_lo`
    ///
    /// Returns `None` when no whole bin of that size starts there (slice
    /// offsets, trailing partial data) — callers fall back to scanning the
    /// raw samples.
    pub fn lookup(&self, ch: usize, bin_size: usize, frame_lo: usize) -> Option<(Sample, Sample)> {
        let level = self.level(bin_size)?;
        if ch >= self.channels || frame_lo < level.lead {
            return None;
        }
        let rel = frame_lo - level.lead;
        if rel % level.bin != 0 {
            return None;
        }
        let j = rel / level.bin;
        let lo = *level.min.get(ch)?.get(j)?;
        let hi = *level.max.get(ch)?.get(j)?;
        Some((lo, hi))
    }

    /// Direct accessor: min value of bin `j` at the given bin size
    pub fn min_at(&self, ch: usize, bin_size: usize, j: usize) -> Option<Sample> {
        self.level(bin_size)?.min.get(ch)?.get(j).copied()
    }

    /// Direct accessor: max value of bin `j` at the given bin size
    pub fn max_at(&self, ch: usize, bin_size: usize, j: usize) -> Option<Sample> {
        self.level(bin_size)?.max.get(ch)?.get(j).copied()
    }

    /// Cache for the frame range `[frame_lo, frame_hi)`
    ///
    /// Keeps only whole bins that lie entirely within the range.
    pub fn slice(&self, frame_lo: usize, frame_hi: usize) -> Self {
        Self {
            channels: self.channels,
            levels: self
                .levels
                .iter()
                .map(|l| l.slice(frame_lo, frame_hi))
                .collect(),
        }
    }
}
