//! Offline time-stretching via signalsmith-stretch
//!
//! Region edits (subregion stretch, three-point onset moves) run entirely in
//! the edit domain, so the wrapper here trades latency handling for exact
//! output sizing: callers say how many frames they want and get exactly that
//! many back. The stretch ratio is implied by the input/output sizes.

use signalsmith_stretch::Stretch;

use crate::types::Sample;

/// Offline stretcher for a fixed channel count
pub struct OfflineStretcher {
    stretcher: Stretch,
    channels: usize,
}

impl OfflineStretcher {
    /// Create a stretcher for interleaved audio with the given channel count
    pub fn new(channels: usize, sample_rate: u32) -> Self {
        Self {
            stretcher: Stretch::preset_default(channels as u32, sample_rate),
            channels,
        }
    }

    /// Stretch an interleaved clip to exactly `output_frames` frames
    ///
    /// An empty input or a zero-length output yields silence of the
    /// requested size. The stretcher state is reset afterwards so instances
    /// can be reused across unrelated clips.
    pub fn stretch(&mut self, input: &[Sample], output_frames: usize) -> Vec<Sample> {
        let mut output = vec![0.0; output_frames * self.channels];
        if input.is_empty() || output_frames == 0 {
            return output;
        }

        self.stretcher.process(input, &mut output);
        self.stretcher.reset();
        output
    }
}

/// One-shot convenience: stretch `input` to `output_frames` frames
pub fn stretch_clip(
    input: &[Sample],
    channels: usize,
    output_frames: usize,
    sample_rate: u32,
) -> Vec<Sample> {
    OfflineStretcher::new(channels, sample_rate).stretch(input, output_frames)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_is_exactly_sized() {
        let input: Vec<Sample> = (0..4410).map(|i| (i as f32 * 0.01).sin()).collect();
        let out = stretch_clip(&input, 1, 8820, 44100);
        assert_eq!(out.len(), 8820);
        let out = stretch_clip(&input, 1, 2205, 44100);
        assert_eq!(out.len(), 2205);
    }

    #[test]
    fn test_empty_input_yields_silence() {
        let out = stretch_clip(&[], 2, 100, 44100);
        assert_eq!(out.len(), 200);
        assert!(out.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn test_stereo_frames_stay_interleaved() {
        let mut input = Vec::new();
        for i in 0..4410 {
            let v = (i as f32 * 0.02).sin();
            input.push(v);
            input.push(v);
        }
        let out = stretch_clip(&input, 2, 4410, 44100);
        assert_eq!(out.len(), 8820);
        // Identical L/R input must produce identical L/R output
        for frame in out.chunks_exact(2) {
            assert!((frame[0] - frame[1]).abs() < 1e-4);
        }
    }
}
