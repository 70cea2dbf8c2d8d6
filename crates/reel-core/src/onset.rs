//! Offline onset detection over piece-table slices
//!
//! Spectral-flux detection: the slice is mixed to mono, windowed frames are
//! run through an FFT, and the positive change in magnitude between
//! consecutive frames forms an onset-strength curve. Local maxima above the
//! strength threshold (and above the silence floor) are reported as onsets.
//! Edit-domain only; typical use is picking split points for three-point
//! stretches.

use rustfft::num_complex::Complex;
use rustfft::FftPlanner;

use crate::piece_table::PieceTable;
use crate::types::Sample;

/// Detection parameters
#[derive(Debug, Clone)]
pub struct OnsetParams {
    /// Analysis window size in frames
    pub window: usize,
    /// Hop between analysis windows in frames
    pub hop: usize,
    /// Onset-strength threshold, relative to the strongest flux in the
    /// slice (0..1)
    pub threshold: f32,
    /// RMS floor below which a window can never be an onset (linear)
    pub silence_threshold: f32,
}

impl Default for OnsetParams {
    fn default() -> Self {
        Self {
            window: 1024,
            hop: 256,
            threshold: 0.3,
            silence_threshold: 1e-4,
        }
    }
}

/// Find onset positions in a slice, as sorted local frame indices
pub fn detect_onsets(slice: &PieceTable, params: &OnsetParams) -> Vec<usize> {
    let window = params.window.max(2);
    let hop = params.hop.max(1);
    let nframes = slice.nframes();
    if nframes < window {
        return Vec::new();
    }

    let mono = mixdown(slice);
    let hann: Vec<f32> = (0..window)
        .map(|i| {
            let x = std::f32::consts::PI * i as f32 / (window - 1) as f32;
            x.sin() * x.sin()
        })
        .collect();

    let mut planner = FftPlanner::<f32>::new();
    let fft = planner.plan_fft_forward(window);

    let nbins = window / 2 + 1;
    let mut prev_mag = vec![0.0f32; nbins];
    let mut buf = vec![Complex::new(0.0f32, 0.0f32); window];

    let hops = (nframes - window) / hop + 1;
    let mut flux = Vec::with_capacity(hops);
    let mut rms = Vec::with_capacity(hops);

    for h in 0..hops {
        let start = h * hop;
        let mut energy = 0.0f32;
        for (i, c) in buf.iter_mut().enumerate() {
            let s = mono[start + i];
            energy += s * s;
            *c = Complex::new(s * hann[i], 0.0);
        }
        fft.process(&mut buf);

        let mut f = 0.0f32;
        for (bin, c) in buf[..nbins].iter().enumerate() {
            let mag = c.norm();
            f += (mag - prev_mag[bin]).max(0.0);
            prev_mag[bin] = mag;
        }
        flux.push(f);
        rms.push((energy / window as f32).sqrt());
    }

    let peak_flux = flux.iter().copied().fold(0.0f32, f32::max);
    if peak_flux <= 0.0 {
        return Vec::new();
    }

    let mut onsets = Vec::new();
    for h in 1..hops {
        let rising = flux[h] > flux[h - 1];
        let falling_next = h + 1 >= hops || flux[h] >= flux[h + 1];
        let strong = flux[h] / peak_flux > params.threshold;
        let audible = rms[h] > params.silence_threshold;
        if rising && falling_next && strong && audible {
            onsets.push(h * hop);
        }
    }
    onsets
}

fn mixdown(slice: &PieceTable) -> Vec<Sample> {
    let channels = slice.channels();
    let samples = slice.to_vec();
    if channels == 1 {
        return samples;
    }
    samples
        .chunks_exact(channels)
        .map(|frame| frame.iter().sum::<Sample>() / channels as Sample)
        .collect()
}
