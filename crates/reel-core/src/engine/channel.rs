//! Shared channel state: fader, mute/solo, meters
//!
//! [`ChannelCore`] is embedded in [`crate::engine::Track`] and
//! [`crate::engine::MasterBus`]. Every field is an atomic so the audio
//! callback reads the channel without locks while the UI writes it.

use std::sync::atomic::{AtomicBool, Ordering};

use crate::meter::{MeterReading, TruePeakMeter};
use crate::types::{db_to_linear, linear_to_db, AtomicF32};

/// Lock-free fader/mute/solo state plus stereo meters
pub struct ChannelCore {
    fader: AtomicF32,
    muted: AtomicBool,
    soloed: AtomicBool,
    left_solo: AtomicBool,
    right_solo: AtomicBool,
    meters: [TruePeakMeter; 2],
}

impl ChannelCore {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            fader: AtomicF32::new(1.0),
            muted: AtomicBool::new(false),
            soloed: AtomicBool::new(false),
            left_solo: AtomicBool::new(false),
            right_solo: AtomicBool::new(false),
            meters: [TruePeakMeter::new(sample_rate), TruePeakMeter::new(sample_rate)],
        }
    }

    /// Fader gain as a linear multiplier
    #[inline]
    pub fn fader_linear(&self) -> f32 {
        self.fader.load()
    }

    /// Set the fader from a linear multiplier (clamped non-negative)
    pub fn set_fader_linear(&self, linear: f32) {
        self.fader.store(linear.max(0.0));
    }

    /// Fader gain in dB
    pub fn fader_db(&self) -> f32 {
        linear_to_db(self.fader.load())
    }

    /// Set the fader in dB
    pub fn set_fader_db(&self, db: f32) {
        self.fader.store(db_to_linear(db));
    }

    #[inline]
    pub fn muted(&self) -> bool {
        self.muted.load(Ordering::Relaxed)
    }

    pub fn set_muted(&self, muted: bool) {
        self.muted.store(muted, Ordering::Relaxed);
    }

    #[inline]
    pub fn soloed(&self) -> bool {
        self.soloed.load(Ordering::Relaxed)
    }

    pub fn set_soloed(&self, soloed: bool) {
        self.soloed.store(soloed, Ordering::Relaxed);
    }

    #[inline]
    pub fn left_solo(&self) -> bool {
        self.left_solo.load(Ordering::Relaxed)
    }

    /// Solo the left channel; mutually exclusive with right solo
    pub fn set_left_solo(&self, on: bool) {
        if on {
            self.right_solo.store(false, Ordering::Relaxed);
        }
        self.left_solo.store(on, Ordering::Relaxed);
    }

    #[inline]
    pub fn right_solo(&self) -> bool {
        self.right_solo.load(Ordering::Relaxed)
    }

    /// Solo the right channel; mutually exclusive with left solo
    pub fn set_right_solo(&self, on: bool) {
        if on {
            self.left_solo.store(false, Ordering::Relaxed);
        }
        self.right_solo.store(on, Ordering::Relaxed);
    }

    /// The meter for channel 0 (left) or 1 (right)
    pub fn meter(&self, ch: usize) -> &TruePeakMeter {
        &self.meters[ch.min(1)]
    }

    /// Read and re-arm both meter latches
    pub fn read_meters(&self) -> [MeterReading; 2] {
        [self.meters[0].read(), self.meters[1].read()]
    }
}
