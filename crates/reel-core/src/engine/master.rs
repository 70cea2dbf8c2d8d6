//! Master bus - the final stereo stage
//!
//! Applies the master fader to the already-mixed stereo signal and feeds the
//! post-fader result to the master meters. The master has no mute or solo
//! semantics; its embedded [`ChannelCore`] is used for fader and meters only.

use crate::engine::ChannelCore;
use crate::types::StereoBuffer;

/// The final gain and metering stage
pub struct MasterBus {
    channel: ChannelCore,
}

impl MasterBus {
    pub(crate) fn new(sample_rate: u32) -> Self {
        Self {
            channel: ChannelCore::new(sample_rate),
        }
    }

    /// Fader and meters
    pub fn channel(&self) -> &ChannelCore {
        &self.channel
    }

    /// Apply the fader in place and meter the post-fader signal
    pub fn process(&self, mix: &mut StereoBuffer) {
        let gain = self.channel.fader_linear();
        for frame in mix.iter_mut() {
            *frame *= gain;
        }
        self.channel.meter(0).process(mix.iter().map(|f| f.left));
        self.channel.meter(1).process(mix.iter().map(|f| f.right));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_master_applies_fader_post_meter() {
        let master = MasterBus::new(44100);
        master.channel().set_fader_linear(0.5);

        let mut mix = StereoBuffer::from_interleaved(&[0.8, -0.8, 0.8, -0.8]);
        master.process(&mut mix);
        assert_eq!(mix[0].left, 0.4);
        assert_eq!(mix[0].right, -0.4);
        // Meters see the post-fader signal
        assert!(master.channel().meter(0).absolute_peak() <= 0.45);
        assert!(master.channel().meter(0).absolute_peak() >= 0.39);
    }
}
