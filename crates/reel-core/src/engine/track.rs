//! Track - a channel that owns regions and mixes them
//!
//! The region vector is published through a `SharedCell`, so placing or
//! removing regions is an atomic swap and the audio callback iterates the
//! vector without locks. Mixing follows the channel model: per-region
//! samples scaled by the fader accumulate into the track's working buffers,
//! L/R solo shapes the result, the meters follow the working buffers, and
//! the shaped signal is summed into the mix-down buffer.

use std::sync::Arc;

use basedrop::{Shared, SharedCell};

use crate::engine::{ChannelCore, Timeline};
use crate::gc::gc_handle;
use crate::region::Region;
use crate::types::StereoBuffer;

/// A mixer channel holding zero or more regions
pub struct Track {
    name: String,
    channel: ChannelCore,
    regions: SharedCell<Vec<Arc<Region>>>,
    timeline: Arc<Timeline>,
}

impl Track {
    pub(crate) fn new(name: String, sample_rate: u32, timeline: Arc<Timeline>) -> Self {
        Self {
            name,
            channel: ChannelCore::new(sample_rate),
            regions: SharedCell::new(Shared::new(&gc_handle(), Vec::new())),
            timeline,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The track's fader/mute/solo state and meters
    pub fn channel(&self) -> &ChannelCore {
        &self.channel
    }

    /// Place a region on this track, growing the session to cover it
    pub fn add_region(&self, region: Arc<Region>) {
        region.place_on_timeline(&self.timeline);
        self.timeline.ensure_session_length(region.global_end());

        let current = self.regions.get();
        let mut next = Vec::with_capacity(current.len() + 1);
        next.extend(current.iter().cloned());
        next.push(region);
        self.regions.set(Shared::new(&gc_handle(), next));
    }

    /// Remove a region from this track (the region itself is untouched)
    pub fn remove_region(&self, region: &Arc<Region>) {
        let current = self.regions.get();
        let next: Vec<Arc<Region>> = current
            .iter()
            .filter(|r| !Arc::ptr_eq(r, region))
            .cloned()
            .collect();
        self.regions.set(Shared::new(&gc_handle(), next));
    }

    /// The current region vector (lock-free)
    pub fn regions(&self) -> Shared<Vec<Arc<Region>>> {
        self.regions.get()
    }

    pub fn region_count(&self) -> usize {
        self.regions.get().len()
    }

    /// Mix global frames `[t0, t0 + mix.len())` into `mix`
    ///
    /// `audible` is decided by the mixer's solo model; an inaudible or muted
    /// track contributes silence but its meters still run (so they decay).
    /// `work` must have capacity for the block; nothing here allocates.
    pub fn mix_into(&self, t0: usize, audible: bool, work: &mut StereoBuffer, mix: &mut StereoBuffer) {
        let nframes = mix.len();
        work.set_len_from_capacity(nframes);
        work.fill_silence();

        if audible && !self.channel.muted() {
            let fader = self.channel.fader_linear();
            let regions = self.regions.get();
            for region in regions.iter() {
                if region.muted() {
                    continue;
                }
                let snap = region.snapshot();
                let lo = snap.start().max(t0);
                let hi = snap.end().min(t0 + nframes);
                let frames = work.as_mut_slice();
                for f in lo..hi {
                    let frame = &mut frames[f - t0];
                    frame.left += snap.sample(0, f) * fader;
                    frame.right += snap.sample(1, f) * fader;
                }
            }
        }

        // Per-channel solo: the soloed side passes, the other is silenced
        if self.channel.left_solo() {
            for frame in work.iter_mut() {
                frame.right = 0.0;
            }
        } else if self.channel.right_solo() {
            for frame in work.iter_mut() {
                frame.left = 0.0;
            }
        }

        self.channel.meter(0).process(work.iter().map(|f| f.left));
        self.channel.meter(1).process(work.iter().map(|f| f.right));

        mix.add_buffer(work);
    }
}
