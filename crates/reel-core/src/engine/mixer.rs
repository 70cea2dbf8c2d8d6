//! Mixer - tracks, master bus, and the callback entry points
//!
//! The mixer owns the track vector (swap-published so the callback iterates
//! it lock-free), the master bus, and the timeline. The driver calls
//! [`Mixer::mix_stereo_interleaved`] or
//! [`Mixer::mix_stereo_non_interleaved`] with a pre-allocated
//! [`MixScratch`]; both split each buffer at loop and session boundaries so
//! loop wraps are sample-accurate. [`Mixer::bounce_to_interleaved`] renders
//! the same mix from an independent cursor without touching the transport.

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use anyhow::Context;
use basedrop::{Shared, SharedCell};

use crate::engine::{MasterBus, Timeline, Track};
use crate::error::{EngineError, EngineResult};
use crate::gc::gc_handle;
use crate::types::StereoBuffer;

/// Largest block the mix path handles at once; covers every common device
/// buffer size, and larger callbacks are processed in chunks of this
pub const MAX_BUFFER_SIZE: usize = 8192;

/// Pre-allocated working buffers for the mix path
///
/// Create one per consumer of the mix entry points (the audio callback owns
/// one; each bounce allocates its own) and reuse it across calls.
pub struct MixScratch {
    work: StereoBuffer,
    mix: StereoBuffer,
}

impl MixScratch {
    pub fn new() -> Self {
        Self {
            work: StereoBuffer::silence(MAX_BUFFER_SIZE),
            mix: StereoBuffer::silence(MAX_BUFFER_SIZE),
        }
    }
}

impl Default for MixScratch {
    fn default() -> Self {
        Self::new()
    }
}

/// The top of the playback engine
pub struct Mixer {
    sample_rate: u32,
    timeline: Arc<Timeline>,
    master: MasterBus,
    tracks: SharedCell<Vec<Arc<Track>>>,
    track_counter: AtomicUsize,
}

impl Mixer {
    pub fn new(sample_rate: u32) -> Arc<Mixer> {
        Arc::new(Mixer {
            sample_rate,
            timeline: Arc::new(Timeline::new()),
            master: MasterBus::new(sample_rate),
            tracks: SharedCell::new(Shared::new(&gc_handle(), Vec::new())),
            track_counter: AtomicUsize::new(0),
        })
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn timeline(&self) -> &Arc<Timeline> {
        &self.timeline
    }

    pub fn master(&self) -> &MasterBus {
        &self.master
    }

    /// Add a new track
    ///
    /// The track vector should only change while the transport is stopped;
    /// the swap publication keeps an in-flight callback safe regardless.
    pub fn create_track(&self) -> Arc<Track> {
        let n = self.track_counter.fetch_add(1, Ordering::Relaxed) + 1;
        let track = Arc::new(Track::new(
            format!("Track {}", n),
            self.sample_rate,
            Arc::clone(&self.timeline),
        ));

        let current = self.tracks.get();
        let mut next = Vec::with_capacity(current.len() + 1);
        next.extend(current.iter().cloned());
        next.push(Arc::clone(&track));
        self.tracks.set(Shared::new(&gc_handle(), next));

        log::info!("Created {}", track.name());
        track
    }

    /// Remove a track from the mix
    pub fn remove_track(&self, track: &Arc<Track>) {
        let current = self.tracks.get();
        let next: Vec<Arc<Track>> = current
            .iter()
            .filter(|t| !Arc::ptr_eq(t, track))
            .cloned()
            .collect();
        self.tracks.set(Shared::new(&gc_handle(), next));
    }

    /// The current track vector (lock-free)
    pub fn tracks(&self) -> Shared<Vec<Arc<Track>>> {
        self.tracks.get()
    }

    // ── transport facade ───────────────────────────────────────────────

    pub fn play(&self) {
        self.timeline.play();
    }

    pub fn pause(&self) {
        self.timeline.pause();
    }

    pub fn seek(&self, frame: usize) {
        self.timeline.seek(frame);
    }

    pub fn enable_loop(&self, start: usize, end: usize) {
        self.timeline.enable_loop(start, end);
    }

    pub fn disable_loop(&self) {
        self.timeline.disable_loop();
    }

    /// Recompute the session length from the tracks' region extents
    ///
    /// Growth happens automatically when regions are placed or linked
    /// sequences grow; call this after edits that shrink the session.
    pub fn update_session_length(&self) {
        let tracks = self.tracks.get();
        let mut frames = 0;
        for track in tracks.iter() {
            for region in track.regions().iter() {
                frames = frames.max(region.global_end());
            }
        }
        self.timeline.set_session_length(frames);
    }

    /// Mix one block at `t0` into the scratch mix buffer
    fn render_block(&self, t0: usize, nframes: usize, scratch: &mut MixScratch) {
        scratch.mix.set_len_from_capacity(nframes);
        scratch.mix.fill_silence();

        let tracks = self.tracks.get();
        // Solo model: when any track is soloed, only soloed tracks sound
        let any_solo = tracks.iter().any(|t| t.channel().soloed());
        for track in tracks.iter() {
            let audible = !any_solo || track.channel().soloed();
            track.mix_into(t0, audible, &mut scratch.work, &mut scratch.mix);
        }

        self.master.process(&mut scratch.mix);
    }

    /// The next transport-contiguous chunk of at most `want` frames
    ///
    /// Applies deferred transport rules (loop wrap, end-of-session stop)
    /// when the cursor sits exactly on a boundary. `None` means playback
    /// stopped.
    fn next_chunk(&self, want: usize) -> Option<(usize, usize)> {
        // Bounded retries: each pass either yields a chunk or moves the
        // transport through tick(0)
        for _ in 0..4 {
            if !self.timeline.is_playing() {
                return None;
            }
            let t0 = self.timeline.transport();
            let session = self.timeline.session_frames();

            if self.timeline.is_looping() {
                let (_, loop_end) = self.timeline.loop_bounds();
                if t0 >= loop_end {
                    self.timeline.tick(0);
                    if self.timeline.transport() == t0 {
                        return None;
                    }
                    continue;
                }
                return Some((t0, want.min(loop_end - t0)));
            }

            if t0 >= session {
                self.timeline.tick(0);
                continue;
            }
            return Some((t0, want.min(session - t0)));
        }
        None
    }

    /// Real-time entry point: fill `out` with `nframes` frames of `nch`
    /// interleaved channels
    ///
    /// Channels beyond stereo are silenced. When the transport is stopped
    /// (or stops mid-buffer) the remainder is silence.
    pub fn mix_stereo_interleaved(
        &self,
        nframes: usize,
        nch: usize,
        out: &mut [f32],
        scratch: &mut MixScratch,
    ) {
        out[..nframes * nch].fill(0.0);
        if nch == 0 {
            return;
        }

        let mut done = 0;
        while done < nframes {
            let want = (nframes - done).min(MAX_BUFFER_SIZE);
            let Some((t0, chunk)) = self.next_chunk(want) else {
                break;
            };
            self.render_block(t0, chunk, scratch);
            for (j, frame) in scratch.mix.iter().enumerate() {
                let base = (done + j) * nch;
                out[base] = frame.left;
                if nch > 1 {
                    out[base + 1] = frame.right;
                }
            }
            self.timeline.tick(chunk);
            done += chunk;
        }
    }

    /// Real-time entry point: fill separate left/right buffers
    pub fn mix_stereo_non_interleaved(
        &self,
        nframes: usize,
        out_left: &mut [f32],
        out_right: &mut [f32],
        scratch: &mut MixScratch,
    ) {
        out_left[..nframes].fill(0.0);
        out_right[..nframes].fill(0.0);

        let mut done = 0;
        while done < nframes {
            let want = (nframes - done).min(MAX_BUFFER_SIZE);
            let Some((t0, chunk)) = self.next_chunk(want) else {
                break;
            };
            self.render_block(t0, chunk, scratch);
            scratch.mix.to_channels(
                &mut out_left[done..done + chunk],
                &mut out_right[done..done + chunk],
            );
            self.timeline.tick(chunk);
            done += chunk;
        }
    }

    /// Offline render from frame 0, independent of the transport
    ///
    /// Runs the same mix path as playback but with its own cursor, so a
    /// bounce can proceed while the playback transport is paused or parked
    /// elsewhere. Loop mode does not apply. `nch` must be 1 or 2.
    pub fn bounce_to_interleaved(
        &self,
        nframes: usize,
        nch: usize,
        out: &mut [f32],
    ) -> EngineResult<()> {
        if !(1..=2).contains(&nch) {
            return Err(EngineError::InvalidFormat(format!(
                "{}-channel bounce not supported (stereo output only)",
                nch
            )));
        }
        if out.len() < nframes * nch {
            return Err(EngineError::range(0, nframes * nch, out.len()));
        }

        let mut scratch = MixScratch::new();
        let mut cursor = 0;
        while cursor < nframes {
            let chunk = (nframes - cursor).min(MAX_BUFFER_SIZE);
            self.render_block(cursor, chunk, &mut scratch);
            for (j, frame) in scratch.mix.iter().enumerate() {
                let base = (cursor + j) * nch;
                if nch == 1 {
                    out[base] = 0.5 * (frame.left + frame.right);
                } else {
                    out[base] = frame.left;
                    out[base + 1] = frame.right;
                }
            }
            cursor += chunk;
        }
        Ok(())
    }

    /// Bounce `nframes` frames to a stereo WAV file
    ///
    /// `bits` selects 16-bit integer or 32-bit float samples. The progress
    /// callback receives the rendered fraction and may cancel by returning
    /// false, in which case the partial file is removed.
    pub fn bounce_to_wav(
        &self,
        path: &Path,
        nframes: usize,
        bits: u16,
        mut progress: impl FnMut(f32) -> bool,
    ) -> anyhow::Result<()> {
        let sample_format = match bits {
            16 => hound::SampleFormat::Int,
            32 => hound::SampleFormat::Float,
            other => {
                return Err(EngineError::InvalidFormat(format!(
                    "{}-bit WAV export not supported",
                    other
                ))
                .into())
            }
        };
        let spec = hound::WavSpec {
            channels: 2,
            sample_rate: self.sample_rate,
            bits_per_sample: bits,
            sample_format,
        };

        let mut writer = hound::WavWriter::create(path, spec)
            .with_context(|| format!("creating {}", path.display()))?;

        let mut scratch = MixScratch::new();
        let mut cursor = 0;
        while cursor < nframes {
            let chunk = (nframes - cursor).min(MAX_BUFFER_SIZE);
            self.render_block(cursor, chunk, &mut scratch);
            for frame in scratch.mix.iter() {
                if bits == 16 {
                    let l = (frame.left.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
                    let r = (frame.right.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
                    writer.write_sample(l)?;
                    writer.write_sample(r)?;
                } else {
                    writer.write_sample(frame.left)?;
                    writer.write_sample(frame.right)?;
                }
            }
            cursor += chunk;

            if !progress(cursor as f32 / nframes as f32) {
                drop(writer);
                let _ = std::fs::remove_file(path);
                return Err(EngineError::Cancelled.into());
            }
        }

        writer.finalize().context("finalizing WAV")?;
        log::info!("Bounced {} frames to {}", nframes, path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::region::Region;
    use crate::sequence::Sequence;

    fn mixer_with_region(value: f32, nframes: usize, offset: usize) -> Arc<Mixer> {
        let mixer = Mixer::new(44100);
        let track = mixer.create_track();
        let seq = Arc::new(
            Sequence::from_samples("s", vec![value; nframes], 44100, 1).unwrap(),
        );
        track.add_region(Region::new(seq, "r", offset));
        mixer
    }

    #[test]
    fn test_stopped_transport_outputs_silence() {
        let mixer = mixer_with_region(0.5, 1000, 0);
        let mut out = vec![1.0f32; 256 * 2];
        let mut scratch = MixScratch::new();
        mixer.mix_stereo_interleaved(256, 2, &mut out, &mut scratch);
        assert!(out.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn test_playback_advances_transport() {
        let mixer = mixer_with_region(0.5, 1000, 0);
        let mut out = vec![0.0f32; 256 * 2];
        let mut scratch = MixScratch::new();
        mixer.play();
        mixer.mix_stereo_interleaved(256, 2, &mut out, &mut scratch);
        assert_eq!(mixer.timeline().transport(), 256);
        assert_eq!(out[0], 0.5);
        assert_eq!(out[1], 0.5);
    }

    #[test]
    fn test_playback_stops_at_session_end() {
        let mixer = mixer_with_region(0.5, 100, 0);
        let mut out = vec![0.0f32; 256 * 2];
        let mut scratch = MixScratch::new();
        mixer.play();
        mixer.mix_stereo_interleaved(256, 2, &mut out, &mut scratch);
        assert!(!mixer.timeline().is_playing());
        assert_eq!(mixer.timeline().transport(), 100);
        assert_eq!(out[99 * 2], 0.5);
        assert_eq!(out[100 * 2], 0.0);
    }

    #[test]
    fn test_non_interleaved_matches_interleaved() {
        let mixer = mixer_with_region(0.25, 500, 10);
        let mut scratch = MixScratch::new();

        mixer.play();
        let mut inter = vec![0.0f32; 128 * 2];
        mixer.mix_stereo_interleaved(128, 2, &mut inter, &mut scratch);

        mixer.seek(0);
        mixer.play();
        let mut left = vec![0.0f32; 128];
        let mut right = vec![0.0f32; 128];
        mixer.mix_stereo_non_interleaved(128, &mut left, &mut right, &mut scratch);

        for j in 0..128 {
            assert_eq!(inter[j * 2], left[j]);
            assert_eq!(inter[j * 2 + 1], right[j]);
        }
    }

    #[test]
    fn test_bounce_ignores_transport_state() {
        let mixer = mixer_with_region(0.5, 100, 0);
        mixer.seek(50);
        // Transport is paused at frame 50; the bounce still starts at 0
        let mut out = vec![0.0f32; 200 * 2];
        mixer.bounce_to_interleaved(200, 2, &mut out).unwrap();
        assert_eq!(out[0], 0.5);
        assert_eq!(out[99 * 2 + 1], 0.5);
        assert_eq!(out[100 * 2], 0.0);
        assert_eq!(mixer.timeline().transport(), 50);
    }

    #[test]
    fn test_bounce_rejects_bad_channel_counts() {
        let mixer = mixer_with_region(0.5, 10, 0);
        let mut out = vec![0.0f32; 100];
        assert!(matches!(
            mixer.bounce_to_interleaved(10, 3, &mut out),
            Err(EngineError::InvalidFormat(_))
        ));
        assert!(mixer.bounce_to_interleaved(100, 2, &mut out).is_err());
    }

    #[test]
    fn test_solo_excludes_other_tracks() {
        let mixer = Mixer::new(44100);
        let a = mixer.create_track();
        let b = mixer.create_track();
        let seq_a = Arc::new(Sequence::from_samples("a", vec![0.3; 100], 44100, 1).unwrap());
        let seq_b = Arc::new(Sequence::from_samples("b", vec![0.4; 100], 44100, 1).unwrap());
        a.add_region(Region::new(seq_a, "ra", 0));
        b.add_region(Region::new(seq_b, "rb", 0));

        a.channel().set_soloed(true);
        let mut out = vec![0.0f32; 100 * 2];
        mixer.bounce_to_interleaved(100, 2, &mut out).unwrap();
        assert_eq!(out[0], 0.3);

        a.channel().set_soloed(false);
        mixer.bounce_to_interleaved(100, 2, &mut out).unwrap();
        assert!((out[0] - 0.7).abs() < 1e-6);
    }

    #[test]
    fn test_update_session_length_shrinks() {
        let mixer = mixer_with_region(0.1, 1000, 0);
        let tracks = mixer.tracks();
        let region = tracks[0].regions()[0].clone();
        assert_eq!(mixer.timeline().session_frames(), 1000);

        region.shrink_end(400);
        mixer.update_session_length();
        assert_eq!(mixer.timeline().session_frames(), 400);
    }
}
