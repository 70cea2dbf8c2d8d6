//! Regions: named, positioned views over a sequence
//!
//! A [`Region`] exposes a window `[slice_start, slice_end)` of its sequence
//! at a global timeline offset, and carries the edit verbs (gain, normalize,
//! fades, reverse, stretching, shrinking). Every verb rewrites the sequence
//! through `Sequence::replace`, so all verbs are undoable and all sibling
//! regions registered as links see the change.
//!
//! The region keeps a cached piece table equal to its window, published
//! through a `SharedCell` so the audio thread reads it without locks. The
//! mix loop takes one [`RegionSnapshot`] per callback and reads samples
//! through that.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, OnceLock, Weak};

use basedrop::{Shared, SharedCell};

use crate::engine::Timeline;
use crate::error::{EngineError, EngineResult};
use crate::gc::gc_handle;
use crate::piece_table::PieceTable;
use crate::segment::AudioSegment;
use crate::sequence::{Sequence, SequenceLink};
use crate::stretch::stretch_clip;
use crate::types::{db_to_linear, Sample};

/// Outcome of a shrink edit: how many frames actually moved
///
/// `ok` is false when the request was clipped at a sequence boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShrinkResult {
    pub ok: bool,
    pub frames: usize,
}

struct RegionState {
    name: String,
    /// Window into the sequence, in frames
    slice_start: usize,
    slice_end: usize,
}

/// A named slice of a sequence placed on the global timeline
pub struct Region {
    sequence: Arc<Sequence>,
    state: Mutex<RegionState>,
    /// Cached table equal to `sequence[slice_start..slice_end]`
    slice: SharedCell<PieceTable>,
    muted: AtomicBool,
    /// Global start frame on the timeline
    offset: AtomicUsize,
    /// Set when the region is placed on a track, so edits that change the
    /// region's extent can grow the session
    timeline: OnceLock<Weak<Timeline>>,
}

impl Region {
    /// A region viewing the whole of `sequence` at the given global offset
    pub fn new(
        sequence: Arc<Sequence>,
        name: impl Into<String>,
        global_offset: usize,
    ) -> Arc<Region> {
        let nframes = sequence.nframes();
        // The full-sequence window is always valid
        match Self::with_bounds(sequence, name, global_offset, 0, nframes) {
            Ok(region) => region,
            Err(_) => unreachable!("full-sequence bounds are always valid"),
        }
    }

    /// A region viewing `[slice_start, slice_end)` frames of `sequence`
    pub fn with_bounds(
        sequence: Arc<Sequence>,
        name: impl Into<String>,
        global_offset: usize,
        slice_start: usize,
        slice_end: usize,
    ) -> EngineResult<Arc<Region>> {
        let nframes = sequence.nframes();
        if slice_start > slice_end || slice_end > nframes {
            return Err(EngineError::range(slice_start, slice_end, nframes));
        }
        let channels = sequence.channels();
        let table = sequence.slice(slice_start * channels, slice_end * channels)?;
        Ok(Arc::new(Region {
            sequence,
            state: Mutex::new(RegionState {
                name: name.into(),
                slice_start,
                slice_end,
            }),
            slice: SharedCell::new(Shared::new(&gc_handle(), table)),
            muted: AtomicBool::new(false),
            offset: AtomicUsize::new(global_offset),
            timeline: OnceLock::new(),
        }))
    }

    /// Register this region as a link on its sequence
    ///
    /// Construction deliberately does not do this; a registered region is a
    /// "soft copy" that tracks edits made through any sibling region.
    pub fn register(self: &Arc<Self>) {
        self.sequence
            .add_link(Arc::downgrade(self) as Weak<dyn SequenceLink>);
    }

    /// Remove this region from its sequence's link set
    pub fn unregister(self: &Arc<Self>) {
        let weak = Arc::downgrade(self) as Weak<dyn SequenceLink>;
        self.sequence.remove_link(&weak);
    }

    /// The sequence this region views
    pub fn sequence(&self) -> &Arc<Sequence> {
        &self.sequence
    }

    pub fn name(&self) -> String {
        self.state.lock().unwrap().name.clone()
    }

    pub fn set_name(&self, name: impl Into<String>) {
        self.state.lock().unwrap().name = name.into();
    }

    pub fn muted(&self) -> bool {
        self.muted.load(Ordering::Relaxed)
    }

    pub fn set_muted(&self, muted: bool) {
        self.muted.store(muted, Ordering::Relaxed);
    }

    /// Global start frame on the timeline
    pub fn global_offset(&self) -> usize {
        self.offset.load(Ordering::Relaxed)
    }

    /// Move the region on the timeline (does not touch the sequence)
    pub fn set_global_offset(&self, frames: usize) {
        self.offset.store(frames, Ordering::Release);
        self.grow_session();
    }

    /// Length of the region in frames
    pub fn nframes(&self) -> usize {
        let st = self.state.lock().unwrap();
        st.slice_end - st.slice_start
    }

    /// One past the last global frame the region covers
    pub fn global_end(&self) -> usize {
        self.global_offset() + self.nframes()
    }

    /// The window into the sequence, in frames
    pub fn slice_bounds(&self) -> (usize, usize) {
        let st = self.state.lock().unwrap();
        (st.slice_start, st.slice_end)
    }

    /// Snapshot for the mix loop: one cell read per callback, then
    /// allocation- and lock-free sample access
    pub fn snapshot(&self) -> RegionSnapshot {
        RegionSnapshot {
            muted: self.muted.load(Ordering::Relaxed),
            offset: self.offset.load(Ordering::Acquire),
            slice: self.slice.get(),
        }
    }

    /// Read one sample at a global frame position (real-time safe)
    ///
    /// Returns 0 outside the region's extent. Mono regions answer every
    /// channel with their single channel.
    pub fn sample_at_global(&self, ch: usize, frame: usize) -> Sample {
        self.snapshot().sample(ch, frame)
    }

    /// An independent piece table covering local frames `[lo, hi)`
    pub fn slice_local(&self, lo: usize, hi: usize) -> EngineResult<PieceTable> {
        let slice = self.slice.get();
        let channels = slice.channels();
        slice.slice(lo * channels, hi * channels)
    }

    /// Waveform overview: min/max over local frames `[frame, frame+bin_size)`
    ///
    /// Consults the per-piece caches where a whole bin lines up and scans
    /// raw samples at piece seams and partial bins. `None` when the range is
    /// empty or the channel does not exist.
    pub fn overview_minmax(
        &self,
        ch: usize,
        bin_size: usize,
        frame: usize,
    ) -> Option<(Sample, Sample)> {
        let slice = self.slice.get();
        let channels = slice.channels();
        if ch >= channels || bin_size == 0 {
            return None;
        }
        let lo = frame.min(slice.nframes()) * channels;
        let hi = (frame + bin_size).min(slice.nframes()) * channels;
        if lo >= hi {
            return None;
        }

        let mut min = Sample::MAX;
        let mut max = Sample::MIN;
        for piece in slice.pieces() {
            let end = piece.offset() + piece.segment().len();
            if end <= lo || piece.offset() >= hi {
                continue;
            }
            let s = lo.max(piece.offset()) - piece.offset();
            let e = hi.min(end) - piece.offset();
            let (fs, fe) = (s / channels, e / channels);

            let cached = if fe - fs == bin_size {
                piece.segment().cache().lookup(ch, bin_size, fs)
            } else {
                None
            };
            match cached {
                Some((lo_v, hi_v)) => {
                    min = min.min(lo_v);
                    max = max.max(hi_v);
                }
                None => {
                    let data = piece.segment().as_slice();
                    for f in fs..fe {
                        let v = data[f * channels + ch];
                        min = min.min(v);
                        max = max.max(v);
                    }
                }
            }
        }
        Some((min, max))
    }

    /// A sibling view sharing this region's sequence
    ///
    /// The copy is not registered as a link; call [`Region::register`] to
    /// make it track edits.
    pub fn soft_copy(&self) -> Arc<Region> {
        let st = self.state.lock().unwrap();
        let table = (*self.slice.get()).clone();
        Arc::new(Region {
            sequence: Arc::clone(&self.sequence),
            state: Mutex::new(RegionState {
                name: st.name.clone(),
                slice_start: st.slice_start,
                slice_end: st.slice_end,
            }),
            slice: SharedCell::new(Shared::new(&gc_handle(), table)),
            muted: AtomicBool::new(self.muted.load(Ordering::Relaxed)),
            offset: AtomicUsize::new(self.offset.load(Ordering::Relaxed)),
            timeline: OnceLock::new(),
        })
    }

    /// An independent copy: the sequence's current table cloned into a new
    /// sequence with its own history
    pub fn hard_copy(&self) -> EngineResult<Arc<Region>> {
        let table = (*self.sequence.current()).clone();
        let sequence = Arc::new(Sequence::from_table(
            format!("{} copy", self.sequence.name()),
            table,
            self.sequence.sample_rate(),
        ));
        let st = self.state.lock().unwrap();
        Region::with_bounds(
            sequence,
            st.name.clone(),
            self.offset.load(Ordering::Relaxed),
            st.slice_start,
            st.slice_end,
        )
    }

    // ── edit verbs ─────────────────────────────────────────────────────

    /// Apply a gain to local frames `[lo, hi)`
    pub fn gain_range(&self, lo: usize, hi: usize, db: f32) -> EngineResult<()> {
        let (glo, ghi) = self.frame_range_to_samples(lo, hi)?;
        let mut buf = self.sequence.slice(glo, ghi)?.to_vec();
        let factor = db_to_linear(db);
        for s in &mut buf {
            *s *= factor;
        }
        self.replace_samples(glo, ghi, buf)
    }

    /// Apply a gain to the whole region
    pub fn gain(&self, db: f32) -> EngineResult<()> {
        self.gain_range(0, self.nframes(), db)
    }

    /// Scale local frames `[lo, hi)` so the peak hits `max_db`
    ///
    /// Silent input is left unchanged (and adds no history state).
    pub fn normalize_range(&self, lo: usize, hi: usize, max_db: f32) -> EngineResult<()> {
        let (glo, ghi) = self.frame_range_to_samples(lo, hi)?;
        let mut buf = self.sequence.slice(glo, ghi)?.to_vec();
        let peak = buf.iter().fold(0.0f32, |acc, s| acc.max(s.abs()));
        if peak == 0.0 {
            return Ok(());
        }
        let factor = db_to_linear(max_db) / peak;
        for s in &mut buf {
            *s *= factor;
        }
        self.replace_samples(glo, ghi, buf)
    }

    /// Normalize the whole region to `max_db`
    pub fn normalize(&self, max_db: f32) -> EngineResult<()> {
        self.normalize_range(0, self.nframes(), max_db)
    }

    /// Time-reverse local frames `[lo, hi)`
    ///
    /// Reverses the interleaved buffer, which for stereo also exchanges the
    /// channels — the time-reverse of the whole stereo signal.
    pub fn reverse_range(&self, lo: usize, hi: usize) -> EngineResult<()> {
        let (glo, ghi) = self.frame_range_to_samples(lo, hi)?;
        let mut buf = self.sequence.slice(glo, ghi)?.to_vec();
        buf.reverse();
        self.replace_samples(glo, ghi, buf)
    }

    /// Linear fade from silence over local frames `[lo, hi)`
    pub fn fade_in(&self, lo: usize, hi: usize) -> EngineResult<()> {
        self.fade(lo, hi, false)
    }

    /// Linear fade to silence over local frames `[lo, hi)`
    pub fn fade_out(&self, lo: usize, hi: usize) -> EngineResult<()> {
        self.fade(lo, hi, true)
    }

    fn fade(&self, lo: usize, hi: usize, out: bool) -> EngineResult<()> {
        let (glo, ghi) = self.frame_range_to_samples(lo, hi)?;
        let mut buf = self.sequence.slice(glo, ghi)?.to_vec();
        let channels = self.sequence.channels();
        let n = hi - lo;
        if n == 0 {
            return Ok(());
        }
        for f in 0..n {
            let ramp = f as f32 / n as f32;
            let factor = if out { 1.0 - ramp } else { ramp };
            for c in 0..channels {
                buf[f * channels + c] *= factor;
            }
        }
        self.replace_samples(glo, ghi, buf)
    }

    /// Remove local frames `[lo, hi)` from the sequence
    pub fn remove_range(&self, lo: usize, hi: usize) -> EngineResult<()> {
        let (glo, ghi) = self.frame_range_to_samples(lo, hi)?;
        self.sequence.remove(glo, ghi)
    }

    /// Stretch local frames `[lo, hi)` by `ratio`
    ///
    /// Produces `floor((hi - lo) * ratio)` frames in place of the range.
    pub fn stretch_subregion(&self, lo: usize, hi: usize, ratio: f64) -> EngineResult<()> {
        if !(ratio.is_finite() && ratio > 0.0) {
            return Err(EngineError::InvalidFormat(format!(
                "stretch ratio {} out of range",
                ratio
            )));
        }
        let (glo, ghi) = self.frame_range_to_samples(lo, hi)?;
        let buf = self.sequence.slice(glo, ghi)?.to_vec();
        let channels = self.sequence.channels();
        let out_frames = ((hi - lo) as f64 * ratio).floor() as usize;
        let out = stretch_clip(&buf, channels, out_frames, self.sequence.sample_rate());
        self.replace_samples(glo, ghi, out)
    }

    /// Three-point stretch: move the audio at `src` to `dest` within
    /// `[start, end)`, stretching each half independently
    ///
    /// All positions are local frames with `start < src < end` and
    /// `start <= dest <= end`; the overall length is preserved. When
    /// `left_source` / `right_source` are given they are used as the
    /// stretcher's input instead of the current audio, so repeated onset
    /// moves are computed from the pre-stretch signal instead of compounding
    /// artifacts. With `link_channels` false only channel `ch_idx` is
    /// stretched and the remaining channels replay the source unchanged.
    #[allow(clippy::too_many_arguments)]
    pub fn stretch_three_point(
        &self,
        start: usize,
        src: usize,
        dest: usize,
        end: usize,
        link_channels: bool,
        ch_idx: usize,
        left_source: Option<&PieceTable>,
        right_source: Option<&PieceTable>,
    ) -> EngineResult<()> {
        let nframes = self.nframes();
        if !(start < src && src < end && start <= dest && dest <= end && end <= nframes) {
            return Err(EngineError::range(start, end, nframes));
        }
        let channels = self.sequence.channels();
        if !link_channels && ch_idx >= channels {
            return Err(EngineError::InvalidFormat(format!(
                "channel {} out of range for {}-channel region",
                ch_idx, channels
            )));
        }

        let (glo, ghi) = self.frame_range_to_samples(start, end)?;
        let current = self.sequence.slice(glo, ghi)?;
        let n = end - start;

        let left_in = match left_source {
            Some(t) if !t.is_empty() => t.to_vec(),
            _ => current.slice(0, (src - start) * channels)?.to_vec(),
        };
        let right_in = match right_source {
            Some(t) if !t.is_empty() => t.to_vec(),
            _ => current.slice((src - start) * channels, n * channels)?.to_vec(),
        };

        let out_left = dest - start;
        let out_right = end - dest;
        let rate = self.sequence.sample_rate();

        let out = if link_channels {
            let mut out = stretch_clip(&left_in, channels, out_left, rate);
            out.extend_from_slice(&stretch_clip(&right_in, channels, out_right, rate));
            out
        } else {
            // Unstretched channels replay the source signal
            let mut out = vec![0.0; n * channels];
            let mut source = left_in.clone();
            source.extend_from_slice(&right_in);
            let copy = (source.len() / channels).min(n) * channels;
            out[..copy].copy_from_slice(&source[..copy]);

            let stretched_l = stretch_clip(
                &extract_channel(&left_in, channels, ch_idx),
                1,
                out_left,
                rate,
            );
            let stretched_r = stretch_clip(
                &extract_channel(&right_in, channels, ch_idx),
                1,
                out_right,
                rate,
            );
            for f in 0..out_left {
                out[f * channels + ch_idx] = stretched_l[f];
            }
            for f in 0..out_right {
                out[(out_left + f) * channels + ch_idx] = stretched_r[f];
            }
            out
        };

        self.replace_samples(glo, ghi, out)
    }

    /// Move the region's left edge to `new_global_start`
    ///
    /// Only the slice window and global offset change; the sequence is
    /// untouched. The move is clipped at the window and sequence bounds.
    pub fn shrink_start(&self, new_global_start: usize) -> ShrinkResult {
        let result;
        {
            let mut st = self.state.lock().unwrap();
            let offset = self.offset.load(Ordering::Relaxed);
            if new_global_start >= offset {
                let want = new_global_start - offset;
                let moved = want.min(st.slice_end - st.slice_start);
                st.slice_start += moved;
                self.offset.store(offset + moved, Ordering::Release);
                result = ShrinkResult { ok: moved == want, frames: moved };
            } else {
                let want = offset - new_global_start;
                let moved = want.min(st.slice_start);
                st.slice_start -= moved;
                self.offset.store(offset - moved, Ordering::Release);
                result = ShrinkResult { ok: moved == want, frames: moved };
            }
            self.refresh_slice(&st);
        }
        self.grow_session();
        result
    }

    /// Move the region's right edge to `new_global_end`
    pub fn shrink_end(&self, new_global_end: usize) -> ShrinkResult {
        let result;
        {
            let mut st = self.state.lock().unwrap();
            let offset = self.offset.load(Ordering::Relaxed);
            let end_global = offset + (st.slice_end - st.slice_start);
            if new_global_end <= end_global {
                let want = end_global - new_global_end;
                let moved = want.min(st.slice_end - st.slice_start);
                st.slice_end -= moved;
                result = ShrinkResult { ok: moved == want, frames: moved };
            } else {
                let want = new_global_end - end_global;
                let moved = want.min(self.sequence.nframes().saturating_sub(st.slice_end));
                st.slice_end += moved;
                result = ShrinkResult { ok: moved == want, frames: moved };
            }
            self.refresh_slice(&st);
        }
        self.grow_session();
        result
    }

    // ── internals ──────────────────────────────────────────────────────

    pub(crate) fn place_on_timeline(&self, timeline: &Arc<Timeline>) {
        let _ = self.timeline.set(Arc::downgrade(timeline));
    }

    fn grow_session(&self) {
        if let Some(timeline) = self.timeline.get().and_then(Weak::upgrade) {
            timeline.ensure_session_length(self.global_end());
        }
    }

    /// Local frame range -> global sample range, validated against the
    /// current window
    fn frame_range_to_samples(&self, lo: usize, hi: usize) -> EngineResult<(usize, usize)> {
        let st = self.state.lock().unwrap();
        let nframes = st.slice_end - st.slice_start;
        if lo > hi || hi > nframes {
            return Err(EngineError::range(lo, hi, nframes));
        }
        let channels = self.sequence.channels();
        Ok(((st.slice_start + lo) * channels, (st.slice_start + hi) * channels))
    }

    fn replace_samples(&self, glo: usize, ghi: usize, samples: Vec<Sample>) -> EngineResult<()> {
        let segment = AudioSegment::new(samples, self.sequence.channels())?;
        self.sequence
            .replace(glo, ghi, &PieceTable::from_segment(segment))
    }

    /// Rebuild the cached slice from the sequence's current state
    fn refresh_slice(&self, st: &RegionState) {
        let channels = self.sequence.channels();
        if let Ok(table) = self
            .sequence
            .slice(st.slice_start * channels, st.slice_end * channels)
        {
            self.slice.set(Shared::new(&gc_handle(), table));
        }
    }
}

impl SequenceLink for Region {
    fn on_sequence_changed(&self, prev_nframes: usize, new_nframes: usize) {
        {
            let mut st = self.state.lock().unwrap();
            if new_nframes >= prev_nframes {
                st.slice_end += new_nframes - prev_nframes;
            } else {
                let shrink = prev_nframes - new_nframes;
                st.slice_end = st.slice_end.saturating_sub(shrink).max(st.slice_start);
            }
            st.slice_end = st.slice_end.min(new_nframes);
            st.slice_start = st.slice_start.min(st.slice_end);
            self.refresh_slice(&st);
        }
        self.grow_session();
    }
}

/// Lock-free view of a region for one mix callback
pub struct RegionSnapshot {
    muted: bool,
    offset: usize,
    slice: Shared<PieceTable>,
}

impl RegionSnapshot {
    #[inline]
    pub fn muted(&self) -> bool {
        self.muted
    }

    /// Global start frame
    #[inline]
    pub fn start(&self) -> usize {
        self.offset
    }

    /// One past the last global frame
    #[inline]
    pub fn end(&self) -> usize {
        self.offset + self.slice.nframes()
    }

    /// Read one sample at a global frame, 0 outside the extent
    ///
    /// Mono content answers every channel; requests beyond the channel
    /// count clamp to the last channel.
    #[inline]
    pub fn sample(&self, ch: usize, frame: usize) -> Sample {
        if frame < self.offset {
            return 0.0;
        }
        let local = frame - self.offset;
        if local >= self.slice.nframes() {
            return 0.0;
        }
        let channels = self.slice.channels();
        self.slice.sample(local * channels + ch.min(channels - 1))
    }
}

fn extract_channel(interleaved: &[Sample], channels: usize, ch: usize) -> Vec<Sample> {
    interleaved
        .chunks_exact(channels)
        .map(|frame| frame[ch])
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_sequence(samples: Vec<Sample>, channels: usize) -> Arc<Sequence> {
        Arc::new(Sequence::from_samples("seq", samples, 44100, channels).unwrap())
    }

    fn region_samples(region: &Region) -> Vec<Sample> {
        let (lo, hi) = region.slice_bounds();
        region.slice_local(0, hi - lo).unwrap().to_vec()
    }

    #[test]
    fn test_region_covers_sequence_by_default() {
        let seq = make_sequence((0..8).map(|i| i as Sample).collect(), 2);
        let region = Region::new(seq, "r", 100);
        assert_eq!(region.nframes(), 4);
        assert_eq!(region.global_offset(), 100);
        assert_eq!(region.global_end(), 104);
    }

    #[test]
    fn test_sample_at_global_extent_and_broadcast() {
        let seq = make_sequence(vec![0.1, 0.2, 0.3], 1);
        let region = Region::new(seq, "r", 10);
        assert_eq!(region.sample_at_global(0, 9), 0.0);
        assert_eq!(region.sample_at_global(0, 10), 0.1);
        // Mono broadcasts to the right channel too
        assert_eq!(region.sample_at_global(1, 11), 0.2);
        assert_eq!(region.sample_at_global(0, 13), 0.0);
    }

    #[test]
    fn test_gain_then_undo_is_bit_exact() {
        let original: Vec<Sample> = (0..1000).map(|i| ((i * 7) % 13) as f32 * 0.01).collect();
        let seq = make_sequence(original.clone(), 1);
        let region = Region::new(Arc::clone(&seq), "r", 0);
        region.register();

        region.gain(20.0).unwrap();
        assert_ne!(region_samples(&region), original);

        assert!(seq.undo());
        // Immutable segments are restored, not recomputed
        assert_eq!(seq.current().to_vec(), original);
        assert_eq!(region_samples(&region), original);
    }

    #[test]
    fn test_gain_applies_linear_factor() {
        let seq = make_sequence(vec![0.5; 100], 1);
        let region = Region::new(Arc::clone(&seq), "r", 0);
        region.register();
        region.gain(-6.0).unwrap();
        let got = region_samples(&region);
        assert!((got[0] - 0.5 * db_to_linear(-6.0)).abs() < 1e-6);
    }

    #[test]
    fn test_normalize_is_idempotent() {
        let seq = make_sequence(vec![0.1, -0.25, 0.2, 0.05], 1);
        let region = Region::new(Arc::clone(&seq), "r", 0);
        region.register();

        region.normalize(-1.0).unwrap();
        let once = region_samples(&region);
        let target = db_to_linear(-1.0);
        let peak = once.iter().fold(0.0f32, |a, s| a.max(s.abs()));
        assert!((peak - target).abs() < 1e-5);

        region.normalize(-1.0).unwrap();
        let twice = region_samples(&region);
        for (a, b) in once.iter().zip(twice.iter()) {
            assert!((a - b).abs() < 1e-6);
        }
    }

    #[test]
    fn test_normalize_leaves_silence_alone() {
        let seq = make_sequence(vec![0.0; 64], 1);
        let region = Region::new(Arc::clone(&seq), "r", 0);
        region.register();
        region.normalize(0.0).unwrap();
        assert!(!seq.can_undo(), "silent normalize must not add history");
        assert!(region_samples(&region).iter().all(|&s| s == 0.0));
    }

    #[test]
    fn test_fade_endpoints() {
        let seq = make_sequence(vec![1.0; 100], 1);
        let region = Region::new(Arc::clone(&seq), "r", 0);
        region.register();

        region.fade_in(0, 100).unwrap();
        let faded = region_samples(&region);
        assert_eq!(faded[0], 0.0);
        assert!((faded[99] - 1.0).abs() < 0.011);
        assert!(faded.windows(2).all(|w| w[0] <= w[1]));

        seq.undo();
        region.fade_out(0, 100).unwrap();
        let faded = region_samples(&region);
        assert_eq!(faded[0], 1.0);
        assert!(faded[99] < 0.011);
    }

    #[test]
    fn test_reverse_stereo_reverses_interleaved() {
        let seq = make_sequence(vec![1.0, 2.0, 3.0, 4.0], 2);
        let region = Region::new(Arc::clone(&seq), "r", 0);
        region.register();
        region.reverse_range(0, 2).unwrap();
        assert_eq!(region_samples(&region), vec![4.0, 3.0, 2.0, 1.0]);
    }

    #[test]
    fn test_stretch_subregion_changes_length() {
        let samples: Vec<Sample> = (0..4410).map(|i| (i as f32 * 0.01).sin()).collect();
        let seq = make_sequence(samples, 1);
        let region = Region::new(Arc::clone(&seq), "r", 0);
        region.register();

        region.stretch_subregion(0, 4410, 2.0).unwrap();
        assert_eq!(region.nframes(), 8820);
        assert_eq!(seq.nframes(), 8820);

        seq.undo();
        assert_eq!(region.nframes(), 4410);
    }

    #[test]
    fn test_three_point_preserves_length() {
        let samples: Vec<Sample> = (0..8820).map(|i| (i as f32 * 0.02).sin()).collect();
        let seq = make_sequence(samples, 1);
        let region = Region::new(Arc::clone(&seq), "r", 0);
        region.register();

        region
            .stretch_three_point(0, 4410, 2205, 8820, true, 0, None, None)
            .unwrap();
        assert_eq!(region.nframes(), 8820);
    }

    #[test]
    fn test_three_point_unlinked_keeps_other_channel() {
        let mut samples = Vec::new();
        for i in 0..8820 {
            samples.push((i as f32 * 0.01).sin()); // left: tone
            samples.push(i as f32);                // right: ramp marker
        }
        let seq = make_sequence(samples, 2);
        let region = Region::new(Arc::clone(&seq), "r", 0);
        region.register();

        region
            .stretch_three_point(0, 4410, 6615, 8820, false, 0, None, None)
            .unwrap();
        let out = region_samples(&region);
        // Right channel replays the source ramp
        assert_eq!(out[1], 0.0);
        assert_eq!(out[2 * 100 + 1], 100.0);
        assert_eq!(region.nframes(), 8820);
    }

    #[test]
    fn test_three_point_rejects_bad_split() {
        let seq = make_sequence(vec![0.0; 1000], 1);
        let region = Region::new(seq, "r", 0);
        assert!(region
            .stretch_three_point(0, 0, 100, 1000, true, 0, None, None)
            .is_err());
        assert!(region
            .stretch_three_point(0, 500, 100, 2000, true, 0, None, None)
            .is_err());
    }

    #[test]
    fn test_shrink_start_clips_at_bounds() {
        let seq = make_sequence(vec![0.0; 100], 1);
        let region = Region::with_bounds(seq, "r", 50, 20, 80).unwrap();

        // Consume 10 frames from the head
        let r = region.shrink_start(60);
        assert_eq!(r, ShrinkResult { ok: true, frames: 10 });
        assert_eq!(region.slice_bounds(), (30, 80));
        assert_eq!(region.global_offset(), 60);

        // Extend left past the window head: only 30 frames exist
        let r = region.shrink_start(0);
        assert_eq!(r, ShrinkResult { ok: false, frames: 30 });
        assert_eq!(region.slice_bounds(), (0, 80));
        assert_eq!(region.global_offset(), 30);
    }

    #[test]
    fn test_shrink_end_clips_at_sequence() {
        let seq = make_sequence(vec![0.0; 100], 1);
        let region = Region::with_bounds(seq, "r", 0, 20, 80).unwrap();

        let r = region.shrink_end(50);
        assert_eq!(r, ShrinkResult { ok: true, frames: 10 });
        assert_eq!(region.slice_bounds(), (20, 70));

        // Grow past the sequence tail: only 30 more frames exist
        let r = region.shrink_end(200);
        assert_eq!(r, ShrinkResult { ok: false, frames: 30 });
        assert_eq!(region.slice_bounds(), (20, 100));
        // The sequence itself never changed
        assert!(!region.sequence().can_undo());
    }

    #[test]
    fn test_soft_copy_tracks_edits_once_registered() {
        let seq = make_sequence((0..1000).map(|i| i as Sample).collect(), 1);
        let r1 = Region::new(Arc::clone(&seq), "r1", 0);
        let r2 = r1.soft_copy();
        r2.register();

        r1.remove_range(100, 200).unwrap();
        assert_eq!(r2.nframes(), 900);
        let got = r2.slice_local(0, 900).unwrap().to_vec();
        assert_eq!(got[99], 99.0);
        assert_eq!(got[100], 200.0);
        // r1 was never registered, so its window is stale by design
        assert_eq!(r1.slice_bounds(), (0, 1000));
    }

    #[test]
    fn test_hard_copy_is_independent() {
        let seq = make_sequence(vec![0.5; 100], 1);
        let r1 = Region::new(Arc::clone(&seq), "r1", 0);
        r1.register();
        let r2 = r1.hard_copy().unwrap();
        r2.register();

        r1.gain(-6.0).unwrap();
        assert!((region_samples(&r2)[0] - 0.5).abs() < 1e-6);
        assert!(!r2.sequence().can_undo());
    }

    #[test]
    fn test_overview_uses_cache_and_seam_scan() {
        let samples: Vec<Sample> = (0..400).map(|i| i as Sample).collect();
        let seq = make_sequence(samples, 1);
        let region = Region::new(Arc::clone(&seq), "r", 0);
        region.register();

        assert_eq!(region.overview_minmax(0, 10, 0), Some((0.0, 9.0)));
        assert_eq!(region.overview_minmax(0, 100, 100), Some((100.0, 199.0)));

        // Splice to create a piece seam inside a bin
        region.remove_range(105, 110).unwrap();
        let (lo, hi) = region.overview_minmax(0, 10, 100).unwrap();
        assert_eq!(lo, 100.0);
        assert_eq!(hi, 114.0);
    }

    #[test]
    fn test_edit_out_of_window_rejected() {
        let seq = make_sequence(vec![0.0; 100], 1);
        let region = Region::with_bounds(seq, "r", 0, 10, 60).unwrap();
        assert!(region.gain_range(0, 51, 3.0).is_err());
        assert!(region.fade_in(30, 20).is_err());
    }
}
