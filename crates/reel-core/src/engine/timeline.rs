//! Session length, transport, and loop state
//!
//! The whole timeline is atomic scalars: the audio thread advances the
//! transport with [`Timeline::tick`], the edit domain issues transport
//! commands, and nobody locks. End-of-session handling runs before loop
//! wrapping, so a loop ending at the session tail still wraps.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// Transport and loop state for one session
pub struct Timeline {
    session_frames: AtomicUsize,
    transport: AtomicUsize,
    playing: AtomicBool,
    looping: AtomicBool,
    loop_start: AtomicUsize,
    loop_end: AtomicUsize,
}

impl Timeline {
    pub fn new() -> Self {
        Self {
            session_frames: AtomicUsize::new(0),
            transport: AtomicUsize::new(0),
            playing: AtomicBool::new(false),
            looping: AtomicBool::new(false),
            loop_start: AtomicUsize::new(0),
            loop_end: AtomicUsize::new(0),
        }
    }

    pub fn play(&self) {
        self.playing.store(true, Ordering::Relaxed);
    }

    /// Stop playback; pausing also leaves loop mode
    pub fn pause(&self) {
        self.playing.store(false, Ordering::Relaxed);
        self.looping.store(false, Ordering::Relaxed);
    }

    /// Move the transport, clamped into the session; leaves loop mode
    pub fn seek(&self, frame: usize) {
        let clamped = frame.min(self.session_frames.load(Ordering::Relaxed));
        self.transport.store(clamped, Ordering::Relaxed);
        self.looping.store(false, Ordering::Relaxed);
    }

    /// Enable looping over `[start, end)`, clamped into the session
    pub fn enable_loop(&self, start: usize, end: usize) {
        let session = self.session_frames.load(Ordering::Relaxed);
        let start = start.min(session);
        let end = end.clamp(start, session);
        self.loop_start.store(start, Ordering::Relaxed);
        self.loop_end.store(end, Ordering::Relaxed);
        self.looping.store(true, Ordering::Relaxed);
    }

    pub fn disable_loop(&self) {
        self.looping.store(false, Ordering::Relaxed);
    }

    /// Advance the transport by `nframes` (audio thread)
    ///
    /// Applies the end-of-session rule first (playback stops at the last
    /// frame unless looping), then the loop wrap.
    pub fn tick(&self, nframes: usize) {
        if !self.playing.load(Ordering::Relaxed) {
            return;
        }
        let session = self.session_frames.load(Ordering::Relaxed);
        let looping = self.looping.load(Ordering::Relaxed);
        let mut t = self.transport.load(Ordering::Relaxed) + nframes;

        if t >= session {
            t = session;
            self.playing.store(looping, Ordering::Relaxed);
        }
        if looping && t >= self.loop_end.load(Ordering::Relaxed) {
            t = self.loop_start.load(Ordering::Relaxed);
        }
        self.transport.store(t, Ordering::Relaxed);
    }

    /// Grow the session to at least `frames`
    pub fn ensure_session_length(&self, frames: usize) {
        self.session_frames.fetch_max(frames, Ordering::Relaxed);
    }

    /// Set the session length exactly, clamping dependent state into it
    pub fn set_session_length(&self, frames: usize) {
        self.session_frames.store(frames, Ordering::Relaxed);
        self.transport
            .fetch_min(frames, Ordering::Relaxed);
        self.loop_end.fetch_min(frames, Ordering::Relaxed);
        self.loop_start
            .fetch_min(self.loop_end.load(Ordering::Relaxed), Ordering::Relaxed);
    }

    /// Return the timeline to its initial state
    pub fn reset(&self) {
        self.session_frames.store(0, Ordering::Relaxed);
        self.transport.store(0, Ordering::Relaxed);
        self.playing.store(false, Ordering::Relaxed);
        self.looping.store(false, Ordering::Relaxed);
        self.loop_start.store(0, Ordering::Relaxed);
        self.loop_end.store(0, Ordering::Relaxed);
    }

    #[inline]
    pub fn transport(&self) -> usize {
        self.transport.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn session_frames(&self) -> usize {
        self.session_frames.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn is_playing(&self) -> bool {
        self.playing.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn is_looping(&self) -> bool {
        self.looping.load(Ordering::Relaxed)
    }

    /// Current loop bounds `(start, end)`
    pub fn loop_bounds(&self) -> (usize, usize) {
        (
            self.loop_start.load(Ordering::Relaxed),
            self.loop_end.load(Ordering::Relaxed),
        )
    }
}

impl Default for Timeline {
    fn default() -> Self {
        Self::new()
    }
}
