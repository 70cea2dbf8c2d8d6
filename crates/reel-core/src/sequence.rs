//! Editable audio sequences
//!
//! A [`Sequence`] owns a piece table inside a [`StateHistory`] and is the
//! unit of undo. Edits are serialized by one mutex per sequence; the current
//! table is published atomically, so the audio thread reads it without ever
//! taking that lock. Regions viewing the sequence register as links and are
//! notified after every change so they can recompute their cached slices.

use std::sync::{Arc, Mutex, Weak};

use basedrop::{Shared, SharedCell};

use crate::error::EngineResult;
use crate::history::StateHistory;
use crate::piece_table::PieceTable;
use crate::segment::AudioSegment;
use crate::types::Sample;

/// A non-owning observer of a sequence's edits
///
/// Implementors recompute whatever they cache over the sequence. The
/// notification runs with the sequence's edit lock held, so implementations
/// must not call back into sequence mutation (reading the published current
/// state is fine, it is lock-free).
pub trait SequenceLink: Send + Sync {
    /// Called after every structural change with the frame counts before
    /// and after the change
    fn on_sequence_changed(&self, prev_nframes: usize, new_nframes: usize);
}

struct SequenceInner {
    history: StateHistory<PieceTable>,
    links: Vec<Weak<dyn SequenceLink>>,
}

/// A piece table with undo history, a name, and a link set
pub struct Sequence {
    name: String,
    sample_rate: u32,
    channels: usize,
    /// Lock-free handle onto the history's published current state
    published: Arc<SharedCell<PieceTable>>,
    inner: Mutex<SequenceInner>,
}

impl Sequence {
    /// An empty sequence
    pub fn new(name: impl Into<String>, sample_rate: u32, channels: usize) -> Self {
        Self::from_table(name, PieceTable::empty(channels), sample_rate)
    }

    /// A sequence seeded with an existing piece table
    pub fn from_table(name: impl Into<String>, table: PieceTable, sample_rate: u32) -> Self {
        let channels = table.channels();
        let history = StateHistory::new(table);
        let published = history.reader();
        Self {
            name: name.into(),
            sample_rate,
            channels,
            published,
            inner: Mutex::new(SequenceInner {
                history,
                links: Vec::new(),
            }),
        }
    }

    /// A sequence that takes ownership of an interleaved buffer
    pub fn from_samples(
        name: impl Into<String>,
        samples: Vec<Sample>,
        sample_rate: u32,
        channels: usize,
    ) -> EngineResult<Self> {
        let segment = AudioSegment::new(samples, channels)?;
        Ok(Self::from_table(name, PieceTable::from_segment(segment), sample_rate))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    /// The published current table (lock-free, safe from the audio thread)
    pub fn current(&self) -> Shared<PieceTable> {
        self.published.get()
    }

    /// Current length in frames
    pub fn nframes(&self) -> usize {
        self.current().nframes()
    }

    /// Current length in samples
    pub fn len_samples(&self) -> usize {
        self.current().len()
    }

    /// Read one sample of the current state, or `None` past the end
    pub fn sample(&self, i: usize) -> Option<Sample> {
        self.current().get(i)
    }

    /// An independent slice of the current state, sample bounds
    pub fn slice(&self, lo: usize, hi: usize) -> EngineResult<PieceTable> {
        self.current().slice(lo, hi)
    }

    /// Apply a pure table transformation as a new history state
    fn mutate(
        &self,
        op: impl FnOnce(&PieceTable) -> EngineResult<PieceTable>,
    ) -> EngineResult<()> {
        let mut inner = self.inner.lock().unwrap();
        let current = inner.history.current();
        let prev_nframes = current.nframes();
        let next = op(&current)?;
        let new_nframes = next.nframes();
        inner.history.push(next);
        notify_links(&mut inner.links, prev_nframes, new_nframes);
        Ok(())
    }

    /// Splice `src` in at sample position `at`
    pub fn insert(&self, src: &PieceTable, at: usize) -> EngineResult<()> {
        self.mutate(|t| t.insert(src, at))
    }

    /// Append `src` at the end
    pub fn append(&self, src: &PieceTable) -> EngineResult<()> {
        self.mutate(|t| t.append(src))
    }

    /// Append a bare segment at the end
    pub fn append_segment(&self, segment: AudioSegment) -> EngineResult<()> {
        self.mutate(move |t| t.append(&PieceTable::from_segment(segment)))
    }

    /// Remove the sample range `[lo, hi)`
    pub fn remove(&self, lo: usize, hi: usize) -> EngineResult<()> {
        self.mutate(|t| t.remove(lo, hi))
    }

    /// Replace the sample range `[lo, hi)` with `src`
    pub fn replace(&self, lo: usize, hi: usize, src: &PieceTable) -> EngineResult<()> {
        self.mutate(|t| t.replace(lo, hi, src))
    }

    /// Step back one edit; links are notified like any other change
    pub fn undo(&self) -> bool {
        let mut inner = self.inner.lock().unwrap();
        let prev_nframes = inner.history.current().nframes();
        if !inner.history.undo() {
            return false;
        }
        let new_nframes = inner.history.current().nframes();
        notify_links(&mut inner.links, prev_nframes, new_nframes);
        true
    }

    /// Step forward one edit; links are notified like any other change
    pub fn redo(&self) -> bool {
        let mut inner = self.inner.lock().unwrap();
        let prev_nframes = inner.history.current().nframes();
        if !inner.history.redo() {
            return false;
        }
        let new_nframes = inner.history.current().nframes();
        notify_links(&mut inner.links, prev_nframes, new_nframes);
        true
    }

    pub fn can_undo(&self) -> bool {
        self.inner.lock().unwrap().history.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.inner.lock().unwrap().history.can_redo()
    }

    /// Register a link to be notified on every change
    ///
    /// Links are held weakly; dead links are pruned on the next notification.
    pub fn add_link(&self, link: Weak<dyn SequenceLink>) {
        self.inner.lock().unwrap().links.push(link);
    }

    /// Remove a previously registered link
    pub fn remove_link(&self, link: &Weak<dyn SequenceLink>) {
        self.inner
            .lock()
            .unwrap()
            .links
            .retain(|l| !l.ptr_eq(link));
    }

    /// Number of live links (mainly for tests)
    pub fn link_count(&self) -> usize {
        self.inner
            .lock()
            .unwrap()
            .links
            .iter()
            .filter(|l| l.strong_count() > 0)
            .count()
    }
}

fn notify_links(links: &mut Vec<Weak<dyn SequenceLink>>, prev: usize, new: usize) {
    links.retain(|weak| match weak.upgrade() {
        Some(link) => {
            link.on_sequence_changed(prev, new);
            true
        }
        None => false,
    });
}
