//! Persistent piece table over audio segments
//!
//! A [`PieceTable`] presents an ordered list of segment slices as one
//! logical run of interleaved samples. All operations are pure: they build a
//! new table and leave the input untouched, so an older table handed to the
//! audio thread stays valid forever. Indexing keeps a one-piece cursor so
//! sequential reads from the mix loop are amortized O(1) without locks.

use std::sync::atomic::{AtomicUsize, Ordering};

use crate::error::{EngineError, EngineResult};
use crate::segment::AudioSegment;
use crate::types::Sample;

/// One run of a segment placed at a logical offset
#[derive(Clone)]
pub struct Piece {
    segment: AudioSegment,
    /// Logical start of this piece within the table, in samples
    offset: usize,
}

impl Piece {
    /// Logical start of this piece within the table, in samples
    #[inline]
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// The segment slice this piece plays
    #[inline]
    pub fn segment(&self) -> &AudioSegment {
        &self.segment
    }

    #[inline]
    fn end(&self) -> usize {
        self.offset + self.segment.len()
    }
}

/// A logical sample sequence assembled from segment slices
pub struct PieceTable {
    pieces: Vec<Piece>,
    /// Total length in samples
    len: usize,
    channels: usize,
    /// Index of the piece the last read landed in
    cursor: AtomicUsize,
}

impl Clone for PieceTable {
    fn clone(&self) -> Self {
        Self {
            pieces: self.pieces.clone(),
            len: self.len,
            channels: self.channels,
            cursor: AtomicUsize::new(0),
        }
    }
}

impl PieceTable {
    /// An empty table for the given channel count
    pub fn empty(channels: usize) -> Self {
        Self {
            pieces: Vec::new(),
            len: 0,
            channels: channels.max(1),
            cursor: AtomicUsize::new(0),
        }
    }

    /// A table playing one segment in full
    pub fn from_segment(segment: AudioSegment) -> Self {
        let channels = segment.channels();
        let len = segment.len();
        let pieces = if segment.is_empty() {
            Vec::new()
        } else {
            vec![Piece { segment, offset: 0 }]
        };
        Self {
            pieces,
            len,
            channels,
            cursor: AtomicUsize::new(0),
        }
    }

    /// Length in samples
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    /// True when the table holds no samples
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Length in frames
    #[inline]
    pub fn nframes(&self) -> usize {
        self.len / self.channels
    }

    /// Number of interleaved channels
    #[inline]
    pub fn channels(&self) -> usize {
        self.channels
    }

    /// The pieces in logical order
    pub fn pieces(&self) -> &[Piece] {
        &self.pieces
    }

    fn check_range(&self, lo: usize, hi: usize) -> EngineResult<()> {
        if lo > hi || hi > self.len || lo % self.channels != 0 || hi % self.channels != 0 {
            return Err(EngineError::range(lo, hi, self.len));
        }
        Ok(())
    }

    fn check_compatible(&self, src: &PieceTable) -> EngineResult<()> {
        if !src.is_empty() && src.channels != self.channels {
            return Err(EngineError::InvalidFormat(format!(
                "cannot splice {}-channel audio into a {}-channel table",
                src.channels, self.channels
            )));
        }
        Ok(())
    }

    /// Index of the piece containing sample `i`
    ///
    /// Hits the cursor on sequential access; falls back to a binary search
    /// over the logical offsets on a miss. Lock-free and allocation-free.
    #[inline]
    fn find_piece(&self, i: usize) -> usize {
        let hint = self.cursor.load(Ordering::Relaxed);
        if let Some(piece) = self.pieces.get(hint) {
            if i >= piece.offset && i < piece.end() {
                return hint;
            }
        }
        let idx = self.pieces.partition_point(|p| p.end() <= i);
        self.cursor.store(idx, Ordering::Relaxed);
        idx
    }

    /// Read one sample; `i` must be below `len`
    #[inline]
    pub fn sample(&self, i: usize) -> Sample {
        let piece = &self.pieces[self.find_piece(i)];
        piece.segment.sample(i - piece.offset)
    }

    /// Read one sample, or `None` past the end
    pub fn get(&self, i: usize) -> Option<Sample> {
        if i < self.len {
            Some(self.sample(i))
        } else {
            None
        }
    }

    /// Copy the table out as one contiguous interleaved buffer
    pub fn to_vec(&self) -> Vec<Sample> {
        let mut out = Vec::with_capacity(self.len);
        for piece in &self.pieces {
            out.extend_from_slice(piece.segment.as_slice());
        }
        out
    }

    /// Append the pieces covering `[lo, hi)` to `out`, re-offset to `logical`
    fn extend_from_range(
        &self,
        out: &mut Vec<Piece>,
        logical: &mut usize,
        lo: usize,
        hi: usize,
    ) -> EngineResult<()> {
        if lo >= hi {
            return Ok(());
        }
        let mut idx = self.pieces.partition_point(|p| p.end() <= lo);
        while let Some(piece) = self.pieces.get(idx) {
            if piece.offset >= hi {
                break;
            }
            let s = lo.max(piece.offset) - piece.offset;
            let e = hi.min(piece.end()) - piece.offset;
            let segment = if s == 0 && e == piece.segment.len() {
                piece.segment.clone()
            } else {
                piece.segment.slice(s, e)?
            };
            push_piece(out, logical, segment);
            idx += 1;
        }
        Ok(())
    }

    fn build(pieces: Vec<Piece>, len: usize, channels: usize) -> Self {
        Self {
            pieces,
            len,
            channels,
            cursor: AtomicUsize::new(0),
        }
    }

    /// A new table with `src` spliced in at sample position `at`
    ///
    /// Piece-table inputs keep their internal piece structure. A piece
    /// straddling `at` is split in two.
    pub fn insert(&self, src: &PieceTable, at: usize) -> EngineResult<PieceTable> {
        self.check_range(at, at)?;
        self.check_compatible(src)?;

        let mut pieces = Vec::with_capacity(self.pieces.len() + src.pieces.len() + 1);
        let mut logical = 0;
        self.extend_from_range(&mut pieces, &mut logical, 0, at)?;
        for piece in &src.pieces {
            push_piece(&mut pieces, &mut logical, piece.segment.clone());
        }
        self.extend_from_range(&mut pieces, &mut logical, at, self.len)?;
        Ok(Self::build(pieces, logical, self.channels))
    }

    /// A new table with `src` appended at the end
    pub fn append(&self, src: &PieceTable) -> EngineResult<PieceTable> {
        self.insert(src, self.len)
    }

    /// A new table with the sample range `[lo, hi)` removed
    pub fn remove(&self, lo: usize, hi: usize) -> EngineResult<PieceTable> {
        self.check_range(lo, hi)?;

        let mut pieces = Vec::with_capacity(self.pieces.len() + 1);
        let mut logical = 0;
        self.extend_from_range(&mut pieces, &mut logical, 0, lo)?;
        self.extend_from_range(&mut pieces, &mut logical, hi, self.len)?;
        Ok(Self::build(pieces, logical, self.channels))
    }

    /// A new table with `[lo, hi)` replaced by `src`, in one pass
    pub fn replace(&self, lo: usize, hi: usize, src: &PieceTable) -> EngineResult<PieceTable> {
        self.check_range(lo, hi)?;
        self.check_compatible(src)?;

        let mut pieces = Vec::with_capacity(self.pieces.len() + src.pieces.len() + 1);
        let mut logical = 0;
        self.extend_from_range(&mut pieces, &mut logical, 0, lo)?;
        for piece in &src.pieces {
            push_piece(&mut pieces, &mut logical, piece.segment.clone());
        }
        self.extend_from_range(&mut pieces, &mut logical, hi, self.len)?;
        Ok(Self::build(pieces, logical, self.channels))
    }

    /// An independent table covering `[lo, hi)`, offsets starting from zero
    pub fn slice(&self, lo: usize, hi: usize) -> EngineResult<PieceTable> {
        self.check_range(lo, hi)?;

        let mut pieces = Vec::with_capacity(self.pieces.len());
        let mut logical = 0;
        self.extend_from_range(&mut pieces, &mut logical, lo, hi)?;
        Ok(Self::build(pieces, logical, self.channels))
    }
}

impl From<AudioSegment> for PieceTable {
    fn from(segment: AudioSegment) -> Self {
        PieceTable::from_segment(segment)
    }
}

fn push_piece(out: &mut Vec<Piece>, logical: &mut usize, segment: AudioSegment) {
    if segment.is_empty() {
        return;
    }
    let len = segment.len();
    out.push(Piece {
        segment,
        offset: *logical,
    });
    *logical += len;
}
