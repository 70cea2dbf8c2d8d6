//! Property tests for the sequence engine invariants

use std::sync::Arc;

use proptest::prelude::*;

use reel_core::piece_table::PieceTable;
use reel_core::region::Region;
use reel_core::segment::AudioSegment;
use reel_core::sequence::{Sequence, SequenceLink};
use reel_core::types::Sample;

fn table_from(samples: Vec<Sample>) -> PieceTable {
    PieceTable::from_segment(AudioSegment::new(samples, 1).unwrap())
}

/// An arbitrary table built through a few random edits, so pieces are split
/// in interesting ways
fn arb_table() -> impl Strategy<Value = PieceTable> {
    (
        proptest::collection::vec(-1.0f32..1.0, 1..64),
        proptest::collection::vec((any::<u16>(), any::<u16>()), 0..4),
    )
        .prop_map(|(base, edits)| {
            let mut table = table_from(base);
            for (a, b) in edits {
                let len = table.len();
                if len == 0 {
                    break;
                }
                let lo = a as usize % (len + 1);
                let hi = lo + (b as usize % (len - lo + 1));
                // Alternate removing and re-inserting to split pieces
                if (a as usize + b as usize) % 2 == 0 {
                    table = table.remove(lo, hi).unwrap();
                } else {
                    let src = table_from(vec![0.5; (b as usize % 8) + 1]);
                    table = table.insert(&src, lo).unwrap();
                }
            }
            table
        })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_slice_matches_to_vec(table in arb_table(), a in any::<u16>(), b in any::<u16>()) {
        let len = table.len();
        let lo = a as usize % (len + 1);
        let hi = lo + (b as usize % (len - lo + 1));
        let sliced = table.slice(lo, hi).unwrap();
        prop_assert_eq!(sliced.to_vec(), table.to_vec()[lo..hi].to_vec());
    }

    #[test]
    fn prop_insert_remove_inverts(table in arb_table(), src in proptest::collection::vec(-1.0f32..1.0, 1..16), at in any::<u16>()) {
        let at = at as usize % (table.len() + 1);
        let src = table_from(src);
        let roundtrip = table
            .insert(&src, at)
            .unwrap()
            .remove(at, at + src.len())
            .unwrap();
        prop_assert_eq!(roundtrip.to_vec(), table.to_vec());
    }

    #[test]
    fn prop_indexing_matches_to_vec(table in arb_table()) {
        let flat = table.to_vec();
        for (i, want) in flat.iter().enumerate() {
            prop_assert_eq!(table.sample(i), *want);
        }
    }

    #[test]
    fn prop_undo_restores_pre_edit_content(
        base in proptest::collection::vec(-1.0f32..1.0, 2..64),
        lo_seed in any::<u16>(),
        hi_seed in any::<u16>(),
    ) {
        let len = base.len();
        let lo = lo_seed as usize % len;
        let hi = lo + (hi_seed as usize % (len - lo));
        let seq = Sequence::from_samples("p", base.clone(), 44100, 1).unwrap();

        seq.remove(lo, hi).unwrap();
        prop_assert!(seq.undo());
        prop_assert_eq!(seq.current().to_vec(), base);
    }

    #[test]
    fn prop_redo_equals_reapply(
        base in proptest::collection::vec(-1.0f32..1.0, 2..64),
        lo_seed in any::<u16>(),
    ) {
        let len = base.len();
        let lo = lo_seed as usize % len;
        let seq = Sequence::from_samples("p", base, 44100, 1).unwrap();

        seq.remove(lo, len).unwrap();
        let applied = seq.current().to_vec();
        seq.undo();
        prop_assert!(seq.redo());
        prop_assert_eq!(seq.current().to_vec(), applied);
    }

    #[test]
    fn prop_new_edit_clears_redo(
        base in proptest::collection::vec(-1.0f32..1.0, 4..64),
    ) {
        let len = base.len();
        let seq = Sequence::from_samples("p", base, 44100, 1).unwrap();
        seq.remove(0, 1).unwrap();
        seq.undo();
        seq.remove(len - 1, len).unwrap();
        prop_assert!(!seq.can_redo());
    }

    #[test]
    fn prop_linked_region_tracks_length(
        base_len in 16usize..256,
        lo_seed in any::<u16>(),
        hi_seed in any::<u16>(),
    ) {
        let lo = lo_seed as usize % base_len;
        let hi = lo + (hi_seed as usize % (base_len - lo));
        let seq = Arc::new(
            Sequence::from_samples("p", vec![0.5; base_len], 44100, 1).unwrap(),
        );
        let region = Region::new(Arc::clone(&seq), "r", 0);
        region.register();

        seq.remove(lo, hi).unwrap();
        prop_assert_eq!(region.nframes(), base_len - (hi - lo));
        // The cached slice agrees with the bounds
        let (s, e) = region.slice_bounds();
        prop_assert_eq!(e - s, region.nframes());
    }
}

#[derive(Debug, Clone)]
enum TransportOp {
    Play,
    Pause,
    Seek(usize),
    Tick(usize),
    EnableLoop(usize, usize),
    DisableLoop,
}

fn arb_transport_op() -> impl Strategy<Value = TransportOp> {
    prop_oneof![
        Just(TransportOp::Play),
        Just(TransportOp::Pause),
        (0usize..2000).prop_map(TransportOp::Seek),
        (0usize..600).prop_map(TransportOp::Tick),
        (0usize..1000, 0usize..1200).prop_map(|(a, b)| TransportOp::EnableLoop(a, a + b)),
        Just(TransportOp::DisableLoop),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    /// The transport never leaves the session, and a tick in loop mode never
    /// lands past the loop end
    #[test]
    fn prop_transport_stays_bounded(ops in proptest::collection::vec(arb_transport_op(), 1..64)) {
        use reel_core::engine::Timeline;

        let timeline = Timeline::new();
        timeline.ensure_session_length(1000);

        for op in ops {
            match op {
                TransportOp::Play => timeline.play(),
                TransportOp::Pause => timeline.pause(),
                TransportOp::Seek(f) => timeline.seek(f),
                TransportOp::Tick(n) => {
                    let active = timeline.is_playing() && timeline.is_looping();
                    timeline.tick(n);
                    if active {
                        let (_, end) = timeline.loop_bounds();
                        prop_assert!(timeline.transport() <= end);
                    }
                }
                TransportOp::EnableLoop(a, b) => timeline.enable_loop(a, b),
                TransportOp::DisableLoop => timeline.disable_loop(),
            }
            prop_assert!(timeline.transport() <= timeline.session_frames());
        }
    }

    /// Gains compose: g1 then g2 equals g1 + g2 within float tolerance
    #[test]
    fn prop_gain_is_linear(
        base in proptest::collection::vec(-1.0f32..1.0, 8..64),
        g1 in -12.0f32..12.0,
        g2 in -12.0f32..12.0,
    ) {
        let combined = {
            let seq = Arc::new(Sequence::from_samples("a", base.clone(), 44100, 1).unwrap());
            let r = Region::new(Arc::clone(&seq), "r", 0);
            r.register();
            r.gain(g1 + g2).unwrap();
            seq.current().to_vec()
        };
        let stepwise = {
            let seq = Arc::new(Sequence::from_samples("b", base, 44100, 1).unwrap());
            let r = Region::new(Arc::clone(&seq), "r", 0);
            r.register();
            r.gain(g1).unwrap();
            r.gain(g2).unwrap();
            seq.current().to_vec()
        };
        for (a, b) in combined.iter().zip(stepwise.iter()) {
            prop_assert!((a - b).abs() <= 1e-4 * a.abs().max(1.0));
        }
    }
}

/// Registering the same observer twice must notify twice; links are a plain
/// list, not a set
#[test]
fn double_registration_notifies_twice() {
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Counter(AtomicUsize);
    impl SequenceLink for Counter {
        fn on_sequence_changed(&self, _: usize, _: usize) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    let seq = Sequence::from_samples("p", vec![0.0; 8], 44100, 1).unwrap();
    let counter = Arc::new(Counter(AtomicUsize::new(0)));
    seq.add_link(Arc::downgrade(&counter) as _);
    seq.add_link(Arc::downgrade(&counter) as _);
    seq.remove(0, 1).unwrap();
    assert_eq!(counter.0.load(std::sync::atomic::Ordering::SeqCst), 2);
}
