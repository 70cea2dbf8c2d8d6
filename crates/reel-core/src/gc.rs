//! RT-safe deferred deallocation for retired sequence state
//!
//! Every piece table the audio callback can reach is wrapped in a
//! `basedrop::Shared` instead of an `Arc`. Dropping the last reference on
//! the audio thread then only enqueues the pointer; the actual free (which
//! for multi-gigabyte sessions can mean hundreds of milliseconds of munmap)
//! happens on the background collector thread spawned here.
//!
//! Call [`gc_handle`] wherever a `Shared<T>` or `SharedCell<T>` is created.

use std::sync::mpsc;
use std::sync::OnceLock;
use std::thread;
use std::time::Duration;

use basedrop::{Collector, Handle};

static GC_HANDLE: OnceLock<Handle> = OnceLock::new();

/// How often the collector sweeps retired allocations
const COLLECT_INTERVAL: Duration = Duration::from_millis(100);

fn init_gc() -> Handle {
    let (tx, rx) = mpsc::channel();

    // The Collector is !Sync, so it lives on its own thread and we only
    // hand out clonable Handles.
    thread::Builder::new()
        .name("reel-gc".to_string())
        .spawn(move || {
            let mut collector = Collector::new();
            tx.send(collector.handle()).expect("Failed to send GC handle");

            log::info!("Sequence GC thread started");

            loop {
                collector.collect();
                thread::sleep(COLLECT_INTERVAL);
            }
        })
        .expect("Failed to spawn GC thread");

    rx.recv().expect("Failed to receive GC handle")
}

/// Get a handle for creating `Shared<T>` allocations
///
/// The handle is lightweight and can be cloned freely. The collector thread
/// is spawned lazily on first use.
pub fn gc_handle() -> Handle {
    GC_HANDLE.get_or_init(init_gc).clone()
}
