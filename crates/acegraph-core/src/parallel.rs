//! # Parallel Iteration Runtime
//!
//! Bounded worker pool over a slice. Workers claim chunks of indexes from a
//! shared atomic counter until none remain, so every item is handed to
//! exactly one worker and no ordering holds between items.
//!
//! Scoped threads borrow the slice directly; the call returns only after
//! every worker finished. A panicking worker re-raises on the caller.

use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// Items claimed per counter increment.
const CHUNK: usize = 64;

/// Worker count used when the caller asks for 0.
#[must_use]
pub fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(NonZeroUsize::get)
        .unwrap_or(1)
}

/// Call `visit` once for each item using up to `workers` threads.
///
/// `workers == 0` means one per available core. `visit` returning false asks
/// the pool to stop claiming further chunks; items already claimed by other
/// workers may still be visited.
pub fn for_each<T, F>(items: &[T], workers: usize, visit: F)
where
    T: Sync,
    F: Fn(&T) -> bool + Sync,
{
    let workers = match workers {
        0 => default_workers(),
        n => n,
    }
    .min(items.len().div_ceil(CHUNK))
    .max(1);

    if workers == 1 {
        for item in items {
            if !visit(item) {
                break;
            }
        }
        return;
    }

    let next_chunk = AtomicUsize::new(0);
    let stop = AtomicBool::new(false);

    std::thread::scope(|s| {
        let handles: Vec<_> = (0..workers)
            .map(|_| {
                let next_chunk = &next_chunk;
                let stop = &stop;
                let visit = &visit;

                s.spawn(move || {
                    // Work-stealing loop: claim chunks until none remain
                    while !stop.load(Ordering::Relaxed) {
                        let start = next_chunk.fetch_add(1, Ordering::Relaxed) * CHUNK;
                        if start >= items.len() {
                            break;
                        }
                        let end = (start + CHUNK).min(items.len());
                        for item in &items[start..end] {
                            if !visit(item) {
                                stop.store(true, Ordering::Relaxed);
                                break;
                            }
                        }
                    }
                })
            })
            .collect();

        for handle in handles {
            if let Err(e) = handle.join() {
                std::panic::resume_unwind(e);
            }
        }
    });
}
