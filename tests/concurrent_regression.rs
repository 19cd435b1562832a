//! Concurrent operation regression tests.
//!
//! These tests stress concurrent search/insert/delete/iterate operations to
//! catch memory safety issues, race conditions, and correctness bugs in the
//! optimistic read path.
//!
//! Run with: `cargo test --test concurrent_regression`
//! Run with release: `cargo test --test concurrent_regression --release`
//!
//! ## Tracing
//!
//! Enable tracing to debug race conditions:
//!
//! ```bash
//! # Console output only (debug level for gbstree crate)
//! RUST_LOG=gbstree=debug cargo test --features tracing --test concurrent_regression
//!
//! # Full trace to file, no console
//! RUST_LOG=trace GBSTREE_LOG_CONSOLE=0 cargo test --features tracing --test concurrent_regression
//! ```
//!
//! Logs are written to `logs/` directory (gitignored).

#![allow(clippy::pedantic)]
#![expect(clippy::unwrap_used)]

mod common;

use gbstree::{GbsConfig, GbsTree, K_FACTORS};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

fn shared_tree(k: usize, width: usize) -> Arc<GbsTree<u64>> {
    Arc::new(GbsTree::new(GbsConfig::new(k, width)).unwrap())
}

// =============================================================================
// Basic Concurrent Insert
// =============================================================================

#[test]
fn concurrent_insert_4_threads_disjoint_keys() {
    common::init_tracing();

    for k in K_FACTORS {
        let tree = shared_tree(k, 4);

        let handles: Vec<_> = (0..4_u64)
            .map(|t| {
                let tree = Arc::clone(&tree);
                thread::spawn(move || {
                    let guard = tree.guard();
                    for i in 0..2_000 {
                        assert!(tree.insert_with_guard(i * 4 + t, &guard).unwrap());
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(tree.len(), 8_000, "k={k}");
        let keys: Vec<u64> = tree.iter().map(|key| *key.unwrap()).collect();
        assert_eq!(keys, (0..8_000).collect::<Vec<_>>(), "k={k}");
        tree.validate().unwrap();
    }
}

#[test]
fn concurrent_insert_same_keys_exactly_one_wins() {
    let tree = shared_tree(6, 5);

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let tree = Arc::clone(&tree);
            thread::spawn(move || {
                let guard = tree.guard();
                (0..1_000_u64)
                    .filter(|&key| tree.insert_with_guard(key, &guard).unwrap())
                    .count()
            })
        })
        .collect();
    let wins: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();

    assert_eq!(wins, 1_000);
    assert_eq!(tree.len(), 1_000);
    tree.validate().unwrap();
}

// =============================================================================
// Readers During Writes
// =============================================================================

#[test]
fn readers_never_miss_stable_keys() {
    common::init_tracing();

    // Even keys are inserted up front and never touched; writers churn the
    // odd keys. A reader must find every even key every time.
    let tree = shared_tree(8, 3);
    for key in (0..4_000).step_by(2) {
        tree.insert(key).unwrap();
    }
    let stop = Arc::new(AtomicBool::new(false));

    let writers: Vec<_> = (0..2_u64)
        .map(|t| {
            let tree = Arc::clone(&tree);
            let stop = Arc::clone(&stop);
            thread::spawn(move || {
                let guard = tree.guard();
                let mut round = 0_u64;
                while !stop.load(Ordering::Relaxed) {
                    for key in (1 + 2 * t..4_000).step_by(4) {
                        if round % 2 == 0 {
                            tree.insert_with_guard(key, &guard).unwrap();
                        } else {
                            tree.delete_with_guard(&key, &guard).unwrap();
                        }
                    }
                    round += 1;
                }
            })
        })
        .collect();

    let readers: Vec<_> = (0..2)
        .map(|_| {
            let tree = Arc::clone(&tree);
            thread::spawn(move || {
                let guard = tree.guard();
                for _ in 0..5 {
                    for key in (0..4_000).step_by(2) {
                        let found = tree.search_equal_with_guard(&key, &guard).unwrap();
                        assert_eq!(found.as_deref(), Some(&key));
                        let next = tree.search_greater_or_equal(&key).unwrap();
                        assert_eq!(next.as_deref(), Some(&key));
                    }
                }
            })
        })
        .collect();

    for r in readers {
        r.join().unwrap();
    }
    stop.store(true, Ordering::Relaxed);
    for w in writers {
        w.join().unwrap();
    }
    tree.validate().unwrap();
}

#[test]
fn scan_during_writes_is_sorted_and_complete() {
    let tree = shared_tree(4, 4);
    for key in (0..3_000).map(|k| k * 3) {
        tree.insert(key).unwrap();
    }
    let stop = Arc::new(AtomicBool::new(false));

    let writer = {
        let tree = Arc::clone(&tree);
        let stop = Arc::clone(&stop);
        thread::spawn(move || {
            let guard = tree.guard();
            let mut key = 1_u64;
            while !stop.load(Ordering::Relaxed) {
                tree.insert_with_guard(key, &guard).unwrap();
                tree.delete_with_guard(&(key + 1), &guard).unwrap();
                key = (key + 3) % 9_000;
            }
        })
    };

    for _ in 0..10 {
        let keys: Vec<u64> = tree.iter().map(|key| *key.unwrap()).collect();
        assert!(keys.windows(2).all(|w| w[0] < w[1]), "scan out of order");
        let multiples: BTreeSet<u64> = keys.iter().copied().filter(|k| k % 3 == 0).collect();
        assert_eq!(multiples.len(), 3_000, "scan skipped a stable key");
    }

    stop.store(true, Ordering::Relaxed);
    writer.join().unwrap();
    tree.validate().unwrap();
}

// =============================================================================
// Mixed Writers
// =============================================================================

#[test]
fn concurrent_mixed_writers_then_validate() {
    for k in [2, 12, 32] {
        let tree = shared_tree(k, 3);

        let handles: Vec<_> = (0..4_u64)
            .map(|t| {
                let tree = Arc::clone(&tree);
                thread::spawn(move || {
                    let guard = tree.guard();
                    let mut state = (t + 1).wrapping_mul(0x9e37_79b9_7f4a_7c15);
                    for _ in 0..5_000 {
                        state = state
                            .wrapping_mul(6_364_136_223_846_793_005)
                            .wrapping_add(1);
                        let key = (state >> 20) % 2_048;
                        if state % 3 == 0 {
                            tree.delete_with_guard(&key, &guard).unwrap();
                        } else {
                            tree.insert_with_guard(key, &guard).unwrap();
                        }
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        let stats = tree.validate().unwrap();
        assert_eq!(stats.keys, tree.len(), "k={k}");
        assert_eq!(tree.iter().count(), tree.len(), "k={k}");
    }
}

#[test]
fn concurrent_iterator_removes_with_inserters() {
    let tree = shared_tree(12, 6);
    for key in (0..5_000).map(|k| k * 2) {
        tree.insert(key).unwrap();
    }

    let inserter = {
        let tree = Arc::clone(&tree);
        thread::spawn(move || {
            let guard = tree.guard();
            for key in (0..5_000).map(|k| k * 2 + 1) {
                tree.insert_with_guard(key, &guard).unwrap();
            }
        })
    };

    let mut iter = tree.iter();
    while let Some(key) = iter.next_key().unwrap() {
        if *key % 2 == 0 {
            assert!(iter.remove().unwrap());
        }
    }
    inserter.join().unwrap();

    assert!(tree.iter().all(|key| *key.unwrap() % 2 == 1));
    assert_eq!(tree.len(), 5_000);
    tree.validate().unwrap();
}
