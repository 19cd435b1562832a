//! Benchmarks for `GbsTree` using Divan.
//!
//! Most groups are parameterized by K factor, since it decides how long
//! fringes grow before they are reshaped.
//!
//! Run with: `cargo bench --bench tree`
#![expect(clippy::unwrap_used)]

use divan::{Bencher, black_box};
use gbstree::{GbsConfig, GbsTree};
use std::sync::Arc;

fn main() {
    divan::main();
}

const K_ARGS: [usize; 4] = [2, 4, 12, 32];

fn populated(k: usize, width: usize, n: u64) -> GbsTree<u64> {
    let tree = GbsTree::new(GbsConfig::new(k, width)).unwrap();
    let guard = tree.guard();
    for key in 0..n {
        tree.insert_with_guard(scatter(key), &guard).unwrap();
    }
    drop(guard);
    tree
}

/// Bijective scramble so sequential `i` gives non-sequential keys.
const fn scatter(i: u64) -> u64 {
    i.wrapping_mul(0x9e37_79b9_7f4a_7c15)
}

// =============================================================================
// Construction
// =============================================================================

#[divan::bench_group]
mod construction {
    use super::{GbsConfig, GbsTree};

    #[divan::bench]
    fn new_default() -> GbsTree<u64> {
        GbsTree::new(GbsConfig::default()).unwrap()
    }

    #[divan::bench(args = [100, 1000])]
    fn pre_populate(count: usize) -> GbsTree<u64> {
        let tree = GbsTree::new(GbsConfig::default()).unwrap();
        tree.pre_populate(count);
        tree
    }
}

// =============================================================================
// Insert Operations
// =============================================================================

#[divan::bench_group]
mod insert {
    use super::{Bencher, GbsConfig, GbsTree, K_ARGS, black_box, populated, scatter};

    #[divan::bench(args = K_ARGS)]
    fn sequential_1000(bencher: Bencher, k: usize) {
        bencher
            .with_inputs(|| GbsTree::<u64>::new(GbsConfig::new(k, 10)).unwrap())
            .bench_local_values(|tree| {
                for key in 0..1000 {
                    let _ = tree.insert(black_box(key));
                }
                tree
            });
    }

    #[divan::bench(args = K_ARGS)]
    fn scattered_1000(bencher: Bencher, k: usize) {
        bencher
            .with_inputs(|| GbsTree::<u64>::new(GbsConfig::new(k, 10)).unwrap())
            .bench_local_values(|tree| {
                let guard = tree.guard();
                for i in 0..1000 {
                    let _ = tree.insert_with_guard(black_box(scatter(i)), &guard);
                }
                drop(guard);
                tree
            });
    }

    #[divan::bench(args = [3, 10, 64, 256])]
    fn node_width_1000(bencher: Bencher, width: usize) {
        bencher
            .with_inputs(|| GbsTree::<u64>::new(GbsConfig::new(4, width)).unwrap())
            .bench_local_values(|tree| {
                for i in 0..1000 {
                    let _ = tree.insert(black_box(scatter(i)));
                }
                tree
            });
    }

    #[divan::bench(args = K_ARGS)]
    fn duplicate(bencher: Bencher, k: usize) {
        let tree = populated(k, 10, 10_000);
        bencher.bench_local(|| tree.insert(black_box(scatter(5_000))));
    }
}

// =============================================================================
// Search Operations
// =============================================================================

#[divan::bench_group]
mod search {
    use super::{Bencher, K_ARGS, black_box, populated, scatter};

    #[divan::bench(args = K_ARGS)]
    fn equal_hit(bencher: Bencher, k: usize) {
        let tree = populated(k, 10, 10_000);
        let mut i = 0_u64;
        bencher.bench_local(|| {
            i = (i + 1) % 10_000;
            tree.search_equal(black_box(&scatter(i)))
        });
    }

    #[divan::bench(args = K_ARGS)]
    fn equal_miss(bencher: Bencher, k: usize) {
        let tree = populated(k, 10, 10_000);
        let mut i = 10_000_u64;
        bencher.bench_local(|| {
            i += 1;
            tree.search_equal(black_box(&scatter(i)))
        });
    }

    #[divan::bench(args = K_ARGS)]
    fn greater_with_guard(bencher: Bencher, k: usize) {
        let tree = populated(k, 10, 10_000);
        let guard = tree.guard();
        let mut i = 0_u64;
        bencher.bench_local(|| {
            i = i.wrapping_add(0x1234_5678_9abc);
            tree.search_with_guard(black_box(&i), gbstree::SearchMode::Greater, &guard)
        });
    }
}

// =============================================================================
// Delete Operations
// =============================================================================

#[divan::bench_group]
mod delete {
    use super::{Bencher, K_ARGS, populated, scatter};

    #[divan::bench(args = K_ARGS)]
    fn delete_all_1000(bencher: Bencher, k: usize) {
        bencher
            .with_inputs(|| populated(k, 10, 1000))
            .bench_local_values(|tree| {
                for i in 0..1000 {
                    let _ = tree.delete(&scatter(i));
                }
                tree
            });
    }

    #[divan::bench(args = K_ARGS)]
    fn delete_miss(bencher: Bencher, k: usize) {
        let tree = populated(k, 10, 10_000);
        bencher.bench_local(|| tree.delete(&scatter(20_000)));
    }
}

// =============================================================================
// Iteration
// =============================================================================

#[divan::bench_group]
mod iterate {
    use super::{Bencher, K_ARGS, black_box, populated};

    #[divan::bench(args = K_ARGS)]
    fn full_scan_10000(bencher: Bencher, k: usize) {
        let tree = populated(k, 10, 10_000);
        bencher.bench_local(|| {
            let mut count = 0_usize;
            for key in tree.iter() {
                black_box(key.unwrap());
                count += 1;
            }
            count
        });
    }

    #[divan::bench(args = K_ARGS)]
    fn remove_every_other_1000(bencher: Bencher, k: usize) {
        bencher
            .with_inputs(|| populated(k, 10, 1000))
            .bench_local_values(|tree| {
                let mut iter = tree.iter();
                let mut odd = false;
                while let Ok(Some(_)) = iter.next_key() {
                    if odd {
                        let _ = iter.remove();
                    }
                    odd = !odd;
                }
                drop(iter);
                tree
            });
    }
}

// =============================================================================
// Concurrent Readers
// =============================================================================

#[divan::bench_group]
mod concurrent {
    use super::{Arc, Bencher, black_box, populated, scatter};

    #[divan::bench(threads = [1, 2, 4, 8])]
    fn search_shared(bencher: Bencher) {
        let tree = Arc::new(populated(8, 10, 10_000));
        bencher.bench(|| {
            let guard = tree.guard();
            for i in 0..100 {
                black_box(tree.search_equal_with_guard(&scatter(i * 97), &guard).unwrap());
            }
        });
    }
}
