//! Stress binary for concurrent `GbsTree` workloads.
//!
//! Runs disjoint inserts, a mixed insert/delete/search workload over a shared
//! key space, and an iterator expiry scan against live writers, then checks
//! every tree with `validate()`. A watchdog reports threads that stop making
//! progress.
//!
//! Run with:
//! ```bash
//! GBSTREE_THREADS=8 GBSTREE_K_FACTOR=12 RUST_LOG=gbstree=debug cargo run --features tracing
//! ```
//!
//! Environment:
//! - `GBSTREE_THREADS` (default 4)
//! - `GBSTREE_KEYS` keys per thread (default 50000)
//! - `GBSTREE_K_FACTOR` (default 4)
//! - `GBSTREE_NODE_WIDTH` (default 10)

#![allow(clippy::unwrap_used)]
#![allow(clippy::indexing_slicing)]
#![allow(
    clippy::cast_possible_truncation,
    clippy::cast_precision_loss,
    clippy::too_many_lines
)]

use gbstree::{GbsConfig, GbsTree};
use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::thread;
use std::time::{Duration, Instant};

// =============================================================================
// Settings
// =============================================================================

#[derive(Debug, Clone, Copy)]
struct Settings {
    threads: usize,
    keys_per_thread: usize,
    config: GbsConfig,
}

fn env_or(name: &str, default: usize) -> usize {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl Settings {
    fn from_env() -> Self {
        Self {
            threads: env_or("GBSTREE_THREADS", 4).max(1),
            keys_per_thread: env_or("GBSTREE_KEYS", 50_000).max(1),
            config: GbsConfig::new(
                env_or("GBSTREE_K_FACTOR", gbstree::DEFAULT_K_FACTOR),
                env_or("GBSTREE_NODE_WIDTH", gbstree::DEFAULT_NODE_WIDTH),
            ),
        }
    }
}

// =============================================================================
// Thread progress tracking for hang detection
// =============================================================================

struct ThreadProgress {
    current_op: Vec<AtomicUsize>,
    current_key: Vec<AtomicU64>,
    last_progress_ms: Vec<AtomicU64>,
    done: Vec<AtomicBool>,
    start: Instant,
}

impl ThreadProgress {
    fn new(num_threads: usize) -> Self {
        Self {
            current_op: (0..num_threads).map(|_| AtomicUsize::new(0)).collect(),
            current_key: (0..num_threads).map(|_| AtomicU64::new(0)).collect(),
            last_progress_ms: (0..num_threads).map(|_| AtomicU64::new(0)).collect(),
            done: (0..num_threads).map(|_| AtomicBool::new(false)).collect(),
            start: Instant::now(),
        }
    }

    fn update(&self, thread_id: usize, op: usize, key: u64) {
        self.current_op[thread_id].store(op, Ordering::Relaxed);
        self.current_key[thread_id].store(key, Ordering::Relaxed);
        self.last_progress_ms[thread_id]
            .store(self.start.elapsed().as_millis() as u64, Ordering::Relaxed);
    }

    fn mark_done(&self, thread_id: usize) {
        self.done[thread_id].store(true, Ordering::Relaxed);
    }

    fn report_stuck(&self, timeout_ms: u64) -> Vec<(usize, usize, u64, u64)> {
        let now_ms = self.start.elapsed().as_millis() as u64;
        (0..self.done.len())
            .filter(|&i| !self.done[i].load(Ordering::Relaxed))
            .filter_map(|i| {
                let last = self.last_progress_ms[i].load(Ordering::Relaxed);
                (now_ms.saturating_sub(last) > timeout_ms).then(|| {
                    (
                        i,
                        self.current_op[i].load(Ordering::Relaxed),
                        self.current_key[i].load(Ordering::Relaxed),
                        now_ms - last,
                    )
                })
            })
            .collect()
    }

    fn all_done(&self) -> bool {
        self.done.iter().all(|d| d.load(Ordering::Relaxed))
    }
}

/// Run `work(thread_id)` on every thread under a watchdog.
fn run_watched<F>(threads: usize, work: F)
where
    F: Fn(usize, &ThreadProgress) + Send + Sync + 'static,
{
    let progress = Arc::new(ThreadProgress::new(threads));
    let stop_watchdog = Arc::new(AtomicBool::new(false));
    let work = Arc::new(work);

    let watchdog = {
        let progress = Arc::clone(&progress);
        let stop = Arc::clone(&stop_watchdog);
        thread::spawn(move || {
            while !stop.load(Ordering::Relaxed) {
                thread::sleep(Duration::from_millis(500));
                for (tid, op, key, stall_ms) in &progress.report_stuck(2000) {
                    eprintln!("!!! STUCK: Thread {tid} at op {op} key={key} for {stall_ms}ms");
                }
                if progress.all_done() {
                    break;
                }
            }
        })
    };

    let handles: Vec<_> = (0..threads)
        .map(|t| {
            let progress = Arc::clone(&progress);
            let work = Arc::clone(&work);
            thread::spawn(move || {
                work(t, &progress);
                progress.mark_done(t);
            })
        })
        .collect();

    for h in handles {
        let _ = h.join();
    }
    stop_watchdog.store(true, Ordering::Relaxed);
    let _ = watchdog.join();
}

fn banner(title: &str) {
    println!("\n{}", "=".repeat(80));
    println!("{title}");
    println!("{}", "=".repeat(80));
}

fn report(name: &str, ops: usize, elapsed: Duration, tree: &GbsTree<u64>) -> bool {
    let counters = tree.counters();
    println!(
        "{name} DONE: {ops} ops in {elapsed:?} ({:.0} ops/sec), len={}, nodes={}",
        ops as f64 / elapsed.as_secs_f64(),
        tree.len(),
        tree.node_count()
    );
    println!(
        "    pessimistic={} surprises={} null_refs={} resyncs={} fast_removes={}",
        counters.pessimistic_total(),
        counters.surprise_total(),
        counters.null_references,
        counters.iterator_resyncs,
        counters.iterator_fast_removes
    );
    match tree.validate() {
        Ok(stats) => {
            println!("    valid: {stats:?}");
            true
        }
        Err(e) => {
            eprintln!("    INVALID: {e}");
            false
        }
    }
}

// =============================================================================
// 01: Disjoint inserts
// =============================================================================

fn run_01_disjoint_inserts(settings: Settings) -> bool {
    let Settings {
        threads,
        keys_per_thread,
        config,
    } = settings;
    banner(&format!(
        "01: DISJOINT INSERTS ({threads} threads, {keys_per_thread} keys/thread, {config:?})"
    ));

    let tree = Arc::new(GbsTree::<u64>::new(config).unwrap());
    let start = Instant::now();
    {
        let tree = Arc::clone(&tree);
        run_watched(threads, move |t, progress| {
            let guard = tree.guard();
            let base = (t * keys_per_thread) as u64;
            for i in 0..keys_per_thread {
                let key = base + i as u64;
                progress.update(t, i, key);
                if let Err(e) = tree.insert_with_guard(key, &guard) {
                    eprintln!("[T{t:02}] ERROR insert {key}: {e}");
                }
            }
        });
    }

    let ok = report("01", threads * keys_per_thread, start.elapsed(), &tree);
    ok && tree.len() == threads * keys_per_thread
}

// =============================================================================
// 02: Mixed insert / delete / search over a shared key space
// =============================================================================

fn run_02_mixed(settings: Settings) -> bool {
    let Settings {
        threads,
        keys_per_thread,
        config,
    } = settings;
    let key_space = keys_per_thread as u64;
    banner(&format!(
        "02: MIXED CONTENTION ({threads} threads, {keys_per_thread} ops/thread, {key_space} keys)"
    ));

    let tree = Arc::new(GbsTree::<u64>::new(config).unwrap());
    for key in (0..key_space).step_by(2) {
        tree.insert(key).unwrap();
    }
    eprintln!("Pre-populated {} keys", tree.len());

    let start = Instant::now();
    {
        let tree = Arc::clone(&tree);
        run_watched(threads, move |t, progress| {
            let guard = tree.guard();
            let mut state = (t as u64 + 1).wrapping_mul(0x517c_c1b7_2722_0a95);
            for op in 0..keys_per_thread {
                state = state
                    .wrapping_mul(6_364_136_223_846_793_005)
                    .wrapping_add(1);
                let key = (state >> 16) % key_space;
                progress.update(t, op, key);

                let result = match state % 4 {
                    0 => tree.insert_with_guard(key, &guard).map(drop),
                    1 => tree.delete_with_guard(&key, &guard).map(drop),
                    _ => tree.search_equal_with_guard(&key, &guard).map(drop),
                };
                if let Err(e) = result {
                    eprintln!("[T{t:02}] ERROR op {op} key={key}: {e}");
                }
            }
        });
    }

    report("02", threads * keys_per_thread, start.elapsed(), &tree)
}

// =============================================================================
// 03: Expiry scan racing writers
// =============================================================================

fn run_03_expiry_scan(settings: Settings) -> bool {
    let Settings {
        threads,
        keys_per_thread,
        config,
    } = settings;
    banner(&format!(
        "03: EXPIRY SCAN ({threads} writer threads, {keys_per_thread} keys)"
    ));

    let tree = Arc::new(GbsTree::<u64>::new(config).unwrap());
    for key in 0..keys_per_thread as u64 {
        tree.insert(key * 4).unwrap();
    }

    let start = Instant::now();
    let scanned = Arc::new(AtomicUsize::new(0));
    {
        let tree = Arc::clone(&tree);
        let scanned = Arc::clone(&scanned);
        // Thread 0 scans and expires every key divisible by 8; the others
        // insert keys the scan may or may not see.
        run_watched(threads + 1, move |t, progress| {
            if t == 0 {
                let mut iter = tree.iter();
                let mut op = 0;
                loop {
                    match iter.next_key() {
                        Ok(Some(key)) => {
                            progress.update(0, op, *key);
                            op += 1;
                            if *key % 8 == 0 {
                                if let Err(e) = iter.remove() {
                                    eprintln!("[T00] ERROR remove {key}: {e}");
                                }
                            }
                        }
                        Ok(None) => break,
                        Err(e) => {
                            eprintln!("[T00] ERROR scan: {e}");
                            break;
                        }
                    }
                }
                scanned.store(op, Ordering::Relaxed);
                return;
            }

            let guard = tree.guard();
            for i in 0..keys_per_thread {
                let key = (i as u64) * 4 + t as u64 % 3 + 1;
                progress.update(t, i, key);
                if let Err(e) = tree.insert_with_guard(key, &guard) {
                    eprintln!("[T{t:02}] ERROR insert {key}: {e}");
                }
            }
        });
    }

    let leftover = tree.iter().filter_map(Result::ok).filter(|k| **k % 8 == 0).count();
    println!(
        "    scanned={} expired keys left={leftover}",
        scanned.load(Ordering::Relaxed)
    );
    let ops = scanned.load(Ordering::Relaxed) + threads * keys_per_thread;
    report("03", ops, start.elapsed(), &tree) && leftover == 0
}

// =============================================================================
// Main
// =============================================================================

fn main() -> ExitCode {
    gbstree::init_tracing();

    let settings = Settings::from_env();
    if let Err(e) = settings.config.validate() {
        eprintln!("{e}");
        return ExitCode::FAILURE;
    }

    eprintln!("GbsTree Concurrent Stress");
    eprintln!("=========================");
    eprintln!("Watchdog will report any thread stuck for >2 seconds.");

    let results = [
        run_01_disjoint_inserts(settings),
        run_02_mixed(settings),
        run_03_expiry_scan(settings),
    ];

    if results.iter().all(|&ok| ok) {
        eprintln!("\nAll runs completed and validated.");
        ExitCode::SUCCESS
    } else {
        eprintln!("\nAt least one run failed validation.");
        ExitCode::FAILURE
    }
}
