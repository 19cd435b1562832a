//! Shared helpers for the integration tests: tracing setup, tree builders,
//! and the `BTreeSet` oracle check.
//!
//! # Tracing
//!
//! - `RUST_LOG`: filter directives (e.g. `gbstree=debug`)
//! - `GBSTREE_LOG_DIR`: log directory (default: `logs/`)
//! - `GBSTREE_LOG_CONSOLE`: set to "0" to disable console output
//!
//! Events are appended to `<dir>/gbstree.jsonl`, one JSON object per line:
//!
//! ```bash
//! # Reshaping decisions for one K factor
//! jq 'select(.fields.k_factor == 12)' logs/gbstree.jsonl
//!
//! # Iterator resyncs only
//! jq 'select(.fields.message | test("resync"))' logs/gbstree.jsonl
//! ```

#![allow(dead_code)]

use std::collections::BTreeSet;
use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::Once;

use gbstree::{GbsConfig, GbsTree, K_FACTORS};
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry};

static INIT: Once = Once::new();

/// Install the console and NDJSON file subscribers once per test binary.
pub fn init_tracing() {
    INIT.call_once(install_subscribers);
}

fn filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

#[expect(clippy::expect_used)]
fn install_subscribers() {
    let dir = std::env::var("GBSTREE_LOG_DIR").map_or_else(|_| PathBuf::from("logs"), PathBuf::from);
    let console = !std::env::var("GBSTREE_LOG_CONSOLE").is_ok_and(|v| v == "0");

    std::fs::create_dir_all(&dir).expect("create log directory");
    // Append: nextest runs every test in its own process.
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(dir.join("gbstree.jsonl"))
        .expect("open log file");

    let console_layer = console.then(|| {
        tracing_subscriber::fmt::layer()
            .with_thread_names(true)
            .with_target(true)
            .compact()
            .with_filter(filter())
    });

    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::sync::Mutex::new(file))
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .with_span_events(FmtSpan::CLOSE)
        .json()
        .with_filter(filter());

    // The library's own `init_tracing` may have won the race already.
    let _ = Registry::default()
        .with(console_layer)
        .with(file_layer)
        .try_init();
}

// ============================================================================
//  Tree builders
// ============================================================================

/// One empty tree per supported K factor, all with the same node width.
///
/// # Panics
/// If `width` is out of range.
#[expect(clippy::unwrap_used)]
pub fn tree_per_k_factor(width: usize) -> Vec<(usize, GbsTree<u32>)> {
    K_FACTORS
        .iter()
        .map(|&k| (k, GbsTree::new(GbsConfig::new(k, width)).unwrap()))
        .collect()
}

/// Deterministic pseudo-random keys below `bound`, duplicates included.
pub fn scrambled_keys(count: usize, bound: u32, seed: u64) -> Vec<u32> {
    let mut state = seed | 1;
    (0..count)
        .map(|_| {
            state ^= state << 13;
            state ^= state >> 7;
            state ^= state << 17;
            (state % u64::from(bound)) as u32
        })
        .collect()
}

// ============================================================================
//  Oracle
// ============================================================================

/// Check a tree against the ordered oracle it should mirror.
///
/// # Panics
/// If the tree fails validation or holds different keys.
#[expect(clippy::unwrap_used)]
pub fn assert_matches_oracle(tree: &GbsTree<u32>, oracle: &BTreeSet<u32>) {
    let stats = tree.validate().unwrap();
    assert_eq!(stats.keys, oracle.len());
    assert_eq!(tree.len(), oracle.len());
    let keys: Vec<u32> = tree.iter().map(|k| *k.unwrap()).collect();
    assert!(keys.iter().eq(oracle.iter()), "tree {keys:?} != oracle {oracle:?}");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scrambled_keys_stay_in_bound() {
        let keys = scrambled_keys(1_000, 50, 7);
        assert_eq!(keys.len(), 1_000);
        assert!(keys.iter().all(|&k| k < 50));
        assert_eq!(keys, scrambled_keys(1_000, 50, 7));
    }

    #[test]
    fn test_tracing_init() {
        init_tracing();
        init_tracing();
        tracing::debug!(k_factor = 4, node_width = 10, "debug event");
    }
}
