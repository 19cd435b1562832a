//! # `gbstree`
//!
//! A concurrent, in-memory ordered set built as a GBS tree: a binary tree of
//! fixed-width multi-key nodes in which height balancing is applied to
//! *groups* of nodes rather than to individual nodes.
//!
//! - Leaves and near-leaves are kept in loosely shaped groups called fringes.
//!   A fringe is cheap to grow: keys shift between its nodes and a new node
//!   is appended only when the last one on the path is full.
//! - A plain chain that reaches the T0 size of the configured K factor is
//!   rebuilt as a literal complete T0 block. A group that reaches its
//!   germinate size splits into a skeleton node over two T0 blocks.
//! - Skeleton nodes are AVL-balanced by grouped height, where a whole fringe
//!   group counts as one level.
//!
//! ## Thread Safety
//!
//! `GbsTree<K>` is `Send + Sync` when `K: Send + Sync`. Readers never lock:
//! they traverse optimistically and validate the tree-wide `vno` counter.
//! Writers serialize on one tree lock and plan their work optimistically
//! before taking it.
//!
//! ```rust
//! use gbstree::{GbsConfig, GbsTree};
//!
//! let tree: GbsTree<u64> = GbsTree::new(GbsConfig::default().with_k_factor(8)).unwrap();
//! let guard = tree.guard();
//!
//! for key in [40, 10, 30, 20] {
//!     tree.insert_with_guard(key, &guard).unwrap();
//! }
//! assert_eq!(tree.search_equal_with_guard(&30, &guard).unwrap().as_deref(), Some(&30));
//!
//! let keys: Vec<u64> = tree.iter().map(|k| *k.unwrap()).collect();
//! assert_eq!(keys, vec![10, 20, 30, 40]);
//! ```
//!
//! ## Keys
//!
//! - The tree stores each key behind one `Arc<K>` and hands out clones of it,
//!   so lookups never need `K: Clone` and never borrow into a node.
//! - Order comes from two [`Comparator`]s: the insert comparator (insert and
//!   delete) and the key comparator (searches and iteration). Both default to
//!   [`NaturalOrder`]; closures `Fn(&K, &K) -> Ordering` work too.
//!
//! ## Diagnostics
//!
//! [`GbsTree::validate()`] checks every structural invariant,
//! [`GbsTree::snapshot()`] copies the node graph out, and
//! [`GbsTree::counters()`] reports how often operations had to fall back to
//! the tree lock. Structured logging is available behind the `tracing`
//! feature.

#![deny(missing_docs)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

pub mod comparator;
pub mod ordering;
pub mod version;

mod alloc;
mod fringe;
mod height;
mod node;
mod stack;
mod tracing_helpers;
mod tree;

// Re-export main types for convenience
pub use comparator::{Comparator, NaturalOrder, SearchMode};
pub use tracing_helpers::init_tracing;
pub use tree::{
    ConfigError, CounterSnapshot, DEFAULT_K_FACTOR, DEFAULT_NODE_WIDTH, GBS_TREE, GbsConfig,
    GbsIter, GbsTree, K_FACTORS, MAX_NODE_WIDTH, MIN_NODE_WIDTH, NodeSnapshot, T_TREE, TreeError,
    TreeStats,
};
