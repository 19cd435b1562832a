//! `GbsTree` - a concurrent tree of multi-key nodes balanced by groups.
//!
//! This module provides the [`GbsTree`] engine, its [`GbsConfig`], and the
//! optimistic/pessimistic protocol every operation runs through:
//!
//! ```text
//! 1. snapshot = vno            (odd: a write is in flight, go to 4)
//! 2. traverse without the lock (a torn link or slot aborts the pass)
//! 3. vno == snapshot?          commit (writers: under the lock, if vno is
//!                              still the snapshot)
//! 4. take the tree lock, traverse again, commit
//! ```
//!
//! An optimistic pass that reports [`Interference`] while `vno` did not move
//! cannot blame a concurrent writer; it is surfaced as
//! [`TreeError::Corrupted`] instead of being retried.

use std::fmt as StdFmt;
use std::ptr::NonNull;
use std::sync::atomic::AtomicUsize;

use parking_lot::Mutex;
use seize::{Collector, LocalGuard};

use crate::alloc::NodePool;
use crate::comparator::{Comparator, NaturalOrder};
use crate::fringe::FringeProfile;
use crate::node::Node;
use crate::ordering::RELAXED;
use crate::stack::MAX_BALANCED_DEPTH;
use crate::tracing_helpers::{error_log, trace_log};
use crate::version::TreeVersion;

mod counters;
mod delete;
mod error;
mod find;
mod insert;
mod iter;
mod validate;


pub use counters::CounterSnapshot;
pub use error::{ConfigError, TreeError};
pub use iter::GbsIter;
pub use validate::{NodeSnapshot, TreeStats};

pub(crate) use counters::{OpKind, TreeCounters};
pub(crate) use error::Interference;

// ============================================================================
//  Constants
// ============================================================================

/// Supported K factors, smallest first.
pub const K_FACTORS: [usize; 8] = [2, 4, 6, 8, 12, 16, 24, 32];

/// K factor of [`GbsConfig::default()`].
pub const DEFAULT_K_FACTOR: usize = 4;

/// Node width of [`GbsConfig::default()`].
pub const DEFAULT_NODE_WIDTH: usize = 10;

/// Smallest supported node width.
pub const MIN_NODE_WIDTH: usize = 3;

/// Largest supported node width.
pub const MAX_NODE_WIDTH: usize = 2000;

/// Tree type tag reported by [`GbsTree::tree_type()`].
pub const GBS_TREE: u32 = 12;

/// Tree type tag of the classic T-tree, kept for callers that switch on it.
pub const T_TREE: u32 = 15;

// ============================================================================
//  GbsConfig
// ============================================================================

/// Construction parameters of a [`GbsTree`].
///
/// ```rust
/// use gbstree::GbsConfig;
///
/// let config = GbsConfig::default().with_k_factor(8).with_node_width(32);
/// assert!(config.validate().is_ok());
/// assert!(GbsConfig::default().with_k_factor(5).validate().is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GbsConfig {
    k_factor: usize,
    node_width: usize,
}

impl GbsConfig {
    /// Config with explicit values. Nothing is checked until
    /// [`validate()`](Self::validate) or tree construction.
    #[must_use]
    pub const fn new(k_factor: usize, node_width: usize) -> Self {
        Self {
            k_factor,
            node_width,
        }
    }

    /// Replace the K factor.
    #[must_use]
    pub const fn with_k_factor(mut self, k_factor: usize) -> Self {
        self.k_factor = k_factor;
        self
    }

    /// Replace the node width.
    #[must_use]
    pub const fn with_node_width(mut self, node_width: usize) -> Self {
        self.node_width = node_width;
        self
    }

    /// The K factor.
    #[must_use]
    #[inline]
    pub const fn k_factor(&self) -> usize {
        self.k_factor
    }

    /// Keys per node.
    #[must_use]
    #[inline]
    pub const fn node_width(&self) -> usize {
        self.node_width
    }

    /// Check both values against the supported ranges.
    ///
    /// # Errors
    /// [`ConfigError::InvalidKFactor`] for a K factor outside [`K_FACTORS`],
    /// [`ConfigError::InvalidNodeWidth`] for a width outside
    /// `MIN_NODE_WIDTH..=MAX_NODE_WIDTH`.
    pub const fn validate(&self) -> Result<(), ConfigError> {
        if FringeProfile::for_k_factor(self.k_factor).is_none() {
            return Err(ConfigError::InvalidKFactor {
                k_factor: self.k_factor,
            });
        }
        if self.node_width < MIN_NODE_WIDTH || self.node_width > MAX_NODE_WIDTH {
            return Err(ConfigError::InvalidNodeWidth {
                node_width: self.node_width,
            });
        }
        Ok(())
    }
}

impl Default for GbsConfig {
    fn default() -> Self {
        Self::new(DEFAULT_K_FACTOR, DEFAULT_NODE_WIDTH)
    }
}

// ============================================================================
//  GbsTree
// ============================================================================

/// A concurrent ordered set of `Arc<K>` keys.
///
/// # Type Parameters
///
/// - `K` - The key type. Never inspected except through the comparators.
/// - `C` - Insert comparator: the total order of `insert` and `delete`.
/// - `S` - Key comparator: the order of the `search_*` family and of
///   iterator re-synchronization.
///
/// # Example
///
/// ```rust
/// use gbstree::{GbsConfig, GbsTree};
///
/// let tree: GbsTree<u64> = GbsTree::new(GbsConfig::default()).unwrap();
/// assert!(tree.insert(7).unwrap());
/// assert!(!tree.insert(7).unwrap());
/// assert_eq!(tree.search_greater(&3).unwrap().as_deref(), Some(&7));
/// assert!(tree.delete(&7).unwrap());
/// assert!(tree.is_empty());
/// ```
pub struct GbsTree<K, C = NaturalOrder, S = NaturalOrder> {
    /// Reclaims keys removed from the tree once no reader can hold them.
    collector: Collector,

    /// Parent of the root. Only its right link is used.
    dummy: Box<Node<K>>,

    /// Tree-wide writer lock. Owns the node pool.
    writer: Mutex<NodePool<K>>,

    version: TreeVersion,

    /// Number of keys in the tree.
    population: AtomicUsize,

    config: GbsConfig,
    profile: FringeProfile,

    /// Traversal stack bound: the AVL limit, plus the longest fringe, plus
    /// the dummy and one slack entry.
    depth_limit: usize,

    insert_cmp: C,
    key_cmp: S,

    counters: TreeCounters,
}

impl<K: Ord> GbsTree<K> {
    /// Create an empty tree ordered by `K: Ord`.
    ///
    /// # Errors
    /// Returns [`ConfigError`] if `config` does not validate.
    pub fn new(config: GbsConfig) -> Result<Self, ConfigError> {
        Self::with_comparators(config, NaturalOrder, NaturalOrder)
    }
}

impl<K, C, S> GbsTree<K, C, S>
where
    C: Comparator<K>,
    S: Comparator<K>,
{
    /// Create an empty tree with explicit comparators.
    ///
    /// # Errors
    /// Returns [`ConfigError`] if `config` does not validate.
    pub fn with_comparators(
        config: GbsConfig,
        insert_cmp: C,
        key_cmp: S,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let profile: FringeProfile =
            FringeProfile::for_k_factor(config.k_factor).ok_or(ConfigError::InvalidKFactor {
                k_factor: config.k_factor,
            })?;

        Ok(Self {
            collector: Collector::new(),
            dummy: Box::new(Node::new(0)),
            writer: Mutex::new(NodePool::new(config.node_width)),
            version: TreeVersion::new(),
            population: AtomicUsize::new(0),
            config,
            profile,
            depth_limit: MAX_BALANCED_DEPTH + profile.group_limit() + 2,
            insert_cmp,
            key_cmp,
            counters: TreeCounters::default(),
        })
    }
}

impl<K, C, S> GbsTree<K, C, S> {
    /// Enter a protected region and return a guard.
    ///
    /// Keys loaded while the guard lives are not reclaimed even if a
    /// concurrent delete removes them. Pass it to the `_with_guard` methods
    /// to amortize its cost over many operations.
    #[must_use]
    #[inline]
    pub fn guard(&self) -> LocalGuard<'_> {
        self.collector.enter()
    }

    /// Number of keys in the tree.
    #[must_use]
    #[inline]
    pub fn len(&self) -> usize {
        self.population.load(RELAXED)
    }

    /// Whether the tree holds no keys.
    #[must_use]
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The configured K factor.
    #[must_use]
    #[inline]
    pub const fn k_factor(&self) -> usize {
        self.config.k_factor
    }

    /// Keys per node.
    #[must_use]
    #[inline]
    pub const fn node_width(&self) -> usize {
        self.config.node_width
    }

    /// Middle slot index of a full node.
    #[must_use]
    #[inline]
    pub const fn node_mid_point(&self) -> usize {
        (self.config.node_width - 1) / 2
    }

    /// Depth of the complete T0 sub-tree built from the root fringe.
    #[must_use]
    #[inline]
    pub const fn t_zero_depth(&self) -> usize {
        self.profile.t0_depth()
    }

    /// Fringe length the next reshape is measured against.
    ///
    /// The T0 size while the tree is still one plain chain. Once the root
    /// has a left child (a T0 block or a skeleton node), the longest tail a
    /// block may grow before its group germinates.
    #[must_use]
    pub fn maximum_fringe_imbalance(&self) -> usize {
        match self.root() {
            Some(root) if root.left().is_some() => self.profile.max_imbalance(),
            _ => self.profile.t0_size(),
        }
    }

    /// Always [`GBS_TREE`].
    #[must_use]
    #[inline]
    pub const fn tree_type(&self) -> u32 {
        GBS_TREE
    }

    /// Current `vno`: bumped twice by every write.
    #[must_use]
    #[inline]
    pub fn vno(&self) -> u64 {
        self.version.vno()
    }

    /// Current `xno`: bumped once by every write that changed the tree shape.
    #[must_use]
    #[inline]
    pub fn xno(&self) -> u64 {
        self.version.xno()
    }

    /// Snapshot of the diagnostic counters.
    #[must_use]
    pub fn counters(&self) -> CounterSnapshot {
        self.counters.snapshot()
    }

    /// Allocate `count` spare nodes ahead of use.
    pub fn pre_populate(&self, count: usize) {
        self.writer.lock().pre_populate(count);
        trace_log!(count, "pool: pre-populated");
    }

    /// Number of nodes linked into the tree.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.writer.lock().live()
    }

    // ========================================================================
    //  Internal helpers
    // ========================================================================

    #[inline]
    pub(crate) fn root(&self) -> Option<&Node<K>> {
        self.dummy.right()
    }

    /// Borrow a node handed out by the pool.
    #[inline]
    pub(crate) fn adopt(&self, ptr: NonNull<Node<K>>) -> &Node<K> {
        // SAFETY: pool nodes stay allocated until the pool drops, and the pool
        // drops together with `self`.
        unsafe { ptr.as_ref() }
    }

    pub(crate) fn release_count(&self) -> Result<(), TreeError> {
        self.population
            .fetch_update(RELAXED, RELAXED, |count| count.checked_sub(1))
            .map(drop)
            .map_err(|_| TreeError::PopulationUnderflow)
    }

    /// Promote an interference no concurrent writer can explain.
    pub(crate) fn corruption(&self, cause: Interference, vno: u64) -> TreeError {
        error_log!(%cause, vno, "tree: interference without a concurrent writer");
        cause.into_corruption(vno, self.depth_limit)
    }

    /// Run the read protocol around `pass`.
    ///
    /// `pass` runs once without the lock and, if that run is invalidated,
    /// once more under it. Returns the value of the run that counted and the
    /// version it is consistent with.
    pub(crate) fn read<T, F>(&self, op: OpKind, mut pass: F) -> Result<(T, Stamp), TreeError>
    where
        F: FnMut() -> Result<T, Interference>,
    {
        if let Some(vno) = self.version.stable() {
            let stamp = Stamp {
                vno,
                xno: self.version.xno(),
            };
            match pass() {
                Ok(value) if !self.version.has_changed(vno) => {
                    self.counters.optimistic(op);
                    return Ok((value, stamp));
                }
                Ok(_) => {
                    self.counters.surprise(op);
                    trace_log!(?op, vno, "tree: optimistic pass invalidated");
                }
                Err(cause) => {
                    if !self.version.has_changed(vno) {
                        return Err(self.corruption(cause, vno));
                    }
                    self.counters.surprise(op);
                    self.counters.interference(cause);
                    trace_log!(?op, %cause, vno, "tree: optimistic pass interfered");
                }
            }
        }

        let _held = self.writer.lock();
        let stamp = Stamp {
            vno: self.version.vno(),
            xno: self.version.xno(),
        };
        self.counters.pessimistic(op);
        let value: T = pass().map_err(|cause| self.corruption(cause, stamp.vno))?;
        Ok((value, stamp))
    }
}

/// The `vno`/`xno` pair a read was validated against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Stamp {
    pub(crate) vno: u64,
    pub(crate) xno: u64,
}

impl<K, C, S> StdFmt::Debug for GbsTree<K, C, S> {
    fn fmt(&self, f: &mut StdFmt::Formatter<'_>) -> StdFmt::Result {
        f.debug_struct("GbsTree")
            .field("len", &self.len())
            .field("config", &self.config)
            .field("profile", &self.profile)
            .field("version", &self.version)
            .field("depth_limit", &self.depth_limit)
            .finish_non_exhaustive()
    }
}
