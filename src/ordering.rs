//! Standard memory orderings for concurrent tree access.
//!
//! Readers never lock: they load node fields with acquire ordering and
//! validate the tree's `vno` afterwards. Writers hold the tree lock and
//! publish every field with release ordering, so a reader that observes any
//! part of a write also observes the odd `vno` that opened it.

use std::sync::atomic::Ordering;

/// Ordering for reading node fields during optimistic traversal.
/// Pairs with the writer's Release stores.
pub const READ_ORD: Ordering = Ordering::Acquire;

/// Ordering for writing node fields under the tree lock.
/// Pairs with the reader's Acquire loads.
pub const WRITE_ORD: Ordering = Ordering::Release;

/// Ordering for relaxed loads (within the locked region, or counters).
/// Safe because the lock provides synchronization.
pub const RELAXED: Ordering = Ordering::Relaxed;

/// Ordering for taking a `vno` snapshot.
/// Must see the odd value published when a write bracket opens.
pub const VERSION_ORD: Ordering = Ordering::Acquire;

/// Ordering for opening a write bracket (`vno` becomes odd).
/// Later node stores must not be reordered before the bump.
pub const BRACKET_ORD: Ordering = Ordering::AcqRel;

/// Ordering for closing a write bracket (`vno` becomes even).
/// Must be visible to readers validating their snapshot.
pub const UNLOCK_ORD: Ordering = Ordering::Release;
