//! Diagnostic counters of a [`GbsTree`](crate::GbsTree).
//!
//! Counts how often each operation completed on its optimistic pass versus
//! the pessimistic (locked) retry, and why optimistic passes gave up. The
//! counters are for tuning only: nothing in the tree branches on them.

use std::sync::atomic::AtomicU64;

use crate::ordering::RELAXED;
use crate::tree::Interference;

/// Live counters, bumped with relaxed atomics.
#[derive(Debug, Default)]
pub(crate) struct TreeCounters {
    optimistic_finds: AtomicU64,
    pessimistic_finds: AtomicU64,
    optimistic_inserts: AtomicU64,
    pessimistic_inserts: AtomicU64,
    optimistic_deletes: AtomicU64,
    pessimistic_deletes: AtomicU64,
    find_surprises: AtomicU64,
    insert_surprises: AtomicU64,
    delete_surprises: AtomicU64,
    null_references: AtomicU64,
    depth_exceeded: AtomicU64,
    iterator_resyncs: AtomicU64,
    iterator_fast_removes: AtomicU64,
}

/// Which operation a counter bump belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum OpKind {
    Find,
    Insert,
    Delete,
}

#[inline]
fn bump(counter: &AtomicU64) {
    counter.fetch_add(1, RELAXED);
}

impl TreeCounters {
    pub(crate) fn optimistic(&self, op: OpKind) {
        bump(match op {
            OpKind::Find => &self.optimistic_finds,
            OpKind::Insert => &self.optimistic_inserts,
            OpKind::Delete => &self.optimistic_deletes,
        });
    }

    pub(crate) fn pessimistic(&self, op: OpKind) {
        bump(match op {
            OpKind::Find => &self.pessimistic_finds,
            OpKind::Insert => &self.pessimistic_inserts,
            OpKind::Delete => &self.pessimistic_deletes,
        });
    }

    /// An optimistic pass was invalidated by a concurrent write.
    pub(crate) fn surprise(&self, op: OpKind) {
        bump(match op {
            OpKind::Find => &self.find_surprises,
            OpKind::Insert => &self.insert_surprises,
            OpKind::Delete => &self.delete_surprises,
        });
    }

    pub(crate) fn interference(&self, cause: Interference) {
        bump(match cause {
            Interference::DepthExceeded => &self.depth_exceeded,
            Interference::NullReference
            | Interference::SlotOutOfRange
            | Interference::Unlinked
            | Interference::ShapeMismatch => &self.null_references,
        });
    }

    pub(crate) fn iterator_resync(&self) {
        bump(&self.iterator_resyncs);
    }

    pub(crate) fn iterator_fast_remove(&self) {
        bump(&self.iterator_fast_removes);
    }

    pub(crate) fn snapshot(&self) -> CounterSnapshot {
        CounterSnapshot {
            optimistic_finds: self.optimistic_finds.load(RELAXED),
            pessimistic_finds: self.pessimistic_finds.load(RELAXED),
            optimistic_inserts: self.optimistic_inserts.load(RELAXED),
            pessimistic_inserts: self.pessimistic_inserts.load(RELAXED),
            optimistic_deletes: self.optimistic_deletes.load(RELAXED),
            pessimistic_deletes: self.pessimistic_deletes.load(RELAXED),
            find_surprises: self.find_surprises.load(RELAXED),
            insert_surprises: self.insert_surprises.load(RELAXED),
            delete_surprises: self.delete_surprises.load(RELAXED),
            null_references: self.null_references.load(RELAXED),
            depth_exceeded: self.depth_exceeded.load(RELAXED),
            iterator_resyncs: self.iterator_resyncs.load(RELAXED),
            iterator_fast_removes: self.iterator_fast_removes.load(RELAXED),
        }
    }
}

/// Point-in-time copy of a tree's diagnostic counters.
///
/// Fields are read one at a time, so a snapshot taken under concurrent load
/// is not an atomic cut across counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CounterSnapshot {
    /// Searches answered without the tree lock.
    pub optimistic_finds: u64,
    /// Searches that had to take the tree lock.
    pub pessimistic_finds: u64,
    /// Inserts whose lock-free plan was still valid under the lock.
    pub optimistic_inserts: u64,
    /// Inserts that searched again under the lock.
    pub pessimistic_inserts: u64,
    /// Deletes whose lock-free plan was still valid under the lock.
    pub optimistic_deletes: u64,
    /// Deletes that searched again under the lock.
    pub pessimistic_deletes: u64,
    /// Searches whose optimistic pass saw `vno` move.
    pub find_surprises: u64,
    /// Inserts whose optimistic pass saw `vno` move.
    pub insert_surprises: u64,
    /// Deletes whose optimistic pass saw `vno` move.
    pub delete_surprises: u64,
    /// Optimistic passes that hit a torn link or slot.
    pub null_references: u64,
    /// Optimistic passes that ran past the depth bound.
    pub depth_exceeded: u64,
    /// Iterator steps that had to search again after a concurrent write.
    pub iterator_resyncs: u64,
    /// `remove()` calls patched in place without the general delete.
    pub iterator_fast_removes: u64,
}

impl CounterSnapshot {
    /// Total operations that fell back to the tree lock.
    #[must_use]
    pub const fn pessimistic_total(&self) -> u64 {
        self.pessimistic_finds + self.pessimistic_inserts + self.pessimistic_deletes
    }

    /// Total optimistic passes that gave up.
    #[must_use]
    pub const fn surprise_total(&self) -> u64 {
        self.find_surprises + self.insert_surprises + self.delete_surprises
    }
}
