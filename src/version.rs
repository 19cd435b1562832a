//! Tree-wide version counters for optimistic concurrency control.
//!
//! [`TreeVersion`] holds the two counters every reader and writer of a
//! [`GbsTree`](crate::GbsTree) coordinates through:
//!
//! - `vno`: bumped twice around every write. Odd while a write is in flight,
//!   even when the tree is stable.
//! - `xno`: bumped once per write that changed the *shape* of the tree
//!   (nodes added or removed, fringes reshaped, rotations). Plain key shifts
//!   inside existing nodes leave it alone.
//!
//! # Concurrency Model
//! 1. Readers: call [`TreeVersion::stable()`], traverse, then
//!    [`TreeVersion::has_changed()`]. A changed or odd snapshot means the
//!    traversal may have seen a torn tree and must be redone under the lock.
//! 2. Writers: take the tree lock, call [`TreeVersion::begin_write()`] to get a
//!    [`WriteGuard`], modify nodes, let the guard drop.
//!
//! # Type-State Pattern
//! [`WriteGuard`] is the compile-time proof that a write bracket is open.
//! Mutating helpers take `&mut WriteGuard` so they cannot run outside one, and
//! the guard closes the bracket on drop (panic-safe).
//!
//! ```rust
//! use gbstree::version::TreeVersion;
//! use parking_lot::Mutex;
//!
//! let version = TreeVersion::new();
//! let lock = Mutex::new(());
//!
//! let before = version.stable().unwrap();
//! {
//!     let held = lock.lock();
//!     let mut write = version.begin_write(&held);
//!     assert!(version.is_writing());
//!     write.mark_structural();
//! }
//! assert!(version.has_changed(before));
//! assert_eq!(version.xno(), 1);
//! ```

use std::fmt as StdFmt;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, fence};

use parking_lot::MutexGuard;

use crate::ordering::{BRACKET_ORD, READ_ORD, RELAXED, UNLOCK_ORD, VERSION_ORD};



// ============================================================================
//  TreeVersion
// ============================================================================

/// The `vno`/`xno` pair of a tree.
///
/// # Example
///
/// ```rust
/// use gbstree::version::TreeVersion;
///
/// let v = TreeVersion::new();
/// assert_eq!(v.vno(), 0);
/// assert!(!v.is_writing());
/// ```
pub struct TreeVersion {
    vno: AtomicU64,
    xno: AtomicU64,
}

impl TreeVersion {
    /// Create a stable version pair at zero.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            vno: AtomicU64::new(0),
            xno: AtomicU64::new(0),
        }
    }

    /// Current `vno`.
    #[inline]
    #[must_use]
    pub fn vno(&self) -> u64 {
        self.vno.load(VERSION_ORD)
    }

    /// Current `xno`.
    #[inline]
    #[must_use]
    pub fn xno(&self) -> u64 {
        self.xno.load(VERSION_ORD)
    }

    /// Whether a write bracket is open right now.
    #[inline]
    #[must_use]
    pub fn is_writing(&self) -> bool {
        self.vno() & 1 == 1
    }

    /// Snapshot `vno` for an optimistic pass.
    ///
    /// Returns `None` while a write is in flight: the caller should go
    /// straight to the pessimistic path instead of spinning.
    #[inline]
    #[must_use]
    pub fn stable(&self) -> Option<u64> {
        let vno: u64 = self.vno();
        (vno & 1 == 0).then_some(vno)
    }

    /// Whether `vno` moved since `snapshot` was taken.
    ///
    /// The acquire fence keeps every node load of the traversal ahead of the
    /// final counter load.
    #[inline]
    #[must_use]
    pub fn has_changed(&self, snapshot: u64) -> bool {
        fence(READ_ORD);
        self.vno.load(RELAXED) != snapshot
    }

    /// Open a write bracket.
    ///
    /// `_held` proves the caller owns the tree's writer lock; writes are
    /// serialized by that lock, not by this counter.
    #[inline]
    pub fn begin_write<'a, T: ?Sized>(&'a self, _held: &MutexGuard<'_, T>) -> WriteGuard<'a> {
        let opened: u64 = self.vno.fetch_add(1, BRACKET_ORD) + 1;
        debug_assert!(opened & 1 == 1, "nested write bracket");

        WriteGuard {
            version: self,
            opened,
            structural: false,
            _marker: PhantomData,
        }
    }
}

impl Default for TreeVersion {
    fn default() -> Self {
        Self::new()
    }
}

impl StdFmt::Debug for TreeVersion {
    fn fmt(&self, f: &mut StdFmt::Formatter<'_>) -> StdFmt::Result {
        f.debug_struct("TreeVersion")
            .field("vno", &self.vno.load(RELAXED))
            .field("xno", &self.xno.load(RELAXED))
            .finish()
    }
}

// ============================================================================
//  WriteGuard (Type-State Pattern)
// ============================================================================

/// Proof that a write bracket is open.
///
/// Cannot be constructed except through [`TreeVersion::begin_write()`].
/// Dropping it bumps `xno` (only if the write was marked structural) and then
/// makes `vno` even again.
///
/// Guards are `!Send` and `!Sync` via `PhantomData<*mut ()>`; a bracket is
/// opened and closed by the same thread that holds the tree lock.
#[must_use = "dropping the guard immediately closes the write bracket"]
pub struct WriteGuard<'a> {
    version: &'a TreeVersion,
    opened: u64,
    structural: bool,

    // PhantomData<*mut ()> makes this type !Send + !Sync
    _marker: PhantomData<*mut ()>,
}

impl WriteGuard<'_> {
    /// The odd `vno` this bracket opened with.
    #[inline]
    #[must_use]
    pub const fn opened_at(&self) -> u64 {
        self.opened
    }

    /// Record that this write changes the shape of the tree.
    #[inline]
    pub fn mark_structural(&mut self) {
        self.structural = true;
    }

    /// Whether [`WriteGuard::mark_structural()`] was called.
    #[inline]
    #[must_use]
    pub const fn is_structural(&self) -> bool {
        self.structural
    }
}

impl Drop for WriteGuard<'_> {
    fn drop(&mut self) {
        if self.structural {
            self.version.xno.fetch_add(1, UNLOCK_ORD);
        }
        self.version.vno.store(self.opened + 1, UNLOCK_ORD);
    }
}

impl StdFmt::Debug for WriteGuard<'_> {
    fn fmt(&self, f: &mut StdFmt::Formatter<'_>) -> StdFmt::Result {
        f.debug_struct("WriteGuard")
            .field("opened", &self.opened)
            .field("structural", &self.structural)
            .finish_non_exhaustive()
    }
}
