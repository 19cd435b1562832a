//! Multi-key tree node.
//!
//! A [`Node`] is a fixed-capacity run of sorted keys plus the links that make
//! it part of a binary tree of nodes: a left and a right child, an AVL balance
//! factor, and a flag telling whether the node belongs to a fringe.
//!
//! # Concurrency
//!
//! Every field is atomic. Writers mutate nodes only while holding the tree
//! lock inside an open write bracket; readers load fields without locking and
//! rely on the tree's `vno` to discard anything they read mid-write. Reader
//! accessors therefore return [`Interference`] instead of panicking whenever a
//! value is out of range (a population of zero, an empty key slot, a cached
//! middle index past the population).
//!
//! # Keys
//!
//! Key slots hold `Arc<K>` raw pointers. A key removed from the tree is retired
//! through the seize collector, so an optimistic reader that already loaded the
//! pointer can still dereference it until its guard drops.
//!
//! # Lifetime
//!
//! Nodes are owned by the tree's [`NodePool`](crate::alloc::NodePool) and are
//! never freed before the tree drops. Child pointers therefore always refer to
//! live memory, even when they are stale.

use std::fmt as StdFmt;
use std::marker::PhantomData;
use std::ptr::{self as StdPtr, NonNull};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicI8, AtomicPtr, AtomicUsize};

use seize::{Collector, Guard, LocalGuard};

use crate::comparator::Comparator;
use crate::ordering::{READ_ORD, RELAXED, WRITE_ORD};
use crate::tree::Interference;

/// Ranges shorter than this are scanned sequentially instead of bisected.
pub(crate) const SEQUENTIAL_SCAN_LIMIT: usize = 4;

// ============================================================================
//  Side / Probe
// ============================================================================

/// Which child of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Side {
    Left,
    Right,
}

impl Side {
    /// Balance factor contribution of growing this side.
    #[inline]
    pub(crate) const fn sign(self) -> i8 {
        match self {
            Self::Left => -1,
            Self::Right => 1,
        }
    }

    #[inline]
    pub(crate) const fn opposite(self) -> Self {
        match self {
            Self::Left => Self::Right,
            Self::Right => Self::Left,
        }
    }
}

/// Result of probing a key range of one node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Probe {
    /// The key is stored at this index.
    Found(usize),
    /// The key is absent; it would be inserted at this index.
    Vacant(usize),
}

// ============================================================================
//  Key slot helpers
// ============================================================================

/// Publish an owned key as a slot pointer.
#[inline]
pub(crate) fn key_into_slot<K>(key: Arc<K>) -> NonNull<K> {
    // SAFETY: `Arc::into_raw` never returns null.
    unsafe { NonNull::new_unchecked(Arc::into_raw(key).cast_mut()) }
}

/// Take back ownership of a key that was never published.
///
/// # Safety
/// `key` must come from [`key_into_slot`] and must not be stored in any node.
#[inline]
pub(crate) unsafe fn key_from_slot<K>(key: NonNull<K>) -> Arc<K> {
    // SAFETY: guaranteed by the caller.
    unsafe { Arc::from_raw(key.as_ptr()) }
}

/// Reclaimer handed to seize for retired keys.
unsafe fn reclaim_key<K>(ptr: *mut K, _collector: &Collector) {
    // SAFETY: seize calls this once, after every guard that could have
    // loaded `ptr` has been dropped.
    unsafe { drop(Arc::from_raw(ptr)) };
}

/// Retire a key that has been unlinked from every slot.
///
/// # Safety
/// `key` must come from [`key_into_slot`], must no longer be reachable from
/// any node, and must not be retired twice.
#[inline]
pub(crate) unsafe fn retire_key<K>(guard: &LocalGuard<'_>, key: NonNull<K>) {
    // SAFETY: guaranteed by the caller.
    unsafe { guard.defer_retire(key.as_ptr(), reclaim_key::<K>) };
}

// ============================================================================
//  Node
// ============================================================================

/// A fixed-width node of the GBS tree.
pub(crate) struct Node<K> {
    /// Sorted key slots. `keys[..population]` are non-null.
    keys: Box<[AtomicPtr<K>]>,

    /// Number of occupied slots.
    population: AtomicUsize,

    /// Cached index of the representative key, `(population - 1) / 2`.
    middle: AtomicUsize,

    left: AtomicPtr<Self>,
    right: AtomicPtr<Self>,

    /// `gh(right) - gh(left)` in grouped height. Always 0 on fringe nodes.
    balance: AtomicI8,

    /// Set on every member of a fringe chain.
    fringe: AtomicBool,

    /// Slots own `Arc<K>` values.
    _marker: PhantomData<Arc<K>>,
}

impl<K> Node<K> {
    /// Create an empty, unlinked node with `width` slots.
    pub(crate) fn new(width: usize) -> Self {
        let keys: Box<[AtomicPtr<K>]> = (0..width)
            .map(|_| AtomicPtr::new(StdPtr::null_mut()))
            .collect();

        Self {
            keys,
            population: AtomicUsize::new(0),
            middle: AtomicUsize::new(0),
            left: AtomicPtr::new(StdPtr::null_mut()),
            right: AtomicPtr::new(StdPtr::null_mut()),
            balance: AtomicI8::new(0),
            fringe: AtomicBool::new(false),
            _marker: PhantomData,
        }
    }

    #[inline]
    pub(crate) const fn as_ptr(&self) -> *mut Self {
        StdPtr::from_ref(self).cast_mut()
    }

    #[inline]
    pub(crate) fn width(&self) -> usize {
        self.keys.len()
    }

    // ========================================================================
    //  Reader accessors
    // ========================================================================

    #[inline]
    pub(crate) fn population(&self) -> usize {
        self.population.load(READ_ORD)
    }

    /// Population of a node reachable from the root.
    ///
    /// Zero or more than `width` can only be observed mid-write.
    #[inline]
    pub(crate) fn checked_population(&self) -> Result<usize, Interference> {
        let population: usize = self.population();
        if population == 0 || population > self.width() {
            return Err(Interference::NullReference);
        }
        Ok(population)
    }

    #[inline]
    pub(crate) fn middle_index(&self) -> usize {
        self.middle.load(READ_ORD)
    }

    /// Middle index validated against a population loaded earlier.
    #[inline]
    pub(crate) fn checked_middle(&self, population: usize) -> Result<usize, Interference> {
        let middle: usize = self.middle_index();
        if middle >= population {
            return Err(Interference::NullReference);
        }
        Ok(middle)
    }

    #[inline]
    pub(crate) fn is_full(&self) -> bool {
        self.population() == self.width()
    }

    #[inline]
    pub(crate) fn balance(&self) -> i8 {
        self.balance.load(READ_ORD)
    }

    #[inline]
    pub(crate) fn is_fringe(&self) -> bool {
        self.fringe.load(READ_ORD)
    }

    #[inline]
    pub(crate) fn left(&self) -> Option<&Self> {
        Self::deref_link(self.left.load(READ_ORD))
    }

    #[inline]
    pub(crate) fn right(&self) -> Option<&Self> {
        Self::deref_link(self.right.load(READ_ORD))
    }

    #[inline]
    pub(crate) fn child(&self, side: Side) -> Option<&Self> {
        match side {
            Side::Left => self.left(),
            Side::Right => self.right(),
        }
    }

    #[inline]
    pub(crate) fn is_leaf(&self) -> bool {
        self.left.load(READ_ORD).is_null() && self.right.load(READ_ORD).is_null()
    }

    /// Which side of `self` holds `child`, if either.
    #[inline]
    pub(crate) fn side_of(&self, child: &Self) -> Option<Side> {
        let ptr: *mut Self = child.as_ptr();
        if self.left.load(READ_ORD) == ptr {
            Some(Side::Left)
        } else if self.right.load(READ_ORD) == ptr {
            Some(Side::Right)
        } else {
            None
        }
    }

    #[inline]
    fn deref_link<'a>(ptr: *mut Self) -> Option<&'a Self> {
        // SAFETY: links only ever point at nodes owned by the same pool,
        // which is dropped together with the tree that lends out `&self`.
        unsafe { ptr.as_ref() }
    }

    /// Raw pointer stored in slot `index`.
    #[inline]
    pub(crate) fn key_ptr(&self, index: usize) -> Result<NonNull<K>, Interference> {
        let slot: &AtomicPtr<K> = self.keys.get(index).ok_or(Interference::NullReference)?;
        NonNull::new(slot.load(READ_ORD)).ok_or(Interference::NullReference)
    }

    /// Borrow the key in slot `index` for as long as `guard` lives.
    #[inline]
    pub(crate) fn key<'g>(
        &self,
        index: usize,
        _guard: &'g LocalGuard<'_>,
    ) -> Result<&'g K, Interference> {
        let ptr: NonNull<K> = self.key_ptr(index)?;

        // SAFETY: keys are retired through the collector `guard` belongs to,
        // so this allocation cannot be reclaimed while `guard` is alive.
        Ok(unsafe { ptr.as_ref() })
    }

    /// Clone out the key in slot `index`.
    #[inline]
    pub(crate) fn key_arc(
        &self,
        index: usize,
        _guard: &LocalGuard<'_>,
    ) -> Result<Arc<K>, Interference> {
        let ptr: *const K = self.key_ptr(index)?.as_ptr();

        // SAFETY: the pointer came from `Arc::into_raw` and its strong count
        // is still held by the tree or by a pending retirement that cannot run
        // while the guard is alive.
        unsafe {
            Arc::increment_strong_count(ptr);
            Ok(Arc::from_raw(ptr))
        }
    }

    /// Locate `key` within slots `lo..hi`.
    ///
    /// Short ranges are scanned; longer ones are bisected.
    pub(crate) fn probe<C>(
        &self,
        lo: usize,
        hi: usize,
        cmp: &C,
        key: &K,
        guard: &LocalGuard<'_>,
    ) -> Result<Probe, Interference>
    where
        C: Comparator<K> + ?Sized,
    {
        use std::cmp::Ordering;

        if lo > hi {
            return Err(Interference::NullReference);
        }

        if hi - lo < SEQUENTIAL_SCAN_LIMIT {
            for index in lo..hi {
                match cmp.compare(key, self.key(index, guard)?) {
                    Ordering::Equal => return Ok(Probe::Found(index)),
                    Ordering::Less => return Ok(Probe::Vacant(index)),
                    Ordering::Greater => {}
                }
            }
            return Ok(Probe::Vacant(hi));
        }

        let (mut low, mut high) = (lo, hi);
        while low < high {
            let mid: usize = low + (high - low) / 2;
            match cmp.compare(key, self.key(mid, guard)?) {
                Ordering::Equal => return Ok(Probe::Found(mid)),
                Ordering::Less => high = mid,
                Ordering::Greater => low = mid + 1,
            }
        }
        Ok(Probe::Vacant(low))
    }

    // ========================================================================
    //  Writer operations (tree lock held, write bracket open)
    // ========================================================================

    #[inline]
    fn store_population(&self, population: usize) {
        self.middle
            .store(population.saturating_sub(1) / 2, WRITE_ORD);
        self.population.store(population, WRITE_ORD);
    }

    #[inline]
    fn slot(&self, index: usize) -> Result<&AtomicPtr<K>, Interference> {
        self.keys.get(index).ok_or(Interference::SlotOutOfRange)
    }

    /// Move slots `from..to` one position to the right.
    fn shift_right(&self, from: usize, to: usize) -> Result<(), Interference> {
        for index in (from..to).rev() {
            let moved: *mut K = self.slot(index)?.load(RELAXED);
            self.slot(index + 1)?.store(moved, WRITE_ORD);
        }
        Ok(())
    }

    /// Move slots `from..to` one position to the left.
    fn shift_left(&self, from: usize, to: usize) -> Result<(), Interference> {
        for index in from..to {
            let moved: *mut K = self.slot(index)?.load(RELAXED);
            self.slot(index - 1)?.store(moved, WRITE_ORD);
        }
        Ok(())
    }

    /// Insert `key` at `index`, shifting larger keys right.
    ///
    /// When the node is full the right-most key falls out and is returned as
    /// the key to migrate; inserting at `index == width` returns `key` itself.
    pub(crate) fn insert_at(
        &self,
        index: usize,
        key: NonNull<K>,
    ) -> Result<Option<NonNull<K>>, Interference> {
        let population: usize = self.population.load(RELAXED);
        let width: usize = self.width();
        if index > population {
            return Err(Interference::SlotOutOfRange);
        }

        if population < width {
            self.shift_right(index, population)?;
            self.slot(index)?.store(key.as_ptr(), WRITE_ORD);
            self.store_population(population + 1);
            return Ok(None);
        }

        if index == width {
            return Ok(Some(key));
        }

        let overflow: NonNull<K> = self.key_ptr(width - 1)?;
        self.shift_right(index, width - 1)?;
        self.slot(index)?.store(key.as_ptr(), WRITE_ORD);
        Ok(Some(overflow))
    }

    /// Insert `key` just before slot `index`, pushing the left-most key out
    /// of a full node.
    ///
    /// Used when a key lands in an upper successor: the displaced key moves to
    /// the end of the in-order predecessor. A node with room takes the key
    /// without displacing anything.
    pub(crate) fn insert_by_left_shift(
        &self,
        index: usize,
        key: NonNull<K>,
    ) -> Result<Option<NonNull<K>>, Interference> {
        let population: usize = self.population.load(RELAXED);
        if population < self.width() {
            return self.insert_at(index, key);
        }
        if index == 0 || index > population {
            return Err(Interference::SlotOutOfRange);
        }

        let first: NonNull<K> = self.key_ptr(0)?;
        self.shift_left(1, index)?;
        self.slot(index - 1)?.store(key.as_ptr(), WRITE_ORD);
        Ok(Some(first))
    }

    /// Remove and return the key at `index`, closing the gap.
    pub(crate) fn delete_at(&self, index: usize) -> Result<NonNull<K>, Interference> {
        let population: usize = self.population.load(RELAXED);
        if index >= population {
            return Err(Interference::SlotOutOfRange);
        }

        let removed: NonNull<K> = self.key_ptr(index)?;
        self.shift_left(index + 1, population)?;
        self.slot(population - 1)?
            .store(StdPtr::null_mut(), WRITE_ORD);
        self.store_population(population - 1);
        Ok(removed)
    }

    /// Remove and return the left-most key.
    #[inline]
    pub(crate) fn take_first(&self) -> Result<NonNull<K>, Interference> {
        self.delete_at(0)
    }

    /// Append `key` after the current right-most key.
    pub(crate) fn push_back(&self, key: NonNull<K>) -> Result<(), Interference> {
        let population: usize = self.population.load(RELAXED);
        if population >= self.width() {
            return Err(Interference::SlotOutOfRange);
        }
        self.slot(population)?.store(key.as_ptr(), WRITE_ORD);
        self.store_population(population + 1);
        Ok(())
    }

    /// Pull the left-most key of `successor` into the last slot of `self`.
    ///
    /// `successor` must be the in-order next node; used to migrate a delete
    /// hole one node down the successor path.
    #[inline]
    pub(crate) fn fill_from_right_sibling(&self, successor: &Self) -> Result<(), Interference> {
        let key: NonNull<K> = successor.take_first()?;
        self.push_back(key)
    }

    #[inline]
    pub(crate) fn set_left(&self, child: Option<&Self>) {
        self.left.store(child.map_or(StdPtr::null_mut(), Self::as_ptr), WRITE_ORD);
    }

    #[inline]
    pub(crate) fn set_right(&self, child: Option<&Self>) {
        self.right.store(child.map_or(StdPtr::null_mut(), Self::as_ptr), WRITE_ORD);
    }

    #[inline]
    pub(crate) fn set_child(&self, side: Side, child: Option<&Self>) {
        match side {
            Side::Left => self.set_left(child),
            Side::Right => self.set_right(child),
        }
    }

    #[inline]
    pub(crate) fn set_balance(&self, balance: i8) {
        self.balance.store(balance, WRITE_ORD);
    }

    #[inline]
    pub(crate) fn set_fringe(&self, fringe: bool) {
        self.fringe.store(fringe, WRITE_ORD);
    }

    /// Turn a pooled node into a live single-key node.
    pub(crate) fn reset_with(&self, key: NonNull<K>, fringe: bool) {
        self.set_left(None);
        self.set_right(None);
        self.set_balance(0);
        self.set_fringe(fringe);
        if let Some(slot) = self.keys.first() {
            slot.store(key.as_ptr(), WRITE_ORD);
        }
        self.store_population(1);
    }

    /// Return a node to its pooled state. Its keys must already be gone.
    pub(crate) fn clear(&self) {
        for slot in &self.keys {
            slot.store(StdPtr::null_mut(), WRITE_ORD);
        }
        self.store_population(0);
        self.set_left(None);
        self.set_right(None);
        self.set_balance(0);
        self.set_fringe(false);
    }

    /// Drop every key still owned by this node.
    ///
    /// Requires exclusive access: only called while the tree is torn down.
    pub(crate) fn drop_keys(&mut self) {
        let population: usize = *self.population.get_mut();
        for slot in self.keys.iter_mut().take(population) {
            let ptr: *mut K = std::mem::replace(slot.get_mut(), StdPtr::null_mut());
            if !ptr.is_null() {
                // SAFETY: live slots own one strong count each, and teardown
                // runs with no concurrent readers.
                unsafe { drop(Arc::from_raw(ptr)) };
            }
        }
        *self.population.get_mut() = 0;
    }
}

impl<K> StdFmt::Debug for Node<K> {
    fn fmt(&self, f: &mut StdFmt::Formatter<'_>) -> StdFmt::Result {
        f.debug_struct("Node")
            .field("population", &self.population.load(RELAXED))
            .field("width", &self.width())
            .field("balance", &self.balance.load(RELAXED))
            .field("fringe", &self.fringe.load(RELAXED))
            .field("left", &self.left.load(RELAXED))
            .field("right", &self.right.load(RELAXED))
            .finish()
    }
}
