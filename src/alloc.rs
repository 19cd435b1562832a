//! Node pool for the GBS tree.
//!
//! [`NodePool`] hands out nodes on insert and takes them back on delete,
//! recycling released nodes through a free list instead of returning them to
//! the global allocator. Nodes are only freed when the pool itself drops,
//! which happens together with the tree.
//!
//! # Pointer Stability
//!
//! Every node is boxed once and leaked into a raw pointer tracked by the pool.
//! The heap address never changes, so a reader holding a stale reference to a
//! released (or recycled) node still points at a valid `Node`; only its
//! contents may be unrelated, which the tree's `vno` check catches.
//!
//! The pool lives inside the tree's writer mutex: only writers allocate or
//! release, so it needs no synchronization of its own.

use std::fmt as StdFmt;
use std::ptr::NonNull;

use crate::node::Node;

/// Free-list node allocator.
pub(crate) struct NodePool<K> {
    /// Slots per node.
    width: usize,

    /// Every node ever allocated (live or free). Freed on drop.
    all: Vec<NonNull<Node<K>>>,

    /// Released nodes waiting for reuse.
    free: Vec<NonNull<Node<K>>>,
}

// SAFETY: the pool owns its nodes outright; nodes hold `Arc<K>` keys, which
// may be dropped on whichever thread drops the pool.
unsafe impl<K: Send + Sync> Send for NodePool<K> {}

impl<K> NodePool<K> {
    /// Create an empty pool for nodes of `width` slots.
    pub(crate) const fn new(width: usize) -> Self {
        Self {
            width,
            all: Vec::new(),
            free: Vec::new(),
        }
    }

    /// Number of nodes currently linked into the tree.
    #[inline]
    pub(crate) const fn live(&self) -> usize {
        self.all.len() - self.free.len()
    }

    fn allocate(&mut self) -> NonNull<Node<K>> {
        let boxed: Box<Node<K>> = Box::new(Node::new(self.width));
        let ptr: NonNull<Node<K>> = NonNull::from(Box::leak(boxed));
        self.all.push(ptr);
        ptr
    }

    /// Fill the free list with `count` additional nodes.
    pub(crate) fn pre_populate(&mut self, count: usize) {
        self.all.reserve(count);
        self.free.reserve(count);
        for _ in 0..count {
            let ptr: NonNull<Node<K>> = self.allocate();
            self.free.push(ptr);
        }
    }

    /// Take a node from the free list (or allocate one) holding just `key`.
    pub(crate) fn acquire(&mut self, key: NonNull<K>, fringe: bool) -> NonNull<Node<K>> {
        let ptr: NonNull<Node<K>> = match self.free.pop() {
            Some(ptr) => ptr,
            None => self.allocate(),
        };

        // SAFETY: pool nodes stay allocated until the pool drops.
        unsafe { ptr.as_ref() }.reset_with(key, fringe);
        ptr
    }

    /// Return an unlinked, empty node to the free list.
    pub(crate) fn release(&mut self, node: &Node<K>) {
        node.clear();
        self.free.push(NonNull::from(node));
    }
}

impl<K> Drop for NodePool<K> {
    fn drop(&mut self) {
        for ptr in self.all.drain(..) {
            // SAFETY: every pointer in `all` came from `Box::leak` in
            // `allocate` and is freed exactly once, here.
            let mut node: Box<Node<K>> = unsafe { Box::from_raw(ptr.as_ptr()) };
            node.drop_keys();
        }
        self.free.clear();
    }
}

impl<K> StdFmt::Debug for NodePool<K> {
    fn fmt(&self, f: &mut StdFmt::Formatter<'_>) -> StdFmt::Result {
        f.debug_struct("NodePool")
            .field("width", &self.width)
            .field("allocated", &self.all.len())
            .field("free", &self.free.len())
            .finish()
    }
}

// ============================================================================
//  Tests
// ============================================================================
