//! Explicit traversal stacks.
//!
//! Rebalancing has to climb back up the path a search took, and the iterator
//! has to resume an in-order walk, so neither can rely on recursion. A
//! [`TraversalStack`] records `(node, visit state)` pairs from the dummy top
//! node (or the root, for the iterator) down to the current node, together
//! with a little scratch state:
//!
//! - the deepest stack index whose node had a non-zero balance factor (the
//!   "balance point"), where insert height rebalancing starts,
//! - the maximum depth reached, which gates delete fringe balancing.
//!
//! The depth is bounded. Pushing past the bound reports
//! [`Interference::DepthExceeded`]: an optimistic reader that wandered into a
//! cycle of a half-rewired tree stops instead of looping forever.
//!
//! [`InsertStack`] and [`DeleteStack`] add the scratch state of key migration
//! and hole migration. Both drive [`TraversalStack::walk_successors`], the
//! shared "walk a sub-fringe with a callback" primitive.

use std::fmt as StdFmt;

use crate::node::{Node, Side};
use crate::tree::Interference;

mod delete;
mod insert;

pub(crate) use delete::DeleteStack;
pub(crate) use insert::{InsertPoint, InsertStack, Migration, Position, ShiftSide};

/// Depth bound derived from the AVL height limit for 2^31 node groups.
pub(crate) const MAX_BALANCED_DEPTH: usize = 47;

// ============================================================================
//  VisitState / StackEntry
// ============================================================================

/// Where an in-order walk stands with respect to a stacked node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum VisitState {
    /// The left sub-tree has not been entered yet.
    VisitLeft,
    /// The left sub-tree is being (or has been) walked; the node itself is next.
    ProcessCurrent,
    /// Nothing left to do for this node.
    DoneVisits,
}

/// One stacked node.
pub(crate) struct StackEntry<'t, K> {
    pub(crate) node: &'t Node<K>,
    pub(crate) state: VisitState,
}

impl<K> Clone for StackEntry<'_, K> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<K> Copy for StackEntry<'_, K> {}

/// What a sub-fringe walk callback wants next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Walk {
    Continue,
    Done,
}

/// A found `(node, index)` pair plus the stack index of `node`.
pub(crate) struct Location<'t, K> {
    pub(crate) node: &'t Node<K>,
    pub(crate) index: usize,
    pub(crate) depth: usize,
}

impl<K> Clone for Location<'_, K> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<K> Copy for Location<'_, K> {}

impl<K> StdFmt::Debug for Location<'_, K> {
    fn fmt(&self, f: &mut StdFmt::Formatter<'_>) -> StdFmt::Result {
        f.debug_struct("Location")
            .field("node", &self.node.as_ptr())
            .field("index", &self.index)
            .field("depth", &self.depth)
            .finish()
    }
}

// ============================================================================
//  TraversalStack
// ============================================================================

/// Array-backed path record. Per operation, never shared.
pub(crate) struct TraversalStack<'t, K> {
    entries: Vec<StackEntry<'t, K>>,
    limit: usize,
    balance_point: usize,
    max_depth: usize,
}

impl<'t, K> TraversalStack<'t, K> {
    /// Create a stack holding at most `limit` entries.
    pub(crate) fn new(limit: usize) -> Self {
        Self {
            entries: Vec::with_capacity(limit),
            limit,
            balance_point: 0,
            max_depth: 0,
        }
    }

    /// Forget everything, keeping the allocation.
    pub(crate) fn clear(&mut self) {
        self.entries.clear();
        self.balance_point = 0;
        self.max_depth = 0;
    }

    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub(crate) const fn max_depth(&self) -> usize {
        self.max_depth
    }

    /// Stack index of the deepest stacked node with a non-zero balance, 0 if
    /// none leans.
    #[inline]
    pub(crate) const fn balance_point(&self) -> usize {
        self.balance_point
    }

    pub(crate) fn push(&mut self, node: &'t Node<K>, state: VisitState) -> Result<(), Interference> {
        if self.entries.len() >= self.limit {
            return Err(Interference::DepthExceeded);
        }
        self.entries.push(StackEntry { node, state });
        self.max_depth = self.max_depth.max(self.entries.len());
        Ok(())
    }

    /// Push and remember `node` as the balance point if it leans either way.
    pub(crate) fn balanced_push(
        &mut self,
        node: &'t Node<K>,
        state: VisitState,
    ) -> Result<(), Interference> {
        self.push(node, state)?;
        if node.balance() != 0 {
            self.balance_point = self.entries.len() - 1;
        }
        Ok(())
    }

    #[inline]
    pub(crate) fn pop(&mut self) -> Option<StackEntry<'t, K>> {
        let popped: Option<StackEntry<'t, K>> = self.entries.pop();
        self.settle_balance_point();
        popped
    }

    /// Re-find the balance point once the entry holding it was dropped.
    fn settle_balance_point(&mut self) {
        if self.balance_point < self.entries.len() {
            return;
        }
        self.balance_point = self
            .entries
            .iter()
            .rposition(|entry| entry.node.balance() != 0)
            .unwrap_or(0);
    }

    #[inline]
    pub(crate) fn top(&self) -> Option<&'t Node<K>> {
        self.entries.last().map(|entry| entry.node)
    }

    #[inline]
    pub(crate) fn top_index(&self) -> Option<usize> {
        self.entries.len().checked_sub(1)
    }

    #[inline]
    pub(crate) fn node(&self, index: usize) -> Option<&'t Node<K>> {
        self.entries.get(index).map(|entry| entry.node)
    }

    #[inline]
    pub(crate) fn set_top_state(&mut self, state: VisitState) {
        if let Some(entry) = self.entries.last_mut() {
            entry.state = state;
        }
    }

    /// Drop entries above `len`.
    pub(crate) fn truncate(&mut self, len: usize) {
        self.entries.truncate(len);
        self.settle_balance_point();
    }

    /// Parent of the entry at `index` and the side it hangs from.
    pub(crate) fn parent_link(&self, index: usize) -> Result<(&'t Node<K>, Side), Interference> {
        let child: &'t Node<K> = self.node(index).ok_or(Interference::Unlinked)?;
        let parent: &'t Node<K> = index
            .checked_sub(1)
            .and_then(|p| self.node(p))
            .ok_or(Interference::Unlinked)?;
        let side: Side = parent.side_of(child).ok_or(Interference::Unlinked)?;
        Ok((parent, side))
    }

    /// Stack index of the top of the fringe containing the top entry.
    ///
    /// `None` when the top entry is not a fringe node.
    pub(crate) fn fringe_top(&self) -> Option<usize> {
        let mut index: usize = self.top_index()?;
        if !self.node(index)?.is_fringe() {
            return None;
        }
        while index > 0 && self.node(index - 1).is_some_and(Node::is_fringe) {
            index -= 1;
        }
        Some(index)
    }

    /// Walk the successor path below the top entry.
    ///
    /// From the current node, step to the left-most node of its right
    /// sub-tree (its in-order successor), push the path, and hand that node to
    /// `visit`. Stops when `visit` returns [`Walk::Done`] or the current node
    /// has no right child. Returns the last node reached. Pushed nodes keep
    /// the balance point current.
    pub(crate) fn walk_successors<E, F>(&mut self, mut visit: F) -> Result<&'t Node<K>, E>
    where
        E: From<Interference>,
        F: FnMut(&'t Node<K>) -> Result<Walk, E>,
    {
        let mut current: &'t Node<K> = self.top().ok_or(Interference::NullReference)?;

        loop {
            let Some(mut next) = current.right() else {
                return Ok(current);
            };

            self.set_top_state(VisitState::DoneVisits);
            self.balanced_push(next, VisitState::ProcessCurrent)?;
            while let Some(left) = next.left() {
                self.balanced_push(left, VisitState::ProcessCurrent)?;
                next = left;
            }

            match visit(next)? {
                Walk::Done => return Ok(next),
                Walk::Continue => current = next,
            }
        }
    }

    /// Advance to the in-order successor of the top entry.
    ///
    /// Descends into the right sub-tree if there is one; otherwise pops back
    /// to the nearest ancestor still marked [`VisitState::ProcessCurrent`].
    /// Returns the new top, or `None` once the walk has left the tree.
    pub(crate) fn next_in_order(&mut self) -> Result<Option<&'t Node<K>>, Interference> {
        let Some(top) = self.top() else {
            return Ok(None);
        };

        if let Some(mut next) = top.right() {
            self.set_top_state(VisitState::DoneVisits);
            self.push(next, VisitState::ProcessCurrent)?;
            while let Some(left) = next.left() {
                self.push(left, VisitState::ProcessCurrent)?;
                next = left;
            }
            return Ok(Some(next));
        }

        self.pop();
        while let Some(entry) = self.entries.last() {
            if entry.state == VisitState::ProcessCurrent {
                return Ok(Some(entry.node));
            }
            self.pop();
        }
        Ok(None)
    }
}

impl<K> StdFmt::Debug for TraversalStack<'_, K> {
    fn fmt(&self, f: &mut StdFmt::Formatter<'_>) -> StdFmt::Result {
        f.debug_struct("TraversalStack")
            .field("len", &self.entries.len())
            .field("limit", &self.limit)
            .field("balance_point", &self.balance_point)
            .field("max_depth", &self.max_depth)
            .finish_non_exhaustive()
    }
}
