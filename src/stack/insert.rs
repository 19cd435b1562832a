//! Insert-side traversal stack and insert location records.

use std::fmt as StdFmt;
use std::ops::{Deref, DerefMut};
use std::ptr::NonNull;

use super::{TraversalStack, Walk};
use crate::node::Node;
use crate::tree::Interference;

/// Which way a key displaced from an upper neighbor travels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ShiftSide {
    /// The key goes into the upper predecessor; its right-most key moves to
    /// the front of the insert node.
    Right,
    /// The key goes into the upper successor; its left-most key is appended
    /// to the insert node.
    Left,
}

/// A key that belongs in an ancestor rather than in the insert node.
pub(crate) struct Position<'t, K> {
    pub(crate) node: &'t Node<K>,
    pub(crate) index: usize,
    pub(crate) shift: ShiftSide,
}

impl<K> Clone for Position<'_, K> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<K> Copy for Position<'_, K> {}

/// Where an absent key goes.
///
/// `node` is the stack top when the descent stopped; `None` means the tree is
/// empty. With a `position`, the key itself lands in the position node and
/// only a displaced key (if the position node was full) lands in `node` at
/// `index`.
pub(crate) struct InsertPoint<'t, K> {
    pub(crate) node: Option<&'t Node<K>>,
    pub(crate) index: usize,
    pub(crate) position: Option<Position<'t, K>>,
}

impl<K> Clone for InsertPoint<'_, K> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<K> Copy for InsertPoint<'_, K> {}

impl<'t, K> InsertPoint<'t, K> {
    pub(crate) const fn empty_tree() -> Self {
        Self {
            node: None,
            index: 0,
            position: None,
        }
    }

    pub(crate) const fn at(node: &'t Node<K>, index: usize) -> Self {
        Self {
            node: Some(node),
            index,
            position: None,
        }
    }

    pub(crate) const fn shifted(
        node: &'t Node<K>,
        index: usize,
        position: Position<'t, K>,
    ) -> Self {
        Self {
            node: Some(node),
            index,
            position: Some(position),
        }
    }
}

impl<K> StdFmt::Debug for InsertPoint<'_, K> {
    fn fmt(&self, f: &mut StdFmt::Formatter<'_>) -> StdFmt::Result {
        f.debug_struct("InsertPoint")
            .field("node", &self.node.map(Node::as_ptr))
            .field("index", &self.index)
            .field("shift", &self.position.map(|p| (p.node.as_ptr(), p.index, p.shift)))
            .finish()
    }
}

/// Outcome of pushing a key down the successor path.
pub(crate) struct Migration<'t, K> {
    /// Last node the key reached.
    pub(crate) end: &'t Node<K>,
    /// Key still looking for a slot: `end` was full and has no right child.
    pub(crate) overflow: Option<NonNull<K>>,
}

// ============================================================================
//  InsertStack
// ============================================================================

/// Traversal stack that can carry a key down its successor path.
pub(crate) struct InsertStack<'t, K> {
    base: TraversalStack<'t, K>,
}

impl<'t, K> InsertStack<'t, K> {
    pub(crate) fn new(limit: usize) -> Self {
        Self {
            base: TraversalStack::new(limit),
        }
    }

    /// Carry `key` down the successor path of the stack top.
    ///
    /// Each successor takes the key at its front; if it was full, its
    /// right-most key is carried on. Stops once a node absorbs the carried key
    /// or the path runs out.
    pub(crate) fn migrate(&mut self, key: NonNull<K>) -> Result<Migration<'t, K>, Interference> {
        let mut carried: Option<NonNull<K>> = Some(key);

        let end: &'t Node<K> = self.base.walk_successors::<Interference, _>(|node: &'t Node<K>| {
            let Some(key) = carried.take() else {
                return Ok(Walk::Done);
            };
            carried = node.insert_at(0, key)?;
            Ok(if carried.is_some() { Walk::Continue } else { Walk::Done })
        })?;

        Ok(Migration {
            end,
            overflow: carried,
        })
    }
}

impl<'t, K> Deref for InsertStack<'t, K> {
    type Target = TraversalStack<'t, K>;

    fn deref(&self) -> &Self::Target {
        &self.base
    }
}

impl<K> DerefMut for InsertStack<'_, K> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.base
    }
}

#[cfg(test)]
#[expect(clippy::unwrap_used, reason = "Fail fast in tests")]
mod tests {
    use super::*;
    use crate::node::{key_from_slot, key_into_slot};
    use crate::stack::VisitState;
    use seize::Collector;
    use std::sync::Arc;

    fn full(values: &[u32]) -> Node<u32> {
        let node = Node::new(values.len());
        for &v in values {
            node.push_back(key_into_slot(Arc::new(v))).unwrap();
        }
        node
    }

    #[test]
    fn test_migrate_carries_through_full_successors() {
        let collector = Collector::new();
        let guard = collector.enter();

        // p=[1,2,3] -> right s=[10,11,12] -> right t=[20,21,22]
        let mut p = full(&[1, 2, 3]);
        let mut s = full(&[10, 11, 12]);
        let mut t = full(&[20, 21, 22]);
        p.set_right(Some(&s));
        s.set_right(Some(&t));

        let mut stack = InsertStack::new(8);
        stack.push(&p, VisitState::ProcessCurrent).unwrap();

        let carried = key_into_slot(Arc::new(5));
        let migration = stack.migrate(carried).unwrap();

        assert!(std::ptr::eq(migration.end, &t));
        assert_eq!(stack.len(), 3);
        assert_eq!(*s.key(0, &guard).unwrap(), 5);
        assert_eq!(*t.key(0, &guard).unwrap(), 12);
        // SAFETY: overflow was unlinked from every node.
        let overflow = unsafe { key_from_slot(migration.overflow.unwrap()) };
        assert_eq!(*overflow, 22);

        p.drop_keys();
        s.drop_keys();
        t.drop_keys();
    }

    #[test]
    fn test_migrate_stops_at_node_with_room() {
        let collector = Collector::new();
        let guard = collector.enter();

        let mut p = full(&[1, 2, 3]);
        let mut s = Node::new(3);
        s.push_back(key_into_slot(Arc::new(10))).unwrap();
        p.set_right(Some(&s));

        let mut stack = InsertStack::new(8);
        stack.push(&p, VisitState::ProcessCurrent).unwrap();

        let migration = stack.migrate(key_into_slot(Arc::new(4))).unwrap();
        assert!(migration.overflow.is_none());
        assert!(std::ptr::eq(migration.end, &s));
        assert_eq!(s.population(), 2);
        assert_eq!(*s.key(0, &guard).unwrap(), 4);

        p.drop_keys();
        s.drop_keys();
    }
}
