//! Delete-side traversal stack.

use std::ops::{Deref, DerefMut};

use super::{TraversalStack, Walk};
use crate::node::Node;
use crate::tree::Interference;

/// Traversal stack that can move a hole down its successor path.
pub(crate) struct DeleteStack<'t, K> {
    base: TraversalStack<'t, K>,
}

impl<'t, K> DeleteStack<'t, K> {
    pub(crate) fn new(limit: usize) -> Self {
        Self {
            base: TraversalStack::new(limit),
        }
    }

    /// Move the hole left in the stack top down its successor path.
    ///
    /// Each successor hands its left-most key to the node before it, so only
    /// the last node of the path (the returned one, now on top of the stack)
    /// loses a key.
    pub(crate) fn migrate_hole(&mut self) -> Result<&'t Node<K>, Interference> {
        let mut hole: &'t Node<K> = self.base.top().ok_or(Interference::NullReference)?;

        let end: &'t Node<K> = self.base.walk_successors(|successor: &'t Node<K>| {
            hole.fill_from_right_sibling(successor)?;
            hole = successor;
            Ok::<Walk, Interference>(Walk::Continue)
        })?;

        Ok(end)
    }
}

impl<'t, K> Deref for DeleteStack<'t, K> {
    type Target = TraversalStack<'t, K>;

    fn deref(&self) -> &Self::Target {
        &self.base
    }
}

impl<K> DerefMut for DeleteStack<'_, K> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.base
    }
}

#[cfg(test)]
#[expect(clippy::unwrap_used, reason = "Fail fast in tests")]
mod tests {
    use super::*;
    use crate::node::key_into_slot;
    use crate::stack::VisitState;
    use seize::Collector;
    use std::sync::Arc;

    fn node(values: &[u32]) -> Node<u32> {
        let node = Node::new(3);
        for &v in values {
            node.push_back(key_into_slot(Arc::new(v))).unwrap();
        }
        node
    }

    #[test]
    fn test_hole_moves_to_end_of_successor_path() {
        let collector = Collector::new();
        let guard = collector.enter();

        // d=[1,3] (hole left by deleting 2) -> s=[10,11,12] -> t=[20]
        let mut d = node(&[1, 3]);
        let mut s = node(&[10, 11, 12]);
        let mut t = node(&[20]);
        d.set_right(Some(&s));
        s.set_right(Some(&t));

        let mut stack = DeleteStack::new(8);
        stack.push(&d, VisitState::ProcessCurrent).unwrap();

        let end = stack.migrate_hole().unwrap();
        assert!(std::ptr::eq(end, &t));
        assert_eq!(stack.len(), 3);
        assert_eq!(d.population(), 3);
        assert_eq!(*d.key(2, &guard).unwrap(), 10);
        assert_eq!(*s.key(2, &guard).unwrap(), 20);
        assert_eq!(t.population(), 0);
        assert!(std::ptr::eq(stack.top().unwrap(), &t));

        d.drop_keys();
        s.drop_keys();
        t.drop_keys();
    }

    #[test]
    fn test_hole_without_successor_stays() {
        let mut d = node(&[1]);
        let mut stack = DeleteStack::new(4);
        stack.push(&d, VisitState::ProcessCurrent).unwrap();

        let end = stack.migrate_hole().unwrap();
        assert!(std::ptr::eq(end, &d));
        assert_eq!(stack.len(), 1);
        d.drop_keys();
    }
}
