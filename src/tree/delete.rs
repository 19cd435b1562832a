//! Delete: hole migration, node unlinking, and the in-place removal used by
//! the iterator.

use std::ptr::NonNull;
use std::sync::Arc;

use seize::LocalGuard;

use super::find::Descent;
use super::{GbsTree, OpKind, TreeError};
use crate::alloc::NodePool;
use crate::comparator::Comparator;
use crate::fringe::{self, delete::Shrink};
use crate::height;
use crate::node::{Node, retire_key};
use crate::stack::{DeleteStack, Location};
use crate::tracing_helpers::{debug_log, trace_log};
use crate::tree::Interference;
use crate::version::WriteGuard;

impl<K, C, S> GbsTree<K, C, S>
where
    C: Comparator<K>,
    S: Comparator<K>,
{
    /// Delete the key equal to `key` under the insert comparator.
    ///
    /// Creates a guard internally. For bulk deletes, prefer
    /// [`delete_with_guard`](Self::delete_with_guard).
    ///
    /// # Returns
    ///
    /// * `Ok(true)` - The key was found and removed
    /// * `Ok(false)` - No such key; nothing was written
    ///
    /// # Errors
    /// [`TreeError`] if the tree is found corrupted.
    #[inline]
    pub fn delete(&self, key: &K) -> Result<bool, TreeError> {
        let guard: LocalGuard<'_> = self.guard();
        self.delete_with_guard(key, &guard)
    }

    /// Delete a key using an explicit guard.
    ///
    /// The removed key is retired through the guard's collector: readers
    /// that loaded it before the delete keep a valid reference until their
    /// own guards drop.
    ///
    /// # Arguments
    ///
    /// * `key` - The key to delete
    /// * `guard` - A guard from [`GbsTree::guard()`]
    ///
    /// # Errors
    /// [`TreeError`] if the tree is found corrupted.
    #[cfg_attr(feature = "tracing", tracing::instrument(level = "debug", skip_all))]
    pub fn delete_with_guard(&self, key: &K, guard: &LocalGuard<'_>) -> Result<bool, TreeError> {
        let mut stack: DeleteStack<'_, K> = DeleteStack::new(self.depth_limit);
        let mut planned: Option<(u64, Location<'_, K>)> = None;

        if let Some(snapshot) = self.version.stable() {
            match self.descend(&mut stack, &self.insert_cmp, key, guard) {
                Ok(descent) if !self.version.has_changed(snapshot) => match descent {
                    Descent::Found(target) => planned = Some((snapshot, target)),
                    Descent::Vacant(_) => {
                        self.counters.optimistic(OpKind::Delete);
                        return Ok(false);
                    }
                },
                Ok(_) => self.counters.surprise(OpKind::Delete),
                Err(cause) => {
                    if !self.version.has_changed(snapshot) {
                        return Err(self.corruption(cause, snapshot));
                    }
                    self.counters.surprise(OpKind::Delete);
                    self.counters.interference(cause);
                    trace_log!(%cause, "delete: optimistic plan interfered");
                }
            }
        }

        let mut pool = self.writer.lock();
        let vno: u64 = self.version.vno();

        let target: Location<'_, K> = match planned {
            Some((snapshot, target)) if snapshot == vno => {
                self.counters.optimistic(OpKind::Delete);
                target
            }
            stale => {
                if stale.is_some() {
                    self.counters.surprise(OpKind::Delete);
                }
                self.counters.pessimistic(OpKind::Delete);
                match self
                    .descend(&mut stack, &self.insert_cmp, key, guard)
                    .map_err(|cause| self.corruption(cause, vno))?
                {
                    Descent::Found(target) => target,
                    Descent::Vacant(_) => return Ok(false),
                }
            }
        };

        let mut write: WriteGuard<'_> = self.version.begin_write(&pool);
        let removed: NonNull<K> = self
            .apply_delete(&mut pool, &mut write, &mut stack, target)
            .map_err(|e| e.stamped(write.opened_at(), self.depth_limit))?;
        drop(write);

        // SAFETY: `apply_delete` cleared the only slot holding `removed`.
        unsafe { retire_key(guard, removed) };
        self.release_count()?;
        Ok(true)
    }

    /// Remove the key at `target` and rebalance. Tree lock held, bracket
    /// open. Returns the removed key, still owned by the caller.
    fn apply_delete<'t>(
        &'t self,
        pool: &mut NodePool<K>,
        write: &mut WriteGuard<'_>,
        stack: &mut DeleteStack<'t, K>,
        target: Location<'t, K>,
    ) -> Result<NonNull<K>, TreeError> {
        stack.truncate(target.depth + 1);
        let removed: NonNull<K> = target.node.delete_at(target.index)?;
        let end: &'t Node<K> = stack.migrate_hole()?;
        trace_log!(depth = stack.len(), "delete: hole migrated");

        if end.population() > 0 {
            return Ok(removed);
        }

        // The end of a successor path has no right child.
        write.mark_structural();
        let end_index: usize = stack.top_index().ok_or(Interference::NullReference)?;
        let (parent, side) = stack.parent_link(end_index)?;
        let replacement: Option<&Node<K>> = end.left();
        parent.set_child(side, replacement);
        // Inside a group the grouped height stays 1; it only drops when a
        // skeleton node goes or a whole group disappears.
        let mut shrink: Option<Shrink> = (!end.is_fringe()
            || (replacement.is_none() && !parent.is_fringe()))
        .then_some(Shrink {
            index: end_index - 1,
            side,
        });
        stack.pop();
        pool.release(end);
        debug_log!(depth = end_index, "delete: node unlinked");

        if let Some(linearized) = fringe::delete::linearize(&self.profile, stack, write)? {
            shrink = Some(linearized);
        }
        if let Some(Shrink { index, side }) = shrink {
            height::delete::rebalance(&self.profile, stack, index, side)?;
        }
        Ok(removed)
    }

    /// Delete the key at `node[index]` in place if nothing could need
    /// rebalancing.
    ///
    /// Holds only when `xno` still equals `xno` (no node was added or
    /// removed since the caller located the key), the slot still holds
    /// `key`, and `node` is a leaf that is neither full nor down to its last
    /// key. The write bumps `vno` but not `xno`. Returns the new `vno`, or
    /// `None` when the general delete has to run instead.
    pub(crate) fn remove_in_place(
        &self,
        node: &Node<K>,
        index: usize,
        key: &Arc<K>,
        xno: u64,
        guard: &LocalGuard<'_>,
    ) -> Result<Option<u64>, TreeError> {
        let held = self.writer.lock();

        let same_key: bool = node
            .key_ptr(index)
            .is_ok_and(|ptr| std::ptr::eq(ptr.as_ptr(), Arc::as_ptr(key)));
        let fits: bool = self.version.xno() == xno
            && same_key
            && node.is_leaf()
            && !node.is_full()
            && node.population() > 1;
        if !fits {
            return Ok(None);
        }

        let write: WriteGuard<'_> = self.version.begin_write(&held);
        let removed: NonNull<K> = node
            .delete_at(index)
            .map_err(|cause| self.corruption(cause, write.opened_at()))?;
        drop(write);

        // SAFETY: the slot held the only tree reference to `removed`.
        unsafe { retire_key(guard, removed) };
        self.release_count()?;
        self.counters.iterator_fast_remove();
        Ok(Some(self.version.vno()))
    }
}

#[cfg(test)]
#[expect(clippy::unwrap_used, reason = "Fail fast in tests")]
mod tests {
    use crate::tree::{GbsConfig, GbsTree, K_FACTORS};

    fn keys(tree: &GbsTree<u32>) -> Vec<u32> {
        tree.iter().map(|key| *key.unwrap()).collect()
    }

    #[test]
    fn test_single_key_insert_then_delete() {
        let tree: GbsTree<u32> = GbsTree::new(GbsConfig::default()).unwrap();
        tree.insert(42).unwrap();
        assert!(tree.delete(&42).unwrap());

        assert_eq!(tree.len(), 0);
        assert!(tree.snapshot().unwrap().is_none());
        assert_eq!(tree.node_count(), 0);
        assert!(tree.iter().next().is_none());
    }

    #[test]
    fn test_delete_missing_key_writes_nothing() {
        let tree: GbsTree<u32> = GbsTree::new(GbsConfig::default()).unwrap();
        tree.insert(1).unwrap();
        let vno = tree.vno();
        assert!(!tree.delete(&2).unwrap());
        assert_eq!(tree.vno(), vno);
        assert_eq!(tree.len(), 1);
    }

    #[test]
    fn test_delete_everything_every_k_factor() {
        for k in K_FACTORS {
            let tree: GbsTree<u32> = GbsTree::new(GbsConfig::new(k, 3)).unwrap();
            for key in 0..500 {
                tree.insert(key).unwrap();
            }
            // Odd keys first, then the rest from the top down.
            for key in (0..500).filter(|k| k % 2 == 1) {
                assert!(tree.delete(&key).unwrap(), "k={k} key={key}");
            }
            tree.validate().unwrap();
            assert_eq!(keys(&tree), (0..500).filter(|k| k % 2 == 0).collect::<Vec<_>>());

            for key in (0..500).filter(|k| k % 2 == 0).rev() {
                assert!(tree.delete(&key).unwrap(), "k={k} key={key}");
                if key % 50 == 0 {
                    tree.validate().unwrap();
                }
            }
            assert!(tree.is_empty());
            assert_eq!(tree.node_count(), 0, "k={k}");
        }
    }

    #[test]
    fn test_insert_delete_round_trip_restores_order() {
        let tree: GbsTree<u32> = GbsTree::new(GbsConfig::new(6, 4)).unwrap();
        for key in (0..200).map(|k| k * 2) {
            tree.insert(key).unwrap();
        }
        let before = keys(&tree);
        for probe in [1, 77, 199, 399] {
            tree.insert(probe).unwrap();
            assert!(tree.delete(&probe).unwrap());
            assert_eq!(keys(&tree), before);
            assert_eq!(tree.len(), 200);
        }
    }

    #[test]
    fn test_deleted_key_stays_readable_through_an_old_arc() {
        let tree: GbsTree<String> = GbsTree::new(GbsConfig::default()).unwrap();
        tree.insert("alpha".to_string()).unwrap();
        let held = tree.search_equal(&"alpha".to_string()).unwrap().unwrap();
        assert!(tree.delete(&"alpha".to_string()).unwrap());
        assert_eq!(held.as_str(), "alpha");
    }
}
