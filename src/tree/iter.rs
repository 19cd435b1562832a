//! In-order iteration over a [`GbsTree`].
//!
//! [`GbsIter`] keeps the node and slot of the last key it returned, the
//! ancestor stack that leads there, and the `vno`/`xno` they were read at.
//! As long as no writer has run since, the next key is the next slot or the
//! next node of the stack walk. After any write the iterator searches again
//! for the first key strictly greater than the last one returned, so a scan
//! never repeats or skips a key that stayed in the tree.
//!
//! The iterator is restartable: after the end it reports `None` until a
//! write happens, then picks up any keys added past the old end.

use std::fmt as StdFmt;
use std::sync::Arc;

use seize::LocalGuard;

use super::{GbsTree, OpKind, Stamp, TreeError};
use crate::comparator::{Comparator, NaturalOrder, SearchMode};
use crate::node::Node;
use crate::stack::{Location, TraversalStack};
use crate::tracing_helpers::trace_log;
use crate::tree::Interference;

/// The last key returned and where it was read.
struct Locator<'t, K> {
    node: &'t Node<K>,
    index: usize,
    key: Arc<K>,
    vno: u64,
    xno: u64,
}

enum Cursor<'t, K> {
    /// Nothing returned yet.
    Unpositioned,

    /// `at` was returned last. `removed` once `remove()` deleted it.
    Positioned { at: Locator<'t, K>, removed: bool },

    /// The end was reached at `vno`; `last` is the final key returned.
    Exhausted { vno: u64, last: Option<Arc<K>> },
}

/// Result of the cheap continuation.
enum Step<'t, K> {
    Moved(Locator<'t, K>),
    End,
    Stale,
}

/// Restartable in-order cursor over a [`GbsTree`].
///
/// Created by [`GbsTree::iter()`]. Keys are yielded in key-comparator order
/// as `Arc<K>`.
///
/// ```rust
/// use gbstree::{GbsConfig, GbsTree};
///
/// let tree: GbsTree<u32> = GbsTree::new(GbsConfig::default()).unwrap();
/// for key in [3, 1, 2] {
///     tree.insert(key).unwrap();
/// }
///
/// let mut iter = tree.iter();
/// while let Some(key) = iter.next_key().unwrap() {
///     if *key == 2 {
///         iter.remove().unwrap();
///     }
/// }
/// let rest: Vec<u32> = tree.iter().map(|k| *k.unwrap()).collect();
/// assert_eq!(rest, vec![1, 3]);
/// ```
pub struct GbsIter<'t, K, C = NaturalOrder, S = NaturalOrder> {
    tree: &'t GbsTree<K, C, S>,
    stack: TraversalStack<'t, K>,
    cursor: Cursor<'t, K>,
}

impl<K, C, S> GbsTree<K, C, S>
where
    C: Comparator<K>,
    S: Comparator<K>,
{
    /// Cursor positioned before the first key.
    #[must_use]
    pub fn iter(&self) -> GbsIter<'_, K, C, S> {
        GbsIter {
            tree: self,
            stack: TraversalStack::new(self.depth_limit),
            cursor: Cursor::Unpositioned,
        }
    }
}

/// Next slot after `at`, walking to the next node through `stack` when
/// `at` was the node's last key.
fn advance<'t, K>(
    stack: &mut TraversalStack<'t, K>,
    at: &Locator<'t, K>,
    removed: bool,
    guard: &LocalGuard<'_>,
) -> Result<Option<(&'t Node<K>, usize, Arc<K>)>, Interference> {
    let mut node: &'t Node<K> = at.node;
    let mut index: usize = if removed { at.index } else { at.index + 1 };
    if index >= node.checked_population()? {
        match stack.next_in_order()? {
            Some(next) => {
                node = next;
                index = 0;
            }
            None => return Ok(None),
        }
    }
    Ok(Some((node, index, node.key_arc(index, guard)?)))
}

impl<'t, K, C, S> GbsIter<'t, K, C, S>
where
    C: Comparator<K>,
    S: Comparator<K>,
{
    /// Advance and return the next key, or `None` at the end.
    ///
    /// Calling again after `None` re-checks the tree: keys inserted past the
    /// old end since then are returned.
    ///
    /// # Errors
    /// [`TreeError`] only if the tree is found corrupted.
    pub fn next_key(&mut self) -> Result<Option<Arc<K>>, TreeError> {
        let guard: LocalGuard<'t> = self.tree.guard();

        let next: Option<Locator<'t, K>> =
            match std::mem::replace(&mut self.cursor, Cursor::Unpositioned) {
                Cursor::Unpositioned => self.resync(None, &guard)?,

                Cursor::Positioned { at, removed } => match self.step(&at, removed, &guard)? {
                    Step::Moved(next) => Some(next),
                    Step::End => {
                        self.cursor = Cursor::Exhausted {
                            vno: at.vno,
                            last: Some(at.key),
                        };
                        None
                    }
                    Step::Stale => {
                        self.tree.counters.iterator_resync();
                        trace_log!(vno = at.vno, "iter: resync after write");
                        self.resync(Some(at.key), &guard)?
                    }
                },

                Cursor::Exhausted { vno, last } => {
                    if self.tree.version.stable() == Some(vno) {
                        self.cursor = Cursor::Exhausted { vno, last };
                        return Ok(None);
                    }
                    self.tree.counters.iterator_resync();
                    self.resync(last, &guard)?
                }
            };

        Ok(next.map(|at| {
            let key: Arc<K> = Arc::clone(&at.key);
            self.cursor = Cursor::Positioned { at, removed: false };
            key
        }))
    }

    /// Delete the key returned by the last [`next_key`](Self::next_key).
    ///
    /// Patches the node in place when nothing structural changed since that
    /// key was read and the node is a leaf that keeps at least one key;
    /// falls back to [`GbsTree::delete`] otherwise. Iteration continues with
    /// the following key either way.
    ///
    /// # Returns
    ///
    /// * `Ok(true)` - The key was removed
    /// * `Ok(false)` - A concurrent delete removed it first
    ///
    /// # Errors
    /// [`TreeError::NoCurrentKey`] before the first `next_key()`, after the
    /// end, or twice for the same key. Otherwise only on corruption.
    pub fn remove(&mut self) -> Result<bool, TreeError> {
        let Cursor::Positioned { at, removed } = &mut self.cursor else {
            return Err(TreeError::NoCurrentKey);
        };
        if *removed {
            return Err(TreeError::NoCurrentKey);
        }

        let guard: LocalGuard<'t> = self.tree.guard();
        let deleted: bool = match self
            .tree
            .remove_in_place(at.node, at.index, &at.key, at.xno, &guard)?
        {
            Some(vno) => {
                at.vno = vno;
                true
            }
            None => self.tree.delete_with_guard(&at.key, &guard)?,
        };
        *removed = true;
        Ok(deleted)
    }

    /// Forget the position; the next call starts from the first key again.
    pub fn reset(&mut self) {
        self.cursor = Cursor::Unpositioned;
        self.stack.clear();
    }

    /// Search for the first key, or the first key strictly greater than
    /// `from`, and leave the stack on it. Marks the cursor exhausted if there
    /// is none.
    fn resync(
        &mut self,
        from: Option<Arc<K>>,
        guard: &LocalGuard<'_>,
    ) -> Result<Option<Locator<'t, K>>, TreeError> {
        let tree: &'t GbsTree<K, C, S> = self.tree;
        let stack: &mut TraversalStack<'t, K> = &mut self.stack;

        let (found, stamp): (Option<(Location<'t, K>, Arc<K>)>, Stamp) =
            tree.read(OpKind::Find, || {
                let at: Option<Location<'t, K>> = match &from {
                    Some(key) => tree.seek(stack, SearchMode::Greater, key, guard)?,
                    None => tree.seek_first(stack)?,
                };
                at.map(|at| at.node.key_arc(at.index, guard).map(|key| (at, key)))
                    .transpose()
            })?;

        let Some((at, key)) = found else {
            self.cursor = Cursor::Exhausted {
                vno: stamp.vno,
                last: from,
            };
            return Ok(None);
        };
        Ok(Some(Locator {
            node: at.node,
            index: at.index,
            key,
            vno: stamp.vno,
            xno: stamp.xno,
        }))
    }

    /// Move one key forward without searching, if no write has happened
    /// since `at` was read.
    fn step(
        &mut self,
        at: &Locator<'t, K>,
        removed: bool,
        guard: &LocalGuard<'_>,
    ) -> Result<Step<'t, K>, TreeError> {
        if self.tree.version.stable() != Some(at.vno) {
            return Ok(Step::Stale);
        }
        let result = advance(&mut self.stack, at, removed, guard);
        if self.tree.version.has_changed(at.vno) {
            return Ok(Step::Stale);
        }

        match result {
            Ok(Some((node, index, key))) => Ok(Step::Moved(Locator {
                node,
                index,
                key,
                vno: at.vno,
                xno: at.xno,
            })),
            Ok(None) => Ok(Step::End),
            Err(cause) => Err(self.tree.corruption(cause, at.vno)),
        }
    }
}

impl<K, C, S> Iterator for GbsIter<'_, K, C, S>
where
    C: Comparator<K>,
    S: Comparator<K>,
{
    type Item = Result<Arc<K>, TreeError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_key().transpose()
    }
}

impl<K, C, S> StdFmt::Debug for GbsIter<'_, K, C, S> {
    fn fmt(&self, f: &mut StdFmt::Formatter<'_>) -> StdFmt::Result {
        let state: &str = match &self.cursor {
            Cursor::Unpositioned => "unpositioned",
            Cursor::Positioned { removed: false, .. } => "positioned",
            Cursor::Positioned { removed: true, .. } => "removed",
            Cursor::Exhausted { .. } => "exhausted",
        };
        f.debug_struct("GbsIter")
            .field("state", &state)
            .field("stack", &self.stack)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[expect(clippy::unwrap_used, reason = "Fail fast in tests")]
mod tests {
    use crate::tree::{GbsConfig, GbsTree, K_FACTORS, TreeError};

    fn filled(keys: impl IntoIterator<Item = u32>, k: usize, width: usize) -> GbsTree<u32> {
        let tree = GbsTree::new(GbsConfig::new(k, width)).unwrap();
        for key in keys {
            tree.insert(key).unwrap();
        }
        tree
    }

    #[test]
    fn test_iter_yields_sorted_keys_every_k_factor() {
        for k in K_FACTORS {
            let tree = filled((0..300).rev(), k, 3);
            let keys: Vec<u32> = tree.iter().map(|key| *key.unwrap()).collect();
            assert_eq!(keys, (0..300).collect::<Vec<_>>(), "k={k}");
        }
    }

    #[test]
    fn test_empty_tree_iterates_nothing() {
        let tree = filled([], 4, 10);
        let mut iter = tree.iter();
        assert!(iter.next_key().unwrap().is_none());
        assert!(iter.next_key().unwrap().is_none());
    }

    #[test]
    fn test_exhausted_iterator_resumes_after_insert() {
        let tree = filled(0..10, 4, 4);
        let mut iter = tree.iter();
        assert_eq!(iter.by_ref().count(), 10);
        assert!(iter.next_key().unwrap().is_none());

        tree.insert(100).unwrap();
        tree.insert(5_000).unwrap();
        assert_eq!(iter.next_key().unwrap().as_deref(), Some(&100));
        assert_eq!(iter.next_key().unwrap().as_deref(), Some(&5_000));
        assert!(iter.next_key().unwrap().is_none());
        assert!(tree.counters().iterator_resyncs >= 1);
    }

    #[test]
    fn test_exhausted_empty_iterator_sees_first_insert() {
        let tree = filled([], 4, 4);
        let mut iter = tree.iter();
        assert!(iter.next_key().unwrap().is_none());
        tree.insert(7).unwrap();
        assert_eq!(iter.next_key().unwrap().as_deref(), Some(&7));
    }

    #[test]
    fn test_writes_during_scan_neither_repeat_nor_skip() {
        let tree = filled((0..200).map(|k| k * 2), 6, 4);
        let mut iter = tree.iter();
        let mut seen: Vec<u32> = Vec::new();
        while let Some(key) = iter.next_key().unwrap() {
            seen.push(*key);
            if *key == 100 {
                tree.insert(101).unwrap();
                tree.delete(&50).unwrap();
                tree.delete(&102).unwrap();
            }
        }
        let mut expected: Vec<u32> = (0..200).map(|k| k * 2).filter(|&k| k != 102).collect();
        expected.push(101);
        expected.sort_unstable();
        assert_eq!(seen, expected);
    }

    #[test]
    fn test_remove_before_next_is_an_error() {
        let tree = filled(0..5, 4, 4);
        let mut iter = tree.iter();
        assert_eq!(iter.remove(), Err(TreeError::NoCurrentKey));

        iter.next_key().unwrap();
        assert!(iter.remove().unwrap());
        assert_eq!(iter.remove(), Err(TreeError::NoCurrentKey));
    }

    #[test]
    fn test_remove_fast_path_keeps_xno() {
        let tree = filled(0..3, 4, 10);
        let xno = tree.xno();
        let mut iter = tree.iter();
        assert_eq!(iter.next_key().unwrap().as_deref(), Some(&0));
        assert!(iter.remove().unwrap());

        assert_eq!(tree.xno(), xno);
        assert_eq!(tree.counters().iterator_fast_removes, 1);
        assert_eq!(iter.next_key().unwrap().as_deref(), Some(&1));
        assert_eq!(tree.counters().iterator_resyncs, 0);
    }

    #[test]
    fn test_remove_every_other_key_during_scan() {
        for k in K_FACTORS {
            let tree = filled(0..400, k, 5);
            let mut iter = tree.iter();
            let mut seen: Vec<u32> = Vec::new();
            while let Some(key) = iter.next_key().unwrap() {
                seen.push(*key);
                if *key % 2 == 0 {
                    assert!(iter.remove().unwrap());
                }
            }
            assert_eq!(seen, (0..400).collect::<Vec<_>>(), "k={k}");

            let rest: Vec<u32> = tree.iter().map(|key| *key.unwrap()).collect();
            assert_eq!(rest, (0..400).filter(|k| k % 2 == 1).collect::<Vec<_>>());
            assert_eq!(tree.len(), 200);
            tree.validate().unwrap();
        }
    }

    #[test]
    fn test_remove_everything_during_scan() {
        let tree = filled(0..150, 8, 3);
        let mut iter = tree.iter();
        while iter.next_key().unwrap().is_some() {
            assert!(iter.remove().unwrap());
        }
        assert!(tree.is_empty());
        assert_eq!(tree.node_count(), 0);
    }

    #[test]
    fn test_reset_restarts_from_first_key() {
        let tree = filled(0..20, 4, 4);
        let mut iter = tree.iter();
        for _ in 0..7 {
            iter.next_key().unwrap();
        }
        iter.reset();
        assert_eq!(iter.next_key().unwrap().as_deref(), Some(&0));
    }
}
