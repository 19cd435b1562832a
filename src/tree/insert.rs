//! Insert: the locked write phase and the optimistic planning around it.

use std::ptr::NonNull;
use std::sync::Arc;

use seize::LocalGuard;

use super::find::Descent;
use super::{GbsTree, OpKind, TreeError};
use crate::alloc::NodePool;
use crate::comparator::Comparator;
use crate::fringe;
use crate::height;
use crate::node::{Node, Side, key_from_slot, key_into_slot};
use crate::ordering::RELAXED;
use crate::stack::{InsertPoint, InsertStack, Migration, Position, ShiftSide};
use crate::tracing_helpers::{debug_log, trace_log};
use crate::tree::Interference;
use crate::version::WriteGuard;

impl<K, C, S> GbsTree<K, C, S>
where
    C: Comparator<K>,
    S: Comparator<K>,
{
    /// Insert a key.
    ///
    /// Creates a guard internally. For bulk loads, prefer
    /// [`insert_with_guard`](Self::insert_with_guard) to amortize guard
    /// creation cost.
    ///
    /// # Returns
    ///
    /// * `Ok(true)` - The key was added
    /// * `Ok(false)` - An equal key (per the insert comparator) is already
    ///   stored; nothing was written
    ///
    /// # Errors
    /// [`TreeError`] if the tree is found corrupted.
    #[inline]
    pub fn insert(&self, key: K) -> Result<bool, TreeError> {
        let guard: LocalGuard<'_> = self.guard();
        self.insert_with_guard(key, &guard)
    }

    /// Insert a key using an explicit guard.
    ///
    /// The insert position is planned without the tree lock. If `vno` has
    /// not moved by the time the lock is held, the plan is applied as is;
    /// otherwise the descent is redone under the lock.
    ///
    /// # Arguments
    ///
    /// * `key` - The key to insert
    /// * `guard` - A guard from [`GbsTree::guard()`]
    ///
    /// # Errors
    /// [`TreeError`] if the tree is found corrupted.
    #[cfg_attr(feature = "tracing", tracing::instrument(level = "debug", skip_all))]
    pub fn insert_with_guard(&self, key: K, guard: &LocalGuard<'_>) -> Result<bool, TreeError> {
        let key: Arc<K> = Arc::new(key);
        let mut stack: InsertStack<'_, K> = InsertStack::new(self.depth_limit);
        let mut planned: Option<(u64, InsertPoint<'_, K>)> = None;

        if let Some(snapshot) = self.version.stable() {
            match self.descend(&mut stack, &self.insert_cmp, &key, guard) {
                Ok(descent) if !self.version.has_changed(snapshot) => match descent {
                    Descent::Found(_) => {
                        self.counters.optimistic(OpKind::Insert);
                        return Ok(false);
                    }
                    Descent::Vacant(point) => planned = Some((snapshot, point)),
                },
                Ok(_) => self.counters.surprise(OpKind::Insert),
                Err(cause) => {
                    if !self.version.has_changed(snapshot) {
                        return Err(self.corruption(cause, snapshot));
                    }
                    self.counters.surprise(OpKind::Insert);
                    self.counters.interference(cause);
                    trace_log!(%cause, "insert: optimistic plan interfered");
                }
            }
        }

        let mut pool = self.writer.lock();
        let vno: u64 = self.version.vno();

        let point: InsertPoint<'_, K> = match planned {
            Some((snapshot, point)) if snapshot == vno => {
                self.counters.optimistic(OpKind::Insert);
                point
            }
            stale => {
                if stale.is_some() {
                    self.counters.surprise(OpKind::Insert);
                }
                self.counters.pessimistic(OpKind::Insert);
                match self
                    .descend(&mut stack, &self.insert_cmp, &key, guard)
                    .map_err(|cause| self.corruption(cause, vno))?
                {
                    Descent::Found(_) => return Ok(false),
                    Descent::Vacant(point) => point,
                }
            }
        };

        let mut write: WriteGuard<'_> = self.version.begin_write(&pool);
        self.apply_insert(&mut pool, &mut write, &mut stack, point, key)
            .map_err(|e| e.stamped(write.opened_at(), self.depth_limit))?;
        drop(write);

        self.population.fetch_add(1, RELAXED);
        Ok(true)
    }

    /// Write `key` at `point` and rebalance. Tree lock held, bracket open.
    fn apply_insert<'t>(
        &'t self,
        pool: &mut NodePool<K>,
        write: &mut WriteGuard<'_>,
        stack: &mut InsertStack<'t, K>,
        point: InsertPoint<'t, K>,
        key: Arc<K>,
    ) -> Result<(), TreeError> {
        let key: NonNull<K> = key_into_slot(key);

        let Some(node) = point.node else {
            write.mark_structural();
            let leaf: &Node<K> = self.adopt(pool.acquire(key, true));
            self.dummy.set_right(Some(leaf));
            debug_log!("insert: first node");
            return Ok(());
        };

        let placed: Result<Option<NonNull<K>>, Interference> = match point.position {
            None => node.insert_at(point.index, key),
            Some(Position {
                node: upper,
                index,
                shift: ShiftSide::Right,
            }) => upper.insert_at(index, key),
            Some(Position {
                node: upper,
                index,
                shift: ShiftSide::Left,
            }) => upper.insert_by_left_shift(index, key),
        };
        let moved: Option<NonNull<K>> = match placed {
            Ok(moved) => moved,
            Err(cause) => {
                // SAFETY: the rejected write left every slot as it was, so
                // `key` was never published.
                drop(unsafe { key_from_slot(key) });
                return Err(cause.into());
            }
        };

        let displaced: Option<NonNull<K>> = match (point.position, moved) {
            (None, displaced) | (Some(_), displaced @ None) => displaced,
            (
                Some(Position {
                    shift: ShiftSide::Right,
                    ..
                }),
                Some(moved),
            ) => node.insert_at(0, moved)?,
            (
                Some(Position {
                    shift: ShiftSide::Left,
                    ..
                }),
                Some(moved),
            ) => node.insert_at(point.index, moved)?,
        };

        let Some(overflow) = displaced else {
            fringe::insert::rebalance(&self.profile, stack, write)?;
            return Ok(());
        };

        let migration: Migration<'t, K> = stack.migrate(overflow)?;
        trace_log!(depth = stack.len(), "insert: key migrated");

        let Some(leftover) = migration.overflow else {
            fringe::insert::rebalance(&self.profile, stack, write)?;
            return Ok(());
        };

        write.mark_structural();
        let end: &'t Node<K> = migration.end;
        let leaf: &'t Node<K> = self.adopt(pool.acquire(leftover, true));
        end.set_right(Some(leaf));

        if end.is_fringe() {
            fringe::insert::grow(&self.profile, stack, write)?;
        } else {
            let index: usize = stack.top_index().ok_or(Interference::NullReference)?;
            height::insert::rebalance(&self.profile, stack, index, Side::Right)?;
        }
        Ok(())
    }
}
