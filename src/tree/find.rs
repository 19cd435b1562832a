//! Descents: locating a key for insert, delete and equality search, and
//! seeking the first key above a bound.

use std::cmp::Ordering;
use std::sync::Arc;

use seize::LocalGuard;

use super::{GbsTree, OpKind, TreeError};
use crate::comparator::{Comparator, SearchMode};
use crate::node::{Node, Probe};
use crate::stack::{InsertPoint, Location, Position, ShiftSide, TraversalStack, VisitState};
use crate::tree::Interference;

/// Where a descent for one key ended.
pub(crate) enum Descent<'t, K> {
    /// The key is stored here.
    Found(Location<'t, K>),
    /// The key is absent; it would go here.
    Vacant(InsertPoint<'t, K>),
}

/// A node whose missing child stopped the descent.
struct DeadEnd<'t, K> {
    node: &'t Node<K>,
    depth: usize,
    middle: usize,
    population: usize,
}

impl<K> Clone for DeadEnd<'_, K> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<K> Copy for DeadEnd<'_, K> {}

#[inline]
fn probed<'t, K>(node: &'t Node<K>, depth: usize, probe: Probe) -> Descent<'t, K> {
    match probe {
        Probe::Found(index) => Descent::Found(Location { node, index, depth }),
        Probe::Vacant(index) => Descent::Vacant(InsertPoint::at(node, index)),
    }
}

/// The key is below `at`'s middle key and `at` has no left child.
///
/// `at`'s in-order predecessor is the upper predecessor, whose right half may
/// still hold the key's place.
fn left_dead_end<'t, K, Q>(
    stack: &TraversalStack<'t, K>,
    at: DeadEnd<'t, K>,
    upper_pred: Option<usize>,
    cmp: &Q,
    key: &K,
    guard: &LocalGuard<'_>,
) -> Result<Descent<'t, K>, Interference>
where
    Q: Comparator<K> + ?Sized,
{
    let own_half = || -> Result<Descent<'t, K>, Interference> {
        let probe: Probe = at.node.probe(0, at.middle, cmp, key, guard)?;
        Ok(probed(at.node, at.depth, probe))
    };

    let Some(depth) = upper_pred else {
        return own_half();
    };
    let pred: &'t Node<K> = stack.node(depth).ok_or(Interference::NullReference)?;
    let population: usize = pred.checked_population()?;
    let last: usize = population - 1;

    match cmp.compare(key, pred.key(last, guard)?) {
        Ordering::Equal => Ok(Descent::Found(Location {
            node: pred,
            index: last,
            depth,
        })),
        Ordering::Greater => own_half(),
        Ordering::Less => {
            let middle: usize = pred.checked_middle(population)?;
            Ok(match pred.probe(middle + 1, last, cmp, key, guard)? {
                Probe::Found(index) => Descent::Found(Location {
                    node: pred,
                    index,
                    depth,
                }),
                Probe::Vacant(index) => Descent::Vacant(InsertPoint::shifted(
                    at.node,
                    0,
                    Position {
                        node: pred,
                        index,
                        shift: ShiftSide::Right,
                    },
                )),
            })
        }
    }
}

/// The key is above `at`'s middle key and `at` has no right child.
///
/// Mirror image of [`left_dead_end`] through the upper successor.
fn right_dead_end<'t, K, Q>(
    stack: &TraversalStack<'t, K>,
    at: DeadEnd<'t, K>,
    upper_succ: Option<usize>,
    cmp: &Q,
    key: &K,
    guard: &LocalGuard<'_>,
) -> Result<Descent<'t, K>, Interference>
where
    Q: Comparator<K> + ?Sized,
{
    let own_half = || -> Result<Descent<'t, K>, Interference> {
        let probe: Probe = at.node.probe(at.middle + 1, at.population, cmp, key, guard)?;
        Ok(probed(at.node, at.depth, probe))
    };

    let Some(depth) = upper_succ else {
        return own_half();
    };
    let succ: &'t Node<K> = stack.node(depth).ok_or(Interference::NullReference)?;

    match cmp.compare(key, succ.key(0, guard)?) {
        Ordering::Equal => Ok(Descent::Found(Location {
            node: succ,
            index: 0,
            depth,
        })),
        Ordering::Less => own_half(),
        Ordering::Greater => {
            let population: usize = succ.checked_population()?;
            let middle: usize = succ.checked_middle(population)?;
            Ok(match succ.probe(1, middle, cmp, key, guard)? {
                Probe::Found(index) => Descent::Found(Location {
                    node: succ,
                    index,
                    depth,
                }),
                Probe::Vacant(index) => Descent::Vacant(InsertPoint::shifted(
                    at.node,
                    at.population,
                    Position {
                        node: succ,
                        index,
                        shift: ShiftSide::Left,
                    },
                )),
            })
        }
    }
}

impl<K, C, S> GbsTree<K, C, S>
where
    C: Comparator<K>,
    S: Comparator<K>,
{
    /// Descend from the dummy node looking for `key` under `cmp`.
    ///
    /// Each node is compared through its middle key only; the dead-end
    /// helpers settle which half of which node holds the key. On return the
    /// stack holds the path from the dummy (index 0) to the node the descent
    /// stopped at, which may lie below the node of a [`Descent::Found`].
    pub(crate) fn descend<'t, Q>(
        &'t self,
        stack: &mut TraversalStack<'t, K>,
        cmp: &Q,
        key: &K,
        guard: &LocalGuard<'_>,
    ) -> Result<Descent<'t, K>, Interference>
    where
        Q: Comparator<K> + ?Sized,
    {
        stack.clear();
        let dummy: &'t Node<K> = &self.dummy;
        stack.push(dummy, VisitState::DoneVisits)?;

        let Some(mut node) = dummy.right() else {
            return Ok(Descent::Vacant(InsertPoint::empty_tree()));
        };
        let mut upper_pred: Option<usize> = None;
        let mut upper_succ: Option<usize> = None;

        loop {
            let depth: usize = stack.len();
            stack.balanced_push(node, VisitState::VisitLeft)?;
            let population: usize = node.checked_population()?;
            let middle: usize = node.checked_middle(population)?;
            let at = DeadEnd {
                node,
                depth,
                middle,
                population,
            };

            match cmp.compare(key, node.key(middle, guard)?) {
                Ordering::Equal => {
                    return Ok(Descent::Found(Location {
                        node,
                        index: middle,
                        depth,
                    }));
                }

                Ordering::Less => {
                    stack.set_top_state(VisitState::ProcessCurrent);
                    match node.left() {
                        Some(left) => {
                            upper_succ = Some(depth);
                            node = left;
                        }
                        None => return left_dead_end(stack, at, upper_pred, cmp, key, guard),
                    }
                }

                Ordering::Greater => {
                    stack.set_top_state(VisitState::DoneVisits);
                    match node.right() {
                        Some(right) => {
                            upper_pred = Some(depth);
                            node = right;
                        }
                        None => return right_dead_end(stack, at, upper_succ, cmp, key, guard),
                    }
                }
            }
        }
    }

    /// Position `stack` (rooted at the tree root, no dummy) on the smallest
    /// key accepted by `mode` relative to `key`.
    ///
    /// Ancestors still to be visited in order are left as
    /// [`VisitState::ProcessCurrent`], passed ones as
    /// [`VisitState::DoneVisits`]. `mode` must be one of the ordering modes;
    /// [`SearchMode::Equal`] is treated as [`SearchMode::GreaterOrEqual`].
    pub(crate) fn seek<'t>(
        &'t self,
        stack: &mut TraversalStack<'t, K>,
        mode: SearchMode,
        key: &K,
        guard: &LocalGuard<'_>,
    ) -> Result<Option<Location<'t, K>>, Interference> {
        stack.clear();
        let strict: bool = mode == SearchMode::Greater;
        let mode: SearchMode = if strict {
            SearchMode::Greater
        } else {
            SearchMode::GreaterOrEqual
        };

        let mut candidate: Option<Location<'t, K>> = None;
        let mut cursor: Option<&'t Node<K>> = self.root();

        while let Some(node) = cursor {
            let depth: usize = stack.len();
            let population: usize = node.checked_population()?;

            if mode.accepts(self.key_cmp.compare(node.key(0, guard)?, key)) {
                stack.push(node, VisitState::ProcessCurrent)?;
                candidate = Some(Location {
                    node,
                    index: 0,
                    depth,
                });
                cursor = node.left();
            } else if mode.accepts(self.key_cmp.compare(node.key(population - 1, guard)?, key)) {
                let index: usize = match node.probe(1, population - 1, &self.key_cmp, key, guard)? {
                    Probe::Found(index) if strict => index + 1,
                    Probe::Found(index) | Probe::Vacant(index) => index,
                };
                stack.push(node, VisitState::ProcessCurrent)?;
                candidate = Some(Location { node, index, depth });
                break;
            } else {
                stack.push(node, VisitState::DoneVisits)?;
                cursor = node.right();
            }
        }

        if let Some(found) = candidate {
            stack.truncate(found.depth + 1);
        }
        Ok(candidate)
    }

    /// Position `stack` on the first key of the tree.
    pub(crate) fn seek_first<'t>(
        &'t self,
        stack: &mut TraversalStack<'t, K>,
    ) -> Result<Option<Location<'t, K>>, Interference> {
        stack.clear();
        let mut cursor: Option<&'t Node<K>> = self.root();
        let mut found: Option<Location<'t, K>> = None;

        while let Some(node) = cursor {
            let depth: usize = stack.len();
            stack.push(node, VisitState::ProcessCurrent)?;
            found = Some(Location {
                node,
                index: 0,
                depth,
            });
            cursor = node.left();
        }
        Ok(found)
    }

    // ========================================================================
    //  Public search API
    // ========================================================================

    /// Find the stored key equal to `key` under the key comparator.
    ///
    /// Creates a guard internally. For bulk lookups, prefer
    /// [`search_equal_with_guard`](Self::search_equal_with_guard).
    ///
    /// # Errors
    /// [`TreeError`] only if the tree is found corrupted.
    #[inline]
    pub fn search_equal(&self, key: &K) -> Result<Option<Arc<K>>, TreeError> {
        let guard: LocalGuard<'_> = self.guard();
        self.search_equal_with_guard(key, &guard)
    }

    /// Find the stored key equal to `key` using an explicit guard.
    ///
    /// # Arguments
    ///
    /// * `key` - The probe key
    /// * `guard` - A guard from [`GbsTree::guard()`]
    ///
    /// # Errors
    /// [`TreeError`] only if the tree is found corrupted.
    #[cfg_attr(feature = "tracing", tracing::instrument(level = "debug", skip_all))]
    pub fn search_equal_with_guard(
        &self,
        key: &K,
        guard: &LocalGuard<'_>,
    ) -> Result<Option<Arc<K>>, TreeError> {
        let mut stack: TraversalStack<'_, K> = TraversalStack::new(self.depth_limit);
        let (found, _) = self.read(OpKind::Find, || {
            match self.descend(&mut stack, &self.key_cmp, key, guard)? {
                Descent::Found(at) => at.node.key_arc(at.index, guard).map(Some),
                Descent::Vacant(_) => Ok(None),
            }
        })?;
        Ok(found)
    }

    /// Smallest stored key strictly greater than `key`.
    ///
    /// # Errors
    /// [`TreeError`] only if the tree is found corrupted.
    #[inline]
    pub fn search_greater(&self, key: &K) -> Result<Option<Arc<K>>, TreeError> {
        let guard: LocalGuard<'_> = self.guard();
        self.search_with_guard(key, SearchMode::Greater, &guard)
    }

    /// Smallest stored key greater than or equal to `key`.
    ///
    /// # Errors
    /// [`TreeError`] only if the tree is found corrupted.
    #[inline]
    pub fn search_greater_or_equal(&self, key: &K) -> Result<Option<Arc<K>>, TreeError> {
        let guard: LocalGuard<'_> = self.guard();
        self.search_with_guard(key, SearchMode::GreaterOrEqual, &guard)
    }

    /// Search in any [`SearchMode`] using an explicit guard.
    ///
    /// # Errors
    /// [`TreeError`] only if the tree is found corrupted.
    #[cfg_attr(feature = "tracing", tracing::instrument(level = "debug", skip_all, fields(mode = ?mode)))]
    pub fn search_with_guard(
        &self,
        key: &K,
        mode: SearchMode,
        guard: &LocalGuard<'_>,
    ) -> Result<Option<Arc<K>>, TreeError> {
        if mode == SearchMode::Equal {
            return self.search_equal_with_guard(key, guard);
        }

        let mut stack: TraversalStack<'_, K> = TraversalStack::new(self.depth_limit);
        let (found, _) = self.read(OpKind::Find, || {
            self.seek(&mut stack, mode, key, guard)?
                .map(|at| at.node.key_arc(at.index, guard))
                .transpose()
        })?;
        Ok(found)
    }
}
