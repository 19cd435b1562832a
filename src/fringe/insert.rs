//! Insert fringe balancing: T0 blocks and germination.

use super::{FringeProfile, collect_group, relink_chain};
use crate::fringe::shapes::T0Shape;
use crate::height;
use crate::node::{Node, Side};
use crate::stack::TraversalStack;
use crate::tracing_helpers::debug_log;
use crate::tree::{Interference, TreeError};
use crate::version::WriteGuard;

/// What the insert fringe balancer did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Reshape {
    /// The group is below its thresholds.
    Unchanged,
    /// A full chain became a T0 block. Grouped height is unchanged.
    T0,
    /// A group split around its pivot and the sub-tree grew one level.
    Germinated,
}

/// Rewire `block` into the literal T0 `shape`, returning its root.
///
/// `block` lists the nodes in key order. Every node stays in the fringe
/// with a zero balance.
pub(crate) fn build_t0<'t, K>(
    block: &[&'t Node<K>],
    shape: &T0Shape,
) -> Result<&'t Node<K>, Interference> {
    if block.len() != shape.size {
        return Err(Interference::ShapeMismatch);
    }
    let at = |position: u8| -> Result<&'t Node<K>, Interference> {
        block
            .get(usize::from(position))
            .copied()
            .ok_or(Interference::ShapeMismatch)
    };

    for node in block {
        node.set_left(None);
        node.set_right(None);
        node.set_balance(0);
        node.set_fringe(true);
    }
    for link in shape.links {
        let node: &'t Node<K> = at(link.node)?;
        node.set_left(Some(at(link.left)?));
        node.set_right(Some(at(link.right)?));
    }

    at(shape.root)
}

/// Relink `nodes` (key order) as one fringe group and return its top.
///
/// Fewer nodes than a T0 block stay a plain chain. Otherwise the first
/// `shape.size` nodes form the block and the rest chain off its last leaf.
pub(crate) fn build_group<'t, K>(
    nodes: &[&'t Node<K>],
    shape: &T0Shape,
) -> Result<&'t Node<K>, Interference> {
    let &first = nodes.first().ok_or(Interference::ShapeMismatch)?;
    if nodes.len() < shape.size {
        relink_chain(nodes);
        return Ok(first);
    }

    let (block, tail) = nodes.split_at(shape.size);
    relink_chain(tail);
    let root: &'t Node<K> = build_t0(block, shape)?;
    let &last = block.last().ok_or(Interference::ShapeMismatch)?;
    last.set_right(tail.first().copied());
    Ok(root)
}

/// Split a group that reached its germinate size.
///
/// The node at the literal pivot becomes a skeleton node with balance 0; the
/// nodes on either side become a group each. Returns the pivot.
pub(crate) fn germinate<'t, K>(
    group: &[&'t Node<K>],
    profile: &FringeProfile,
) -> Result<&'t Node<K>, Interference> {
    let germination = profile.germination();
    if group.len() != germination.size {
        return Err(Interference::ShapeMismatch);
    }
    let (left, rest) = group.split_at(germination.pivot);
    let (&pivot, right) = rest.split_first().ok_or(Interference::ShapeMismatch)?;

    let left_top: &'t Node<K> = build_group(left, profile.t0())?;
    let right_top: &'t Node<K> = build_group(right, profile.t0())?;
    pivot.set_left(Some(left_top));
    pivot.set_right(Some(right_top));
    pivot.set_balance(0);
    pivot.set_fringe(false);
    Ok(pivot)
}

/// Rebuild the chain ending at the stack top as a T0 block once it is long
/// enough and its last node is full.
///
/// Runs after a key landed in the stack top without creating a node. Only a
/// plain chain (no node with a left child) qualifies. The stack is truncated
/// to the chain's parent.
pub(crate) fn rebalance<K>(
    profile: &FringeProfile,
    stack: &mut TraversalStack<'_, K>,
    write: &mut WriteGuard<'_>,
) -> Result<Reshape, TreeError> {
    let (Some(top), Some(last)) = (stack.top_index(), stack.top()) else {
        return Ok(Reshape::Unchanged);
    };
    if !last.is_fringe() || last.right().is_some() || !last.is_full() {
        return Ok(Reshape::Unchanged);
    }
    let Some(first) = stack.fringe_top() else {
        return Ok(Reshape::Unchanged);
    };
    let len: usize = top - first + 1;
    if len < profile.t0_size() {
        return Ok(Reshape::Unchanged);
    }

    let chain: Vec<&Node<K>> = (first..=top)
        .map(|index| stack.node(index))
        .collect::<Option<Vec<_>>>()
        .ok_or(Interference::NullReference)?;
    if chain.iter().any(|node| node.left().is_some()) {
        return Ok(Reshape::Unchanged);
    }

    let (parent, side): (&Node<K>, Side) = stack.parent_link(first)?;
    write.mark_structural();
    let root: &Node<K> = build_group(&chain, profile.t0())?;
    parent.set_child(side, Some(root));
    stack.truncate(first);

    debug_log!(
        k_factor = profile.k_factor(),
        len,
        depth = first,
        "fringe: chain rebuilt as T0 block"
    );
    Ok(Reshape::T0)
}

/// Germinate the group holding the stack top if a new leaf just brought it
/// to its germinate size.
///
/// Runs after a leaf was linked under the stack top, a fringe node. The
/// grown sub-tree goes to the insert height balancer.
pub(crate) fn grow<K>(
    profile: &FringeProfile,
    stack: &mut TraversalStack<'_, K>,
    write: &mut WriteGuard<'_>,
) -> Result<Reshape, TreeError> {
    let Some(first) = stack.fringe_top() else {
        return Ok(Reshape::Unchanged);
    };
    let top: &Node<K> = stack.node(first).ok_or(Interference::NullReference)?;
    let group: Vec<&Node<K>> = collect_group(top, profile.group_limit())?;
    if group.len() < profile.group_limit() {
        return Ok(Reshape::Unchanged);
    }

    let (parent, side): (&Node<K>, Side) = stack.parent_link(first)?;
    write.mark_structural();
    let pivot: &Node<K> = germinate(&group, profile)?;
    parent.set_child(side, Some(pivot));
    stack.truncate(first);

    debug_log!(
        k_factor = profile.k_factor(),
        size = group.len(),
        depth = first,
        "fringe: germinated"
    );

    height::insert::rebalance(profile, stack, first - 1, side)?;
    Ok(Reshape::Germinated)
}
