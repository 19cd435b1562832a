//! Delete fringe balancing: linearize and combine.

use super::{FringeProfile, collect_group, relink_chain};
use crate::fringe::insert::build_group;
use crate::node::{Node, Side};
use crate::stack::TraversalStack;
use crate::tracing_helpers::debug_log;
use crate::tree::{Interference, TreeError};
use crate::version::WriteGuard;

/// A sub-tree that lost one level of grouped height.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Shrink {
    /// Stack index of the node whose child shrank.
    pub(crate) index: usize,
    /// Which child.
    pub(crate) side: Side,
}

/// Nodes of the group rooted at `top`, if it is a group of at most `budget`
/// nodes.
fn small_group<'t, K>(
    top: &'t Node<K>,
    budget: usize,
) -> Result<Option<Vec<&'t Node<K>>>, Interference> {
    if !top.is_fringe() {
        return Ok(None);
    }
    match collect_group(top, budget) {
        Ok(group) => Ok(Some(group)),
        Err(Interference::DepthExceeded) => Ok(None),
        Err(cause) => Err(cause),
    }
}

/// Linearize the skeleton node above the stack top, together with its
/// groups, back into a single chain.
///
/// The candidate is the nearest skeleton node on the stack. It qualifies
/// when both its children are groups (or empty) holding at most
/// [`FringeProfile::linearize_limit`] nodes between them. Deletes that never
/// got below a T0 block's depth skip the check. The stack is truncated to
/// the candidate's parent, which is reported as shrunk.
pub(crate) fn linearize<K>(
    profile: &FringeProfile,
    stack: &mut TraversalStack<'_, K>,
    write: &mut WriteGuard<'_>,
) -> Result<Option<Shrink>, TreeError> {
    if stack.max_depth() <= profile.t0_depth().max(1) {
        return Ok(None);
    }
    let Some(mut index) = stack.top_index() else {
        return Ok(None);
    };
    while index > 0 && stack.node(index).is_some_and(Node::is_fringe) {
        index -= 1;
    }
    if index == 0 {
        return Ok(None);
    }

    let skeleton: &Node<K> = stack.node(index).ok_or(Interference::NullReference)?;
    let limit: usize = profile.linearize_limit();

    let left: Vec<&Node<K>> = match skeleton.left() {
        None => Vec::new(),
        Some(top) => match small_group(top, limit)? {
            Some(group) => group,
            None => return Ok(None),
        },
    };
    let right: Vec<&Node<K>> = match skeleton.right() {
        None => Vec::new(),
        Some(top) => match small_group(top, limit - left.len())? {
            Some(group) => group,
            None => return Ok(None),
        },
    };
    if left.is_empty() && right.is_empty() {
        return Ok(None);
    }

    let (parent, side) = stack.parent_link(index)?;
    write.mark_structural();

    let mut chain: Vec<&Node<K>> = Vec::with_capacity(left.len() + right.len() + 1);
    chain.extend_from_slice(&left);
    chain.push(skeleton);
    chain.extend_from_slice(&right);
    relink_chain(&chain);
    parent.set_child(side, chain.first().copied());
    stack.truncate(index);

    debug_log!(
        k_factor = profile.k_factor(),
        len = chain.len(),
        depth = index,
        "fringe: linearized"
    );

    Ok(Some(Shrink {
        index: index - 1,
        side,
    }))
}

/// Combine `a`, its heavy child `c` and `c`'s inner group `g` into one
/// skeleton node over two groups.
///
/// Only valid where a double rotation would be: `a`'s light side and `c`'s
/// outer side are empty. Heavy right puts the group's first node at the
/// root; heavy left puts its last node there. Returns the new sub-tree root,
/// one level shorter than `a` was.
pub(crate) fn combine<'t, K>(
    profile: &FringeProfile,
    a: &'t Node<K>,
    c: &'t Node<K>,
    g: &'t Node<K>,
    heavy: Side,
) -> Result<&'t Node<K>, TreeError> {
    let light: Side = heavy.opposite();
    if a.child(light).is_some() || c.child(heavy).is_some() {
        return Err(TreeError::Corrupted {
            reason: "combine on a sub-tree taller than two levels",
            vno: 0,
        });
    }

    let group: Vec<&'t Node<K>> = collect_group(g, profile.group_limit())?;

    let (root, left, right): (&'t Node<K>, Vec<&'t Node<K>>, Vec<&'t Node<K>>) = match heavy {
        Side::Right => {
            let (&root, rest) = group.split_first().ok_or(Interference::ShapeMismatch)?;
            let mut right: Vec<&'t Node<K>> = rest.to_vec();
            right.push(c);
            (root, vec![a], right)
        }
        Side::Left => {
            let (&root, rest) = group.split_last().ok_or(Interference::ShapeMismatch)?;
            let mut left: Vec<&'t Node<K>> = Vec::with_capacity(group.len());
            left.push(c);
            left.extend_from_slice(rest);
            (root, left, vec![a])
        }
    };

    let left_top: &'t Node<K> = build_group(&left, profile.t0())?;
    let right_top: &'t Node<K> = build_group(&right, profile.t0())?;
    root.set_left(Some(left_top));
    root.set_right(Some(right_top));
    root.set_balance(0);
    root.set_fringe(false);

    debug_log!(size = group.len(), ?heavy, "fringe: combined");
    Ok(root)
}
