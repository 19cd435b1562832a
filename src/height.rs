//! Height balancing of the skeleton.
//!
//! The skeleton (every non-fringe node) is an AVL tree over grouped height:
//! a fringe group counts as height 1 however many nodes it holds, and a
//! skeleton node is one more than its taller child. Rotations move whole
//! nodes.
//!
//! Insert rebalancing ([`insert`]) climbs from the grown sub-tree to the first
//! node that absorbs the growth, rotating at most once. Delete rebalancing
//! ([`delete`]) may rotate at every level on the way up.

use crate::fringe::{self, FringeProfile};
use crate::node::{Node, Side};
use crate::tracing_helpers::trace_log;
use crate::tree::{Interference, TreeError};

pub(crate) mod delete;
pub(crate) mod insert;

/// Post-rotation balance of the old sub-tree root, indexed by the inner
/// grandchild's balance + 1, for a rotation toward the right and the left.
const NEW_BALANCE_ROOT: [[i8; 3]; 2] = [[0, 0, -1], [1, 0, 0]];

/// Post-rotation balance of the heavy child, same indexing.
const NEW_BALANCE_CHILD: [[i8; 3]; 2] = [[1, 0, 0], [0, 0, -1]];

#[inline]
const fn table_row(side: Side) -> usize {
    match side {
        Side::Right => 0,
        Side::Left => 1,
    }
}

/// Reject a stored balance outside `-1..=1`.
#[inline]
pub(crate) const fn checked_balance(balance: i8) -> Result<i8, TreeError> {
    if balance < -1 || balance > 1 {
        return Err(TreeError::InvalidBalance { balance });
    }
    Ok(balance)
}

/// Fix the fringe flag of a node that may have become a leaf.
#[inline]
fn settle<K>(node: &Node<K>) {
    if node.is_leaf() {
        node.set_fringe(true);
        node.set_balance(0);
    } else {
        node.set_fringe(false);
    }
}

/// Single rotation of `a` toward its `heavy` child.
///
/// The heavy child `c` takes `a`'s place; `c`'s inner sub-tree moves under
/// `a`. Balances are left to the caller. Returns `c`.
pub(crate) fn rotate_single<'t, K>(a: &'t Node<K>, heavy: Side) -> Result<&'t Node<K>, Interference> {
    let light: Side = heavy.opposite();
    let c: &'t Node<K> = a.child(heavy).ok_or(Interference::NullReference)?;

    a.set_child(heavy, c.child(light));
    c.set_child(light, Some(a));
    c.set_fringe(false);
    settle(a);

    trace_log!(?heavy, "height: single rotation");
    Ok(c)
}

/// Double rotation of `a` through its heavy child and that child's inner
/// grandchild `g`, which becomes the sub-tree root.
///
/// A multi-node group in the `g` position cannot be split by a rotation;
/// the three parts are combined instead.
pub(crate) fn rotate_double<'t, K>(
    profile: &FringeProfile,
    a: &'t Node<K>,
    heavy: Side,
) -> Result<&'t Node<K>, TreeError> {
    let light: Side = heavy.opposite();
    let c: &'t Node<K> = a.child(heavy).ok_or(Interference::NullReference)?;
    let g: &'t Node<K> = c.child(light).ok_or(Interference::NullReference)?;

    if g.is_fringe() && !g.is_leaf() {
        return fringe::delete::combine(profile, a, c, g, heavy);
    }

    let g_balance: i8 = if g.is_fringe() { 0 } else { checked_balance(g.balance())? };
    let column: usize = usize::try_from(g_balance + 1).map_err(|_| TreeError::InvalidBalance {
        balance: g_balance,
    })?;
    let row: usize = table_row(heavy);

    c.set_child(light, g.child(heavy));
    a.set_child(heavy, g.child(light));
    g.set_child(heavy, Some(c));
    g.set_child(light, Some(a));

    a.set_balance(NEW_BALANCE_ROOT[row][column]);
    c.set_balance(NEW_BALANCE_CHILD[row][column]);
    g.set_balance(0);
    g.set_fringe(false);
    settle(a);
    settle(c);

    trace_log!(?heavy, g_balance, "height: double rotation");
    Ok(g)
}
