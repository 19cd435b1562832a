//! Delete height rebalancing.

use super::{checked_balance, rotate_double, rotate_single};
use crate::fringe::FringeProfile;
use crate::node::{Node, Side};
use crate::stack::TraversalStack;
use crate::tracing_helpers::trace_log;
use crate::tree::{Interference, TreeError};

/// Climb from stack index `index`, whose `shrunk` child just lost one level.
///
/// Unlike insert, every level may need a rotation: climbing continues as long
/// as the sub-tree keeps getting shorter.
pub(crate) fn rebalance<K>(
    profile: &FringeProfile,
    stack: &TraversalStack<'_, K>,
    mut index: usize,
    mut shrunk: Side,
) -> Result<(), TreeError> {
    while index > 0 {
        let node: &Node<K> = stack.node(index).ok_or(Interference::NullReference)?;
        let (parent, side) = stack.parent_link(index)?;
        let sign: i8 = shrunk.sign();
        let balance: i8 = checked_balance(node.balance())?;

        if balance == sign {
            node.set_balance(0);
            if node.is_leaf() {
                node.set_fringe(true);
            }
            shrunk = side;
            index -= 1;
            continue;
        }

        if balance == 0 {
            node.set_balance(-sign);
            return Ok(());
        }

        // balance == -sign: the other side is now two levels taller.
        let heavy: Side = shrunk.opposite();
        let heavy_sign: i8 = heavy.sign();
        let c: &Node<K> = node.child(heavy).ok_or(Interference::NullReference)?;
        let c_balance: i8 = if c.is_fringe() { 0 } else { checked_balance(c.balance())? };

        if c_balance == 0 {
            let root: &Node<K> = rotate_single(node, heavy)?;
            node.set_balance(heavy_sign);
            root.set_balance(-heavy_sign);
            parent.set_child(side, Some(root));
            trace_log!(depth = index, "height: delete rotation kept height");
            return Ok(());
        }

        if c_balance == heavy_sign {
            let root: &Node<K> = rotate_single(node, heavy)?;
            node.set_balance(0);
            root.set_balance(0);
            parent.set_child(side, Some(root));
        } else {
            let root: &Node<K> = rotate_double(profile, node, heavy)?;
            parent.set_child(side, Some(root));
        }

        shrunk = side;
        index -= 1;
    }
    Ok(())
}
