//! Insert height rebalancing.

use super::{checked_balance, rotate_double, rotate_single};
use crate::fringe::FringeProfile;
use crate::node::{Node, Side};
use crate::stack::TraversalStack;
use crate::tracing_helpers::trace_log;
use crate::tree::{Interference, TreeError};

/// Rebalance after the `grown` child of stack index `index` gained one
/// level.
///
/// Every node below the stack's balance point was level before the write,
/// so each simply leans toward the growth. The balance point itself either
/// absorbs the growth or rotates; only a rotation that grew the sub-tree
/// keeps climbing.
pub(crate) fn rebalance<K>(
    profile: &FringeProfile,
    stack: &TraversalStack<'_, K>,
    mut index: usize,
    mut grown: Side,
) -> Result<(), TreeError> {
    let point: usize = stack.balance_point();
    while index > point {
        let node: &Node<K> = stack.node(index).ok_or(Interference::NullReference)?;
        if node.balance() != 0 {
            break;
        }
        node.set_balance(grown.sign());
        let (_, side) = stack.parent_link(index)?;
        grown = side;
        index -= 1;
    }
    climb(profile, stack, index, grown)
}

/// Climb from stack index `index`, whose `grown` child just gained one level.
///
/// Stops at the first node that absorbs the growth, after a rotation that
/// restores the old height, or at the dummy top node (index 0).
fn climb<K>(
    profile: &FringeProfile,
    stack: &TraversalStack<'_, K>,
    mut index: usize,
    mut grown: Side,
) -> Result<(), TreeError> {
    while index > 0 {
        let node: &Node<K> = stack.node(index).ok_or(Interference::NullReference)?;
        let sign: i8 = grown.sign();
        let balance: i8 = checked_balance(node.balance())?;

        if balance == 0 {
            node.set_balance(sign);
            let (_, side) = stack.parent_link(index)?;
            grown = side;
            index -= 1;
            continue;
        }

        if balance == -sign {
            node.set_balance(0);
            return Ok(());
        }

        // balance == sign: two levels heavier on the grown side.
        let (parent, side) = stack.parent_link(index)?;
        let rotated: Rotation<'_, K> = rotate_heavy(profile, node, grown)?;
        parent.set_child(side, Some(rotated.root));
        if !rotated.grew {
            return Ok(());
        }
        trace_log!(depth = index, "height: insert rotation grew the sub-tree");
        grown = side;
        index -= 1;
    }
    Ok(())
}

struct Rotation<'t, K> {
    root: &'t Node<K>,
    grew: bool,
}

fn rotate_heavy<'t, K>(
    profile: &FringeProfile,
    a: &'t Node<K>,
    heavy: Side,
) -> Result<Rotation<'t, K>, TreeError> {
    let sign: i8 = heavy.sign();
    let c: &'t Node<K> = a.child(heavy).ok_or(Interference::NullReference)?;
    let c_balance: i8 = checked_balance(c.balance())?;

    if c_balance == sign {
        let root = rotate_single(a, heavy)?;
        a.set_balance(0);
        root.set_balance(0);
        return Ok(Rotation { root, grew: false });
    }

    if c_balance == 0 {
        // Only reachable after a germination: both of c's sides sit one
        // level above a's light side.
        let root = rotate_single(a, heavy)?;
        a.set_balance(sign);
        root.set_balance(-sign);
        return Ok(Rotation { root, grew: true });
    }

    let root = rotate_double(profile, a, heavy)?;
    Ok(Rotation { root, grew: false })
}

#[cfg(test)]
#[expect(clippy::unwrap_used, reason = "Fail fast in tests")]
mod tests {
    use super::*;
    use crate::stack::VisitState;

    fn profile() -> FringeProfile {
        FringeProfile::for_k_factor(4).unwrap()
    }

    fn node(fringe: bool) -> Node<u32> {
        let n = Node::new(3);
        n.set_fringe(fringe);
        n
    }

    #[test]
    fn test_growth_absorbed_by_leaning_node() {
        let dummy = node(false);
        let root = node(false);
        let (l, r) = (node(true), node(false));
        dummy.set_right(Some(&root));
        root.set_left(Some(&l));
        root.set_right(Some(&r));
        root.set_balance(-1);

        let mut stack = TraversalStack::new(8);
        stack.push(&dummy, VisitState::DoneVisits).unwrap();
        stack.push(&root, VisitState::DoneVisits).unwrap();

        rebalance(&profile(), &stack, 1, Side::Right).unwrap();
        assert_eq!(root.balance(), 0);
    }

    #[test]
    fn test_growth_propagates_to_root() {
        let dummy = node(false);
        let root = node(false);
        let child = node(false);
        dummy.set_right(Some(&root));
        root.set_left(Some(&child));

        let mut stack = TraversalStack::new(8);
        stack.push(&dummy, VisitState::DoneVisits).unwrap();
        stack.push(&root, VisitState::ProcessCurrent).unwrap();
        stack.push(&child, VisitState::DoneVisits).unwrap();

        rebalance(&profile(), &stack, 2, Side::Right).unwrap();
        assert_eq!(child.balance(), 1);
        assert_eq!(root.balance(), -1);
    }

    #[test]
    fn test_single_rotation_at_root() {
        // dummy -> a (balance +1) -> c (balance +1 after growth)
        let dummy = node(false);
        let a = node(false);
        let c = node(false);
        let x = node(true);
        dummy.set_right(Some(&a));
        a.set_right(Some(&c));
        c.set_right(Some(&x));
        a.set_balance(1);

        let mut stack = TraversalStack::new(8);
        stack.push(&dummy, VisitState::DoneVisits).unwrap();
        stack.push(&a, VisitState::DoneVisits).unwrap();
        stack.push(&c, VisitState::DoneVisits).unwrap();

        rebalance(&profile(), &stack, 2, Side::Right).unwrap();
        assert!(std::ptr::eq(dummy.right().unwrap(), &c));
        assert!(std::ptr::eq(c.left().unwrap(), &a));
        assert_eq!(a.balance(), 0);
        assert_eq!(c.balance(), 0);
        assert!(a.is_fringe() && a.is_leaf());
    }

    #[test]
    fn test_levels_below_balance_point_lean_toward_growth() {
        // dummy -> a (leans left) -> b -> c; b and c are level until c's
        // right side grows.
        let dummy = node(false);
        let (a, b, c) = (node(false), node(false), node(false));
        let (x, y, z, w) = (node(true), node(true), node(true), node(true));
        dummy.set_right(Some(&a));
        a.set_left(Some(&x));
        a.set_right(Some(&b));
        a.set_balance(-1);
        b.set_right(Some(&c));
        b.set_left(Some(&y));
        c.set_left(Some(&z));
        c.set_right(Some(&w));

        let mut stack = TraversalStack::new(8);
        for n in [&dummy, &a, &b, &c] {
            stack.balanced_push(n, VisitState::DoneVisits).unwrap();
        }
        assert_eq!(stack.balance_point(), 1);

        rebalance(&profile(), &stack, 3, Side::Right).unwrap();
        assert_eq!(c.balance(), 1);
        assert_eq!(b.balance(), 1);
        assert_eq!(a.balance(), 0);
        assert!(std::ptr::eq(dummy.right().unwrap(), &a));
    }

    #[test]
    fn test_invalid_balance_is_reported() {
        let dummy = node(false);
        let root = node(false);
        dummy.set_right(Some(&root));
        root.set_balance(3);

        let mut stack = TraversalStack::new(8);
        stack.push(&dummy, VisitState::DoneVisits).unwrap();
        stack.push(&root, VisitState::DoneVisits).unwrap();

        assert_eq!(
            rebalance(&profile(), &stack, 1, Side::Left),
            Err(TreeError::InvalidBalance { balance: 3 })
        );
    }
}
