//! Fringe balancing.
//!
//! A fringe group is a connected run of fringe nodes hanging off the
//! skeleton (or forming the whole tree). New keys accumulate there one node
//! at a time without touching the balanced part of the tree, and height
//! balancing treats every group as a single level. The K factor bounds how
//! large a group may get:
//!
//! - On insert ([`insert`]), a plain right chain whose last node fills up at
//!   the T0 size is rebuilt as the literal T0 block of its K factor, still
//!   inside the fringe. A group that reaches its germinate size splits: the
//!   literal pivot becomes a skeleton node and each side is rebuilt as a T0
//!   block of its own. Germination raises the grouped height by one and is
//!   followed by insert height rebalancing.
//! - On delete ([`delete`]), a skeleton node whose children are small groups
//!   is linearized back into one chain, and a double rotation whose inner
//!   grandchild is a multi-node group combines the three parts instead.

use std::fmt as StdFmt;

use crate::node::Node;
use crate::tree::Interference;

pub(crate) mod delete;
pub(crate) mod insert;
pub(crate) mod shapes;

use shapes::{Germination, T0Shape, germination, t0_shape};

// ============================================================================
//  FringeProfile
// ============================================================================

/// Per-K-factor fringe parameters.
#[derive(Clone, Copy, PartialEq, Eq)]
pub(crate) struct FringeProfile {
    k_factor: usize,
    t0_depth: usize,
    t0: T0Shape,
    germination: Germination,
    max_imbalance: usize,
}

impl FringeProfile {
    /// Profile for one of the supported K factors.
    pub(crate) const fn for_k_factor(k_factor: usize) -> Option<Self> {
        let t0_depth: usize = match k_factor {
            2 => 0,
            4 => 1,
            6 | 8 => 2,
            12 | 16 => 3,
            24 | 32 => 4,
            _ => return None,
        };
        let Some(t0) = t0_shape(k_factor) else {
            return None;
        };
        let Some(germination) = germination(k_factor) else {
            return None;
        };
        let max_imbalance: usize = if k_factor % 3 == 0 {
            k_factor + 2
        } else {
            k_factor + 1
        };

        Some(Self {
            k_factor,
            t0_depth,
            t0,
            germination,
            max_imbalance,
        })
    }

    #[inline]
    pub(crate) const fn k_factor(&self) -> usize {
        self.k_factor
    }

    #[inline]
    pub(crate) const fn t0_depth(&self) -> usize {
        self.t0_depth
    }

    #[inline]
    pub(crate) const fn t0(&self) -> &T0Shape {
        &self.t0
    }

    #[inline]
    pub(crate) const fn germination(&self) -> &Germination {
        &self.germination
    }

    /// Length at which a plain chain is rebuilt as a T0 block.
    #[inline]
    pub(crate) const fn t0_size(&self) -> usize {
        self.t0.size
    }

    /// Longest tail a T0 block may carry once the tree has a skeleton.
    #[inline]
    pub(crate) const fn max_imbalance(&self) -> usize {
        self.max_imbalance
    }

    /// Node count at which a group germinates. Groups at rest stay below it.
    #[inline]
    pub(crate) const fn group_limit(&self) -> usize {
        self.germination.size
    }

    /// Most nodes a group may hold and still be linearized on delete.
    #[inline]
    pub(crate) const fn linearize_limit(&self) -> usize {
        self.max_imbalance / 2
    }
}

impl StdFmt::Debug for FringeProfile {
    fn fmt(&self, f: &mut StdFmt::Formatter<'_>) -> StdFmt::Result {
        f.debug_struct("FringeProfile")
            .field("k_factor", &self.k_factor)
            .field("t0_size", &self.t0.size)
            .field("max_imbalance", &self.max_imbalance)
            .field("group_limit", &self.germination.size)
            .field("pivot", &self.germination.pivot)
            .finish()
    }
}

// ============================================================================
//  Chain helpers
// ============================================================================

/// Collect the fringe group rooted at `top` in key order.
///
/// Fails once more than `limit` nodes were seen, or on a skeleton node
/// hanging below the group.
pub(crate) fn collect_group<'t, K>(
    top: &'t Node<K>,
    limit: usize,
) -> Result<Vec<&'t Node<K>>, Interference> {
    let mut group: Vec<&'t Node<K>> = Vec::with_capacity(limit.min(64));
    let mut pending: Vec<&'t Node<K>> = Vec::new();
    let mut cursor: Option<&'t Node<K>> = Some(top);

    loop {
        while let Some(node) = cursor {
            if !node.is_fringe() {
                return Err(Interference::ShapeMismatch);
            }
            if pending.len() + group.len() >= limit {
                return Err(Interference::DepthExceeded);
            }
            pending.push(node);
            cursor = node.left();
        }
        let Some(node) = pending.pop() else {
            return Ok(group);
        };
        group.push(node);
        cursor = node.right();
    }
}

/// Relink `chain` as a fringe: right links only, fringe flag set, balance 0.
pub(crate) fn relink_chain<K>(chain: &[&Node<K>]) {
    for (i, node) in chain.iter().enumerate() {
        node.set_left(None);
        node.set_right(chain.get(i + 1).copied());
        node.set_balance(0);
        node.set_fringe(true);
    }
}

#[cfg(test)]
#[expect(clippy::unwrap_used, reason = "Fail fast in tests")]
mod tests {
    use super::*;
    use crate::tree::K_FACTORS;

    fn profiles() -> impl Iterator<Item = FringeProfile> {
        K_FACTORS
            .iter()
            .map(|&k| FringeProfile::for_k_factor(k).unwrap())
    }

    #[test]
    fn test_profile_tables() {
        let imbalance: Vec<usize> = profiles().map(|p| p.max_imbalance()).collect();
        assert_eq!(imbalance, vec![3, 5, 8, 9, 14, 17, 26, 33]);

        let depths: Vec<usize> = profiles().map(|p| p.t0_depth()).collect();
        assert_eq!(depths, vec![0, 1, 2, 2, 3, 3, 4, 4]);

        let limits: Vec<usize> = profiles().map(|p| p.linearize_limit()).collect();
        assert_eq!(limits, vec![1, 2, 4, 4, 7, 8, 13, 16]);

        let groups: Vec<usize> = profiles().map(|p| p.group_limit()).collect();
        assert_eq!(groups, vec![5, 7, 12, 15, 24, 31, 48, 63]);
        assert!(FringeProfile::for_k_factor(10).is_none());
    }

    #[test]
    fn test_group_limit_is_a_t0_block_plus_longest_tail() {
        for profile in profiles() {
            assert_eq!(
                profile.group_limit(),
                profile.t0_size() + profile.max_imbalance() - 1,
                "{profile:?}"
            );
            // A linearized group never needs a T0 block.
            assert!(profile.linearize_limit() < profile.t0_size(), "{profile:?}");
        }
    }

    #[test]
    fn test_collect_and_relink_chain() {
        let nodes: Vec<Node<u32>> = (0..4).map(|_| Node::new(3)).collect();
        let refs: Vec<&Node<u32>> = nodes.iter().collect();
        relink_chain(&refs);

        let chain = collect_group(refs[0], 8).unwrap();
        assert_eq!(chain.len(), 4);
        assert!(chain.iter().zip(&refs).all(|(a, b)| std::ptr::eq(*a, *b)));
        assert!(chain.iter().all(|n| n.is_fringe()));
        assert!(matches!(collect_group(refs[0], 3), Err(Interference::DepthExceeded)));
    }

    #[test]
    fn test_collect_group_walks_in_order_and_rejects_skeleton() {
        //        b
        //       / \
        //      a   d
        //         / \
        //        c   e (skeleton)
        let nodes: Vec<Node<u32>> = (0..5).map(|_| Node::new(3)).collect();
        let [a, b, c, d, e] = [&nodes[0], &nodes[1], &nodes[2], &nodes[3], &nodes[4]];
        for n in [a, b, c, d] {
            n.set_fringe(true);
        }
        b.set_left(Some(a));
        b.set_right(Some(d));
        d.set_left(Some(c));
        d.set_right(Some(e));

        assert!(matches!(collect_group(b, 8), Err(Interference::ShapeMismatch)));
        d.set_right(None);

        let group = collect_group(b, 8).unwrap();
        let order: Vec<bool> = group
            .iter()
            .zip([a, b, c, d])
            .map(|(x, y)| std::ptr::eq(*x, y))
            .collect();
        assert_eq!(order, vec![true; 4]);
        assert_eq!(group.len(), 4);
    }
}
