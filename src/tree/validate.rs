//! Structural checks and detached snapshots, for tests and diagnostics.
//!
//! Both entry points take the tree lock, so they see a quiescent tree and
//! block writers for as long as they run.

use std::cmp::Ordering;
use std::sync::Arc;

use seize::LocalGuard;

use super::{GbsTree, TreeError};
use crate::comparator::Comparator;
use crate::node::Node;

/// Shape summary returned by [`GbsTree::validate()`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TreeStats {
    /// Keys stored.
    pub keys: usize,
    /// Nodes linked into the tree.
    pub nodes: usize,
    /// Nodes outside any fringe.
    pub skeleton_nodes: usize,
    /// Number of fringe groups.
    pub fringes: usize,
    /// Nodes in the largest fringe group.
    pub largest_fringe: usize,
    /// Deepest level inside any fringe group, counting its top as 1.
    pub fringe_depth: usize,
    /// Grouped height of the root: fringes count as one level.
    pub grouped_height: usize,
    /// Deepest node, counting the root as 1.
    pub depth: usize,
}

/// Detached copy of one node and everything below it.
#[derive(Debug, Clone)]
pub struct NodeSnapshot<K> {
    /// The node's keys in order.
    pub keys: Vec<Arc<K>>,
    /// Stored balance factor.
    pub balance: i8,
    /// Whether the node belongs to a fringe.
    pub fringe: bool,
    /// Left sub-tree.
    pub left: Option<Box<Self>>,
    /// Right sub-tree.
    pub right: Option<Box<Self>>,
}

impl<K> NodeSnapshot<K> {
    /// Keys in this sub-tree.
    #[must_use]
    pub fn key_count(&self) -> usize {
        self.keys.len()
            + self.left.as_ref().map_or(0, |n| n.key_count())
            + self.right.as_ref().map_or(0, |n| n.key_count())
    }

    /// Nodes in this sub-tree.
    #[must_use]
    pub fn node_count(&self) -> usize {
        1 + self.left.as_ref().map_or(0, |n| n.node_count())
            + self.right.as_ref().map_or(0, |n| n.node_count())
    }

    /// Height in nodes.
    #[must_use]
    pub fn height(&self) -> usize {
        1 + self
            .left
            .as_ref()
            .map_or(0, |n| n.height())
            .max(self.right.as_ref().map_or(0, |n| n.height()))
    }

    /// All keys of this sub-tree in order.
    #[must_use]
    pub fn in_order_keys(&self) -> Vec<Arc<K>> {
        let mut out: Vec<Arc<K>> = Vec::with_capacity(self.key_count());
        self.collect_into(&mut out);
        out
    }

    fn collect_into(&self, out: &mut Vec<Arc<K>>) {
        if let Some(left) = &self.left {
            left.collect_into(out);
        }
        out.extend(self.keys.iter().cloned());
        if let Some(right) = &self.right {
            right.collect_into(out);
        }
    }
}

/// Running state of one validation walk.
struct Walker<'g, 'c, K, C> {
    cmp: &'g C,
    guard: &'g LocalGuard<'c>,
    width: usize,
    group_limit: usize,
    depth_limit: usize,
    last: Option<&'g K>,
    stats: TreeStats,
}

impl<'g, K, C> Walker<'g, '_, K, C>
where
    C: Comparator<K>,
{
    /// Check the keys of one node against each other and the previous node.
    fn visit_keys(&mut self, node: &Node<K>, depth: usize) -> Result<(), &'static str> {
        if depth > self.depth_limit {
            return Err("tree deeper than its depth bound");
        }
        if node.width() != self.width {
            return Err("node width differs from the configured width");
        }
        let population: usize = node.population();
        if population == 0 || population > self.width {
            return Err("node population out of range");
        }
        if node.middle_index() != (population - 1) / 2 {
            return Err("cached middle index is stale");
        }

        for index in 0..population {
            let key: &'g K = node
                .key(index, self.guard)
                .map_err(|_| "null key inside the populated range")?;
            if self
                .last
                .is_some_and(|prev| self.cmp.compare(prev, key) != Ordering::Less)
            {
                return Err("keys out of order");
            }
            self.last = Some(key);
        }
        if (population..self.width).any(|index| node.key_ptr(index).is_ok()) {
            return Err("non-null key past the population");
        }

        self.stats.keys += population;
        self.stats.nodes += 1;
        self.stats.depth = self.stats.depth.max(depth);
        Ok(())
    }

    /// Walk the fringe group rooted at `top`. Its grouped height is 1.
    fn fringe(&mut self, top: &Node<K>, depth: usize) -> Result<usize, &'static str> {
        let mut size: usize = 0;
        self.group_node(top, depth, 1, &mut size)?;

        if size >= self.group_limit {
            return Err("fringe group reached its germinate size");
        }
        self.stats.fringes += 1;
        self.stats.largest_fringe = self.stats.largest_fringe.max(size);
        Ok(1)
    }

    /// In-order walk of one group node and the group below it.
    fn group_node(
        &mut self,
        node: &Node<K>,
        depth: usize,
        level: usize,
        size: &mut usize,
    ) -> Result<(), &'static str> {
        if !node.is_fringe() {
            return Err("skeleton node below a fringe node");
        }
        if depth > self.depth_limit {
            return Err("tree deeper than its depth bound");
        }
        if let Some(left) = node.left() {
            self.group_node(left, depth + 1, level + 1, size)?;
        }
        self.visit_keys(node, depth)?;
        *size += 1;
        self.stats.fringe_depth = self.stats.fringe_depth.max(level);
        if let Some(right) = node.right() {
            self.group_node(right, depth + 1, level + 1, size)?;
        }
        Ok(())
    }

    /// Grouped height of the sub-tree at `node`.
    fn subtree(&mut self, node: &Node<K>, depth: usize) -> Result<usize, &'static str> {
        if node.is_fringe() {
            return self.fringe(node, depth);
        }
        if node.is_leaf() {
            return Err("skeleton node without children");
        }

        let left: usize = match node.left() {
            Some(child) => self.subtree(child, depth + 1)?,
            None => 0,
        };
        self.visit_keys(node, depth)?;
        let right: usize = match node.right() {
            Some(child) => self.subtree(child, depth + 1)?,
            None => 0,
        };

        if left.abs_diff(right) > 1 {
            return Err("grouped heights differ by more than one");
        }
        let balance: i8 = match right.cmp(&left) {
            Ordering::Greater => 1,
            Ordering::Equal => 0,
            Ordering::Less => -1,
        };
        if balance != node.balance() {
            return Err("balance factor does not match grouped heights");
        }
        self.stats.skeleton_nodes += 1;
        Ok(1 + left.max(right))
    }
}

fn snapshot_of<K>(node: &Node<K>, guard: &LocalGuard<'_>) -> Result<NodeSnapshot<K>, &'static str> {
    let keys: Vec<Arc<K>> = (0..node.population())
        .map(|index| node.key_arc(index, guard))
        .collect::<Result<_, _>>()
        .map_err(|_| "null key inside the populated range")?;
    let left = node.left().map(|n| snapshot_of(n, guard)).transpose()?;
    let right = node.right().map(|n| snapshot_of(n, guard)).transpose()?;

    Ok(NodeSnapshot {
        keys,
        balance: node.balance(),
        fringe: node.is_fringe(),
        left: left.map(Box::new),
        right: right.map(Box::new),
    })
}

impl<K, C, S> GbsTree<K, C, S>
where
    C: Comparator<K>,
    S: Comparator<K>,
{
    /// Check every structural invariant of the tree.
    ///
    /// Verifies key order under the insert comparator, node populations and
    /// cached middles, the fringe rules (groups hold only fringe nodes and
    /// stay below their germinate size), the skeleton balance factors against
    /// actual grouped heights, and the key and node totals against the
    /// tree's counters.
    ///
    /// # Errors
    /// [`TreeError::Corrupted`] naming the first violation found.
    pub fn validate(&self) -> Result<TreeStats, TreeError> {
        let pool = self.writer.lock();
        let vno: u64 = self.version.vno();
        let broken = |reason: &'static str| TreeError::Corrupted { reason, vno };
        let guard: LocalGuard<'_> = self.guard();

        let mut walker = Walker {
            cmp: &self.insert_cmp,
            guard: &guard,
            width: self.config.node_width,
            group_limit: self.profile.group_limit(),
            depth_limit: self.depth_limit,
            last: None,
            stats: TreeStats::default(),
        };
        if let Some(root) = self.root() {
            walker.stats.grouped_height = walker.subtree(root, 1).map_err(broken)?;
        }
        let stats: TreeStats = walker.stats;

        if stats.keys != self.len() {
            return Err(broken("population count does not match stored keys"));
        }
        if stats.nodes != pool.live() {
            return Err(broken("pool live count does not match linked nodes"));
        }
        Ok(stats)
    }

    /// Detached copy of the whole node graph, `None` for an empty tree.
    ///
    /// # Errors
    /// [`TreeError::Corrupted`] if a populated slot is null.
    pub fn snapshot(&self) -> Result<Option<NodeSnapshot<K>>, TreeError> {
        let _held = self.writer.lock();
        let vno: u64 = self.version.vno();
        let guard: LocalGuard<'_> = self.guard();

        self.root()
            .map(|root| snapshot_of(root, &guard))
            .transpose()
            .map_err(|reason| TreeError::Corrupted { reason, vno })
    }
}

#[cfg(test)]
#[expect(clippy::unwrap_used, reason = "Fail fast in tests")]
mod tests {
    use crate::tree::{GbsConfig, GbsTree, K_FACTORS, TreeError};

    #[test]
    fn test_empty_tree_validates() {
        let tree: GbsTree<u32> = GbsTree::new(GbsConfig::default()).unwrap();
        assert_eq!(tree.validate().unwrap(), Default::default());
        assert!(tree.snapshot().unwrap().is_none());
    }

    #[test]
    fn test_root_fringe_becomes_t0_block() {
        // k=4: the root chain is rebuilt once it holds 3 full nodes.
        let tree: GbsTree<u32> = GbsTree::new(GbsConfig::new(4, 3)).unwrap();
        for key in 0..9 {
            tree.insert(key).unwrap();
        }
        let stats = tree.validate().unwrap();
        assert_eq!(stats.nodes, 3);
        assert_eq!(stats.skeleton_nodes, 0);
        assert_eq!(stats.grouped_height, 1);
        assert_eq!((stats.fringes, stats.largest_fringe, stats.fringe_depth), (1, 3, 2));

        let root = tree.snapshot().unwrap().unwrap();
        assert!(root.fringe);
        assert_eq!(*root.keys[0], 3);
        assert!(root.left.as_ref().unwrap().fringe);
        assert!(root.right.as_ref().unwrap().fringe);
    }

    #[test]
    fn test_stats_track_growth_every_k_factor() {
        for k in K_FACTORS {
            let tree: GbsTree<u32> = GbsTree::new(GbsConfig::new(k, 3)).unwrap();
            for key in 0..3_000 {
                tree.insert(key).unwrap();
            }
            let stats = tree.validate().unwrap();
            assert_eq!(stats.keys, 3_000, "k={k}");
            assert!(stats.nodes >= 1_000, "k={k}");
            assert!(stats.largest_fringe < tree.profile.group_limit(), "k={k}");
            assert!(stats.fringe_depth < tree.profile.group_limit(), "k={k}");
            assert!(stats.grouped_height > 1, "k={k}");
        }
    }

    #[test]
    fn test_snapshot_matches_iteration() {
        let tree: GbsTree<u32> = GbsTree::new(GbsConfig::new(6, 4)).unwrap();
        for key in (0..500).map(|k| (k * 37) % 500) {
            tree.insert(key).unwrap();
        }
        let root = tree.snapshot().unwrap().unwrap();
        let snap: Vec<u32> = root.in_order_keys().iter().map(|k| **k).collect();
        let iter: Vec<u32> = tree.iter().map(|k| *k.unwrap()).collect();
        assert_eq!(snap, iter);
        assert_eq!(root.key_count(), 500);
        assert_eq!(root.node_count(), tree.node_count());
        assert!(root.height() >= tree.validate().unwrap().grouped_height);
    }

    #[test]
    fn test_validate_reports_broken_balance() {
        // 20 keys need seven nodes, so the root group has germinated.
        let tree: GbsTree<u32> = GbsTree::new(GbsConfig::new(4, 3)).unwrap();
        for key in 0..20 {
            tree.insert(key).unwrap();
        }
        assert!(!tree.root().unwrap().is_fringe());
        tree.root().unwrap().set_balance(1);
        assert!(matches!(
            tree.validate(),
            Err(TreeError::Corrupted {
                reason: "balance factor does not match grouped heights",
                ..
            })
        ));
    }

    #[test]
    fn test_validate_reports_skeleton_inside_group() {
        let tree: GbsTree<u32> = GbsTree::new(GbsConfig::new(4, 3)).unwrap();
        for key in 0..9 {
            tree.insert(key).unwrap();
        }
        tree.root().unwrap().left().unwrap().set_fringe(false);
        assert!(matches!(
            tree.validate(),
            Err(TreeError::Corrupted {
                reason: "skeleton node below a fringe node",
                ..
            })
        ));
    }
}
