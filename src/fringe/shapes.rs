//! Literal fringe shapes, one per K factor.
//!
//! A T0 shape turns a run of `size` fringe nodes (numbered `0..size` in key
//! order) into a complete little tree. Every [`Link`] rewires one internal
//! node; nodes not named by any link become the block's leaves. The finished
//! block still belongs to the fringe and counts as one level of grouped
//! height.
//!
//! A [`Germination`] splits a fringe group that reached its limit: the node
//! at `pivot` becomes a skeleton node, and each side is rebuilt as a T0 block
//! of the same K factor (K = 2 leaves two short chains instead).
//!
//! The shapes for K = 24 and K = 32 reuse the 15-node block: their left part
//! is exactly the K = 16 tree, the right part is either the 7-node block
//! offset by 16 (K = 24) or a second 15-node block (K = 32).

/// One internal node of a T0 shape, by in-order position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Link {
    pub(crate) node: u8,
    pub(crate) left: u8,
    pub(crate) right: u8,
}

const fn link(node: u8, left: u8, right: u8) -> Link {
    Link { node, left, right }
}

/// A complete T0 shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct T0Shape {
    /// Number of fringe nodes consumed.
    pub(crate) size: usize,
    /// In-order position of the block root.
    pub(crate) root: u8,
    pub(crate) links: &'static [Link],
}

/// How a full fringe group splits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Germination {
    /// Nodes in a group that has to split.
    pub(crate) size: usize,
    /// In-order position of the node that becomes the skeleton node.
    pub(crate) pivot: usize,
}

// ============================================================================
//  Shapes
// ============================================================================

//      1
//     / \
//    0   2
const THREE: [Link; 1] = [link(1, 0, 2)];

//        3
//       / \
//      1   4
//     / \
//    0   2
const FIVE: [Link; 2] = [link(3, 1, 4), link(1, 0, 2)];

//        3
//      /   \
//     1     5
//    / \   / \
//   0   2 4   6
const SEVEN: [Link; 3] = [link(3, 1, 5), link(1, 0, 2), link(5, 4, 6)];

//            7
//          /   \
//         3     9
//        / \   / \
//       1   5 8   10
//      / \ / \
//     0  2 4  6
const ELEVEN: [Link; 5] = [
    link(7, 3, 9),
    link(3, 1, 5),
    link(1, 0, 2),
    link(5, 4, 6),
    link(9, 8, 10),
];

//               7
//           /       \
//          3         11
//        /   \      /   \
//       1     5    9     13
//      / \   / \  / \   /  \
//     0   2 4  6 8  10 12  14
const FIFTEEN: [Link; 7] = [
    link(7, 3, 11),
    link(3, 1, 5),
    link(11, 9, 13),
    link(1, 0, 2),
    link(5, 4, 6),
    link(9, 8, 10),
    link(13, 12, 14),
];

//                    15
//               /          \
//          [0..=14]          19
//       (fifteen block)     /   \
//                         17     21
//                        / \    /  \
//                       16 18  20  22
const TWENTY_THREE: [Link; 11] = [
    link(15, 7, 19),
    link(7, 3, 11),
    link(3, 1, 5),
    link(11, 9, 13),
    link(1, 0, 2),
    link(5, 4, 6),
    link(9, 8, 10),
    link(13, 12, 14),
    link(19, 17, 21),
    link(17, 16, 18),
    link(21, 20, 22),
];

//                    15
//               /          \
//          [0..=14]       [16..=30]
//       (fifteen block)  (fifteen block + 16)
const THIRTY_ONE: [Link; 15] = [
    link(15, 7, 23),
    link(7, 3, 11),
    link(3, 1, 5),
    link(11, 9, 13),
    link(1, 0, 2),
    link(5, 4, 6),
    link(9, 8, 10),
    link(13, 12, 14),
    link(23, 19, 27),
    link(19, 17, 21),
    link(27, 25, 29),
    link(17, 16, 18),
    link(21, 20, 22),
    link(25, 24, 26),
    link(29, 28, 30),
];

/// T0 shape for `k_factor`.
pub(crate) const fn t0_shape(k_factor: usize) -> Option<T0Shape> {
    let shape: T0Shape = match k_factor {
        2 | 4 => T0Shape {
            size: 3,
            root: 1,
            links: &THREE,
        },
        6 => T0Shape {
            size: 5,
            root: 3,
            links: &FIVE,
        },
        8 => T0Shape {
            size: 7,
            root: 3,
            links: &SEVEN,
        },
        12 => T0Shape {
            size: 11,
            root: 7,
            links: &ELEVEN,
        },
        16 => T0Shape {
            size: 15,
            root: 7,
            links: &FIFTEEN,
        },
        24 => T0Shape {
            size: 23,
            root: 15,
            links: &TWENTY_THREE,
        },
        32 => T0Shape {
            size: 31,
            root: 15,
            links: &THIRTY_ONE,
        },
        _ => return None,
    };
    Some(shape)
}

// ============================================================================
//  Germinations
// ============================================================================
//
// A group splits once it holds a T0 block plus a tail that reached the
// maximum fringe imbalance. Except for K = 2, the pivot is the node right
// after the first T0 block's worth of nodes:
//
//   K = 8, 15 nodes:              7
//                              /     \
//                        [0..=6]      [8..=14]
//                      seven block   seven block
//
//   K = 12, 24 nodes:             11
//                              /      \
//                       [0..=10]       [12..=23]
//                    eleven block     eleven block, one tail node
//
//   K = 2, 5 nodes:               2
//                               /   \
//                            0->1   3->4

/// Germination for `k_factor`.
pub(crate) const fn germination(k_factor: usize) -> Option<Germination> {
    let (size, pivot): (usize, usize) = match k_factor {
        2 => (5, 2),
        4 => (7, 3),
        6 => (12, 5),
        8 => (15, 7),
        12 => (24, 11),
        16 => (31, 15),
        24 => (48, 23),
        32 => (63, 31),
        _ => return None,
    };
    Some(Germination { size, pivot })
}
