//! Error types of the GBS tree.
//!
//! Three kinds of failure exist, and only two of them ever reach a caller:
//!
//! - [`ConfigError`]: invalid construction parameters.
//! - [`TreeError`]: corruption detected by a writer or by a validated reader,
//!   and usage errors of the iterator.
//! - [`Interference`]: an optimistic traversal ran into a node that a
//!   concurrent writer was rewiring. Recovered internally by retrying under
//!   the tree lock; never surfaces.

use std::fmt as StdFmt;

use crate::tree::{MAX_NODE_WIDTH, MIN_NODE_WIDTH};

// ============================================================================
//  ConfigError
// ============================================================================

/// Invalid [`GbsConfig`](crate::GbsConfig) values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    /// The K factor is not one of the supported fan-outs.
    InvalidKFactor {
        /// The rejected value.
        k_factor: usize,
    },

    /// The node width is outside `3..=2000`.
    InvalidNodeWidth {
        /// The rejected value.
        node_width: usize,
    },
}

impl StdFmt::Display for ConfigError {
    fn fmt(&self, f: &mut StdFmt::Formatter<'_>) -> StdFmt::Result {
        match self {
            Self::InvalidKFactor { k_factor } => write!(
                f,
                "Invalid K factor (k): {k_factor}. Valid K factors are {{2, 4, 6, 8, 12, 16, 24, 32}}."
            ),

            Self::InvalidNodeWidth { node_width } => write!(
                f,
                "Invalid node width (n): {node_width}. Minimum required is {MIN_NODE_WIDTH}. \
                 Maximum (arbitrary) limit is {MAX_NODE_WIDTH}."
            ),
        }
    }
}

impl std::error::Error for ConfigError {}

// ============================================================================
//  TreeError
// ============================================================================

/// Errors surfaced by tree operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TreeError {
    /// A structural invariant does not hold although no writer was active.
    Corrupted {
        /// What was found broken.
        reason: &'static str,
        /// `vno` at the time of detection.
        vno: u64,
    },

    /// A delete found fewer keys than the tree's population count claims.
    PopulationUnderflow,

    /// A balance factor outside `-1..=1`.
    InvalidBalance {
        /// The offending value.
        balance: i8,
    },

    /// A traversal under the tree lock went deeper than any valid tree can.
    DepthExceeded {
        /// The stack bound that was hit.
        limit: usize,
    },

    /// `remove()` called on an iterator with no current key.
    NoCurrentKey,
}

impl StdFmt::Display for TreeError {
    fn fmt(&self, f: &mut StdFmt::Formatter<'_>) -> StdFmt::Result {
        match self {
            Self::Corrupted { reason, vno } => {
                write!(f, "tree corrupted at vno {vno}: {reason}")
            }

            Self::PopulationUnderflow => write!(f, "population count went negative"),

            Self::InvalidBalance { balance } => {
                write!(f, "balance factor {balance} out of range")
            }

            Self::DepthExceeded { limit } => {
                write!(f, "traversal exceeded maximum depth {limit}")
            }

            Self::NoCurrentKey => write!(f, "remove() called without a current key"),
        }
    }
}

impl TreeError {
    /// Fill in the `vno` and depth bound of an error promoted from an
    /// [`Interference`] by code that did not know them.
    #[must_use]
    pub(crate) fn stamped(self, vno: u64, depth_limit: usize) -> Self {
        match self {
            Self::Corrupted { reason, vno: 0 } => Self::Corrupted { reason, vno },
            Self::DepthExceeded { limit: 0 } => Self::DepthExceeded { limit: depth_limit },
            other => other,
        }
    }
}

impl std::error::Error for TreeError {}

// ============================================================================
//  Interference
// ============================================================================

/// Why a traversal or a locked rewrite gave up.
///
/// Readers only ever report the first two: whatever they see mid-write is
/// retried. The others come from writer-side checks under the tree lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Interference {
    /// A link, key slot or population read made no sense.
    NullReference,
    /// The path grew past the stack bound.
    DepthExceeded,
    /// A key write or removal addressed a slot outside the node population.
    SlotOutOfRange,
    /// A stacked node no longer hangs from the node stacked above it.
    Unlinked,
    /// A fringe group had the wrong node count for its literal shape, or a
    /// skeleton node below it.
    ShapeMismatch,
}

impl Interference {
    /// Promote to a [`TreeError`] when no concurrent writer can explain it.
    pub(crate) const fn into_corruption(self, vno: u64, depth_limit: usize) -> TreeError {
        let reason: &'static str = match self {
            Self::DepthExceeded => return TreeError::DepthExceeded { limit: depth_limit },
            Self::NullReference => "null reference during locked traversal",
            Self::SlotOutOfRange => "slot index outside the node population",
            Self::Unlinked => "stacked node is not a child of its stacked parent",
            Self::ShapeMismatch => "fringe group does not fit its literal shape",
        };
        TreeError::Corrupted { reason, vno }
    }
}

impl From<Interference> for TreeError {
    fn from(value: Interference) -> Self {
        value.into_corruption(0, 0)
    }
}

impl StdFmt::Display for Interference {
    fn fmt(&self, f: &mut StdFmt::Formatter<'_>) -> StdFmt::Result {
        match self {
            Self::NullReference => write!(f, "null reference"),
            Self::DepthExceeded => write!(f, "depth exceeded"),
            Self::SlotOutOfRange => write!(f, "slot out of range"),
            Self::Unlinked => write!(f, "unlinked stack entry"),
            Self::ShapeMismatch => write!(f, "shape mismatch"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error_messages() {
        let k = ConfigError::InvalidKFactor { k_factor: 5 };
        assert_eq!(
            k.to_string(),
            "Invalid K factor (k): 5. Valid K factors are {2, 4, 6, 8, 12, 16, 24, 32}."
        );

        let n = ConfigError::InvalidNodeWidth { node_width: 2 };
        assert_eq!(
            n.to_string(),
            "Invalid node width (n): 2. Minimum required is 3. Maximum (arbitrary) limit is 2000."
        );
    }

    #[test]
    fn test_interference_promotion() {
        assert_eq!(
            Interference::DepthExceeded.into_corruption(4, 53),
            TreeError::DepthExceeded { limit: 53 }
        );
        assert!(matches!(
            Interference::NullReference.into_corruption(8, 53),
            TreeError::Corrupted { vno: 8, .. }
        ));
    }

    #[test]
    fn test_writer_side_causes_keep_their_own_reasons() {
        let reasons: Vec<&'static str> = [
            Interference::NullReference,
            Interference::SlotOutOfRange,
            Interference::Unlinked,
            Interference::ShapeMismatch,
        ]
        .into_iter()
        .map(|cause| match TreeError::from(cause) {
            TreeError::Corrupted { reason, .. } => reason,
            other => panic!("{cause} promoted to {other:?}"),
        })
        .collect();

        assert_eq!(reasons[1], "slot index outside the node population");
        for (i, reason) in reasons.iter().enumerate() {
            assert!(!reasons[i + 1..].contains(reason), "{reason} reused");
        }
    }

    #[test]
    fn test_stamped_fills_unknown_context() {
        let promoted: TreeError = Interference::NullReference.into();
        assert!(matches!(promoted.stamped(12, 53), TreeError::Corrupted { vno: 12, .. }));

        let promoted: TreeError = Interference::DepthExceeded.into();
        assert_eq!(promoted.stamped(12, 53), TreeError::DepthExceeded { limit: 53 });

        assert_eq!(
            TreeError::InvalidBalance { balance: 2 }.stamped(12, 53),
            TreeError::InvalidBalance { balance: 2 }
        );
    }

    #[test]
    fn test_tree_error_display() {
        assert_eq!(
            TreeError::InvalidBalance { balance: 2 }.to_string(),
            "balance factor 2 out of range"
        );
        assert_eq!(
            TreeError::NoCurrentKey.to_string(),
            "remove() called without a current key"
        );
    }
}
