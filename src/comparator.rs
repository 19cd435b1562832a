//! Key ordering for [`GbsTree`](crate::GbsTree).
//!
//! The tree never inspects keys itself. Two comparators are supplied at
//! construction:
//!
//! - the **insert comparator** defines the total order used by `insert` and
//!   `delete` (keys comparing equal are duplicates), and
//! - the **key comparator** is used by the `search_*` family and by the
//!   iterator when it has to re-establish its position.
//!
//! Any `Fn(&K, &K) -> Ordering + Send + Sync` closure is a comparator;
//! [`NaturalOrder`] uses `K: Ord`.

use std::cmp::Ordering;

/// A total order over keys of type `K`.
pub trait Comparator<K: ?Sized>: Send + Sync {
    /// Compare `left` with `right`.
    fn compare(&self, left: &K, right: &K) -> Ordering;
}

impl<K, F> Comparator<K> for F
where
    K: ?Sized,
    F: Fn(&K, &K) -> Ordering + Send + Sync,
{
    #[inline]
    fn compare(&self, left: &K, right: &K) -> Ordering {
        self(left, right)
    }
}

/// Comparator delegating to [`Ord`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NaturalOrder;

impl<K: Ord + ?Sized> Comparator<K> for NaturalOrder {
    #[inline]
    fn compare(&self, left: &K, right: &K) -> Ordering {
        left.cmp(right)
    }
}

// ============================================================================
//  SearchMode
// ============================================================================

/// Which key a search is looking for, relative to the probe key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchMode {
    /// The key comparing equal to the probe.
    Equal,
    /// The smallest key strictly greater than the probe.
    Greater,
    /// The smallest key greater than or equal to the probe.
    GreaterOrEqual,
}

impl SearchMode {
    /// Whether a stored key whose comparison against the probe is
    /// `stored_vs_probe` satisfies this mode.
    #[inline]
    #[must_use]
    pub const fn accepts(self, stored_vs_probe: Ordering) -> bool {
        match self {
            Self::Equal => matches!(stored_vs_probe, Ordering::Equal),
            Self::Greater => matches!(stored_vs_probe, Ordering::Greater),
            Self::GreaterOrEqual => !matches!(stored_vs_probe, Ordering::Less),
        }
    }
}
