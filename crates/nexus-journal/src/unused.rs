//! Superseded page versions awaiting reclamation.
//!
//! When a transaction overwrites a page, the previous version leaves the
//! translation table but its scratch memory may still be read by older
//! transactions. It waits here until every such reader is gone.

use nexus_common::types::TxnId;

use crate::collections::ImmutableList;
use crate::translation::PagePosition;

/// Immutable list of superseded page positions.
#[derive(Debug, Clone, Default)]
pub struct UnusedPages {
    pages: ImmutableList<PagePosition>,
}

impl UnusedPages {
    /// Returns an empty tracker.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Number of superseded positions held.
    pub fn len(&self) -> usize {
        self.pages.len()
    }

    /// Returns true if nothing is pending reclamation.
    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    /// Iterates over the pending positions, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &PagePosition> {
        self.pages.iter()
    }

    /// Returns a tracker with `positions` appended.
    #[must_use]
    pub fn add_range(&self, positions: impl IntoIterator<Item = PagePosition>) -> Self {
        Self {
            pages: self.pages.add_range(positions),
        }
    }

    /// Splits off every position written before `oldest_active`.
    ///
    /// Returns the remaining tracker and the positions that can be freed.
    #[must_use]
    pub fn remove_older_than(&self, oldest_active: TxnId) -> (Self, Vec<PagePosition>) {
        let (pages, discarded) = self
            .pages
            .remove_all_and_get_discards(|pos| pos.is_older_than(oldest_active));
        (Self { pages }, discarded)
    }
}
