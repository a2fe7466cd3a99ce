//! Page translation table.
//!
//! Maps a logical page number to the latest version of that page held by a
//! journal file: where it still lives in scratch memory, where it was
//! written inside the journal, and which transaction wrote it.

use nexus_common::types::{PageNumber, ScratchPos, TxnId};
use serde::{Deserialize, Serialize};

use crate::collections::ImmutableMap;

/// Location of one committed page version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PagePosition {
    /// Scratch allocation holding the page content until it is freed.
    pub scratch_pos: ScratchPos,
    /// Page offset inside the journal file.
    pub journal_pos: u64,
    /// Transaction that wrote this version.
    pub transaction_id: TxnId,
}

impl PagePosition {
    /// Creates a new page position.
    pub fn new(scratch_pos: ScratchPos, journal_pos: u64, transaction_id: TxnId) -> Self {
        Self {
            scratch_pos,
            journal_pos,
            transaction_id,
        }
    }

    /// Returns true if no transaction at or after `oldest_active` can see
    /// this version.
    pub fn is_older_than(&self, oldest_active: TxnId) -> bool {
        self.transaction_id < oldest_active
    }
}

/// Logical page number to latest page position.
pub type PageTranslationTable = ImmutableMap<PageNumber, PagePosition>;

/// Transaction id to the last journal page the transaction occupies,
/// overflow pages included.
pub type TransactionEndPositions = ImmutableMap<TxnId, u64>;

/// Running journal position of a transaction's data entries.
///
/// Entry `i` (1-based, the header page being entry 0) lands at
/// `header_position + i + overflow`, where `overflow` is the sum of the
/// extra pages taken by the overflow entries before it.
#[derive(Debug, Clone, Copy)]
pub struct JournalPositionCursor {
    header_position: u64,
    index: u64,
    overflow: u64,
    previous_span: u32,
    current: u64,
}

impl JournalPositionCursor {
    /// Starts a cursor for a transaction whose header page is written at
    /// `header_position`.
    pub fn new(header_position: u64) -> Self {
        Self {
            header_position,
            index: 0,
            overflow: 0,
            previous_span: 1,
            current: header_position,
        }
    }

    /// Returns the journal position of the next entry, which spans
    /// `number_of_pages` pages.
    pub fn next_position(&mut self, number_of_pages: u32) -> u64 {
        self.index += 1;
        self.overflow += u64::from(self.previous_span.saturating_sub(1));
        self.previous_span = number_of_pages;
        self.current = self.header_position + self.index + self.overflow;
        self.current
    }

    /// Last journal page taken by the entries seen so far, the last entry's
    /// overflow pages included. `None` before the first entry.
    pub fn last_page_position(&self) -> Option<u64> {
        (self.index > 0)
            .then(|| self.current + u64::from(self.previous_span.saturating_sub(1)))
    }
}
