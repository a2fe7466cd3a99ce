//! Point-in-time view of a journal file.

use nexus_common::types::{JournalNumber, PageNumber, TxnId};

use crate::translation::{PagePosition, PageTranslationTable, TransactionEndPositions};

/// Immutable view of a journal file, taken for recovery and backup.
///
/// Later writes to the journal are never visible through a snapshot.
#[derive(Debug, Clone)]
pub struct JournalSnapshot {
    /// Journal file number.
    pub number: JournalNumber,
    /// Pages still free in the journal when the snapshot was taken.
    pub available_pages: u64,
    /// Translation table at snapshot time.
    pub page_translation_table: PageTranslationTable,
    /// Last journal page of every transaction at snapshot time.
    pub transaction_end_positions: TransactionEndPositions,
}

impl JournalSnapshot {
    /// Latest position of `page_number`, if the journal holds it.
    pub fn page_position(&self, page_number: PageNumber) -> Option<&PagePosition> {
        self.page_translation_table.get(&page_number)
    }

    /// Last journal page written by `transaction_id`.
    pub fn end_position(&self, transaction_id: TxnId) -> Option<u64> {
        self.transaction_end_positions.get(&transaction_id).copied()
    }
}
