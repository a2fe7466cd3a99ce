//! Journal replay.
//!
//! On startup every journal still holding unsynced transactions is read
//! back header by header to rebuild its translation table. Replay stops at
//! the first page that is not a valid, committed, intact transaction; that
//! is the end of the journal, not an error. Only inconsistencies inside a
//! payload that passed its checksum are reported as corruption.

use std::collections::HashMap;
use std::sync::Arc;

use nexus_common::types::{JournalNumber, PageNumber, TxnId};
use tracing::{debug, info, warn};

use crate::compression::decompress_payload;
use crate::error::{JournalError, JournalResult};
use crate::header::TransactionHeader;
use crate::journal::JournalFile;
use crate::page::PageHeader;
use crate::scratch::ScratchBufferPool;
use crate::translation::{
    JournalPositionCursor, PagePosition, PageTranslationTable, TransactionEndPositions,
};
use crate::writer::JournalWriter;

/// Replays the transactions of one journal.
pub struct JournalReader<'a, W: JournalWriter> {
    writer: &'a W,
    pool: &'a dyn ScratchBufferPool,
    page_size: usize,
    last_synced_transaction: TxnId,
    verify_checksums: bool,
    read_at: u64,
    require_header_update: bool,
    last_transaction_header: Option<TransactionHeader>,
    page_translation_table: PageTranslationTable,
    transaction_end_positions: TransactionEndPositions,
    transactions_replayed: u64,
    transactions_skipped: u64,
}

impl<'a, W: JournalWriter> JournalReader<'a, W> {
    /// Creates a reader over `writer`.
    ///
    /// Recovered pages are copied into `pool`. Transactions up to and
    /// including `last_synced_transaction` are already in the data file and
    /// are skipped.
    pub fn new(
        writer: &'a W,
        pool: &'a dyn ScratchBufferPool,
        last_synced_transaction: TxnId,
    ) -> Self {
        Self {
            writer,
            pool,
            page_size: writer.page_size(),
            last_synced_transaction,
            verify_checksums: true,
            read_at: 0,
            require_header_update: false,
            last_transaction_header: None,
            page_translation_table: PageTranslationTable::empty(),
            transaction_end_positions: TransactionEndPositions::empty(),
            transactions_replayed: 0,
            transactions_skipped: 0,
        }
    }

    /// Sets whether payload checksums are verified.
    #[must_use]
    pub fn with_verify_checksums(mut self, verify: bool) -> Self {
        self.verify_checksums = verify;
        self
    }

    /// Starts reading at page `position` instead of page 0.
    pub fn set_start_page(&mut self, position: u64) {
        self.read_at = position;
    }

    /// Page following the last transaction read.
    pub fn next_write_page(&self) -> u64 {
        self.read_at
    }

    /// Translation table rebuilt so far.
    pub fn page_translation_table(&self) -> PageTranslationTable {
        self.page_translation_table.clone()
    }

    /// End positions of the transactions replayed so far.
    pub fn transaction_end_positions(&self) -> TransactionEndPositions {
        self.transaction_end_positions.clone()
    }

    /// True if replay stopped on a damaged transaction, meaning the file
    /// header must be rewritten to forget it.
    pub fn require_header_update(&self) -> bool {
        self.require_header_update
    }

    /// Header of the last transaction read.
    pub fn last_transaction_header(&self) -> Option<&TransactionHeader> {
        self.last_transaction_header.as_ref()
    }

    /// Replays every transaction up to the end of the journal.
    pub fn recover(&mut self) -> JournalResult<()> {
        while self.read_one_transaction()? {}

        info!(
            replayed = self.transactions_replayed,
            skipped = self.transactions_skipped,
            next_write_page = self.read_at,
            pages = self.page_translation_table.len(),
            require_header_update = self.require_header_update,
            "journal replay finished"
        );
        Ok(())
    }

    /// Reads the next transaction.
    ///
    /// Returns `Ok(false)` once the end of the valid journal data is
    /// reached.
    pub fn read_one_transaction(&mut self) -> JournalResult<bool> {
        let allocated = self.writer.number_of_allocated_pages();
        if self.read_at >= allocated {
            return Ok(false);
        }

        let mut header_page = vec![0u8; self.page_size];
        if !self.writer.read(self.read_at, &mut header_page)? {
            return Ok(false);
        }
        let header = TransactionHeader::from_bytes(&header_page)?;

        if !header.has_valid_marker() {
            // zeroed or garbage tail
            self.require_header_update = false;
            return Ok(false);
        }
        if let Some(previous) = &self.last_transaction_header {
            if header.transaction_id <= previous.transaction_id {
                // leftover from an earlier use of the file
                self.require_header_update = false;
                return Ok(false);
            }
        }
        if !header.is_committed() {
            return Ok(self.stop(&header, "transaction was not committed"));
        }

        let payload_pages = header.payload_pages(self.page_size);
        if self.read_at + 1 + payload_pages > allocated {
            return Ok(self.stop(&header, "transaction extends past the end of the journal"));
        }

        let total_pages = header.total_pages(self.page_size);
        if header.transaction_id <= self.last_synced_transaction {
            debug!(txn = %header.transaction_id, "skipping synced transaction");
            self.read_at += total_pages;
            self.last_transaction_header = Some(header);
            self.transactions_skipped += 1;
            return Ok(true);
        }

        let mut payload = vec![0u8; payload_pages as usize * self.page_size];
        if !self.writer.read(self.read_at + 1, &mut payload)? {
            return Ok(self.stop(&header, "transaction payload is truncated"));
        }
        let compressed = &payload[..header.compressed_size as usize];

        if self.verify_checksums && !header.verify_crc(compressed) {
            return Ok(self.stop(&header, "transaction checksum mismatch"));
        }

        let data_pages = u64::from(header.number_of_pages.saturating_sub(1));
        if header.page_count == 0
            || u64::from(header.page_count) > data_pages
            || u64::from(header.uncompressed_size) != data_pages * self.page_size as u64
        {
            return Ok(self.stop(&header, "transaction sizes are inconsistent"));
        }

        let mut data = vec![0u8; header.uncompressed_size as usize];
        if let Err(e) = decompress_payload(compressed, &mut data) {
            warn!(txn = %header.transaction_id, error = %e, "could not decompress transaction");
            self.require_header_update = true;
            return Ok(false);
        }

        self.apply(&header, &data)?;

        self.read_at += total_pages;
        self.last_transaction_header = Some(header);
        self.transactions_replayed += 1;
        Ok(true)
    }

    /// Copies the pages of a decompressed transaction into scratch memory
    /// and records them.
    fn apply(&mut self, header: &TransactionHeader, data: &[u8]) -> JournalResult<()> {
        let mut entries: HashMap<PageNumber, PagePosition> =
            HashMap::with_capacity(header.page_count as usize);
        let mut cursor = JournalPositionCursor::new(self.read_at);
        let mut offset = 0;
        let mut pages_seen: u64 = 1;

        for _ in 0..header.page_count {
            let page_header = data
                .get(offset..)
                .filter(|rest| rest.len() >= PageHeader::SIZE)
                .map(PageHeader::from_bytes)
                .transpose()?
                .ok_or_else(|| {
                    JournalError::corrupted(
                        self.read_at,
                        format!("page header at offset {offset} is out of bounds"),
                    )
                })?;

            let number_of_pages = page_header.number_of_pages(self.page_size);
            let end = offset + number_of_pages as usize * self.page_size;
            let run = data.get(offset..end).ok_or_else(|| {
                JournalError::corrupted(
                    self.read_at,
                    format!(
                        "page {} spans past the transaction data",
                        page_header.page_number
                    ),
                )
            })?;

            let scratch_pos = self.pool.allocate(number_of_pages)?;
            self.pool.write(scratch_pos, run)?;

            let journal_pos = cursor.next_position(number_of_pages);
            let position = PagePosition::new(scratch_pos, journal_pos, header.transaction_id);
            if let Some(replaced) = entries.insert(page_header.page_number, position) {
                // written twice by the same transaction
                self.pool.free(replaced.scratch_pos);
            }

            pages_seen += u64::from(number_of_pages);
            offset = end;
        }

        if pages_seen != u64::from(header.number_of_pages) {
            return Err(JournalError::corrupted(
                self.read_at,
                format!(
                    "transaction {} holds {} pages, header says {}",
                    header.transaction_id, pages_seen, header.number_of_pages
                ),
            ));
        }
        let Some(last_page_position) = cursor.last_page_position() else {
            return Err(JournalError::corrupted(
                self.read_at,
                format!("transaction {} has no pages", header.transaction_id),
            ));
        };

        for page_number in entries.keys() {
            if let Some(superseded) = self.page_translation_table.get(page_number) {
                self.pool.free(superseded.scratch_pos);
            }
        }
        self.page_translation_table = self.page_translation_table.set_items(entries);
        self.transaction_end_positions = self
            .transaction_end_positions
            .insert(header.transaction_id, last_page_position);

        debug!(
            txn = %header.transaction_id,
            position = self.read_at,
            pages = header.page_count,
            "replayed transaction"
        );
        Ok(())
    }

    /// Ends replay on a damaged transaction.
    fn stop(&mut self, header: &TransactionHeader, reason: &str) -> bool {
        warn!(
            txn = %header.transaction_id,
            position = self.read_at,
            reason,
            "stopping journal replay"
        );
        self.require_header_update = true;
        false
    }
}

impl<W: JournalWriter> std::fmt::Debug for JournalReader<'_, W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JournalReader")
            .field("read_at", &self.read_at)
            .field("last_synced_transaction", &self.last_synced_transaction)
            .field("require_header_update", &self.require_header_update)
            .field("pages", &self.page_translation_table.len())
            .finish()
    }
}

/// Replays `writer` and returns a journal file positioned after the last
/// valid transaction, its translation table rebuilt.
pub fn recover_journal<W: JournalWriter>(
    writer: Arc<W>,
    number: JournalNumber,
    pool: &dyn ScratchBufferPool,
    last_synced_transaction: TxnId,
    verify_checksums: bool,
) -> JournalResult<JournalFile<W>> {
    let mut reader = JournalReader::new(writer.as_ref(), pool, last_synced_transaction)
        .with_verify_checksums(verify_checksums);
    reader.recover()?;

    let journal = JournalFile::new(Arc::clone(&writer), number);
    journal.init_from(
        &reader,
        reader.page_translation_table(),
        reader.transaction_end_positions(),
    );
    Ok(journal)
}
