//! Journal file.
//!
//! A `JournalFile` appends committed transactions to one journal and keeps
//! the in-memory index of what the journal holds:
//!
//! - the page translation table, logical page number to latest version;
//! - the end position of every transaction written;
//! - superseded page versions waiting until no active transaction can
//!   read them.
//!
//! All three are immutable snapshots. A write computes its updates without
//! holding any lock, then swaps the new snapshots in together under a single
//! short lock, so readers see either all of a transaction or none of it.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use nexus_common::types::{JournalNumber, PageNumber, TxnId};
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::compression::{compress_pages, CompressionStaging};
use crate::error::{JournalError, JournalResult};
use crate::header::TransactionHeader;
use crate::reader::JournalReader;
use crate::scratch::ScratchBufferPool;
use crate::snapshot::JournalSnapshot;
use crate::transaction::JournalTransaction;
use crate::translation::{
    JournalPositionCursor, PagePosition, PageTranslationTable, TransactionEndPositions,
};
use crate::unused::UnusedPages;
use crate::writer::JournalWriter;

/// Journal file statistics.
#[derive(Debug, Default)]
pub struct JournalStats {
    /// Transactions written.
    pub transactions_written: AtomicU64,
    /// Physical journal pages written, header pages included.
    pub pages_written: AtomicU64,
    /// Payload bytes before compression.
    pub uncompressed_bytes: AtomicU64,
    /// Payload bytes after compression.
    pub compressed_bytes: AtomicU64,
    /// Scratch allocations returned to the pool.
    pub scratch_pages_freed: AtomicU64,
}

/// Mutable state, replaced under the lock.
#[derive(Debug, Clone, Default)]
struct JournalState {
    write_page: u64,
    page_translation_table: PageTranslationTable,
    transaction_end_positions: TransactionEndPositions,
    unused_pages: UnusedPages,
}

/// Translation updates computed for one transaction.
struct StagedTranslation {
    entries: HashMap<PageNumber, PagePosition>,
    unused: Vec<PagePosition>,
    last_page_position: u64,
}

/// One journal file and its page translation index.
pub struct JournalFile<W: JournalWriter> {
    number: JournalNumber,
    writer: Arc<W>,
    state: Mutex<JournalState>,
    refs: AtomicUsize,
    disposed: AtomicBool,
    writer_closed: AtomicBool,
    stats: JournalStats,
}

impl<W: JournalWriter> JournalFile<W> {
    /// Creates a journal file that starts writing at page 0.
    pub fn new(writer: Arc<W>, number: JournalNumber) -> Self {
        Self {
            number,
            writer,
            state: Mutex::new(JournalState::default()),
            refs: AtomicUsize::new(0),
            disposed: AtomicBool::new(false),
            writer_closed: AtomicBool::new(false),
            stats: JournalStats::default(),
        }
    }

    /// Resumes writing an existing journal after `last_synced_page`.
    pub fn resume(writer: Arc<W>, number: JournalNumber, last_synced_page: u64) -> Self {
        let file = Self::new(writer, number);
        file.state.lock().write_page = last_synced_page + 1;
        file
    }

    /// Journal file number.
    pub fn number(&self) -> JournalNumber {
        self.number
    }

    /// Next unwritten page of the journal.
    pub fn write_page_position(&self) -> u64 {
        self.state.lock().write_page
    }

    /// Pages still free in the journal.
    pub fn available_pages(&self) -> u64 {
        let write_page = self.write_page_position();
        self.writer
            .number_of_allocated_pages()
            .saturating_sub(write_page)
    }

    /// Current translation table.
    pub fn page_translation_table(&self) -> PageTranslationTable {
        self.state.lock().page_translation_table.clone()
    }

    /// Current transaction end positions.
    pub fn transaction_end_positions(&self) -> TransactionEndPositions {
        self.state.lock().transaction_end_positions.clone()
    }

    /// Superseded page versions not reclaimed yet.
    pub fn unused_pages(&self) -> UnusedPages {
        self.state.lock().unused_pages.clone()
    }

    /// The journal writer.
    pub fn writer(&self) -> &Arc<W> {
        &self.writer
    }

    /// Journal statistics.
    pub fn stats(&self) -> &JournalStats {
        &self.stats
    }

    /// Outstanding references.
    pub fn ref_count(&self) -> usize {
        self.refs.load(Ordering::Acquire)
    }

    /// Returns true once the file was disposed.
    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    /// Sets whether the journal is deleted when its writer is disposed.
    pub fn set_delete_on_close(&self, delete: bool) {
        self.writer.set_delete_on_close(delete);
    }

    /// Returns a consistent point-in-time view of the journal.
    pub fn get_snapshot(&self) -> JournalSnapshot {
        let state = self.state.lock();
        JournalSnapshot {
            number: self.number,
            available_pages: self
                .writer
                .number_of_allocated_pages()
                .saturating_sub(state.write_page),
            page_translation_table: state.page_translation_table.clone(),
            transaction_end_positions: state.transaction_end_positions.clone(),
        }
    }

    /// Appends a committed transaction to the journal.
    ///
    /// Compresses the transaction, publishes its translation updates and
    /// starts the physical write. The translation updates are visible as
    /// soon as this returns; the transaction is durable only once the
    /// returned future completes successfully.
    ///
    /// `number_of_pages` is the transaction's page count, header page
    /// included.
    pub fn write<T>(
        &self,
        tx: &T,
        number_of_pages: u32,
        staging: &mut CompressionStaging,
    ) -> JournalResult<impl Future<Output = JournalResult<()>> + Send + 'static>
    where
        T: JournalTransaction + ?Sized,
    {
        self.ensure_live()?;

        let write_page = self.state.lock().write_page;

        let compressed = compress_pages(tx, number_of_pages, staging)?;
        let required = compressed.physical_pages();
        let available = self
            .writer
            .number_of_allocated_pages()
            .saturating_sub(write_page);
        if required > available {
            return Err(JournalError::JournalFull {
                number: self.number,
                required,
                available,
            });
        }

        let mut staged = Self::stage_translation(tx, write_page)?;

        {
            let mut state = self.state.lock();
            debug_assert_eq!(
                state.write_page, write_page,
                "journal file {} written concurrently",
                self.number
            );
            // superseded versions are looked up under the lock, reclamation
            // may have freed entries since the write started
            for page_number in staged.entries.keys() {
                if let Some(previous) = state.page_translation_table.get(page_number) {
                    staged.unused.push(*previous);
                }
            }
            state.write_page += required;
            state.transaction_end_positions = state
                .transaction_end_positions
                .insert(tx.id(), staged.last_page_position);
            state.page_translation_table = state.page_translation_table.set_items(staged.entries);
            state.unused_pages = state.unused_pages.add_range(staged.unused);
        }

        let header = compressed.header;
        self.stats.transactions_written.fetch_add(1, Ordering::Relaxed);
        self.stats.pages_written.fetch_add(required, Ordering::Relaxed);
        self.stats
            .uncompressed_bytes
            .fetch_add(u64::from(header.uncompressed_size), Ordering::Relaxed);
        self.stats
            .compressed_bytes
            .fetch_add(u64::from(header.compressed_size), Ordering::Relaxed);

        debug!(
            journal = %self.number,
            txn = %tx.id(),
            position = write_page,
            pages = required,
            compressed = header.compressed_size,
            uncompressed = header.uncompressed_size,
            "wrote transaction to journal"
        );

        let offset = write_page * self.writer.page_size() as u64;
        let writer = Arc::clone(&self.writer);
        let pages = compressed.pages;
        Ok(async move { writer.write_gather(offset, pages).await })
    }

    /// Computes the translation entries of `tx`.
    fn stage_translation<T>(
        tx: &T,
        write_page: u64,
    ) -> JournalResult<StagedTranslation>
    where
        T: JournalTransaction + ?Sized,
    {
        let pool = tx.scratch_pool();
        let tx_pages = tx.transaction_pages();

        let mut entries: HashMap<PageNumber, PagePosition> = HashMap::with_capacity(tx_pages.len());
        let mut unused = Vec::new();
        let mut cursor = JournalPositionCursor::new(write_page);

        for tx_page in tx_pages.iter().skip(1) {
            let page_number = pool.read_page(tx_page.position_in_scratch)?.page_number()?;

            let journal_pos = cursor.next_position(tx_page.number_of_pages);
            let position = PagePosition::new(tx_page.position_in_scratch, journal_pos, tx.id());
            if let Some(replaced) = entries.insert(page_number, position) {
                // written twice by the same transaction
                unused.push(replaced);
            }
        }

        let last_page_position = cursor.last_page_position().ok_or_else(|| {
            JournalError::invalid_transaction(format!("transaction {} has no data pages", tx.id()))
        })?;

        Ok(StagedTranslation {
            entries,
            unused,
            last_page_position,
        })
    }

    /// Reclaims scratch memory no active transaction can observe.
    ///
    /// Removes every superseded version and every translation entry written
    /// before `oldest_active`, then frees their scratch allocations outside
    /// the lock. Returns the number of allocations freed.
    pub fn free_scratch_pages_older_than(
        &self,
        pool: &dyn ScratchBufferPool,
        oldest_active: TxnId,
    ) -> usize {
        let (unused, expired) = {
            let mut state = self.state.lock();
            let (unused_pages, unused) = state.unused_pages.remove_older_than(oldest_active);
            let (table, expired) = state
                .page_translation_table
                .remove_where(|_, position| position.is_older_than(oldest_active));
            state.unused_pages = unused_pages;
            state.page_translation_table = table;
            (unused, expired)
        };

        for position in &unused {
            pool.free(position.scratch_pos);
        }
        for (_, position) in &expired {
            pool.free(position.scratch_pos);
        }

        let freed = unused.len() + expired.len();
        if freed > 0 {
            self.stats
                .scratch_pages_freed
                .fetch_add(freed as u64, Ordering::Relaxed);
            debug!(
                journal = %self.number,
                oldest_active = %oldest_active,
                superseded = unused.len(),
                expired = expired.len(),
                "freed scratch pages"
            );
        }
        freed
    }

    /// Replaces the write position and the index with the outcome of a
    /// replay.
    pub fn init_from<R: JournalWriter>(
        &self,
        reader: &JournalReader<'_, R>,
        page_translation_table: PageTranslationTable,
        transaction_end_positions: TransactionEndPositions,
    ) {
        let mut state = self.state.lock();
        state.write_page = reader.next_write_page();
        state.page_translation_table = page_translation_table;
        state.transaction_end_positions = transaction_end_positions;
    }

    /// Reads the transaction header stored at page `position`.
    ///
    /// Returns `Ok(None)` when the position lies past the end of the
    /// journal. The header is returned as stored; callers validate it.
    pub fn read_transaction(&self, position: u64) -> JournalResult<Option<TransactionHeader>> {
        self.ensure_live()?;

        let mut buf = [0u8; TransactionHeader::SIZE];
        if !self.writer.read(position, &mut buf)? {
            return Ok(None);
        }
        TransactionHeader::from_bytes(&buf).map(Some)
    }

    /// Takes a reference.
    pub fn add_ref(&self) {
        self.refs.fetch_add(1, Ordering::AcqRel);
    }

    /// Drops a reference, disposing the file when it was the last one.
    ///
    /// Returns true if this call disposed the file.
    pub fn release(&self) -> JournalResult<bool> {
        let previous = self
            .refs
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |refs| refs.checked_sub(1))
            .map_err(|_| JournalError::ReleasedTooManyTimes {
                number: self.number,
            })?;

        if previous == 1 {
            self.dispose();
            return Ok(true);
        }
        Ok(false)
    }

    /// Disposes the file and closes its writer, whatever the reference
    /// count.
    pub fn dispose(&self) {
        self.dispose_without_closing_pager();
        if !self.writer_closed.swap(true, Ordering::AcqRel) {
            self.writer.dispose();
        }
    }

    /// Marks the file disposed but leaves the writer open for its new
    /// owner.
    pub fn dispose_without_closing_pager(&self) {
        if self.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        debug!(journal = %self.number, "disposed journal file");
    }

    fn ensure_live(&self) -> JournalResult<()> {
        if self.is_disposed() {
            return Err(JournalError::Disposed {
                number: self.number,
            });
        }
        Ok(())
    }
}

impl<W: JournalWriter> fmt::Display for JournalFile<W> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Number: {}", self.number)
    }
}

impl<W: JournalWriter> fmt::Debug for JournalFile<W> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("JournalFile")
            .field("number", &self.number)
            .field("write_page", &state.write_page)
            .field("pages", &state.page_translation_table.len())
            .field("unused", &state.unused_pages.len())
            .field("refs", &self.ref_count())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

impl<W: JournalWriter> Drop for JournalFile<W> {
    fn drop(&mut self) {
        if self.is_disposed() {
            return;
        }

        let refs = self.ref_count();
        if refs > 0 {
            warn!(
                journal = %self.number,
                refs,
                "journal file dropped while still referenced, it should be disposed through release()"
            );
        }
        self.dispose();
    }
}

#[cfg(test)]
mod tests {
    use nexus_common::types::ScratchPos;

    use super::*;
    use crate::page::{PageHandle, PageHeader};
    use crate::scratch::MemoryScratchPool;
    use crate::transaction::PreparedTransaction;
    use crate::writer::MemoryJournalWriter;

    const PAGE_SIZE: usize = 1024;

    struct Fixture {
        pool: Arc<MemoryScratchPool>,
        writer: Arc<MemoryJournalWriter>,
        journal: JournalFile<MemoryJournalWriter>,
        staging: CompressionStaging,
    }

    fn fixture(allocated_pages: u64) -> Fixture {
        let writer = Arc::new(MemoryJournalWriter::new(PAGE_SIZE, allocated_pages));
        Fixture {
            pool: Arc::new(MemoryScratchPool::new(PAGE_SIZE)),
            journal: JournalFile::new(writer.clone(), JournalNumber::new(1)),
            writer,
            staging: CompressionStaging::new(PAGE_SIZE),
        }
    }

    impl Fixture {
        /// Builds a transaction; a span above 1 becomes an overflow value.
        fn transaction(&self, txn: u64, pages: &[(u64, u32)]) -> PreparedTransaction {
            let mut tx = PreparedTransaction::begin(TxnId::new(txn), self.pool.clone()).unwrap();
            for (page, span) in pages {
                if *span == 1 {
                    tx.add_page(PageNumber::new(*page), &page.to_be_bytes()).unwrap();
                } else {
                    let len = *span as usize * PAGE_SIZE - PageHeader::SIZE;
                    tx.add_overflow(PageNumber::new(*page), &vec![*page as u8; len])
                        .unwrap();
                }
            }
            tx
        }

        async fn commit(&mut self, txn: u64, pages: &[(u64, u32)]) -> PreparedTransaction {
            let tx = self.transaction(txn, pages);
            self.journal
                .write(&tx, tx.number_of_pages(), &mut self.staging)
                .unwrap()
                .await
                .unwrap();
            tx
        }
    }

    fn journal_pos(journal: &JournalFile<MemoryJournalWriter>, page: u64) -> u64 {
        journal
            .page_translation_table()
            .get(&PageNumber::new(page))
            .unwrap()
            .journal_pos
    }

    #[tokio::test]
    async fn test_write_two_single_pages() {
        let mut f = fixture(64);
        let tx = f.commit(1, &[(5, 1), (9, 1)]).await;

        // header page + one compressed payload page
        assert_eq!(f.journal.write_page_position(), 2);
        assert_eq!(f.journal.available_pages(), 62);

        let table = f.journal.page_translation_table();
        assert_eq!(table.len(), 2);
        let five = table.get(&PageNumber::new(5)).unwrap();
        let nine = table.get(&PageNumber::new(9)).unwrap();
        assert_eq!(five.transaction_id, TxnId::new(1));
        assert_eq!(nine.transaction_id, TxnId::new(1));
        assert_eq!(five.scratch_pos, tx.transaction_pages()[1].position_in_scratch);
        assert_eq!(nine.scratch_pos, tx.transaction_pages()[2].position_in_scratch);
        assert_eq!((five.journal_pos, nine.journal_pos), (1, 2));
        assert_eq!(
            f.journal.transaction_end_positions().get(&TxnId::new(1)),
            Some(&2)
        );

        // the stamped header is page 0 of the journal
        let header = f.journal.read_transaction(0).unwrap().unwrap();
        assert!(header.has_valid_marker());
        assert_eq!(header.transaction_id, TxnId::new(1));
        assert_eq!(header.page_count, 2);
        assert_eq!(f.writer.write_count(), 1);
    }

    #[tokio::test]
    async fn test_overflow_offsets() {
        let mut f = fixture(64);
        f.commit(1, &[(1, 1), (2, 3), (3, 1), (4, 2), (5, 2)]).await;

        assert_eq!(journal_pos(&f.journal, 1), 1);
        assert_eq!(journal_pos(&f.journal, 2), 2);
        assert_eq!(journal_pos(&f.journal, 3), 5);
        assert_eq!(journal_pos(&f.journal, 4), 6);
        assert_eq!(journal_pos(&f.journal, 5), 8);
        assert_eq!(
            f.journal.transaction_end_positions().get(&TxnId::new(1)),
            Some(&9)
        );
    }

    #[tokio::test]
    async fn test_positions_follow_write_page() {
        let mut f = fixture(64);
        f.commit(1, &[(1, 1)]).await;
        let after_first = f.journal.write_page_position();
        f.commit(2, &[(2, 1), (3, 1)]).await;

        assert_eq!(journal_pos(&f.journal, 2), after_first + 1);
        assert_eq!(journal_pos(&f.journal, 3), after_first + 2);
    }

    #[tokio::test]
    async fn test_write_position_is_monotonic() {
        let mut f = fixture(256);
        let mut expected = 0;
        for txn in 1..=10u64 {
            let tx = f.transaction(txn, &[(txn, 1), (txn + 100, 2)]);
            let before = f.journal.write_page_position();
            f.journal
                .write(&tx, tx.number_of_pages(), &mut f.staging)
                .unwrap()
                .await
                .unwrap();
            let after = f.journal.write_page_position();
            assert!(after > before);
            expected += after - before;
        }
        assert_eq!(f.journal.write_page_position(), expected);
        assert_eq!(
            f.journal.stats().pages_written.load(Ordering::Relaxed),
            expected
        );
    }

    #[tokio::test]
    async fn test_supersession_moves_old_position() {
        let mut f = fixture(64);
        let first = f.commit(1, &[(5, 1), (9, 1)]).await;
        let second = f.commit(2, &[(5, 1)]).await;

        let table = f.journal.page_translation_table();
        let five = table.get(&PageNumber::new(5)).unwrap();
        assert_eq!(five.transaction_id, TxnId::new(2));
        assert_eq!(five.scratch_pos, second.transaction_pages()[1].position_in_scratch);
        assert_eq!(table.get(&PageNumber::new(9)).unwrap().transaction_id, TxnId::new(1));

        let unused: Vec<_> = f.journal.unused_pages().iter().copied().collect();
        assert_eq!(unused.len(), 1);
        assert_eq!(unused[0].transaction_id, TxnId::new(1));
        assert_eq!(unused[0].scratch_pos, first.transaction_pages()[1].position_in_scratch);
    }

    /// Scratch pool that runs a callback on the first page read.
    struct InterruptingPool {
        inner: Arc<MemoryScratchPool>,
        on_read: Mutex<Option<Box<dyn FnOnce() + Send>>>,
    }

    impl ScratchBufferPool for InterruptingPool {
        fn page_size(&self) -> usize {
            self.inner.page_size()
        }

        fn allocate(&self, number_of_pages: u32) -> JournalResult<ScratchPos> {
            self.inner.allocate(number_of_pages)
        }

        fn write(&self, position: ScratchPos, data: &[u8]) -> JournalResult<()> {
            self.inner.write(position, data)
        }

        fn read_page(&self, position: ScratchPos) -> JournalResult<PageHandle> {
            let callback = self.on_read.lock().take();
            if let Some(callback) = callback {
                callback();
            }
            self.inner.read_page(position)
        }

        fn free(&self, position: ScratchPos) {
            self.inner.free(position)
        }
    }

    #[tokio::test]
    async fn test_reclaim_during_write_frees_superseded_page_once() {
        let inner = Arc::new(MemoryScratchPool::new(PAGE_SIZE));
        let writer = Arc::new(MemoryJournalWriter::new(PAGE_SIZE, 64));
        let journal = Arc::new(JournalFile::new(writer, JournalNumber::new(1)));
        let mut staging = CompressionStaging::new(PAGE_SIZE);

        let mut first = PreparedTransaction::begin(TxnId::new(1), inner.clone()).unwrap();
        first.add_page(PageNumber::new(5), b"one").unwrap();
        journal
            .write(&first, first.number_of_pages(), &mut staging)
            .unwrap()
            .await
            .unwrap();

        let pool = Arc::new(InterruptingPool {
            inner: inner.clone(),
            on_read: Mutex::new(None),
        });
        let mut third = PreparedTransaction::begin(TxnId::new(3), pool.clone()).unwrap();
        third.add_page(PageNumber::new(5), b"three").unwrap();

        // txn 1's page 5 is reclaimed while txn 3 is being written
        let reclaiming = Arc::clone(&journal);
        let reclaim_pool = inner.clone();
        *pool.on_read.lock() = Some(Box::new(move || {
            let freed =
                reclaiming.free_scratch_pages_older_than(reclaim_pool.as_ref(), TxnId::new(3));
            assert_eq!(freed, 1);
        }));
        journal
            .write(&third, third.number_of_pages(), &mut staging)
            .unwrap()
            .await
            .unwrap();

        assert!(pool.on_read.lock().is_none());
        assert!(journal.unused_pages().is_empty());
        assert!(!inner.is_allocated(first.transaction_pages()[1].position_in_scratch));

        let freed = journal.free_scratch_pages_older_than(inner.as_ref(), TxnId::new(4));
        assert_eq!(freed, 1);
        assert_eq!(inner.stats().invalid_frees.load(Ordering::Relaxed), 0);
        assert!(!inner.is_allocated(third.transaction_pages()[1].position_in_scratch));
    }

    #[tokio::test]
    async fn test_free_scratch_pages_older_than() {
        let mut f = fixture(64);
        let first = f.commit(1, &[(5, 1), (9, 1)]).await;
        let second = f.commit(2, &[(5, 1)]).await;
        let third = f.commit(3, &[(7, 1)]).await;

        // nothing is older than the first transaction
        assert_eq!(f.journal.free_scratch_pages_older_than(f.pool.as_ref(), TxnId::new(1)), 0);

        // superseded page 5 and live page 9 of txn 1
        let freed = f.journal.free_scratch_pages_older_than(f.pool.as_ref(), TxnId::new(2));
        assert_eq!(freed, 2);
        assert!(!f.pool.is_allocated(first.transaction_pages()[1].position_in_scratch));
        assert!(!f.pool.is_allocated(first.transaction_pages()[2].position_in_scratch));
        assert!(f.pool.is_allocated(second.transaction_pages()[1].position_in_scratch));
        assert!(f.journal.unused_pages().is_empty());

        let table = f.journal.page_translation_table();
        assert!(table.get(&PageNumber::new(9)).is_none());
        assert!(table.get(&PageNumber::new(5)).is_some());

        // running again frees nothing twice
        assert_eq!(f.journal.free_scratch_pages_older_than(f.pool.as_ref(), TxnId::new(2)), 0);
        assert_eq!(f.pool.stats().invalid_frees.load(Ordering::Relaxed), 0);

        let freed = f.journal.free_scratch_pages_older_than(f.pool.as_ref(), TxnId::new(3));
        assert_eq!(freed, 1);
        assert!(f.pool.is_allocated(third.transaction_pages()[1].position_in_scratch));
        assert_eq!(f.journal.page_translation_table().len(), 1);
    }

    #[tokio::test]
    async fn test_journal_full_publishes_nothing() {
        let mut f = fixture(2);
        f.commit(1, &[(1, 1)]).await;

        let tx = f.transaction(2, &[(2, 1)]);
        let err = f
            .journal
            .write(&tx, tx.number_of_pages(), &mut f.staging)
            .err()
            .unwrap();
        assert!(matches!(err, JournalError::JournalFull { required: 2, available: 0, .. }));
        assert_eq!(f.journal.write_page_position(), 2);
        assert!(f.journal.page_translation_table().get(&PageNumber::new(2)).is_none());
    }

    #[tokio::test]
    async fn test_write_failure_propagates() {
        let mut f = fixture(64);
        f.writer.fail_next_write(std::io::ErrorKind::Other);

        let tx = f.transaction(1, &[(1, 1)]);
        let pending = f.journal.write(&tx, tx.number_of_pages(), &mut f.staging).unwrap();
        let err = pending.await.unwrap_err();
        assert!(err.is_io());
    }

    #[tokio::test]
    async fn test_empty_transaction_is_rejected() {
        let mut f = fixture(64);
        let tx = f.transaction(1, &[]);
        let err = f.journal.write(&tx, 1, &mut f.staging).err().unwrap();
        assert!(err.is_precondition_violation());
        assert_eq!(f.journal.write_page_position(), 0);
    }

    #[tokio::test]
    async fn test_snapshot_is_isolated_from_later_writes() {
        let mut f = fixture(64);
        f.commit(1, &[(1, 1)]).await;
        let snapshot = f.journal.get_snapshot();
        f.commit(2, &[(2, 1)]).await;

        assert_eq!(snapshot.number, JournalNumber::new(1));
        assert_eq!(snapshot.available_pages, 62);
        assert_eq!(snapshot.page_translation_table.len(), 1);
        assert!(snapshot.end_position(TxnId::new(2)).is_none());
        assert_eq!(f.journal.get_snapshot().page_translation_table.len(), 2);
    }

    #[test]
    fn test_ref_count_teardown() {
        let f = fixture(4);
        for _ in 0..3 {
            f.journal.add_ref();
        }
        assert!(!f.journal.release().unwrap());
        assert!(!f.journal.release().unwrap());
        assert_eq!(f.writer.dispose_count(), 0);
        assert!(f.journal.release().unwrap());
        assert_eq!(f.writer.dispose_count(), 1);
        assert!(f.journal.is_disposed());

        let err = f.journal.release().unwrap_err();
        assert!(matches!(err, JournalError::ReleasedTooManyTimes { .. }));

        drop(f.journal);
        assert_eq!(f.writer.dispose_count(), 1);
    }

    #[tokio::test]
    async fn test_disposed_file_fails_fast() {
        let mut f = fixture(64);
        f.journal.dispose();
        f.journal.dispose();
        assert_eq!(f.writer.dispose_count(), 1);

        let tx = f.transaction(1, &[(1, 1)]);
        let err = f.journal.write(&tx, 2, &mut f.staging).err().unwrap();
        assert!(matches!(err, JournalError::Disposed { .. }));
        assert!(f.journal.read_transaction(0).is_err());
        assert_eq!(f.journal.to_string(), "Number: 1");
    }

    #[test]
    fn test_dispose_without_closing_pager() {
        let f = fixture(4);
        f.journal.add_ref();
        f.journal.dispose_without_closing_pager();
        assert!(f.journal.is_disposed());

        drop(f.journal);
        assert_eq!(f.writer.dispose_count(), 0);
    }

    #[test]
    fn test_drop_while_referenced_disposes_writer() {
        let f = fixture(4);
        f.journal.add_ref();
        drop(f.journal);
        assert_eq!(f.writer.dispose_count(), 1);
    }

    #[test]
    fn test_resume_and_delete_on_close() {
        let writer = Arc::new(MemoryJournalWriter::new(PAGE_SIZE, 16));
        let journal = JournalFile::resume(writer.clone(), JournalNumber::new(4), 5);
        assert_eq!(journal.write_page_position(), 6);
        assert_eq!(journal.available_pages(), 10);

        journal.set_delete_on_close(true);
        assert!(writer.delete_on_close());
        assert!(journal.read_transaction(20).unwrap().is_none());
    }
}
