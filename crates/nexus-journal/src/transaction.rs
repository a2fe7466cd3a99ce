//! Committed transactions as seen by the journal.
//!
//! The journal only needs three things from a transaction: its id, the
//! list of scratch allocations it dirtied, and the pool those allocations
//! live in. The first allocation is always the transaction header page.

use std::sync::Arc;

use nexus_common::types::{PageNumber, ScratchPos, TxnId};

use crate::error::{JournalError, JournalResult};
use crate::header::TransactionHeader;
use crate::page::PageHeader;
use crate::scratch::ScratchBufferPool;

/// One scratch allocation dirtied by a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransactionPage {
    /// Where the allocation lives in the scratch pool.
    pub position_in_scratch: ScratchPos,
    /// Physical pages in the allocation; more than one for overflow values.
    pub number_of_pages: u32,
}

/// A committed transaction handed to the journal.
pub trait JournalTransaction {
    /// Transaction id.
    fn id(&self) -> TxnId;

    /// Dirty scratch allocations; index 0 is the header page.
    fn transaction_pages(&self) -> &[TransactionPage];

    /// Pool holding the transaction's pages.
    fn scratch_pool(&self) -> &dyn ScratchBufferPool;

    /// Total physical pages, header page included.
    fn number_of_pages(&self) -> u32 {
        self.transaction_pages()
            .iter()
            .map(|p| p.number_of_pages)
            .sum()
    }
}

/// A transaction assembled directly in a scratch pool.
///
/// Used by the storage environment's commit path and by replay tooling to
/// hand pages to a journal file.
pub struct PreparedTransaction {
    id: TxnId,
    pages: Vec<TransactionPage>,
    pool: Arc<dyn ScratchBufferPool>,
}

impl PreparedTransaction {
    /// Starts a transaction, allocating and writing its header page.
    pub fn begin(id: TxnId, pool: Arc<dyn ScratchBufferPool>) -> JournalResult<Self> {
        let position = pool.allocate(1)?;
        let mut header = vec![0u8; TransactionHeader::SIZE];
        TransactionHeader::new(id).write_to(&mut header)?;
        pool.write(position, &header)?;

        Ok(Self {
            id,
            pages: vec![TransactionPage {
                position_in_scratch: position,
                number_of_pages: 1,
            }],
            pool,
        })
    }

    /// Adds a single-page write of `page_number` carrying `body`.
    pub fn add_page(&mut self, page_number: PageNumber, body: &[u8]) -> JournalResult<ScratchPos> {
        let capacity = self.pool.page_size() - PageHeader::SIZE;
        if body.len() > capacity {
            return Err(JournalError::invalid_transaction(format!(
                "page body of {} bytes exceeds page capacity {}",
                body.len(),
                capacity
            )));
        }
        self.push(PageHeader::leaf(page_number), body)
    }

    /// Adds an overflow value for `page_number`, spanning as many pages as
    /// `value` needs.
    pub fn add_overflow(
        &mut self,
        page_number: PageNumber,
        value: &[u8],
    ) -> JournalResult<ScratchPos> {
        let size = u32::try_from(value.len()).map_err(|_| {
            JournalError::invalid_transaction(format!(
                "overflow value of {} bytes is too large",
                value.len()
            ))
        })?;
        self.push(PageHeader::overflow(page_number, size), value)
    }

    fn push(&mut self, header: PageHeader, body: &[u8]) -> JournalResult<ScratchPos> {
        let number_of_pages = header.number_of_pages(self.pool.page_size());
        let position = self.pool.allocate(number_of_pages)?;

        let mut data = vec![0u8; PageHeader::SIZE + body.len()];
        header.write_to(&mut data)?;
        data[PageHeader::SIZE..].copy_from_slice(body);
        self.pool.write(position, &data)?;

        self.pages.push(TransactionPage {
            position_in_scratch: position,
            number_of_pages,
        });
        Ok(position)
    }

    /// Number of data entries, header excluded.
    pub fn page_count(&self) -> usize {
        self.pages.len() - 1
    }
}

impl JournalTransaction for PreparedTransaction {
    fn id(&self) -> TxnId {
        self.id
    }

    fn transaction_pages(&self) -> &[TransactionPage] {
        &self.pages
    }

    fn scratch_pool(&self) -> &dyn ScratchBufferPool {
        self.pool.as_ref()
    }
}

impl std::fmt::Debug for PreparedTransaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PreparedTransaction")
            .field("id", &self.id)
            .field("pages", &self.pages)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scratch::MemoryScratchPool;

    #[test]
    fn test_prepared_transaction_layout() {
        let pool = Arc::new(MemoryScratchPool::new(1024));
        let mut tx = PreparedTransaction::begin(TxnId::new(3), pool.clone()).unwrap();
        tx.add_page(PageNumber::new(5), b"five").unwrap();
        tx.add_overflow(PageNumber::new(6), &[7u8; 2000]).unwrap();

        assert_eq!(tx.page_count(), 2);
        // header + leaf + two overflow pages
        assert_eq!(tx.number_of_pages(), 4);

        let header_page = pool
            .read_page(tx.transaction_pages()[0].position_in_scratch)
            .unwrap();
        let header = TransactionHeader::from_bytes(header_page.as_bytes()).unwrap();
        assert!(header.has_valid_marker());
        assert_eq!(header.transaction_id, TxnId::new(3));

        let overflow = pool
            .read_page(tx.transaction_pages()[2].position_in_scratch)
            .unwrap();
        let page_header = overflow.header().unwrap();
        assert!(page_header.is_overflow());
        assert_eq!(page_header.overflow_size, 2000);
        assert_eq!(overflow.as_bytes()[PageHeader::SIZE + 1999], 7);
    }

    #[test]
    fn test_page_body_too_large() {
        let pool = Arc::new(MemoryScratchPool::new(1024));
        let mut tx = PreparedTransaction::begin(TxnId::new(1), pool).unwrap();
        assert!(tx.add_page(PageNumber::new(1), &[0u8; 1024]).is_err());
    }
}
