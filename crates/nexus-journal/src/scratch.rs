//! Scratch buffer pool.
//!
//! The scratch pool holds the pages of committed transactions until the
//! journal no longer needs them. The journal reads pages from it while
//! compressing a transaction and frees them once no active transaction can
//! observe them.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use bytes::{Bytes, BytesMut};
use nexus_common::types::ScratchPos;
use parking_lot::Mutex;
use tracing::warn;

use crate::error::{JournalError, JournalResult};
use crate::page::PageHandle;

/// Pool of in-flight transaction pages.
pub trait ScratchBufferPool: Send + Sync {
    /// Page size used by the pool.
    fn page_size(&self) -> usize;

    /// Allocates `number_of_pages` contiguous zeroed pages.
    fn allocate(&self, number_of_pages: u32) -> JournalResult<ScratchPos>;

    /// Copies `data` to the start of an allocation.
    fn write(&self, position: ScratchPos, data: &[u8]) -> JournalResult<()>;

    /// Reads an allocation. The handle spans every page of the allocation.
    fn read_page(&self, position: ScratchPos) -> JournalResult<PageHandle>;

    /// Returns an allocation to the pool.
    fn free(&self, position: ScratchPos);
}

/// Scratch pool statistics.
#[derive(Debug, Default)]
pub struct ScratchStats {
    /// Number of allocations handed out.
    pub allocations: AtomicU64,
    /// Number of successful frees.
    pub frees: AtomicU64,
    /// Frees of positions that were not allocated (double frees included).
    pub invalid_frees: AtomicU64,
}

/// Heap-backed scratch pool.
pub struct MemoryScratchPool {
    page_size: usize,
    allocations: Mutex<HashMap<ScratchPos, Bytes>>,
    /// Next free position, in pages.
    next_position: AtomicU64,
    stats: ScratchStats,
}

impl MemoryScratchPool {
    /// Creates an empty pool.
    pub fn new(page_size: usize) -> Self {
        Self {
            page_size,
            allocations: Mutex::new(HashMap::new()),
            next_position: AtomicU64::new(0),
            stats: ScratchStats::default(),
        }
    }

    /// Returns true if `position` is currently allocated.
    pub fn is_allocated(&self, position: ScratchPos) -> bool {
        self.allocations.lock().contains_key(&position)
    }

    /// Number of live allocations.
    pub fn allocated_count(&self) -> usize {
        self.allocations.lock().len()
    }

    /// Returns pool statistics.
    pub fn stats(&self) -> &ScratchStats {
        &self.stats
    }
}

impl ScratchBufferPool for MemoryScratchPool {
    fn page_size(&self) -> usize {
        self.page_size
    }

    fn allocate(&self, number_of_pages: u32) -> JournalResult<ScratchPos> {
        if number_of_pages == 0 {
            return Err(JournalError::invalid_transaction(
                "cannot allocate zero scratch pages",
            ));
        }

        let position = ScratchPos::new(
            self.next_position
                .fetch_add(u64::from(number_of_pages), Ordering::AcqRel),
        );
        let len = number_of_pages as usize * self.page_size;
        self.allocations
            .lock()
            .insert(position, BytesMut::zeroed(len).freeze());
        self.stats.allocations.fetch_add(1, Ordering::Relaxed);

        Ok(position)
    }

    fn write(&self, position: ScratchPos, data: &[u8]) -> JournalResult<()> {
        let mut allocations = self.allocations.lock();
        let existing = allocations
            .get_mut(&position)
            .ok_or(JournalError::ScratchPageNotFound { position })?;

        if data.len() > existing.len() {
            return Err(JournalError::invalid_transaction(format!(
                "{} bytes do not fit in scratch allocation of {} bytes",
                data.len(),
                existing.len()
            )));
        }

        let mut buf = BytesMut::from(&existing[..]);
        buf[..data.len()].copy_from_slice(data);
        *existing = buf.freeze();
        Ok(())
    }

    fn read_page(&self, position: ScratchPos) -> JournalResult<PageHandle> {
        self.allocations
            .lock()
            .get(&position)
            .cloned()
            .map(PageHandle::new)
            .ok_or(JournalError::ScratchPageNotFound { position })
    }

    fn free(&self, position: ScratchPos) {
        if self.allocations.lock().remove(&position).is_some() {
            self.stats.frees.fetch_add(1, Ordering::Relaxed);
        } else {
            self.stats.invalid_frees.fetch_add(1, Ordering::Relaxed);
            warn!(%position, "free of a scratch position that is not allocated");
        }
    }
}

impl std::fmt::Debug for MemoryScratchPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryScratchPool")
            .field("page_size", &self.page_size)
            .field("allocated", &self.allocated_count())
            .field("frees", &self.stats.frees.load(Ordering::Relaxed))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::page::PageHeader;
    use nexus_common::types::PageNumber;

    #[test]
    fn test_allocate_write_read() {
        let pool = MemoryScratchPool::new(1024);
        let pos = pool.allocate(2).unwrap();

        let mut page = vec![0u8; 32];
        PageHeader::leaf(PageNumber::new(5)).write_to(&mut page).unwrap();
        pool.write(pos, &page).unwrap();

        let handle = pool.read_page(pos).unwrap();
        assert_eq!(handle.as_bytes().len(), 2048);
        assert_eq!(handle.page_number().unwrap(), PageNumber::new(5));
    }

    #[test]
    fn test_positions_do_not_overlap() {
        let pool = MemoryScratchPool::new(1024);
        let a = pool.allocate(3).unwrap();
        let b = pool.allocate(1).unwrap();
        assert_eq!(b.as_u64(), a.as_u64() + 3);
    }

    #[test]
    fn test_double_free_is_counted() {
        let pool = MemoryScratchPool::new(1024);
        let pos = pool.allocate(1).unwrap();

        pool.free(pos);
        assert!(!pool.is_allocated(pos));
        assert_eq!(pool.stats().frees.load(Ordering::Relaxed), 1);

        pool.free(pos);
        assert_eq!(pool.stats().invalid_frees.load(Ordering::Relaxed), 1);
        assert!(matches!(
            pool.read_page(pos),
            Err(JournalError::ScratchPageNotFound { .. })
        ));
    }

    #[test]
    fn test_write_too_large() {
        let pool = MemoryScratchPool::new(1024);
        let pos = pool.allocate(1).unwrap();
        assert!(pool.write(pos, &[1u8; 1025]).is_err());
        assert!(pool.allocate(0).is_err());
    }
}
