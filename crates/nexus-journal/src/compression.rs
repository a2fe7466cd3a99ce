//! Transaction compression.
//!
//! Before a transaction reaches the journal, its data pages are copied
//! back to back into a staging buffer and compressed as a single lz4
//! block. The journal write is the (uncompressed) transaction header page
//! followed by the compressed payload, padded to whole pages.
//!
//! The staging buffer is split in two regions:
//!
//! ```text
//! page 0                  page n-1                          page 2n+1
//! +-----------------------+---------------------------------+
//! | raw data pages (n-1)  | compressed output (n+2 pages)   |
//! +-----------------------+---------------------------------+
//! ```
//!
//! where `n` is the transaction's page count, header page included.

use bytes::Bytes;
use lz4_flex::block;

use crate::error::{JournalError, JournalResult};
use crate::header::TransactionHeader;
use crate::transaction::JournalTransaction;

/// Reusable staging area for compressing transactions.
///
/// Callers keep one per writer thread and hand it to every
/// `JournalFile::write`; it only grows.
pub struct CompressionStaging {
    page_size: usize,
    buffer: Vec<u8>,
}

impl CompressionStaging {
    /// Creates an empty staging area.
    pub fn new(page_size: usize) -> Self {
        Self {
            page_size,
            buffer: Vec::new(),
        }
    }

    /// Page size of the staging area.
    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Number of pages currently available.
    pub fn capacity_pages(&self) -> usize {
        self.buffer.len() / self.page_size
    }

    /// Makes sure at least `pages` contiguous pages are available.
    pub fn ensure_continuous(&mut self, pages: usize) {
        let len = pages * self.page_size;
        if self.buffer.len() < len {
            self.buffer.resize(len, 0);
        }
    }

    /// Zeroes the first `pages` pages.
    pub fn zero(&mut self, pages: usize) {
        let len = (pages * self.page_size).min(self.buffer.len());
        self.buffer[..len].fill(0);
    }

    /// Returns the staging area from `page` to its end.
    pub fn writable(&mut self, page: usize) -> &mut [u8] {
        let start = (page * self.page_size).min(self.buffer.len());
        &mut self.buffer[start..]
    }

    /// Splits the staging area at `page`.
    fn split_at_page(&mut self, page: usize) -> (&mut [u8], &mut [u8]) {
        let mid = (page * self.page_size).min(self.buffer.len());
        self.buffer.split_at_mut(mid)
    }
}

impl std::fmt::Debug for CompressionStaging {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompressionStaging")
            .field("page_size", &self.page_size)
            .field("capacity_pages", &self.capacity_pages())
            .finish()
    }
}

/// A transaction ready to be appended to a journal.
#[derive(Debug, Clone)]
pub struct CompressedTransaction {
    /// The stamped header written as page 0.
    pub header: TransactionHeader,
    /// Pages to write: the header page, then the compressed payload.
    pub pages: Vec<Bytes>,
}

impl CompressedTransaction {
    /// Physical journal pages the transaction occupies.
    pub fn physical_pages(&self) -> u64 {
        self.pages.len() as u64
    }
}

/// Compresses a transaction's data pages.
///
/// `number_of_pages` is the transaction's total page count, header page
/// included, and must match the sum of its scratch allocations.
pub fn compress_pages<T>(
    tx: &T,
    number_of_pages: u32,
    staging: &mut CompressionStaging,
) -> JournalResult<CompressedTransaction>
where
    T: JournalTransaction + ?Sized,
{
    let tx_pages = tx.transaction_pages();
    let pool = tx.scratch_pool();
    let page_size = staging.page_size();

    if tx_pages.len() < 2 {
        return Err(JournalError::invalid_transaction(format!(
            "transaction {} has no data pages",
            tx.id()
        )));
    }
    if let Some(empty) = tx_pages.iter().find(|page| page.number_of_pages == 0) {
        return Err(JournalError::invalid_transaction(format!(
            "transaction {} has an empty page at {}",
            tx.id(),
            empty.position_in_scratch
        )));
    }
    if pool.page_size() != page_size {
        return Err(JournalError::invalid_transaction(format!(
            "scratch page size {} does not match journal page size {}",
            pool.page_size(),
            page_size
        )));
    }
    let actual = tx.number_of_pages();
    if actual != number_of_pages {
        return Err(JournalError::invalid_transaction(format!(
            "transaction {} spans {} pages, {} requested",
            tx.id(),
            actual,
            number_of_pages
        )));
    }

    let n = number_of_pages as usize;
    let raw_len = (n - 1) * page_size;
    let output_pages = block::get_maximum_output_size(raw_len)
        .div_ceil(page_size)
        .max(n + 2);
    let total_pages = (n - 1) + output_pages;
    staging.ensure_continuous(total_pages);
    staging.zero(total_pages);

    let (raw, output) = staging.split_at_page(n - 1);

    let mut write = 0;
    for tx_page in &tx_pages[1..] {
        let page = pool.read_page(tx_page.position_in_scratch)?;
        let count = tx_page.number_of_pages as usize * page_size;
        let source = page.as_bytes().get(..count).ok_or_else(|| {
            JournalError::invalid_transaction(format!(
                "scratch allocation at {} is shorter than {} pages",
                tx_page.position_in_scratch, tx_page.number_of_pages
            ))
        })?;
        raw[write..write + count].copy_from_slice(source);
        write += count;
    }

    let compressed_len = block::compress_into(&raw[..raw_len], output)
        .map_err(|e| JournalError::compression(e.to_string()))?;
    let compressed = &output[..compressed_len];
    let compressed_pages = compressed_len.div_ceil(page_size);

    let header_page = pool.read_page(tx_pages[0].position_in_scratch)?;
    let mut header = TransactionHeader::from_bytes(header_page.as_bytes())?;
    if !header.has_valid_marker() || header.transaction_id != tx.id() {
        return Err(JournalError::invalid_transaction(format!(
            "header page of transaction {} is not a transaction header",
            tx.id()
        )));
    }
    header.page_count = (tx_pages.len() - 1) as u32;
    header.number_of_pages = number_of_pages;
    header.compressed_size = to_u32(compressed_len)?;
    header.uncompressed_size = to_u32(raw_len)?;
    header.set_crc(compressed);

    let mut first = header_page.as_bytes()[..page_size].to_vec();
    header.write_to(&mut first)?;

    let payload = Bytes::copy_from_slice(&output[..compressed_pages * page_size]);
    let mut pages = Vec::with_capacity(compressed_pages + 1);
    pages.push(Bytes::from(first));
    for index in 0..compressed_pages {
        pages.push(payload.slice(index * page_size..(index + 1) * page_size));
    }

    Ok(CompressedTransaction { header, pages })
}

/// Decompresses a transaction payload into `output`.
///
/// Returns an error unless exactly `output.len()` bytes were produced.
pub fn decompress_payload(compressed: &[u8], output: &mut [u8]) -> JournalResult<()> {
    let len = block::decompress_into(compressed, output)
        .map_err(|e| JournalError::decompression(e.to_string()))?;
    if len != output.len() {
        return Err(JournalError::decompression(format!(
            "expected {} bytes, got {}",
            output.len(),
            len
        )));
    }
    Ok(())
}

fn to_u32(len: usize) -> JournalResult<u32> {
    u32::try_from(len)
        .map_err(|_| JournalError::compression(format!("payload of {len} bytes is too large")))
}
