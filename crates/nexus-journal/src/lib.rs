//! # nexus-journal
//!
//! Write-ahead journal and page translation for NexusDB.
//!
//! Committed transactions are appended to journal files before their pages
//! reach the data file. Each journal file keeps an index of the pages it
//! holds so readers can find the latest version of a page without touching
//! the data file:
//!
//! - a page translation table, logical page number to scratch and journal
//!   position;
//! - the end position of every transaction, for backup and recovery;
//! - the superseded page versions still visible to older readers.
//!
//! # Architecture
//!
//! A journal file is a flat sequence of fixed-size pages. Each transaction
//! takes one uncompressed header page followed by its data pages,
//! compressed together as one lz4 block:
//!
//! ```text
//! +-------------+--------------------+-------------+---------------+----
//! | header (tx1)| payload (tx1) ...  | header (tx2)| payload (tx2) | ...
//! +-------------+--------------------+-------------+---------------+----
//! ```
//!
//! The header records the payload size and its CRC32 so replay can walk the
//! journal transaction by transaction and stop at the first damaged one.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use nexus_common::types::{JournalNumber, PageNumber, TxnId};
//! use nexus_journal::{
//!     CompressionStaging, JournalFile, JournalTransaction, MemoryJournalWriter,
//!     MemoryScratchPool, PreparedTransaction,
//! };
//!
//! # async fn example() -> nexus_journal::JournalResult<()> {
//! let pool = Arc::new(MemoryScratchPool::new(4096));
//! let writer = Arc::new(MemoryJournalWriter::new(4096, 1024));
//! let journal = JournalFile::new(writer, JournalNumber::new(1));
//! let mut staging = CompressionStaging::new(4096);
//!
//! let mut tx = PreparedTransaction::begin(TxnId::new(1), pool.clone())?;
//! tx.add_page(PageNumber::new(5), b"hello")?;
//! journal.write(&tx, tx.number_of_pages(), &mut staging)?.await?;
//!
//! let snapshot = journal.get_snapshot();
//! assert!(snapshot.page_position(PageNumber::new(5)).is_some());
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

mod config;
mod error;

/// Immutable copy-on-write collections.
pub mod collections;

/// Transaction compression.
pub mod compression;

/// Transaction header page.
pub mod header;

/// Journal file.
pub mod journal;

/// Data page layout.
pub mod page;

/// Journal replay.
pub mod reader;

/// Scratch buffer pool.
pub mod scratch;

/// Journal snapshots.
pub mod snapshot;

/// Transactions handed to the journal.
pub mod transaction;

/// Page translation table.
pub mod translation;

/// Superseded page versions.
pub mod unused;

/// Journal writers.
pub mod writer;

// Re-exports for convenience
pub use collections::{ImmutableList, ImmutableMap};
pub use compression::{compress_pages, CompressedTransaction, CompressionStaging};
pub use config::JournalConfig;
pub use error::{JournalError, JournalResult};
pub use header::{TransactionHeader, TransactionMarker};
pub use journal::{JournalFile, JournalStats};
pub use page::{PageFlags, PageHandle, PageHeader};
pub use reader::{recover_journal, JournalReader};
pub use scratch::{MemoryScratchPool, ScratchBufferPool, ScratchStats};
pub use snapshot::JournalSnapshot;
pub use transaction::{JournalTransaction, PreparedTransaction, TransactionPage};
pub use translation::{
    JournalPositionCursor, PagePosition, PageTranslationTable, TransactionEndPositions,
};
pub use unused::UnusedPages;
pub use writer::{FileJournalWriter, JournalWriter, MemoryJournalWriter};
