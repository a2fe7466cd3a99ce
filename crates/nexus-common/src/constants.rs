//! Constants for the NexusDB journal.
//!
//! Sizes are in bytes unless the name says pages.

// =============================================================================
// Page Constants
// =============================================================================

/// Default journal page size in bytes (4 KB).
pub const DEFAULT_PAGE_SIZE: usize = 4 * 1024;

/// Minimum page size in bytes (1 KB).
///
/// A page must at least hold a transaction header and a page header.
pub const MIN_PAGE_SIZE: usize = 1024;

/// Maximum page size in bytes (64 KB).
pub const MAX_PAGE_SIZE: usize = 64 * 1024;

/// Size of the header at the start of every data page.
///
/// Contains: page_number (8), flags (1), reserved (3), overflow_size (4).
pub const PAGE_HEADER_SIZE: usize = 16;

// =============================================================================
// Journal Constants
// =============================================================================

/// Default number of pages allocated for each journal file (16 MB at 4 KB).
pub const DEFAULT_JOURNAL_PAGES: u64 = 4096;

/// Size of the transaction header at the start of page 0 of a transaction.
///
/// Contains: marker (8), txn_id (8), tx_marker (1), reserved (3),
/// page_count (4), number_of_pages (4), compressed_size (4),
/// uncompressed_size (4), crc (4) = 40 bytes, rounded to 48.
pub const TRANSACTION_HEADER_SIZE: usize = 48;

/// Marker identifying a transaction header page ("NXJOURTX" in ASCII).
pub const TRANSACTION_HEADER_MARKER: u64 = 0x4E58_4A4F_5552_5458;
