//! Data page layout.
//!
//! Every page handed to the journal starts with a 16-byte header:
//!
//! ```text
//! +------------------+-------+----------+-------------------+
//! | page_number (8)  | flags | reserved | overflow_size (4) |
//! +------------------+-------+----------+-------------------+
//! ```
//!
//! An overflow page stores a value larger than one page; it occupies
//! `ceil((header + overflow_size) / page_size)` consecutive pages.

use bytes::{Buf, BufMut, Bytes};
use nexus_common::constants::PAGE_HEADER_SIZE;
use nexus_common::types::PageNumber;

use crate::error::{JournalError, JournalResult};

bitflags::bitflags! {
    /// Flags stored in a page header.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct PageFlags: u8 {
        /// Leaf page of a tree.
        const LEAF = 0b0000_0001;
        /// Branch page of a tree.
        const BRANCH = 0b0000_0010;
        /// Value spanning several consecutive pages.
        const OVERFLOW = 0b0000_0100;
    }
}

/// Header at the start of every data page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageHeader {
    /// Logical page number.
    pub page_number: PageNumber,
    /// Page flags.
    pub flags: PageFlags,
    /// Bytes of value data following the header, for overflow pages.
    pub overflow_size: u32,
}

impl PageHeader {
    /// Size of the header in bytes.
    pub const SIZE: usize = PAGE_HEADER_SIZE;

    /// Creates a header for a single-page leaf.
    pub fn leaf(page_number: PageNumber) -> Self {
        Self {
            page_number,
            flags: PageFlags::LEAF,
            overflow_size: 0,
        }
    }

    /// Creates a header for an overflow value of `overflow_size` bytes.
    pub fn overflow(page_number: PageNumber, overflow_size: u32) -> Self {
        Self {
            page_number,
            flags: PageFlags::OVERFLOW,
            overflow_size,
        }
    }

    /// Returns true if this page spans several physical pages.
    pub fn is_overflow(&self) -> bool {
        self.flags.contains(PageFlags::OVERFLOW)
    }

    /// Number of physical pages this page occupies.
    pub fn number_of_pages(&self, page_size: usize) -> u32 {
        if !self.is_overflow() {
            return 1;
        }
        let total = Self::SIZE + self.overflow_size as usize;
        total.div_ceil(page_size) as u32
    }

    /// Serializes the header.
    pub fn serialize(&self, buf: &mut impl BufMut) {
        buf.put_u64(self.page_number.as_u64());
        buf.put_u8(self.flags.bits());
        buf.put_bytes(0, 3); // reserved
        buf.put_u32(self.overflow_size);
    }

    /// Writes the header over the first bytes of `page`.
    pub fn write_to(&self, page: &mut [u8]) -> JournalResult<()> {
        if page.len() < Self::SIZE {
            return Err(JournalError::invalid_transaction(format!(
                "page buffer of {} bytes cannot hold a page header",
                page.len()
            )));
        }
        let mut cursor = &mut page[..Self::SIZE];
        self.serialize(&mut cursor);
        Ok(())
    }

    /// Deserializes a header.
    pub fn deserialize(buf: &mut impl Buf) -> JournalResult<Self> {
        if buf.remaining() < Self::SIZE {
            return Err(JournalError::invalid_transaction(format!(
                "not enough bytes for page header: {} < {}",
                buf.remaining(),
                Self::SIZE
            )));
        }

        let page_number = PageNumber::new(buf.get_u64());
        let flags = PageFlags::from_bits_truncate(buf.get_u8());
        buf.advance(3);
        let overflow_size = buf.get_u32();

        Ok(Self {
            page_number,
            flags,
            overflow_size,
        })
    }

    /// Deserializes a header from the start of a page.
    pub fn from_bytes(mut bytes: &[u8]) -> JournalResult<Self> {
        Self::deserialize(&mut bytes)
    }
}

/// Read-only view of a page (or an overflow run) in the scratch pool.
#[derive(Debug, Clone)]
pub struct PageHandle {
    data: Bytes,
}

impl PageHandle {
    /// Wraps page bytes.
    pub fn new(data: Bytes) -> Self {
        Self { data }
    }

    /// Raw page bytes, header included.
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Shared handle to the page bytes.
    pub fn bytes(&self) -> Bytes {
        self.data.clone()
    }

    /// Parses the page header.
    pub fn header(&self) -> JournalResult<PageHeader> {
        PageHeader::from_bytes(&self.data)
    }

    /// Logical page number from the header.
    pub fn page_number(&self) -> JournalResult<PageNumber> {
        Ok(self.header()?.page_number)
    }
}
