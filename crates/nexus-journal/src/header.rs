//! Transaction header.
//!
//! Page 0 of every transaction written to a journal starts with this
//! header. It stays uncompressed so replay can find the payload length
//! without decompressing anything.
//!
//! Layout (big-endian, 48 bytes):
//! - marker: 8 bytes
//! - txn_id: 8 bytes
//! - tx_marker: 1 byte
//! - reserved: 3 bytes
//! - page_count: 4 bytes (data entries, header excluded)
//! - number_of_pages: 4 bytes (uncompressed pages, header included)
//! - compressed_size: 4 bytes
//! - uncompressed_size: 4 bytes
//! - crc: 4 bytes (CRC32 of the compressed payload)
//! - padding: 8 bytes

use bytes::{Buf, BufMut};
use nexus_common::constants::{TRANSACTION_HEADER_MARKER, TRANSACTION_HEADER_SIZE};
use nexus_common::types::TxnId;

use crate::error::{JournalError, JournalResult};

bitflags::bitflags! {
    /// Transaction state recorded in the header.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct TransactionMarker: u8 {
        /// The transaction started writing.
        const START = 0b0000_0001;
        /// The transaction committed.
        const COMMIT = 0b0000_0010;
    }
}

/// Header stored at the start of a transaction's first journal page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransactionHeader {
    /// Must equal `TRANSACTION_HEADER_MARKER` for a valid header.
    pub marker: u64,
    /// Id of the transaction.
    pub transaction_id: TxnId,
    /// Transaction state.
    pub tx_marker: TransactionMarker,
    /// Number of data entries in the payload.
    pub page_count: u32,
    /// Uncompressed page count, header page included.
    pub number_of_pages: u32,
    /// Bytes of compressed payload following the header page.
    pub compressed_size: u32,
    /// Bytes of payload once decompressed.
    pub uncompressed_size: u32,
    /// CRC32 of the compressed payload.
    pub crc: u32,
}

impl TransactionHeader {
    /// Size of the header in bytes.
    pub const SIZE: usize = TRANSACTION_HEADER_SIZE;

    /// Creates a committed header for `transaction_id` with no payload yet.
    pub fn new(transaction_id: TxnId) -> Self {
        Self {
            marker: TRANSACTION_HEADER_MARKER,
            transaction_id,
            tx_marker: TransactionMarker::START | TransactionMarker::COMMIT,
            page_count: 0,
            number_of_pages: 0,
            compressed_size: 0,
            uncompressed_size: 0,
            crc: 0,
        }
    }

    /// Returns true if the marker identifies a transaction header.
    pub fn has_valid_marker(&self) -> bool {
        self.marker == TRANSACTION_HEADER_MARKER
    }

    /// Returns true if the transaction committed.
    pub fn is_committed(&self) -> bool {
        self.tx_marker.contains(TransactionMarker::COMMIT)
    }

    /// Pages taken by the compressed payload.
    pub fn payload_pages(&self, page_size: usize) -> u64 {
        (self.compressed_size as usize).div_ceil(page_size) as u64
    }

    /// Pages taken by the whole transaction, header page included.
    pub fn total_pages(&self, page_size: usize) -> u64 {
        1 + self.payload_pages(page_size)
    }

    /// Computes the payload checksum.
    pub fn compute_crc(payload: &[u8]) -> u32 {
        crc32fast::hash(payload)
    }

    /// Records the checksum of `payload`.
    pub fn set_crc(&mut self, payload: &[u8]) {
        self.crc = Self::compute_crc(payload);
    }

    /// Verifies `payload` against the recorded checksum.
    pub fn verify_crc(&self, payload: &[u8]) -> bool {
        self.crc == Self::compute_crc(payload)
    }

    /// Serializes the header.
    pub fn serialize(&self, buf: &mut impl BufMut) {
        buf.put_u64(self.marker);
        buf.put_u64(self.transaction_id.as_u64());
        buf.put_u8(self.tx_marker.bits());
        buf.put_bytes(0, 3); // reserved
        buf.put_u32(self.page_count);
        buf.put_u32(self.number_of_pages);
        buf.put_u32(self.compressed_size);
        buf.put_u32(self.uncompressed_size);
        buf.put_u32(self.crc);
        buf.put_u64(0); // padding to 48 bytes
    }

    /// Writes the header over the first bytes of `page`.
    pub fn write_to(&self, page: &mut [u8]) -> JournalResult<()> {
        if page.len() < Self::SIZE {
            return Err(JournalError::invalid_transaction(format!(
                "header page of {} bytes cannot hold a transaction header",
                page.len()
            )));
        }
        let mut cursor = &mut page[..Self::SIZE];
        self.serialize(&mut cursor);
        Ok(())
    }

    /// Deserializes a header. The marker is not validated.
    pub fn deserialize(buf: &mut impl Buf) -> JournalResult<Self> {
        if buf.remaining() < Self::SIZE {
            return Err(JournalError::invalid_transaction(format!(
                "not enough bytes for transaction header: {} < {}",
                buf.remaining(),
                Self::SIZE
            )));
        }

        let marker = buf.get_u64();
        let transaction_id = TxnId::new(buf.get_u64());
        let tx_marker = TransactionMarker::from_bits_truncate(buf.get_u8());
        buf.advance(3);
        let page_count = buf.get_u32();
        let number_of_pages = buf.get_u32();
        let compressed_size = buf.get_u32();
        let uncompressed_size = buf.get_u32();
        let crc = buf.get_u32();
        let _padding = buf.get_u64();

        Ok(Self {
            marker,
            transaction_id,
            tx_marker,
            page_count,
            number_of_pages,
            compressed_size,
            uncompressed_size,
            crc,
        })
    }

    /// Deserializes a header from the start of a page.
    pub fn from_bytes(mut bytes: &[u8]) -> JournalResult<Self> {
        Self::deserialize(&mut bytes)
    }
}
