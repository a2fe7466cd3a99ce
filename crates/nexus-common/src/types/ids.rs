//! Identifier newtypes for the journal.
//!
//! Logical page numbers, transaction ids, journal file numbers and scratch
//! positions are all `u64` on disk. Wrapping them keeps a journal position
//! from being passed where a logical page number is expected.

use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! id_conversions {
    ($name:ident) => {
        impl $name {
            /// Creates the identifier from a raw u64 value.
            #[inline]
            #[must_use]
            pub const fn new(raw: u64) -> Self {
                Self(raw)
            }

            /// Returns the raw u64 value.
            #[inline]
            #[must_use]
            pub const fn as_u64(self) -> u64 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<u64> for $name {
            #[inline]
            fn from(raw: u64) -> Self {
                Self::new(raw)
            }
        }

        impl From<$name> for u64 {
            #[inline]
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

/// Logical page number inside the data file.
///
/// The translation table is keyed by this value; the physical location of
/// the page's latest version is tracked separately.
///
/// # Example
///
/// ```rust
/// use nexus_common::types::PageNumber;
///
/// let page = PageNumber::new(42);
/// assert_eq!(page.as_u64(), 42);
/// ```
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(transparent)]
pub struct PageNumber(u64);

id_conversions!(PageNumber);

impl fmt::Debug for PageNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PageNumber({})", self.0)
    }
}

/// Transaction identifier.
///
/// Ids are assigned in commit order, so comparing two ids tells which
/// transaction committed first. Reclamation relies on this ordering.
///
/// # Example
///
/// ```rust
/// use nexus_common::types::TxnId;
///
/// let txn = TxnId::new(1);
/// assert!(txn.is_valid());
/// assert!(txn < txn.next());
/// ```
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(transparent)]
pub struct TxnId(u64);

id_conversions!(TxnId);

impl TxnId {
    /// Invalid transaction ID, used as a sentinel value.
    pub const INVALID: Self = Self(0);

    /// Minimum valid transaction ID.
    pub const MIN: Self = Self(1);

    /// Returns the next transaction ID.
    #[inline]
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0.saturating_add(1))
    }

    /// Checks if this is a valid transaction ID.
    #[inline]
    #[must_use]
    pub const fn is_valid(self) -> bool {
        self.0 != Self::INVALID.0
    }
}

impl fmt::Debug for TxnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if *self == Self::INVALID {
            write!(f, "TxnId(INVALID)")
        } else {
            write!(f, "TxnId({})", self.0)
        }
    }
}

/// Sequence number of a journal file.
///
/// Journal files are created with strictly increasing numbers; the number
/// never changes for the lifetime of the file.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(transparent)]
pub struct JournalNumber(u64);

id_conversions!(JournalNumber);

impl JournalNumber {
    /// Returns the number of the journal that follows this one.
    #[inline]
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0.saturating_add(1))
    }
}

impl fmt::Debug for JournalNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "JournalNumber({})", self.0)
    }
}

/// Location of a page allocation inside the scratch buffer pool.
///
/// Only the pool that handed out a position can interpret it.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(transparent)]
pub struct ScratchPos(u64);

id_conversions!(ScratchPos);

impl fmt::Debug for ScratchPos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ScratchPos({})", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_txn_id_ordering() {
        let t1 = TxnId::new(1);
        let t2 = t1.next();
        assert!(t1 < t2);
        assert_eq!(t2.as_u64(), 2);
        assert!(!TxnId::INVALID.is_valid());
        assert!(TxnId::MIN.is_valid());
    }

    #[test]
    fn test_debug_format() {
        assert_eq!(format!("{:?}", TxnId::INVALID), "TxnId(INVALID)");
        assert_eq!(format!("{:?}", TxnId::new(7)), "TxnId(7)");
        assert_eq!(format!("{:?}", PageNumber::new(9)), "PageNumber(9)");
        assert_eq!(format!("{:?}", ScratchPos::new(3)), "ScratchPos(3)");
    }

    #[test]
    fn test_conversions() {
        let page: PageNumber = 12u64.into();
        let raw: u64 = page.into();
        assert_eq!(raw, 12);

        let journal = JournalNumber::new(4);
        assert_eq!(journal.next(), JournalNumber::new(5));
        assert_eq!(journal.to_string(), "4");
    }
}
