//! # nexus-common
//!
//! Identifiers and constants shared by the NexusDB journal crates.
//!
//! - **Types**: `PageNumber`, `TxnId`, `JournalNumber`, `ScratchPos`
//! - **Constants**: page sizes, journal sizing and on-disk markers
//!
//! ## Example
//!
//! ```rust
//! use nexus_common::types::{PageNumber, TxnId};
//!
//! let page = PageNumber::new(42);
//! let txn = TxnId::new(1);
//! assert!(txn.is_valid());
//! assert_eq!(page.as_u64(), 42);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod constants;
pub mod types;

// Re-export commonly used items at the crate root
pub use constants::*;
pub use types::{JournalNumber, PageNumber, ScratchPos, TxnId};
