//! Identifier types shared by the journal crates.

mod ids;

pub use ids::{JournalNumber, PageNumber, ScratchPos, TxnId};
