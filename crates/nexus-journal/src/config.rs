//! Journal configuration.
//!
//! This module provides configuration options for journal files.

use std::path::{Path, PathBuf};

use nexus_common::constants::{
    DEFAULT_JOURNAL_PAGES, DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE, MIN_PAGE_SIZE,
};
use nexus_common::types::JournalNumber;

use crate::error::{JournalError, JournalResult};

/// Configuration for journal files.
#[derive(Debug, Clone)]
pub struct JournalConfig {
    /// Directory where journal files are stored.
    pub dir: PathBuf,

    /// Size of a journal page in bytes.
    pub page_size: usize,

    /// Number of pages allocated up front for each journal file.
    pub journal_pages: u64,

    /// Whether to fsync data after every gather write.
    pub sync_writes: bool,

    /// Whether to verify payload checksums during replay.
    pub verify_checksums: bool,

    /// Whether journal files are deleted when their writer is disposed.
    pub delete_on_close: bool,
}

impl Default for JournalConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("data/journal"),
            page_size: DEFAULT_PAGE_SIZE,
            journal_pages: DEFAULT_JOURNAL_PAGES,
            sync_writes: true,
            verify_checksums: true,
            delete_on_close: false,
        }
    }
}

impl JournalConfig {
    /// Creates a new journal configuration with the specified directory.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            ..Default::default()
        }
    }

    /// Sets the page size.
    #[must_use]
    pub fn with_page_size(mut self, size: usize) -> Self {
        self.page_size = size;
        self
    }

    /// Sets the number of pages allocated per journal file.
    #[must_use]
    pub fn with_journal_pages(mut self, pages: u64) -> Self {
        self.journal_pages = pages;
        self
    }

    /// Sets whether every write is followed by a data sync.
    #[must_use]
    pub fn with_sync_writes(mut self, sync: bool) -> Self {
        self.sync_writes = sync;
        self
    }

    /// Sets whether to verify checksums on replay.
    #[must_use]
    pub fn with_verify_checksums(mut self, verify: bool) -> Self {
        self.verify_checksums = verify;
        self
    }

    /// Sets whether journal files are removed when closed.
    #[must_use]
    pub fn with_delete_on_close(mut self, delete: bool) -> Self {
        self.delete_on_close = delete;
        self
    }

    /// Validates the configuration.
    pub fn validate(&self) -> JournalResult<()> {
        if !self.page_size.is_power_of_two() {
            return Err(JournalError::config(format!(
                "page size {} is not a power of two",
                self.page_size
            )));
        }

        if !(MIN_PAGE_SIZE..=MAX_PAGE_SIZE).contains(&self.page_size) {
            return Err(JournalError::config(format!(
                "page size {} outside of {}..={}",
                self.page_size, MIN_PAGE_SIZE, MAX_PAGE_SIZE
            )));
        }

        // header page plus at least one compressed payload page
        if self.journal_pages < 2 {
            return Err(JournalError::config(
                "a journal file needs at least 2 pages",
            ));
        }

        Ok(())
    }

    /// Returns the size in bytes of a journal file.
    pub fn journal_size(&self) -> u64 {
        self.journal_pages * self.page_size as u64
    }

    /// Returns the file path for a given journal number.
    pub fn journal_path(&self, number: JournalNumber) -> PathBuf {
        self.dir.join(format!("journal_{:016x}.log", number.as_u64()))
    }

    /// Parses a journal number from a file path.
    pub fn parse_journal_number(path: &Path) -> Option<JournalNumber> {
        let stem = path.file_stem()?.to_str()?;
        let hex = stem.strip_prefix("journal_")?;
        u64::from_str_radix(hex, 16).ok().map(JournalNumber::new)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = JournalConfig::default();
        assert_eq!(config.page_size, DEFAULT_PAGE_SIZE);
        assert_eq!(config.journal_pages, DEFAULT_JOURNAL_PAGES);
        assert!(config.sync_writes);
        assert!(!config.delete_on_close);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_builder() {
        let config = JournalConfig::new("/tmp/journal")
            .with_page_size(8192)
            .with_journal_pages(64)
            .with_sync_writes(false)
            .with_delete_on_close(true);

        assert_eq!(config.dir, PathBuf::from("/tmp/journal"));
        assert_eq!(config.page_size, 8192);
        assert_eq!(config.journal_size(), 64 * 8192);
        assert!(!config.sync_writes);
        assert!(config.delete_on_close);
    }

    #[test]
    fn test_config_validation() {
        let config = JournalConfig::default().with_page_size(3000);
        assert!(config.validate().is_err());

        let config = JournalConfig::default().with_page_size(512);
        assert!(config.validate().is_err());

        let config = JournalConfig::default().with_journal_pages(1);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_journal_path() {
        let config = JournalConfig::new("/data/journal");
        let path = config.journal_path(JournalNumber::new(42));
        assert_eq!(
            path,
            PathBuf::from("/data/journal/journal_000000000000002a.log")
        );

        assert_eq!(
            JournalConfig::parse_journal_number(&path),
            Some(JournalNumber::new(42))
        );
        assert_eq!(
            JournalConfig::parse_journal_number(Path::new("/data/journal/other.txt")),
            None
        );
    }
}
