//! Journal writers.
//!
//! A journal writer owns the physical storage of one journal file: a flat
//! sequence of pages written with gather writes and read back page-aligned
//! during recovery.

use std::fs::{File as StdFile, OpenOptions};
use std::future::Future;
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use nexus_common::types::JournalNumber;
use parking_lot::Mutex;
use tokio::task;
use tracing::{debug, warn};

use crate::config::JournalConfig;
use crate::error::{JournalError, JournalResult};

/// Physical storage of a journal file.
pub trait JournalWriter: Send + Sync + 'static {
    /// Page size of the journal.
    fn page_size(&self) -> usize;

    /// Pages allocated for the journal.
    fn number_of_allocated_pages(&self) -> u64;

    /// Writes `pages` back to back starting at `byte_offset`.
    ///
    /// The returned future owns everything it needs; it completes once the
    /// data reached the writer's durability point.
    fn write_gather(
        &self,
        byte_offset: u64,
        pages: Vec<Bytes>,
    ) -> impl Future<Output = JournalResult<()>> + Send + 'static;

    /// Reads `buf.len()` bytes starting at page `page_position`.
    ///
    /// Returns `Ok(false)` when the range extends past the end of the
    /// journal.
    fn read(&self, page_position: u64, buf: &mut [u8]) -> JournalResult<bool>;

    /// Sets whether the journal is removed when the writer is disposed.
    fn set_delete_on_close(&self, delete: bool);

    /// Closes the writer. Idempotent.
    fn dispose(&self);
}

/// Journal writer backed by a file.
///
/// I/O runs on tokio's blocking pool, serialized by a mutex around the
/// file handle.
pub struct FileJournalWriter {
    /// The journal file; `None` once disposed.
    file: Arc<Mutex<Option<StdFile>>>,
    path: PathBuf,
    page_size: usize,
    allocated_pages: u64,
    sync_writes: bool,
    delete_on_close: AtomicBool,
}

impl FileJournalWriter {
    /// Creates journal file `number`, preallocating the configured pages.
    ///
    /// An existing file with the same number is truncated.
    pub async fn create(config: &JournalConfig, number: JournalNumber) -> JournalResult<Self> {
        config.validate()?;
        let dir = config.dir.clone();
        let path = config.journal_path(number);
        let size = config.journal_size();

        let path_clone = path.clone();
        let file = task::spawn_blocking(move || -> JournalResult<StdFile> {
            std::fs::create_dir_all(&dir)?;
            let file = OpenOptions::new()
                .create(true)
                .truncate(true)
                .read(true)
                .write(true)
                .open(&path_clone)?;
            file.set_len(size)?;
            Ok(file)
        })
        .await
        .map_err(task_failed)??;

        debug!(path = %path.display(), pages = config.journal_pages, "created journal file");
        Ok(Self::from_file(file, path, config, config.journal_pages))
    }

    /// Opens an existing journal file `number`.
    ///
    /// The allocated page count is derived from the file length.
    pub async fn open(config: &JournalConfig, number: JournalNumber) -> JournalResult<Self> {
        config.validate()?;
        let path = config.journal_path(number);

        let path_clone = path.clone();
        let (file, len) = task::spawn_blocking(move || -> JournalResult<(StdFile, u64)> {
            let file = OpenOptions::new().read(true).write(true).open(&path_clone)?;
            let len = file.metadata()?.len();
            Ok((file, len))
        })
        .await
        .map_err(task_failed)??;

        let pages = len / config.page_size as u64;
        debug!(path = %path.display(), pages, "opened journal file");
        Ok(Self::from_file(file, path, config, pages))
    }

    fn from_file(file: StdFile, path: PathBuf, config: &JournalConfig, pages: u64) -> Self {
        Self {
            file: Arc::new(Mutex::new(Some(file))),
            path,
            page_size: config.page_size,
            allocated_pages: pages,
            sync_writes: config.sync_writes,
            delete_on_close: AtomicBool::new(config.delete_on_close),
        }
    }

    /// Path of the journal file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns true once the writer was disposed.
    pub fn is_disposed(&self) -> bool {
        self.file.lock().is_none()
    }
}

impl JournalWriter for FileJournalWriter {
    fn page_size(&self) -> usize {
        self.page_size
    }

    fn number_of_allocated_pages(&self) -> u64 {
        self.allocated_pages
    }

    fn write_gather(
        &self,
        byte_offset: u64,
        pages: Vec<Bytes>,
    ) -> impl Future<Output = JournalResult<()>> + Send + 'static {
        let file = Arc::clone(&self.file);
        let sync = self.sync_writes;

        async move {
            task::spawn_blocking(move || -> JournalResult<()> {
                let mut guard = file.lock();
                let file = guard.as_mut().ok_or(JournalError::WriterClosed)?;
                file.seek(SeekFrom::Start(byte_offset))?;
                for page in &pages {
                    file.write_all(page)?;
                }
                if sync {
                    file.sync_data()?;
                }
                Ok(())
            })
            .await
            .map_err(task_failed)?
        }
    }

    fn read(&self, page_position: u64, buf: &mut [u8]) -> JournalResult<bool> {
        let offset = page_position * self.page_size as u64;
        let mut guard = self.file.lock();
        let file = guard.as_mut().ok_or(JournalError::WriterClosed)?;

        let len = file.metadata()?.len();
        if offset + buf.len() as u64 > len {
            return Ok(false);
        }

        file.seek(SeekFrom::Start(offset))?;
        match file.read_exact(buf) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    fn set_delete_on_close(&self, delete: bool) {
        self.delete_on_close.store(delete, Ordering::Release);
    }

    fn dispose(&self) {
        let Some(file) = self.file.lock().take() else {
            return;
        };
        drop(file);

        if self.delete_on_close.load(Ordering::Acquire) {
            if let Err(e) = std::fs::remove_file(&self.path) {
                warn!(path = %self.path.display(), error = %e, "failed to delete journal file");
            } else {
                debug!(path = %self.path.display(), "deleted journal file");
            }
        }
    }
}

impl std::fmt::Debug for FileJournalWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileJournalWriter")
            .field("path", &self.path)
            .field("page_size", &self.page_size)
            .field("allocated_pages", &self.allocated_pages)
            .finish()
    }
}

fn task_failed(e: task::JoinError) -> JournalError {
    JournalError::WriteTaskFailed {
        reason: e.to_string(),
    }
}

/// In-memory journal writer.
///
/// Keeps the journal in a byte vector. Writes can be made to fail on
/// demand, and disposals are counted.
pub struct MemoryJournalWriter {
    data: Arc<Mutex<Vec<u8>>>,
    page_size: usize,
    allocated_pages: u64,
    fail_next_write: Mutex<Option<io::ErrorKind>>,
    writes: Arc<AtomicU64>,
    dispose_count: AtomicUsize,
    delete_on_close: AtomicBool,
}

impl MemoryJournalWriter {
    /// Creates a zeroed journal of `allocated_pages` pages.
    pub fn new(page_size: usize, allocated_pages: u64) -> Self {
        Self::from_bytes(page_size, allocated_pages, Vec::new())
    }

    /// Creates a journal holding `data`, zero-padded to the allocated size.
    pub fn from_bytes(page_size: usize, allocated_pages: u64, mut data: Vec<u8>) -> Self {
        let len = page_size * allocated_pages as usize;
        if data.len() < len {
            data.resize(len, 0);
        }
        Self {
            data: Arc::new(Mutex::new(data)),
            page_size,
            allocated_pages,
            fail_next_write: Mutex::new(None),
            writes: Arc::new(AtomicU64::new(0)),
            dispose_count: AtomicUsize::new(0),
            delete_on_close: AtomicBool::new(false),
        }
    }

    /// Makes the next gather write fail with `kind`.
    pub fn fail_next_write(&self, kind: io::ErrorKind) {
        *self.fail_next_write.lock() = Some(kind);
    }

    /// Copy of the journal contents.
    pub fn contents(&self) -> Vec<u8> {
        self.data.lock().clone()
    }

    /// Number of completed gather writes.
    pub fn write_count(&self) -> u64 {
        self.writes.load(Ordering::Acquire)
    }

    /// Number of times `dispose` was called.
    pub fn dispose_count(&self) -> usize {
        self.dispose_count.load(Ordering::Acquire)
    }

    /// Current delete-on-close setting.
    pub fn delete_on_close(&self) -> bool {
        self.delete_on_close.load(Ordering::Acquire)
    }
}

impl JournalWriter for MemoryJournalWriter {
    fn page_size(&self) -> usize {
        self.page_size
    }

    fn number_of_allocated_pages(&self) -> u64 {
        self.allocated_pages
    }

    fn write_gather(
        &self,
        byte_offset: u64,
        pages: Vec<Bytes>,
    ) -> impl Future<Output = JournalResult<()>> + Send + 'static {
        let data = Arc::clone(&self.data);
        let fail = self.fail_next_write.lock().take();
        let writes = Arc::clone(&self.writes);

        async move {
            if let Some(kind) = fail {
                return Err(io::Error::new(kind, "injected write failure").into());
            }

            let mut data = data.lock();
            let mut offset = byte_offset as usize;
            for page in &pages {
                let end = offset + page.len();
                if data.len() < end {
                    data.resize(end, 0);
                }
                data[offset..end].copy_from_slice(page);
                offset = end;
            }
            writes.fetch_add(1, Ordering::AcqRel);
            Ok(())
        }
    }

    fn read(&self, page_position: u64, buf: &mut [u8]) -> JournalResult<bool> {
        let data = self.data.lock();
        let offset = page_position as usize * self.page_size;
        match data.get(offset..offset + buf.len()) {
            Some(source) => {
                buf.copy_from_slice(source);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn set_delete_on_close(&self, delete: bool) {
        self.delete_on_close.store(delete, Ordering::Release);
    }

    fn dispose(&self) {
        self.dispose_count.fetch_add(1, Ordering::AcqRel);
    }
}

impl std::fmt::Debug for MemoryJournalWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryJournalWriter")
            .field("page_size", &self.page_size)
            .field("allocated_pages", &self.allocated_pages)
            .field("writes", &self.write_count())
            .field("dispose_count", &self.dispose_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn page(byte: u8, size: usize) -> Bytes {
        Bytes::from(vec![byte; size])
    }

    #[tokio::test]
    async fn test_file_writer_gather_and_read() {
        let dir = TempDir::new().unwrap();
        let config = JournalConfig::new(dir.path())
            .with_page_size(1024)
            .with_journal_pages(8);

        let writer = FileJournalWriter::create(&config, JournalNumber::new(1))
            .await
            .unwrap();
        assert_eq!(writer.number_of_allocated_pages(), 8);
        assert!(writer.path().exists());

        writer
            .write_gather(1024, vec![page(1, 1024), page(2, 1024)])
            .await
            .unwrap();

        let mut buf = vec![0u8; 2048];
        assert!(writer.read(1, &mut buf).unwrap());
        assert!(buf[..1024].iter().all(|b| *b == 1));
        assert!(buf[1024..].iter().all(|b| *b == 2));

        // past the end of the file
        let mut buf = vec![0u8; 1024];
        assert!(!writer.read(8, &mut buf).unwrap());
    }

    #[tokio::test]
    async fn test_file_writer_reopen() {
        let dir = TempDir::new().unwrap();
        let config = JournalConfig::new(dir.path())
            .with_page_size(1024)
            .with_journal_pages(4);

        let writer = FileJournalWriter::create(&config, JournalNumber::new(7))
            .await
            .unwrap();
        writer.write_gather(0, vec![page(9, 1024)]).await.unwrap();
        writer.dispose();
        assert!(writer.is_disposed());

        let reopened = FileJournalWriter::open(&config, JournalNumber::new(7))
            .await
            .unwrap();
        assert_eq!(reopened.number_of_allocated_pages(), 4);
        let mut buf = vec![0u8; 1024];
        assert!(reopened.read(0, &mut buf).unwrap());
        assert_eq!(buf[0], 9);
    }

    #[tokio::test]
    async fn test_file_writer_delete_on_close() {
        let dir = TempDir::new().unwrap();
        let config = JournalConfig::new(dir.path()).with_page_size(1024);

        let writer = FileJournalWriter::create(&config, JournalNumber::new(2))
            .await
            .unwrap();
        let path = writer.path().to_path_buf();
        writer.set_delete_on_close(true);
        writer.dispose();
        writer.dispose();
        assert!(!path.exists());

        let err = writer.write_gather(0, vec![page(0, 1024)]).await.unwrap_err();
        assert!(matches!(err, JournalError::WriterClosed));
        assert!(writer.read(0, &mut [0u8; 16]).is_err());
    }

    #[tokio::test]
    async fn test_memory_writer_failure_injection() {
        let writer = MemoryJournalWriter::new(1024, 4);
        writer.fail_next_write(io::ErrorKind::Other);

        let err = writer.write_gather(0, vec![page(1, 1024)]).await.unwrap_err();
        assert!(err.is_io());
        assert_eq!(writer.write_count(), 0);

        writer.write_gather(0, vec![page(1, 1024)]).await.unwrap();
        assert_eq!(writer.write_count(), 1);
        assert_eq!(writer.contents()[0], 1);

        let mut buf = vec![0u8; 1024];
        assert!(writer.read(3, &mut buf).unwrap());
        assert!(!writer.read(4, &mut buf).unwrap());
    }
}
