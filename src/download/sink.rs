//! Destinations for received bytes.
//!
//! The transport hands every body chunk to [`Sink::on_bytes_received`]. A sink
//! that accepts fewer bytes than offered ends the transfer; both built-in sinks
//! use that to honour the process-wide cancellation signal by accepting zero
//! bytes once it is raised.

use std::io::{self, SeekFrom};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncSeekExt, AsyncWriteExt, BufWriter};
use tracing::debug;

use super::cancel;
use super::constants::MEMORY_SINK_INITIAL_CAPACITY;
use super::error::DownloadError;

/// Receives the body of a transfer.
#[async_trait]
pub trait Sink: Send {
    /// Stores `chunk` and returns how many bytes were accepted.
    ///
    /// Returning less than `chunk.len()` aborts the transfer.
    async fn on_bytes_received(&mut self, chunk: &[u8]) -> io::Result<usize>;

    /// Empties the destination, including bytes it held before it was opened.
    ///
    /// Used when a ranged request comes back as a full response, so the body
    /// has to be written from byte 0.
    async fn restart(&mut self) -> io::Result<()>;

    /// Bytes accepted since the sink was opened (or last restarted).
    fn bytes_written(&self) -> u64;

    /// Flushes buffered data. Called once after the last attempt.
    async fn finish(&mut self) -> io::Result<()>;
}

/// Growable in-memory buffer.
///
/// Nothing is allocated until the first chunk arrives. Capacity only grows
/// during a transfer, and [`into_inner`](Self::into_inner) hands the buffer
/// to the caller.
#[derive(Debug, Default)]
pub struct MemorySink {
    buf: Vec<u8>,
}

impl MemorySink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Bytes currently held.
    #[must_use]
    pub fn size(&self) -> usize {
        self.buf.len()
    }

    /// Bytes currently allocated.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.buf.capacity()
    }

    #[must_use]
    pub fn as_slice(&self) -> &[u8] {
        &self.buf
    }

    /// Takes ownership of the received bytes.
    #[must_use]
    pub fn into_inner(self) -> Vec<u8> {
        self.buf
    }

    fn grow_for(&mut self, incoming: usize) -> io::Result<()> {
        if self.buf.len() + incoming <= self.buf.capacity() {
            return Ok(());
        }
        let additional = if self.buf.capacity() == 0 {
            incoming.max(MEMORY_SINK_INITIAL_CAPACITY)
        } else {
            incoming
        };
        self.buf
            .try_reserve(additional)
            .map_err(|e| io::Error::new(io::ErrorKind::OutOfMemory, e))
    }
}

#[async_trait]
impl Sink for MemorySink {
    async fn on_bytes_received(&mut self, chunk: &[u8]) -> io::Result<usize> {
        if cancel::is_cancelled() {
            return Ok(0);
        }
        self.grow_for(chunk.len())?;
        self.buf.extend_from_slice(chunk);
        Ok(chunk.len())
    }

    async fn restart(&mut self) -> io::Result<()> {
        self.buf.clear();
        Ok(())
    }

    fn bytes_written(&self) -> u64 {
        self.buf.len() as u64
    }

    async fn finish(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// File destination.
///
/// Opened either truncating (fresh download) or appending (resumed
/// download). Partial contents are left in place when a transfer fails.
#[derive(Debug)]
pub struct FileSink {
    path: PathBuf,
    writer: BufWriter<File>,
    base: u64,
    written: u64,
}

impl FileSink {
    /// Creates or truncates `path`.
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError::Io`] when the file cannot be created.
    pub async fn create(path: impl Into<PathBuf>) -> Result<Self, DownloadError> {
        let path = path.into();
        let file = File::create(&path)
            .await
            .map_err(|e| DownloadError::io(&path, e))?;
        debug!(path = %path.display(), "opened destination for write");
        Ok(Self::from_parts(path, file, 0))
    }

    /// Opens `path` for append, creating it if missing.
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError::Io`] when the file cannot be opened.
    pub async fn append(path: impl Into<PathBuf>) -> Result<Self, DownloadError> {
        let path = path.into();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(|e| DownloadError::io(&path, e))?;
        let base = file
            .metadata()
            .await
            .map_err(|e| DownloadError::io(&path, e))?
            .len();
        debug!(path = %path.display(), existing_bytes = base, "opened destination for append");
        Ok(Self::from_parts(path, file, base))
    }

    fn from_parts(path: PathBuf, file: File, base: u64) -> Self {
        Self {
            path,
            writer: BufWriter::new(file),
            base,
            written: 0,
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Length of the file ahead of this sink's bytes: its length when opened,
    /// or 0 after a restart.
    #[must_use]
    pub fn base_offset(&self) -> u64 {
        self.base
    }
}

#[async_trait]
impl Sink for FileSink {
    async fn on_bytes_received(&mut self, chunk: &[u8]) -> io::Result<usize> {
        if cancel::is_cancelled() {
            return Ok(0);
        }
        self.writer.write_all(chunk).await?;
        self.written += chunk.len() as u64;
        Ok(chunk.len())
    }

    async fn restart(&mut self) -> io::Result<()> {
        self.writer.flush().await?;
        let file = self.writer.get_mut();
        file.set_len(0).await?;
        file.seek(SeekFrom::Start(0)).await?;
        debug!(path = %self.path.display(), dropped = self.base + self.written, "restarted destination");
        self.base = 0;
        self.written = 0;
        Ok(())
    }

    fn bytes_written(&self) -> u64 {
        self.written
    }

    async fn finish(&mut self) -> io::Result<()> {
        self.writer.flush().await
    }
}
