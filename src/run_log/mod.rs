//! Buffered per-run log sinks
//!
//! Each request gets its own folder under the store root and an append-only
//! in-memory buffer flushed to `run.log` when it grows past the configured
//! threshold or at explicit lifecycle points. Appending only takes the
//! buffer lock, so file I/O never blocks a status transition; flushing takes
//! the write lock first and swaps the buffer out second, which keeps file
//! content in append order even with concurrent flushers.

use anyhow::{Context, Result};
use chrono::Utc;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex as AsyncMutex;

/// File name every sink writes inside its folder
const LOG_FILE_NAME: &str = "run.log";

#[derive(Debug)]
struct FolderSink {
    dir: PathBuf,
    buffer: Mutex<String>,
    write_lock: AsyncMutex<()>,
}

impl FolderSink {
    fn new(dir: PathBuf) -> Self {
        Self {
            dir,
            buffer: Mutex::new(String::new()),
            write_lock: AsyncMutex::new(()),
        }
    }

    /// Append a timestamped line to the buffer, returning the buffered size
    fn append(&self, line: &str) -> usize {
        let mut buffer = self.buffer.lock();
        buffer.push_str(&format!("{} {}\n", Utc::now().to_rfc3339(), line));
        buffer.len()
    }

    /// Write buffered content to `run.log`
    ///
    /// The write lock is taken before the buffer is swapped out. A second
    /// flusher that arrives mid-write parks on the write lock, then picks up
    /// only lines appended after the first swap, so the file stays in append
    /// order.
    async fn flush(&self) -> Result<()> {
        let _write = self.write_lock.lock().await;
        let chunk = {
            let mut buffer = self.buffer.lock();
            std::mem::take(&mut *buffer)
        };
        if chunk.is_empty() {
            return Ok(());
        }
        write_chunk(&self.dir, &chunk).await
    }
}

async fn write_chunk(dir: &Path, chunk: &str) -> Result<()> {
    tokio::fs::create_dir_all(dir)
        .await
        .with_context(|| format!("creating log folder {}", dir.display()))?;
    let path = dir.join(LOG_FILE_NAME);
    let mut file = tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .await
        .with_context(|| format!("opening {}", path.display()))?;
    file.write_all(chunk.as_bytes()).await?;
    file.flush().await?;
    Ok(())
}

/// Append handle held by a single request
///
/// Cheap to clone; all clones share the same folder sink.
#[derive(Debug, Clone)]
pub struct RunLogHandle {
    sink: Arc<FolderSink>,
    flush_threshold: usize,
}

impl RunLogHandle {
    /// Buffer one line, returning `true` when the buffer has grown past the
    /// flush threshold and the caller should flush soon
    pub fn append(&self, line: &str) -> bool {
        self.sink.append(line) >= self.flush_threshold
    }

    /// Flush buffered lines to disk
    pub async fn flush(&self) -> Result<()> {
        self.sink.flush().await
    }

    /// Folder this handle writes into
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.sink.dir
    }
}

/// Store of per-run log sinks keyed by request ID
///
/// Entries live from [`create`](RunLogStore::create) until
/// [`flush_and_remove`](RunLogStore::flush_and_remove); text that arrives
/// after removal goes through [`late_flush`](RunLogStore::late_flush), which
/// marks the lines so readers can tell they landed out of band.
#[derive(Debug)]
pub struct RunLogStore {
    root: PathBuf,
    flush_threshold: usize,
    sinks: DashMap<String, Arc<FolderSink>>,
}

impl RunLogStore {
    /// Create a store rooted at `root`
    ///
    /// # Arguments
    /// * `root` - Directory that per-run folders are created under
    /// * `flush_threshold` - Buffered byte count that triggers a flush
    #[must_use]
    pub fn new(root: PathBuf, flush_threshold: usize) -> Self {
        Self {
            root,
            flush_threshold,
            sinks: DashMap::new(),
        }
    }

    /// Register a sink for `id` and return its append handle
    ///
    /// The folder itself is created lazily on first flush.
    pub fn create(&self, id: &str) -> RunLogHandle {
        let sink = self
            .sinks
            .entry(id.to_string())
            .or_insert_with(|| Arc::new(FolderSink::new(self.root.join(id))))
            .clone();
        RunLogHandle {
            sink,
            flush_threshold: self.flush_threshold,
        }
    }

    /// Flush `id`'s sink and retire it
    ///
    /// `final_message` is appended before the flush so the file always ends
    /// with the request's closing line.
    pub async fn flush_and_remove(&self, id: &str, final_message: &str) -> Result<()> {
        let Some((_, sink)) = self.sinks.remove(id) else {
            log::warn!("flush requested for unknown run log {id}");
            return Ok(());
        };
        sink.append(final_message);
        sink.flush().await
    }

    /// Append and flush text for a sink that was already retired
    ///
    /// Only used during shutdown; the lines carry a `[late]` marker so the
    /// out-of-band write is visible in the file.
    pub async fn late_flush(&self, id: &str, text: &str) -> Result<()> {
        let dir = self.root.join(id);
        let chunk = format!("{} [late] {}\n", Utc::now().to_rfc3339(), text);
        write_chunk(&dir, &chunk).await
    }

    /// Flush every registered sink, logging failures instead of aborting
    pub async fn flush_all(&self) {
        for entry in self.sinks.iter() {
            if let Err(e) = entry.value().flush().await {
                log::warn!("failed to flush run log {}: {e:#}", entry.key());
            }
        }
    }

    /// Root directory of the store
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Number of live sinks
    #[must_use]
    pub fn sink_count(&self) -> usize {
        self.sinks.len()
    }
}
