//! Disk persistence with an in-memory cache in front.
//!
//! Every key is stored as one file under the configured directory. Reads hit
//! the memory cache first and fall back to disk, caching what they find.
//! Writes go to memory immediately and to disk through a queue that runs one
//! disk operation at a time, in the order they were requested. Files are
//! written to a staging directory and renamed into place, so a reader never
//! sees a partial payload. When the files outgrow the disk limit, the least
//! recently accessed ones are removed.

use crate::error::{PersistenceError, Result};
use crate::memory::MemoryCache;
use crate::metrics::{self, Access, PersistencePerformanceTracker, Usage};
use crate::stack::{PersistenceCompletion, PersistenceStack};
use alicerce_core::Atomic;
use bytes::Bytes;
use std::collections::HashMap;
use std::future::Future;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;
use std::time::SystemTime;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Directory, inside the cache directory, holding files being written.
///
/// `~` is always percent-encoded in file names, so no key maps to it.
const STAGING_DIR: &str = "~staging";

type Job = Pin<Box<dyn Future<Output = ()> + Send>>;

/// Configuration of a [`DiskMemoryPersistenceStack`].
#[derive(Debug, Clone)]
pub struct DiskMemoryConfig {
    /// Directory holding one file per key
    pub path: PathBuf,

    /// Memory cache size limit, in bytes
    pub memory_limit: usize,

    /// Disk size limit, in bytes
    pub disk_limit: u64,
}

impl DiskMemoryConfig {
    /// Creates a configuration with default limits (10 MiB memory, 100 MiB disk).
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            memory_limit: 10 * 1024 * 1024,
            disk_limit: 100 * 1024 * 1024,
        }
    }

    /// Set the memory cache size limit
    pub fn with_memory_limit(mut self, limit: usize) -> Self {
        self.memory_limit = limit;
        self
    }

    /// Set the disk size limit
    pub fn with_disk_limit(mut self, limit: u64) -> Self {
        self.disk_limit = limit;
        self
    }
}

/// A persistence stack backed by a memory cache and a directory of files.
///
/// If the directory can't be created, the stack keeps working from memory
/// only: memory hits are still served, while operations that need the disk
/// fail with [`PersistenceError::DiskCacheDisabled`].
#[derive(Clone)]
pub struct DiskMemoryPersistenceStack {
    inner: Arc<Inner>,
    tracker: Option<Arc<dyn PersistencePerformanceTracker>>,
}

struct Inner {
    config: DiskMemoryConfig,
    cache: Atomic<CacheState>,
    disk_enabled: bool,
    used_disk: Atomic<u64>,
    staged: Atomic<u64>,
    jobs: mpsc::UnboundedSender<Job>,
}

/// The memory cache, and the disk reads that may fill it.
///
/// A disk read only caches its payload if the key wasn't written, removed
/// or cleared while the read was in flight.
#[derive(Debug)]
struct CacheState {
    memory: MemoryCache,
    pending_reads: HashMap<String, PendingRead>,
}

#[derive(Debug, Default)]
struct PendingRead {
    readers: usize,
    stale: bool,
}

impl CacheState {
    fn new(limit: usize) -> Self {
        Self {
            memory: MemoryCache::new(limit),
            pending_reads: HashMap::new(),
        }
    }

    /// Returns the cached payload, or registers a disk read of `key`.
    fn get_or_begin_read(&mut self, key: &str) -> Option<Bytes> {
        let payload = self.memory.get(key);
        if payload.is_none() {
            self.pending_reads.entry(key.to_string()).or_default().readers += 1;
        }
        payload
    }

    fn finish_read(&mut self, key: &str, payload: Option<&Bytes>) {
        let Some(pending) = self.pending_reads.get_mut(key) else {
            return;
        };

        if let (false, Some(payload)) = (pending.stale, payload) {
            self.memory.insert(key, payload.clone());
        }

        pending.readers -= 1;
        if pending.readers == 0 {
            self.pending_reads.remove(key);
        }
    }

    fn invalidate(&mut self, key: &str) {
        if let Some(pending) = self.pending_reads.get_mut(key) {
            pending.stale = true;
        }
    }

    fn insert(&mut self, key: &str, payload: Bytes) {
        self.invalidate(key);
        self.memory.insert(key, payload);
    }

    fn remove(&mut self, key: &str) {
        self.invalidate(key);
        self.memory.remove(key);
    }

    fn clear(&mut self) {
        for pending in self.pending_reads.values_mut() {
            pending.stale = true;
        }
        self.memory.clear();
    }
}

impl DiskMemoryPersistenceStack {
    /// Creates a stack running its disk operations on the current tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`PersistenceError::NoRuntime`] when called outside of a runtime.
    pub fn new(config: DiskMemoryConfig) -> Result<Self> {
        let runtime = Handle::try_current().map_err(|_| PersistenceError::NoRuntime)?;
        Ok(Self::with_runtime(config, runtime))
    }

    /// Creates a stack running its disk operations on `runtime`.
    pub fn with_runtime(config: DiskMemoryConfig, runtime: Handle) -> Self {
        let disk_enabled = match prepare_directory(&config.path) {
            Ok(()) => true,
            Err(error) => {
                warn!(
                    path = %config.path.display(),
                    error = %error,
                    "Failed to create disk cache directory, using memory only"
                );
                false
            }
        };

        let used_disk = if disk_enabled {
            directory_size(&config.path)
        } else {
            0
        };

        let (jobs, mut queue) = mpsc::unbounded_channel::<Job>();
        runtime.spawn(async move {
            while let Some(job) = queue.recv().await {
                job.await;
            }
        });

        Self {
            inner: Arc::new(Inner {
                cache: Atomic::new(CacheState::new(config.memory_limit)),
                config,
                disk_enabled,
                used_disk: Atomic::new(used_disk),
                staged: Atomic::new(0),
                jobs,
            }),
            tracker: None,
        }
    }

    /// Measure memory and disk accesses with `tracker`.
    pub fn with_performance_tracker(
        mut self,
        tracker: Arc<dyn PersistencePerformanceTracker>,
    ) -> Self {
        self.tracker = Some(tracker);
        self
    }

    /// Whether payloads are being written to disk.
    pub fn is_disk_enabled(&self) -> bool {
        self.inner.disk_enabled
    }

    /// Total size of the files on disk, in bytes, as last accounted.
    pub fn used_disk_size(&self) -> u64 {
        self.inner.used_disk.value()
    }

    /// Total size of the payloads held in memory, in bytes.
    pub fn used_memory_size(&self) -> usize {
        self.inner.cache.with_value(|state| state.memory.used())
    }

    fn tracker(&self) -> Option<&dyn PersistencePerformanceTracker> {
        self.tracker.as_deref()
    }

    fn enqueue<F>(&self, job: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        if self.inner.jobs.send(Box::pin(job)).is_err() {
            warn!("Disk cache queue is closed, dropping operation");
        }
    }
}

impl PersistenceStack for DiskMemoryPersistenceStack {
    type Error = PersistenceError;

    fn object(&self, key: &str, completion: PersistenceCompletion<Option<Bytes>, Self::Error>) {
        let token = metrics::start(self.tracker(), Access::ReadMemory);
        let (cached, used_memory) = self.inner.cache.modify(|state| {
            let payload = if self.inner.disk_enabled {
                state.get_or_begin_read(key)
            } else {
                state.memory.get(key)
            };
            (payload, state.memory.used())
        });
        let usage = Usage {
            size: cached.as_ref().map_or(0, |payload| payload.len() as u64),
            total: used_memory as u64,
        };
        metrics::stop(self.tracker(), token, Access::ReadMemory, Ok(usage));

        if let Some(payload) = cached {
            return completion(Ok(Some(payload)));
        }

        if !self.inner.disk_enabled {
            return completion(Err(PersistenceError::DiskCacheDisabled));
        }

        let path = match self.inner.file_path(key) {
            Ok(path) => path,
            Err(error) => {
                self.inner.cache.modify(|state| state.finish_read(key, None));
                return completion(Err(error));
            }
        };

        let inner = Arc::clone(&self.inner);
        let tracker = self.tracker.clone();
        let key = key.to_string();
        self.enqueue(async move {
            let token = metrics::start(tracker.as_deref(), Access::ReadDisk);
            let result = match tokio::fs::read(&path).await {
                Ok(data) => Ok(Some(Bytes::from(data))),
                Err(error) if error.kind() == ErrorKind::NotFound => Ok(None),
                Err(error) => Err(PersistenceError::from(error)),
            };
            let outcome = result.as_ref().map(|payload| Usage {
                size: payload.as_ref().map_or(0, |payload| payload.len() as u64),
                total: inner.used_disk.value(),
            });
            metrics::stop(tracker.as_deref(), token, Access::ReadDisk, outcome);

            let payload = result.as_ref().ok().and_then(Option::as_ref);
            inner.cache.modify(|state| state.finish_read(&key, payload));

            completion(result)
        });
    }

    fn set_object(
        &self,
        payload: Bytes,
        key: &str,
        completion: PersistenceCompletion<(), Self::Error>,
    ) {
        let path = match self.inner.file_path(key) {
            Ok(path) => path,
            Err(error) => return completion(Err(error)),
        };

        let token = metrics::start(self.tracker(), Access::WriteMemory);
        let used_memory = self.inner.cache.modify(|state| {
            state.insert(key, payload.clone());
            state.memory.used()
        });
        let usage = Usage {
            size: payload.len() as u64,
            total: used_memory as u64,
        };
        metrics::stop(self.tracker(), token, Access::WriteMemory, Ok(usage));

        if !self.inner.disk_enabled {
            return completion(Err(PersistenceError::DiskCacheDisabled));
        }

        let inner = Arc::clone(&self.inner);
        let tracker = self.tracker.clone();
        self.enqueue(async move {
            let token = metrics::start(tracker.as_deref(), Access::WriteDisk);
            let result = inner.write_file(&path, &payload).await;
            let outcome = result.as_ref().map(|_| Usage {
                size: payload.len() as u64,
                total: inner.used_disk.value(),
            });
            metrics::stop(tracker.as_deref(), token, Access::WriteDisk, outcome);

            if result.is_ok() {
                inner.evict_if_needed().await;
            }

            completion(result)
        });
    }

    fn remove_object(&self, key: &str, completion: PersistenceCompletion<(), Self::Error>) {
        self.inner.cache.modify(|state| state.remove(key));

        if !self.inner.disk_enabled {
            return completion(Err(PersistenceError::DiskCacheDisabled));
        }

        let path = match self.inner.file_path(key) {
            Ok(path) => path,
            Err(error) => return completion(Err(error)),
        };

        let inner = Arc::clone(&self.inner);
        self.enqueue(async move { completion(inner.remove_file(&path).await) });
    }

    fn remove_all(&self, completion: PersistenceCompletion<(), Self::Error>) {
        self.inner.cache.modify(CacheState::clear);

        if !self.inner.disk_enabled {
            return completion(Err(PersistenceError::DiskCacheDisabled));
        }

        let inner = Arc::clone(&self.inner);
        self.enqueue(async move { completion(inner.clear_directory().await) });
    }
}

impl Inner {
    fn file_path(&self, key: &str) -> Result<PathBuf> {
        Ok(self.config.path.join(file_name(key)?))
    }

    fn staging_path(&self) -> PathBuf {
        let sequence = self.staged.modify(|staged| {
            *staged += 1;
            *staged
        });
        self.config.path.join(STAGING_DIR).join(sequence.to_string())
    }

    async fn write_file(&self, path: &Path, payload: &[u8]) -> Result<()> {
        let existing_size = match tokio::fs::metadata(path).await {
            Ok(metadata) if metadata.is_file() => metadata.len(),
            Ok(_) => {
                return Err(PersistenceError::Io(std::io::Error::other(format!(
                    "not a regular file: {}",
                    path.display()
                ))));
            }
            Err(error) if error.kind() == ErrorKind::NotFound => 0,
            Err(error) => return Err(error.into()),
        };

        let staging = self.staging_path();
        tokio::fs::write(&staging, payload).await?;
        if let Err(error) = tokio::fs::rename(&staging, path).await {
            let _ = tokio::fs::remove_file(&staging).await;
            return Err(error.into());
        }

        let new_size = payload.len() as u64;
        self.used_disk
            .modify(|used| *used = used.saturating_sub(existing_size).saturating_add(new_size));

        debug!(path = %path.display(), size = new_size, "Wrote payload to disk");
        Ok(())
    }

    async fn remove_file(&self, path: &Path) -> Result<()> {
        let size = match tokio::fs::metadata(path).await {
            Ok(metadata) => metadata.len(),
            Err(error) if error.kind() == ErrorKind::NotFound => return Ok(()),
            Err(error) => return Err(error.into()),
        };

        match tokio::fs::remove_file(path).await {
            Ok(()) => {
                self.used_disk.modify(|used| *used = used.saturating_sub(size));
                Ok(())
            }
            Err(error) if error.kind() == ErrorKind::NotFound => Ok(()),
            Err(error) => Err(error.into()),
        }
    }

    async fn clear_directory(&self) -> Result<()> {
        for (path, _, _) in self.directory_entries().await? {
            self.remove_file(&path).await?;
        }
        Ok(())
    }

    async fn directory_entries(&self) -> Result<Vec<(PathBuf, SystemTime, u64)>> {
        let mut entries = Vec::new();
        let mut dir = tokio::fs::read_dir(&self.config.path).await?;

        while let Some(entry) = dir.next_entry().await? {
            let Ok(metadata) = entry.metadata().await else {
                continue;
            };
            if !metadata.is_file() {
                continue;
            }

            let accessed = metadata
                .accessed()
                .or_else(|_| metadata.modified())
                .unwrap_or(SystemTime::UNIX_EPOCH);
            entries.push((entry.path(), accessed, metadata.len()));
        }

        Ok(entries)
    }

    async fn evict_if_needed(&self) {
        let used = self.used_disk.value();
        if used <= self.config.disk_limit {
            return;
        }

        let mut entries = match self.directory_entries().await {
            Ok(entries) => entries,
            Err(error) => {
                warn!(error = %error, "Failed to list disk cache for eviction");
                return;
            }
        };

        // least recently accessed first
        entries.sort_by_key(|(_, accessed, _)| *accessed);

        let excess = used - self.config.disk_limit;
        let mut evicted = 0u64;

        for (path, _, size) in entries {
            if evicted >= excess {
                break;
            }

            match self.remove_file(&path).await {
                Ok(()) => {
                    evicted += size;
                    debug!(path = %path.display(), size, "Evicted from disk");
                }
                Err(error) => {
                    warn!(path = %path.display(), error = %error, "Failed to evict file");
                }
            }
        }
    }
}

/// Creates the cache and staging directories, dropping leftover staged files.
fn prepare_directory(path: &Path) -> std::io::Result<()> {
    let staging = path.join(STAGING_DIR);
    match std::fs::remove_dir_all(&staging) {
        Ok(()) => {}
        Err(error) if error.kind() == ErrorKind::NotFound => {}
        Err(error) => return Err(error),
    }
    std::fs::create_dir_all(staging)
}

/// Maps a key to a file name, percent-encoding anything that isn't path-safe.
fn file_name(key: &str) -> Result<String> {
    if key.is_empty() || key == "." || key == ".." {
        return Err(PersistenceError::InvalidKey(key.to_string()));
    }

    let encoded: String = url::form_urlencoded::byte_serialize(key.as_bytes()).collect();

    if encoded.len() > 255 {
        return Err(PersistenceError::InvalidKey(key.to_string()));
    }

    Ok(encoded)
}

fn directory_size(path: &Path) -> u64 {
    let Ok(entries) = std::fs::read_dir(path) else {
        return 0;
    };

    entries
        .filter_map(|entry| entry.ok()?.metadata().ok())
        .filter(|metadata| metadata.is_file())
        .map(|metadata| metadata.len())
        .sum()
}
