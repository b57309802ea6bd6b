//! Cache store trait and implementations.
//!
//! A store holds at most one [`RateEntry`] per base currency with
//! last-write-wins semantics. Stores never judge staleness; they hand back
//! whatever they hold and the resolver decides what is usable.

use std::collections::BTreeMap;
use std::fs::OpenOptions;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use fs2::FileExt;
use tempfile::NamedTempFile;
use tracing::{debug, warn};
use xrate_common::{Currency, RateEntry};

use crate::error::{FxError, FxResult};

/// Key-value store of rate entries keyed by base currency.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Get the entry for `base`, stale or not.
    async fn get(&self, base: &Currency) -> FxResult<Option<RateEntry>>;

    /// Insert or replace the entry for `entry.base`.
    async fn put(&self, entry: RateEntry) -> FxResult<()>;

    /// Every entry currently held.
    async fn list(&self) -> FxResult<Vec<RateEntry>>;
}

/// In-process store.
#[derive(Default)]
pub struct MemoryCacheStore {
    entries: DashMap<Currency, RateEntry>,
}

impl MemoryCacheStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the store is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl CacheStore for MemoryCacheStore {
    async fn get(&self, base: &Currency) -> FxResult<Option<RateEntry>> {
        Ok(self.entries.get(base).map(|e| e.clone()))
    }

    async fn put(&self, entry: RateEntry) -> FxResult<()> {
        debug!(base = %entry.base, rates = entry.rates.len(), "Storing rate entry");
        self.entries.insert(entry.base.clone(), entry);
        Ok(())
    }

    async fn list(&self) -> FxResult<Vec<RateEntry>> {
        Ok(self.entries.iter().map(|e| e.value().clone()).collect())
    }
}

/// Store persisted as one JSON document keyed by base currency.
///
/// The file is re-read on every call so separate processes sharing it see
/// each other's writes. Each `put` holds an exclusive lock on a sibling
/// `.lock` file for its whole read-modify-write and installs the new
/// document through a uniquely named temp file and a rename.
pub struct FileCacheStore {
    path: PathBuf,
    lock_path: PathBuf,
}

impl FileCacheStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let mut lock_path = path.clone().into_os_string();
        lock_path.push(".lock");

        Self {
            path,
            lock_path: PathBuf::from(lock_path),
        }
    }

    async fn read_all(&self) -> FxResult<BTreeMap<Currency, RateEntry>> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => decode(&self.path, &bytes),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(e) => Err(io_error("read", &self.path, e)),
        }
    }
}

fn io_error(action: &str, path: &Path, e: std::io::Error) -> FxError {
    FxError::Store(format!("failed to {} {}: {}", action, path.display(), e))
}

fn decode(path: &Path, bytes: &[u8]) -> FxResult<BTreeMap<Currency, RateEntry>> {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(BTreeMap::new());
    }

    serde_json::from_slice(bytes)
        .map_err(|e| FxError::Store(format!("corrupt cache file {}: {}", path.display(), e)))
}

/// Blocking read-modify-write of the cache file under the lock file.
fn put_locked(path: &Path, lock_path: &Path, entry: RateEntry) -> FxResult<()> {
    let dir = match path.parent().filter(|p| !p.as_os_str().is_empty()) {
        Some(parent) => parent.to_path_buf(),
        None => PathBuf::from("."),
    };
    std::fs::create_dir_all(&dir).map_err(|e| io_error("create", &dir, e))?;

    let lock = OpenOptions::new()
        .create(true)
        .truncate(false)
        .write(true)
        .open(lock_path)
        .map_err(|e| io_error("open", lock_path, e))?;
    lock.lock_exclusive().map_err(|e| io_error("lock", lock_path, e))?;

    // Only an undecodable document is discarded; I/O failures abort the write.
    let mut entries = match std::fs::read(path) {
        Ok(bytes) => decode(path, &bytes).unwrap_or_else(|e| {
            warn!(error = %e, "Discarding unreadable cache file");
            BTreeMap::new()
        }),
        Err(e) if e.kind() == ErrorKind::NotFound => BTreeMap::new(),
        Err(e) => return Err(io_error("read", path, e)),
    };

    debug!(base = %entry.base, path = %path.display(), "Storing rate entry");
    entries.insert(entry.base.clone(), entry);

    let json = serde_json::to_vec_pretty(&entries)
        .map_err(|e| FxError::Store(format!("failed to encode cache: {}", e)))?;

    let mut tmp = NamedTempFile::new_in(&dir).map_err(|e| io_error("create temp file in", &dir, e))?;
    tmp.write_all(&json)
        .and_then(|_| tmp.as_file().sync_all())
        .map_err(|e| io_error("write", tmp.path(), e))?;
    tmp.persist(path).map_err(|e| io_error("replace", path, e.error))?;

    // Dropping `lock` releases it.
    Ok(())
}

#[async_trait]
impl CacheStore for FileCacheStore {
    async fn get(&self, base: &Currency) -> FxResult<Option<RateEntry>> {
        Ok(self.read_all().await?.remove(base))
    }

    async fn put(&self, entry: RateEntry) -> FxResult<()> {
        let path = self.path.clone();
        let lock_path = self.lock_path.clone();

        tokio::task::spawn_blocking(move || put_locked(&path, &lock_path, entry))
            .await
            .map_err(|e| FxError::Store(format!("cache write task failed: {}", e)))?
    }

    async fn list(&self) -> FxResult<Vec<RateEntry>> {
        Ok(self.read_all().await?.into_values().collect())
    }
}

/// Freshness summary over a set of entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    pub total_entries: usize,
    pub fresh_entries: usize,
    pub stale_entries: usize,
}

impl CacheStats {
    pub fn from_entries(entries: &[RateEntry], now: DateTime<Utc>) -> Self {
        let stale = entries.iter().filter(|e| e.is_stale(now)).count();
        Self {
            total_entries: entries.len(),
            fresh_entries: entries.len() - stale,
            stale_entries: stale,
        }
    }
}
