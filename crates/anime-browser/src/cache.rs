//! Persistent TTL cache for API responses.
//!
//! One JSON file per entry under a shared cache directory, named
//! `<prefix><key>.json`. The directory is durable across restarts and may
//! be shared by several browser contexts (processes) at once; writes are
//! last-writer-wins per key. Every entry carries the envelope
//! `{ data, timestamp, ttl }` so any context can judge freshness on read.
//!
//! Caching is best-effort: storage failures and malformed entries are
//! logged and reported as a miss, never propagated to the request path.

use anyhow::{Context, Result};
use chrono::Utc;
use serde::{de::DeserializeOwned, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

/// Keys this context wrote itself, with the envelope timestamp of the
/// write. Shared with the change watcher so self-writes are not echoed
/// back as foreign notifications.
pub type WriteJournal = Arc<Mutex<HashMap<String, i64>>>;

/// On-disk entry envelope
#[derive(Debug, serde::Serialize, serde::Deserialize)]
pub(crate) struct CacheEnvelope {
    pub data: serde_json::Value,
    /// Write time, unix milliseconds
    pub timestamp: i64,
    /// Time to live, milliseconds
    pub ttl: u64,
}

/// Cache statistics
#[derive(Debug, Clone)]
pub struct CacheStats {
    pub entries: usize,
    pub size_bytes: u64,
}

/// Persistent TTL cache shared across browser contexts
pub struct CacheStore {
    /// Root cache directory
    cache_dir: PathBuf,
    /// Key namespace prefix
    prefix: String,
    /// Whether caching is enabled
    enabled: bool,
    /// Self-write journal, shared with the watcher
    journal: WriteJournal,
}

impl CacheStore {
    /// Create a new cache store rooted at `cache_dir`
    pub fn new(cache_dir: impl AsRef<Path>, prefix: impl Into<String>, enabled: bool) -> Result<Self> {
        let cache_dir = cache_dir.as_ref().to_path_buf();
        let prefix = prefix.into();

        if enabled {
            std::fs::create_dir_all(&cache_dir).with_context(|| {
                format!("Failed to create cache directory: {}", cache_dir.display())
            })?;
            info!(cache_dir = %cache_dir.display(), prefix = %prefix, "Cache initialized");
        }

        Ok(Self {
            cache_dir,
            prefix,
            enabled,
            journal: Arc::new(Mutex::new(HashMap::new())),
        })
    }

    /// Handle to the self-write journal, for wiring up a watcher
    pub fn journal(&self) -> WriteJournal {
        Arc::clone(&self.journal)
    }

    /// Store a value under `key` with the given TTL.
    ///
    /// Best-effort: any failure is logged and swallowed so the calling
    /// request flow is never broken by the cache.
    pub fn set<T: Serialize>(&self, key: &str, value: &T, ttl_minutes: u64) {
        if !self.enabled {
            return;
        }

        let timestamp = Utc::now().timestamp_millis();
        let envelope = match serde_json::to_value(value) {
            Ok(data) => CacheEnvelope {
                data,
                timestamp,
                ttl: ttl_minutes * 60_000,
            },
            Err(e) => {
                warn!(key = key, error = %e, "Failed to serialize cache value");
                return;
            }
        };

        if let Err(e) = self.write_entry(key, &envelope) {
            warn!(key = key, error = %e, "Failed to write cache entry");
            return;
        }

        let mut journal = self.journal.lock().unwrap_or_else(|p| p.into_inner());
        journal.insert(key.to_string(), timestamp);

        debug!(key = key, ttl_minutes = ttl_minutes, "Cache stored");
    }

    /// Get the stored value if present and unexpired.
    ///
    /// Expired entries are removed on read. Unreadable or malformed
    /// entries are logged and treated as absent.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        if !self.enabled {
            return None;
        }

        let path = self.entry_path(key);
        if !path.exists() {
            debug!(key = key, "Cache miss");
            return None;
        }

        let content = match std::fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) => {
                warn!(key = key, error = %e, "Failed to read cache entry");
                return None;
            }
        };

        let envelope: CacheEnvelope = match serde_json::from_str(&content) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!(key = key, error = %e, "Malformed cache entry");
                return None;
            }
        };

        let now = Utc::now().timestamp_millis();
        if now - envelope.timestamp > envelope.ttl as i64 {
            debug!(key = key, "Cache entry expired");
            self.remove(key);
            return None;
        }

        match serde_json::from_value(envelope.data) {
            Ok(value) => {
                debug!(key = key, "Cache hit");
                Some(value)
            }
            Err(e) => {
                warn!(key = key, error = %e, "Cache entry has unexpected shape");
                None
            }
        }
    }

    /// Remove the entry for `key`; no error if it does not exist
    pub fn remove(&self, key: &str) {
        let path = self.entry_path(key);
        if let Err(e) = std::fs::remove_file(&path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(key = key, error = %e, "Failed to remove cache entry");
            }
        }
    }

    /// Remove every entry under this store's prefix, leaving unrelated
    /// files in the directory untouched
    pub fn clear(&self) {
        if !self.enabled || !self.cache_dir.exists() {
            return;
        }

        for name in self.namespaced_files() {
            if let Err(e) = std::fs::remove_file(self.cache_dir.join(&name)) {
                warn!(file = %name, error = %e, "Failed to remove cache entry");
            }
        }
        info!("Cache cleared");
    }

    /// Approximate size of all namespaced entries: key length plus
    /// content length, summed. Observability only.
    pub fn size_bytes(&self) -> u64 {
        self.stats().size_bytes
    }

    /// Get cache statistics
    pub fn stats(&self) -> CacheStats {
        let mut entries = 0;
        let mut size_bytes = 0;

        if self.enabled && self.cache_dir.exists() {
            for name in self.namespaced_files() {
                let path = self.cache_dir.join(&name);
                if let Ok(metadata) = path.metadata() {
                    entries += 1;
                    size_bytes += name.len() as u64 + metadata.len();
                }
            }
        }

        CacheStats {
            entries,
            size_bytes,
        }
    }

    /// File names in the cache directory carrying this store's prefix
    fn namespaced_files(&self) -> Vec<String> {
        let mut names = Vec::new();
        let entries = match std::fs::read_dir(&self.cache_dir) {
            Ok(entries) => entries,
            Err(e) => {
                warn!(error = %e, "Failed to read cache directory");
                return names;
            }
        };

        for entry in entries.flatten() {
            if !entry.path().is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().to_string();
            if name.starts_with(&self.prefix) && name.ends_with(".json") {
                names.push(name);
            }
        }
        names
    }

    /// Get the file path for a given key
    fn entry_path(&self, key: &str) -> PathBuf {
        // Sanitize key to create a valid filename
        let safe_key = key.replace(['/', '\\', ':', '*', '?', '"', '<', '>', '|'], "_");
        self.cache_dir
            .join(format!("{}{}.json", self.prefix, safe_key))
    }

    /// Serialize and write an entry; temp file plus rename so a reader
    /// never observes a partial write
    fn write_entry(&self, key: &str, envelope: &CacheEnvelope) -> Result<()> {
        let path = self.entry_path(key);
        let content =
            serde_json::to_string(envelope).context("Failed to serialize cache entry")?;

        let tmp_path = path.with_extension("json.tmp");
        std::fs::write(&tmp_path, &content)
            .with_context(|| format!("Failed to write cache file: {}", tmp_path.display()))?;
        std::fs::rename(&tmp_path, &path)
            .with_context(|| format!("Failed to commit cache file: {}", path.display()))?;

        Ok(())
    }
}
