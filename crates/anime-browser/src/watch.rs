//! Cross-context cache change notifier.
//!
//! Watches the shared cache directory for entries written by *other*
//! browser contexts and republishes them as `(key, data)` callbacks.
//! Writes made through this context's own store are recognized via the
//! write journal and suppressed, mirroring the asymmetry of the browser
//! storage event: a context never observes its own writes.
//!
//! Detection is poll-based; each subscription owns one polling task.
//! Entries already present when the subscription starts do not fire, and
//! removals are not delivered.

use crate::cache::{CacheEnvelope, WriteJournal};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Metadata fingerprint used to detect changed entry files
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FileStamp {
    len: u64,
    modified: Option<SystemTime>,
}

/// Watches a shared cache directory for foreign writes
pub struct CacheWatcher {
    cache_dir: PathBuf,
    prefix: String,
    poll_interval: Duration,
    journal: WriteJournal,
}

/// Handle for an active subscription; dropping it stops the watch task
pub struct Subscription {
    handle: JoinHandle<()>,
}

impl Subscription {
    /// Stop delivering notifications
    pub fn unsubscribe(self) {
        self.handle.abort();
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

impl CacheWatcher {
    /// Create a watcher over `cache_dir` for keys under `prefix`.
    ///
    /// `journal` must be the write journal of this context's own store so
    /// self-writes can be told apart from foreign ones.
    pub fn new(
        cache_dir: impl AsRef<Path>,
        prefix: impl Into<String>,
        poll_interval: Duration,
        journal: WriteJournal,
    ) -> Self {
        Self {
            cache_dir: cache_dir.as_ref().to_path_buf(),
            prefix: prefix.into(),
            poll_interval,
            journal,
        }
    }

    /// Subscribe to foreign cache writes.
    ///
    /// The callback receives the clean key (prefix stripped) and the
    /// decoded `data` payload. Malformed entries are logged, not
    /// delivered.
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(String, serde_json::Value) + Send + 'static,
    {
        let cache_dir = self.cache_dir.clone();
        let prefix = self.prefix.clone();
        let poll_interval = self.poll_interval;
        let journal = std::sync::Arc::clone(&self.journal);

        let handle = tokio::spawn(async move {
            // Entries present at subscription time must not fire
            let mut seen = scan(&cache_dir, &prefix);

            let mut ticker = tokio::time::interval(poll_interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            ticker.tick().await; // first tick completes immediately

            loop {
                ticker.tick().await;

                let current = scan(&cache_dir, &prefix);
                for (name, stamp) in &current {
                    if seen.get(name) == Some(stamp) {
                        continue;
                    }

                    let clean_key = name
                        .strip_prefix(prefix.as_str())
                        .and_then(|rest| rest.strip_suffix(".json"))
                        .unwrap_or(name)
                        .to_string();

                    let path = cache_dir.join(name);
                    let content = match std::fs::read_to_string(&path) {
                        Ok(content) => content,
                        Err(e) => {
                            warn!(key = %clean_key, error = %e, "Failed to read changed entry");
                            continue;
                        }
                    };
                    let envelope: CacheEnvelope = match serde_json::from_str(&content) {
                        Ok(envelope) => envelope,
                        Err(e) => {
                            warn!(key = %clean_key, error = %e, "Ignoring malformed cache write");
                            continue;
                        }
                    };

                    // A journal hit with the same write timestamp means this
                    // context produced the entry itself
                    let own_write = {
                        let journal = journal.lock().unwrap_or_else(|p| p.into_inner());
                        journal.get(&clean_key) == Some(&envelope.timestamp)
                    };
                    if own_write {
                        debug!(key = %clean_key, "Skipping self-write");
                        continue;
                    }

                    debug!(key = %clean_key, "Cache updated by another context");
                    callback(clean_key, envelope.data);
                }

                seen = current;
            }
        });

        Subscription { handle }
    }
}

/// Fingerprint every namespaced entry file in the directory
fn scan(cache_dir: &Path, prefix: &str) -> HashMap<String, FileStamp> {
    let mut stamps = HashMap::new();

    let entries = match std::fs::read_dir(cache_dir) {
        Ok(entries) => entries,
        Err(_) => return stamps,
    };

    for entry in entries.flatten() {
        let name = entry.file_name().to_string_lossy().to_string();
        if !name.starts_with(prefix) || !name.ends_with(".json") {
            continue;
        }
        if let Ok(metadata) = entry.metadata() {
            if metadata.is_file() {
                stamps.insert(
                    name,
                    FileStamp {
                        len: metadata.len(),
                        modified: metadata.modified().ok(),
                    },
                );
            }
        }
    }

    stamps
}
