//! The seen-set: which item URLs have already been processed.
//!
//! The store is a single pretty-printed JSON object mapping URL to the
//! millisecond timestamp at which it was first marked seen:
//!
//! ```text
//! {
//!   "https://news.example/1": 1771581000000,
//!   "https://news.example/2": 1771581000000
//! }
//! ```
//!
//! # Lifecycle
//!
//! 1. **Load**: read and parse the file. A missing, unreadable or malformed
//!    file is an empty map, never an error. Records older than the retention
//!    window are pruned from the loaded view.
//! 2. **Dedup**: keep only items whose URL is not in the loaded view.
//! 3. **Mark seen**: stamp the new URLs with the current time and write the
//!    whole map back. This happens before any classification call, so a crash
//!    later in the run drops an item rather than reporting it twice. A failed
//!    write is returned to the caller and ends the run.
//!
//! Writes go to a sibling temp file that is then renamed over the store.
//! [`RunLock`] keeps two runs from interleaving load and write.

use crate::models::RawItem;
use chrono::{DateTime, Utc};
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::error::Error;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, instrument, warn};

pub const SEEN_FILE: &str = "seen.json";

/// How long a URL stays in the seen-set.
pub const RETENTION_DAYS: i64 = 30;

const DAY_MS: i64 = 24 * 60 * 60 * 1000;

/// URL → first-seen epoch milliseconds.
pub type SeenMap = BTreeMap<String, i64>;

/// File-backed seen-set with time-based expiry.
#[derive(Debug, Clone)]
pub struct SeenStore {
    path: PathBuf,
    retention_ms: i64,
}

impl SeenStore {
    /// Store at `<data_dir>/seen.json` with the default retention.
    pub fn in_dir(data_dir: impl AsRef<Path>) -> Self {
        Self::at(data_dir.as_ref().join(SEEN_FILE))
    }

    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            retention_ms: RETENTION_DAYS * DAY_MS,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the store and drop records older than the retention window.
    #[instrument(level = "debug", skip_all, fields(path = %self.path.display()))]
    pub async fn load(&self, now: DateTime<Utc>) -> SeenMap {
        let raw = match fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("No seen store yet; starting empty");
                return SeenMap::new();
            }
            Err(e) => {
                warn!(error = %e, "Seen store unreadable; treating as empty");
                return SeenMap::new();
            }
        };
        let stored: SeenMap = match serde_json::from_str(&raw) {
            Ok(map) => map,
            Err(e) => {
                warn!(error = %e, "Seen store malformed; treating as empty");
                return SeenMap::new();
            }
        };

        let cutoff = now.timestamp_millis() - self.retention_ms;
        let total = stored.len();
        let pruned: SeenMap = stored.into_iter().filter(|(_, ts)| *ts > cutoff).collect();
        debug!(kept = pruned.len(), expired = total - pruned.len(), "Loaded seen store");
        pruned
    }

    /// Items not yet seen. An empty input never touches the store.
    pub async fn dedup(&self, items: Vec<RawItem>, now: DateTime<Utc>) -> Vec<RawItem> {
        if items.is_empty() {
            return Vec::new();
        }
        let seen = self.load(now).await;
        filter_unseen(items, &seen)
    }

    /// Record `items` as seen at `now` and persist the store.
    #[instrument(level = "info", skip_all, fields(path = %self.path.display(), count = items.len()))]
    pub async fn mark_seen(&self, items: &[RawItem], now: DateTime<Utc>) -> Result<(), Box<dyn Error>> {
        let mut seen = self.load(now).await;
        let stamp = now.timestamp_millis();
        for item in items {
            seen.insert(item.url.clone(), stamp);
        }
        self.save(&seen).await?;
        info!(total = seen.len(), "Persisted seen store");
        Ok(())
    }

    async fn save(&self, seen: &SeenMap) -> Result<(), Box<dyn Error>> {
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir).await?;
        }
        let json = serde_json::to_string_pretty(seen)?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, json).await?;
        fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

/// Items whose URL is absent from `seen`, first occurrence only.
pub fn filter_unseen(items: Vec<RawItem>, seen: &SeenMap) -> Vec<RawItem> {
    items
        .into_iter()
        .filter(|item| !seen.contains_key(&item.url))
        .unique_by(|item| item.url.clone())
        .collect()
}

/// A lock older than this is assumed to belong to a crashed run.
pub const STALE_LOCK_MS: i64 = 60 * 60 * 1000;

#[derive(Debug, Serialize, Deserialize)]
struct LockInfo {
    pid: u32,
    acquired_at: i64,
}

/// Exclusive hold on a [`SeenStore`] for the duration of a run.
///
/// Backed by a `<store>.lock` file created with `create_new`; removed on drop.
#[derive(Debug)]
pub struct RunLock {
    path: PathBuf,
}

impl RunLock {
    pub async fn acquire(store: &SeenStore, now: DateTime<Utc>) -> Result<Self, Box<dyn Error>> {
        let path = store.path().with_extension("json.lock");
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir).await?;
        }
        let info = LockInfo {
            pid: std::process::id(),
            acquired_at: now.timestamp_millis(),
        };
        let body = serde_json::to_vec(&info)?;

        for _ in 0..2 {
            match fs::OpenOptions::new().write(true).create_new(true).open(&path).await {
                Ok(mut file) => {
                    file.write_all(&body).await?;
                    file.flush().await?;
                    debug!(path = %path.display(), "Acquired run lock");
                    return Ok(Self { path });
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                    if let Some(holder) = lock_holder(&path, now).await {
                        return Err(format!(
                            "seen store {} is locked by another run ({holder})",
                            store.path().display()
                        )
                        .into());
                    }
                    warn!(path = %path.display(), "Replacing stale run lock");
                    // Move aside and re-check: another run may have replaced the stale
                    // lock between our read and this point.
                    let aside = path.with_extension(format!("lock.{}.stale", std::process::id()));
                    match fs::rename(&path, &aside).await {
                        Ok(()) => {}
                        Err(e) if e.kind() == ErrorKind::NotFound => continue,
                        Err(e) => return Err(e.into()),
                    }
                    let taken = lock_holder(&aside, now).await;
                    if taken.is_some() {
                        let _ = fs::hard_link(&aside, &path).await;
                    }
                    let _ = fs::remove_file(&aside).await;
                    if let Some(holder) = taken {
                        return Err(format!(
                            "seen store {} is locked by another run ({holder})",
                            store.path().display()
                        )
                        .into());
                    }
                }
                Err(e) => return Err(e.into()),
            }
        }
        Err(format!("could not acquire run lock {}", path.display()).into())
    }
}

/// Describes the live holder of an existing lock, or `None` when it is stale.
///
/// A lock whose body cannot be read yet (the holder is between `create_new`
/// and its first write) is judged by file age instead.
async fn lock_holder(path: &Path, now: DateTime<Utc>) -> Option<String> {
    let parsed = fs::read(path)
        .await
        .ok()
        .and_then(|raw| serde_json::from_slice::<LockInfo>(&raw).ok());
    if let Some(h) = parsed {
        let fresh = now.timestamp_millis() - h.acquired_at < STALE_LOCK_MS;
        return fresh.then(|| format!("pid {}", h.pid));
    }

    let age = match fs::metadata(path).await.and_then(|m| m.modified()) {
        Ok(modified) => modified.elapsed().unwrap_or_default(),
        Err(e) if e.kind() == ErrorKind::NotFound => return None,
        Err(_) => return Some("unreadable lock".to_string()),
    };
    (age.as_millis() < STALE_LOCK_MS as u128).then(|| "lock still being written".to_string())
}

impl Drop for RunLock {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            warn!(path = %self.path.display(), error = %e, "Failed to remove run lock");
        }
    }
}
