//! Durable TTL-gated key/value tier.
//!
//! The whole map lives in one pretty-printed JSON file of the form
//! `{key: {value, created_at}}`. The file is the source of truth: every
//! operation takes the process mutex and an advisory lock on a sibling
//! `.lock` file, reloads the map, applies its change and writes it back
//! through a temporary file in the same directory followed by a rename. A
//! failed write leaves the previous file untouched.
//!
//! Entries whose write failed stay in memory and are laid over every later
//! reload until a write succeeds.

use std::collections::{HashMap, HashSet};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use fs4::fs_std::FileExt;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::key::cache_key;
use crate::error::CacheError;

/// A cached value and when it was stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry<V> {
    /// Stored value.
    pub value: V,
    /// Creation time (UTC).
    pub created_at: DateTime<Utc>,
}

impl<V> CacheEntry<V> {
    fn is_expired(&self, ttl: Duration, now: DateTime<Utc>) -> bool {
        let age = now.signed_duration_since(self.created_at);
        age.to_std().is_ok_and(|age| age > ttl)
    }
}

type Entries<V> = HashMap<String, CacheEntry<V>>;

struct State<V> {
    entries: Entries<V>,
    /// Keys held only in memory because their write failed.
    unsaved: HashSet<String>,
}

/// State reloaded from disk, with the file lock held until drop.
struct Synced<'a, V> {
    _file_lock: Option<File>,
    state: MutexGuard<'a, State<V>>,
}

/// Persistent cache tier backed by a JSON file.
pub struct PersistentCache<V> {
    path: PathBuf,
    ttl: Duration,
    state: Mutex<State<V>>,
}

impl<V> std::fmt::Debug for PersistentCache<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PersistentCache")
            .field("path", &self.path)
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}

impl<V> PersistentCache<V>
where
    V: Clone + Serialize + DeserializeOwned,
{
    /// Opens the cache file at `path`.
    ///
    /// A missing file is an empty cache. An unreadable or corrupt file is
    /// logged and also treated as empty; it is replaced on the next write.
    pub fn open(path: impl Into<PathBuf>, ttl: Duration) -> Self {
        let path = path.into();
        let entries = load(&path);
        debug!(path = %path.display(), entries = entries.len(), "persistent cache opened");
        Self {
            path,
            ttl,
            state: Mutex::new(State {
                entries,
                unsaved: HashSet::new(),
            }),
        }
    }

    /// Takes both locks and refreshes the map from disk.
    fn sync(&self) -> Synced<'_, V> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let file_lock = lock_file(&self.path);

        let mut fresh = load(&self.path);
        let State { entries, unsaved } = &mut *state;
        unsaved.retain(|key| match entries.remove(key) {
            Some(entry) => {
                fresh.insert(key.clone(), entry);
                true
            }
            None => false,
        });
        *entries = fresh;

        Synced {
            _file_lock: file_lock,
            state,
        }
    }

    /// Writes the map, tracking `changed` as unsaved if the write fails.
    fn commit(&self, state: &mut State<V>, changed: Option<&str>) -> Result<(), CacheError> {
        match store(&self.path, &state.entries) {
            Ok(()) => {
                state.unsaved.clear();
                Ok(())
            }
            Err(e) => {
                if let Some(key) = changed {
                    state.unsaved.insert(key.to_string());
                }
                Err(e)
            }
        }
    }

    /// Returns the cached value for `query` if a fresh entry exists.
    ///
    /// An expired entry is removed and the file rewritten; a failure of that
    /// rewrite is logged.
    pub fn get(&self, query: &str) -> Option<V> {
        self.get_entry(query).map(|entry| entry.value)
    }

    /// Like [`get`](Self::get) but returns the entry with its timestamp.
    pub fn get_entry(&self, query: &str) -> Option<CacheEntry<V>> {
        let key = cache_key(query);
        let mut synced = self.sync();
        let state = &mut *synced.state;
        let entry = state.entries.get(&key)?;
        if !entry.is_expired(self.ttl, Utc::now()) {
            return Some(entry.clone());
        }

        state.entries.remove(&key);
        state.unsaved.remove(&key);
        debug!(key = %&key[..12], "evicting expired cache entry");
        if let Err(e) = self.commit(state, None) {
            warn!(error = %e, "failed to persist cache eviction");
        }
        None
    }

    /// Stores `value` under the key for `query`, replacing any prior entry.
    ///
    /// The in-memory map keeps the value even when the file write fails.
    pub fn put(&self, query: &str, value: V) -> Result<(), CacheError> {
        let key = cache_key(query);
        let mut synced = self.sync();
        let state = &mut *synced.state;
        state.entries.insert(
            key.clone(),
            CacheEntry {
                value,
                created_at: Utc::now(),
            },
        );
        self.commit(state, Some(&key))
    }

    /// Removes every entry, returning how many there were.
    pub fn clear(&self) -> Result<usize, CacheError> {
        let mut synced = self.sync();
        let state = &mut *synced.state;
        let removed = state.entries.len();
        state.entries.clear();
        state.unsaved.clear();
        self.commit(state, None)?;
        Ok(removed)
    }

    /// Number of stored entries, expired ones included.
    pub fn len(&self) -> usize {
        self.sync().state.entries.len()
    }

    /// Returns true when nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Configured time to live.
    pub const fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Backing file path.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn parent_dir(path: &Path) -> &Path {
    match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    }
}

/// Exclusive advisory lock on `<path>.lock`, released when the file drops.
///
/// Without a lock (unwritable directory, unsupported filesystem) the
/// process mutex still serializes this handle's own operations.
fn lock_file(path: &Path) -> Option<File> {
    let mut name = path.as_os_str().to_owned();
    name.push(".lock");
    let lock_path = PathBuf::from(name);

    let file = std::fs::create_dir_all(parent_dir(path))
        .and_then(|()| {
            OpenOptions::new()
                .create(true)
                .truncate(false)
                .write(true)
                .open(&lock_path)
        })
        .and_then(|file| FileExt::lock_exclusive(&file).map(|()| file));
    match file {
        Ok(file) => Some(file),
        Err(e) => {
            debug!(path = %lock_path.display(), error = %e, "cache file lock unavailable");
            None
        }
    }
}

fn load<V: DeserializeOwned>(path: &Path) -> Entries<V> {
    let text = match std::fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return HashMap::new(),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "cache file unreadable, starting empty");
            return HashMap::new();
        }
    };
    serde_json::from_str(&text).unwrap_or_else(|e| {
        warn!(path = %path.display(), error = %e, "cache file corrupt, starting empty");
        HashMap::new()
    })
}

fn store<V: Serialize>(path: &Path, entries: &Entries<V>) -> Result<(), CacheError> {
    let io_err = |source| CacheError::Io {
        path: path.to_path_buf(),
        source,
    };
    let dir = parent_dir(path);
    std::fs::create_dir_all(dir).map_err(io_err)?;

    let json = serde_json::to_vec_pretty(entries)?;
    let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(io_err)?;
    tmp.write_all(&json).map_err(io_err)?;
    tmp.as_file().sync_all().map_err(io_err)?;
    tmp.persist(path).map_err(|e| io_err(e.error))?;
    Ok(())
}
