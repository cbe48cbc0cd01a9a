//! Persisted API key records
//!
//! Keys live in a pretty-printed JSON file keyed by the full key string. The
//! store re-reads the file whenever its modification time or size changes, so
//! keys created from the CLI are picked up by a running server. Every mutation
//! reloads first and is written through a temporary file renamed into place.

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::SystemTime;
use tracing::{debug, warn};

/// Prefix of every generated key
pub const KEY_PREFIX: &str = "sk-gw-";

/// Characters of a key shown in listings
const DISPLAY_PREFIX_LEN: usize = 20;

/// One stored key
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct KeyRecord {
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Requests per rate-limit window for this key
    pub rate_limit: u32,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub requests: u64,
    #[serde(default)]
    pub tokens: u64,
}

/// Result of creating a key; the only time the full key is shown
#[derive(Debug, Clone, Serialize)]
pub struct CreatedKey {
    pub key: String,
    pub name: String,
    pub rate_limit: u32,
}

/// Listing entry with the key masked
#[derive(Debug, Clone, Serialize)]
pub struct KeySummary {
    pub key: String,
    pub name: String,
    pub active: bool,
    pub requests: u64,
    pub created: DateTime<Utc>,
}

/// Aggregate usage
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct KeyStats {
    pub total_requests: u64,
    pub active_keys: usize,
    pub total_keys: usize,
}

/// Modification time and size of the key file when last read or written
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FileStamp {
    modified: SystemTime,
    len: u64,
}

struct StoreState {
    keys: BTreeMap<String, KeyRecord>,
    loaded: Option<FileStamp>,
}

/// File-backed key store, safe to share between request tasks
pub struct KeyStore {
    path: PathBuf,
    state: Mutex<StoreState>,
}

/// Generate a fresh random key
pub fn generate_key() -> String {
    use rand::Rng;
    let mut rng = rand::rng();
    let bytes: [u8; 16] = rng.random();
    format!("{}{}", KEY_PREFIX, hex::encode(bytes))
}

/// Mask a key for display
pub fn mask_key(key: &str) -> String {
    format!("{}...", crate::truncate_safe(key, DISPLAY_PREFIX_LEN))
}

fn file_stamp(path: &Path) -> Option<FileStamp> {
    let metadata = std::fs::metadata(path).ok()?;
    Some(FileStamp {
        modified: metadata.modified().ok()?,
        len: metadata.len(),
    })
}

fn read_keys(path: &Path) -> Result<BTreeMap<String, KeyRecord>> {
    if !path.exists() {
        return Ok(BTreeMap::new());
    }
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read key file {}", path.display()))?;
    if contents.trim().is_empty() {
        return Ok(BTreeMap::new());
    }
    serde_json::from_str(&contents).with_context(|| format!("Failed to parse key file {}", path.display()))
}

impl KeyStore {
    /// Open (or lazily create) the store at `path`
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let keys = read_keys(&path)?;
        let loaded = file_stamp(&path);
        Ok(Self {
            path,
            state: Mutex::new(StoreState { keys, loaded }),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, StoreState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Re-read the file if it changed on disk since the last load or save
    fn refresh(&self, state: &mut StoreState) {
        let stamp = file_stamp(&self.path);
        if stamp == state.loaded {
            return;
        }
        match read_keys(&self.path) {
            Ok(keys) => {
                debug!("Reloaded {} keys from {}", keys.len(), self.path.display());
                state.keys = keys;
                state.loaded = stamp;
            }
            Err(e) => warn!("Keeping previous keys, reload failed: {:#}", e),
        }
    }

    fn persist(&self, state: &mut StoreState) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).context("Failed to create key directory")?;
            }
        }
        let contents = serde_json::to_string_pretty(&state.keys).context("Failed to serialize keys")?;

        // Readers only ever see a complete file
        let mut tmp = self.path.clone().into_os_string();
        tmp.push(format!(".{}.tmp", std::process::id()));
        let tmp = PathBuf::from(tmp);
        std::fs::write(&tmp, contents)
            .with_context(|| format!("Failed to write key file {}", tmp.display()))?;
        if let Err(e) = std::fs::rename(&tmp, &self.path) {
            let _ = std::fs::remove_file(&tmp);
            return Err(e).with_context(|| format!("Failed to replace key file {}", self.path.display()));
        }
        state.loaded = file_stamp(&self.path);
        Ok(())
    }

    /// Create and persist a new active key
    pub fn create(&self, name: &str, description: &str, rate_limit: u32) -> Result<CreatedKey> {
        if rate_limit == 0 {
            bail!("rate limit must be at least 1 request per window");
        }
        let mut state = self.lock();
        self.refresh(&mut state);

        let key = generate_key();
        state.keys.insert(
            key.clone(),
            KeyRecord {
                name: name.to_string(),
                description: description.to_string(),
                rate_limit,
                active: true,
                created_at: Utc::now(),
                requests: 0,
                tokens: 0,
            },
        );
        self.persist(&mut state)?;

        Ok(CreatedKey {
            key,
            name: name.to_string(),
            rate_limit,
        })
    }

    /// All keys, masked
    pub fn list(&self) -> Vec<KeySummary> {
        let mut state = self.lock();
        self.refresh(&mut state);
        state
            .keys
            .iter()
            .map(|(key, record)| KeySummary {
                key: mask_key(key),
                name: record.name.clone(),
                active: record.active,
                requests: record.requests,
                created: record.created_at,
            })
            .collect()
    }

    /// Deactivate the single key starting with `prefix`.
    ///
    /// Returns the masked key. An unknown or ambiguous prefix is an error.
    pub fn deactivate(&self, prefix: &str) -> Result<String> {
        if prefix.is_empty() {
            bail!("key prefix must not be empty");
        }
        let mut state = self.lock();
        self.refresh(&mut state);

        let matches: Vec<String> = state.keys.keys().filter(|k| k.starts_with(prefix)).cloned().collect();
        let key = match matches.as_slice() {
            [key] => key.clone(),
            [] => bail!("no key matches prefix '{}'", prefix),
            _ => bail!("prefix '{}' matches {} keys, use a longer prefix", prefix, matches.len()),
        };

        if let Some(record) = state.keys.get_mut(&key) {
            record.active = false;
        }
        self.persist(&mut state)?;
        Ok(mask_key(&key))
    }

    /// Look up an active key by exact match
    pub fn active_record(&self, key: &str) -> Option<KeyRecord> {
        let mut state = self.lock();
        self.refresh(&mut state);
        state.keys.get(key).filter(|r| r.active).cloned()
    }

    /// Count one request against `key` and persist the counter.
    ///
    /// Blocking file I/O; async callers run it on the blocking pool.
    pub fn record_request(&self, key: &str) -> Result<()> {
        let mut state = self.lock();
        self.refresh(&mut state);
        match state.keys.get_mut(key) {
            Some(record) => record.requests += 1,
            None => return Ok(()),
        }
        self.persist(&mut state)
    }

    pub fn stats(&self) -> KeyStats {
        let mut state = self.lock();
        self.refresh(&mut state);
        KeyStats {
            total_requests: state.keys.values().map(|r| r.requests).sum(),
            active_keys: state.keys.values().filter(|r| r.active).count(),
            total_keys: state.keys.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> (tempfile::TempDir, KeyStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = KeyStore::open(dir.path().join("keys").join("api_keys.json")).unwrap();
        (dir, store)
    }

    #[test]
    fn test_generated_key_shape() {
        let key = generate_key();
        assert!(key.starts_with(KEY_PREFIX));
        assert_eq!(key.len(), KEY_PREFIX.len() + 32);
        assert_ne!(key, generate_key());
        assert_eq!(mask_key(&key).len(), 23);
    }

    #[test]
    fn test_create_persists_and_reopens() {
        let (_dir, store) = store();
        let created = store.create("ci", "pipeline", 10).unwrap();
        assert!(store.active_record(&created.key).is_some());

        let reopened = KeyStore::open(store.path()).unwrap();
        let record = reopened.active_record(&created.key).unwrap();
        assert_eq!(record.name, "ci");
        assert_eq!(record.rate_limit, 10);
        assert!(record.active);
    }

    #[test]
    fn test_exact_match_only() {
        let (_dir, store) = store();
        let created = store.create("ci", "", 10).unwrap();
        assert!(store.active_record(&created.key[..12]).is_none());
        assert!(store.active_record("").is_none());
    }

    #[test]
    fn test_deactivate_by_unique_prefix() {
        let (_dir, store) = store();
        let created = store.create("ci", "", 10).unwrap();
        let masked = store.deactivate(&created.key[..20]).unwrap();
        assert_eq!(masked, mask_key(&created.key));
        assert!(store.active_record(&created.key).is_none());
        assert_eq!(store.stats().active_keys, 0);
    }

    #[test]
    fn test_deactivate_rejects_ambiguous_or_unknown_prefix() {
        let (_dir, store) = store();
        store.create("a", "", 10).unwrap();
        store.create("b", "", 10).unwrap();
        assert!(store.deactivate(KEY_PREFIX).is_err());
        assert!(store.deactivate("sk-nope").is_err());
        assert!(store.deactivate("").is_err());
        assert_eq!(store.stats().active_keys, 2);
    }

    #[test]
    fn test_stats_and_request_counting() {
        let (_dir, store) = store();
        let a = store.create("a", "", 10).unwrap();
        store.create("b", "", 10).unwrap();
        store.record_request(&a.key).unwrap();
        store.record_request(&a.key).unwrap();
        store.record_request("unknown").unwrap();

        assert_eq!(
            store.stats(),
            KeyStats { total_requests: 2, active_keys: 2, total_keys: 2 }
        );
        let listed = store.list();
        assert_eq!(listed.len(), 2);
        assert!(listed.iter().all(|k| k.key.ends_with("...")));
    }

    #[test]
    fn test_picks_up_external_changes() {
        let (_dir, store) = store();
        store.create("a", "", 10).unwrap();

        // Another process (the CLI) writes a new key
        let other = KeyStore::open(store.path()).unwrap();
        std::thread::sleep(std::time::Duration::from_millis(20));
        let created = other.create("b", "", 5).unwrap();

        assert!(store.active_record(&created.key).is_some());
    }

    #[test]
    fn test_request_counting_keeps_keys_created_elsewhere() {
        let (_dir, server) = store();
        let a = server.create("a", "", 10).unwrap();

        let cli = KeyStore::open(server.path()).unwrap();
        let b = cli.create("b", "", 10).unwrap();

        server.record_request(&a.key).unwrap();

        let on_disk = KeyStore::open(server.path()).unwrap();
        assert_eq!(on_disk.stats().total_keys, 2);
        assert_eq!(on_disk.stats().total_requests, 1);
        assert!(on_disk.active_record(&b.key).is_some());
    }

    #[test]
    fn test_request_counting_keeps_deactivation_done_elsewhere() {
        let (_dir, server) = store();
        let a = server.create("a", "", 10).unwrap();
        assert!(server.active_record(&a.key).is_some());

        let cli = KeyStore::open(server.path()).unwrap();
        cli.deactivate(&a.key).unwrap();

        server.record_request(&a.key).unwrap();

        let on_disk = KeyStore::open(server.path()).unwrap();
        assert!(on_disk.active_record(&a.key).is_none());
        assert!(server.active_record(&a.key).is_none());
    }

    #[test]
    fn test_persist_leaves_no_temporary_files() {
        let (dir, store) = store();
        store.create("a", "", 10).unwrap();
        store.create("b", "", 10).unwrap();

        let entries: Vec<_> = std::fs::read_dir(dir.path().join("keys"))
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        assert_eq!(entries, vec!["api_keys.json".to_string()]);
    }

    #[test]
    fn test_zero_rate_limit_rejected() {
        let (_dir, store) = store();
        assert!(store.create("a", "", 0).is_err());
    }
}
