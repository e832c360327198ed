//! Content-addressed response cache.
//!
//! Each entry is the raw JSON returned by the inference server, stored as
//! `<root>/<sha256 of canonical request>.json`. Entries are written once and
//! never invalidated; clearing the directory is the only way to drop them.

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

static TMP_COUNTER: AtomicU64 = AtomicU64::new(0);

// ---------------------------------------------------------------------------
// Keys
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Compact JSON with object keys sorted at every level.
pub fn canonical_json(value: &Value) -> String {
    canonicalize(value).to_string()
}

fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let mut sorted = Map::with_capacity(map.len());
            for k in keys {
                sorted.insert(k.clone(), canonicalize(&map[k]));
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        other => other.clone(),
    }
}

/// Digest of a request payload. Pure and total.
pub fn key_for(payload: &Value) -> CacheKey {
    let digest = Sha256::digest(canonical_json(payload).as_bytes());
    CacheKey(format!("{digest:x}"))
}

// ---------------------------------------------------------------------------
// ResponseCache
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct ResponseCache {
    root: PathBuf,
}

impl ResponseCache {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path_for(&self, key: &CacheKey) -> PathBuf {
        self.root.join(format!("{key}.json"))
    }

    /// Cached entry for `key`. Missing, unreadable and undecodable files are
    /// all misses.
    pub fn get(&self, key: &CacheKey) -> Option<Value> {
        let path = self.path_for(key);
        let content = match std::fs::read_to_string(&path) {
            Ok(c) => c,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!("cache miss: {key}");
                return None;
            }
            Err(e) => {
                warn!("cache read failed for {}: {e}", path.display());
                return None;
            }
        };
        match serde_json::from_str(&content) {
            Ok(entry) => {
                debug!("cache hit: {key}");
                Some(entry)
            }
            Err(e) => {
                warn!("corrupt cache entry {}: {e}", path.display());
                None
            }
        }
    }

    /// Store `entry` under `key`. Failures are logged and otherwise ignored.
    pub fn put(&self, key: &CacheKey, entry: &Value) {
        if let Err(e) = self.try_put(key, entry) {
            warn!("cache write failed for {key}: {e}");
        }
    }

    fn try_put(&self, key: &CacheKey, entry: &Value) -> io::Result<()> {
        std::fs::create_dir_all(&self.root)?;
        let tmp = self.root.join(format!(
            ".{key}.{}.{}.tmp",
            std::process::id(),
            TMP_COUNTER.fetch_add(1, Ordering::Relaxed)
        ));
        std::fs::write(&tmp, serde_json::to_vec(entry)?)?;
        // Same key means same payload, so a concurrent writer renaming over
        // us leaves identical content behind.
        if let Err(e) = std::fs::rename(&tmp, self.path_for(key)) {
            let _ = std::fs::remove_file(&tmp);
            return Err(e);
        }
        Ok(())
    }
}
