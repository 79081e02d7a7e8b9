//! Persisted cache store: a JSON index plus content-addressed blobs.
//!
//! Layout under the cache root:
//!
//! ```text
//! .conveyor/
//! ├── index.json          # key -> recorded outputs
//! └── blobs/
//!     └── <content-hash>  # output bytes, shared across entries
//! ```
//!
//! The store survives across invocations. A hit whose blobs are missing on
//! disk is a cache-integrity problem: the entry is dropped and the caller
//! recomputes - never fatal.

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::asset::AssetRef;
use crate::debug;
use crate::error::BuildError;

use super::ContentHash;
use super::key::CacheKey;

/// Index file name
const INDEX_FILE: &str = "index.json";

/// Blob directory name
const BLOBS_DIR: &str = "blobs";

/// One recorded output of a cached chain run.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct CachedOutput {
    path: String,
    /// Blake3 hex of the content; doubles as the blob filename.
    hash: String,
    #[serde(default)]
    meta: BTreeMap<String, String>,
}

/// Recorded outputs for one cache key.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct CacheEntry {
    outputs: Vec<CachedOutput>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct CacheIndex {
    entries: FxHashMap<String, CacheEntry>,
}

/// Content-addressed cache of chain outputs, scoped per stage+group via
/// the [`CacheKey`].
pub struct CacheStore {
    root: PathBuf,
    index: Mutex<CacheIndex>,
}

impl CacheStore {
    /// Open (or initialize) a store at the given root directory.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, BuildError> {
        let root = root.into();
        fs::create_dir_all(root.join(BLOBS_DIR)).map_err(|e| BuildError::io(&root, e))?;

        let index_path = root.join(INDEX_FILE);
        let index = if index_path.is_file() {
            let data = fs::read(&index_path).map_err(|e| BuildError::io(&index_path, e))?;
            // A corrupt index is not worth failing a build over
            serde_json::from_slice(&data).unwrap_or_else(|e| {
                debug!("cache"; "discarding unreadable index: {}", e);
                CacheIndex::default()
            })
        } else {
            CacheIndex::default()
        };

        Ok(Self {
            root,
            index: Mutex::new(index),
        })
    }

    /// Look up recorded outputs. Returns `None` on miss or when the
    /// entry's blobs are missing on disk (logged, entry dropped).
    pub fn get(&self, key: &CacheKey) -> Option<Vec<AssetRef>> {
        let entry = self.index.lock().entries.get(key.as_str()).cloned()?;

        let mut outputs = Vec::with_capacity(entry.outputs.len());
        for output in &entry.outputs {
            let blob = self.blob_path(&output.hash);
            match fs::read(&blob) {
                Ok(content) if verify_blob(&content, &output.hash) => {
                    let mut asset = AssetRef::new(output.path.clone(), content);
                    for (k, v) in &output.meta {
                        asset = asset.with_meta(k.clone(), v.clone());
                    }
                    outputs.push(asset);
                }
                _ => {
                    let err = BuildError::CacheIntegrity {
                        key: key.as_str().to_string(),
                    };
                    debug!("cache"; "{}, recomputing", err);
                    self.index.lock().entries.remove(key.as_str());
                    return None;
                }
            }
        }
        Some(outputs)
    }

    /// Record outputs for a key and persist the index.
    pub fn put(&self, key: &CacheKey, outputs: &[AssetRef]) -> Result<(), BuildError> {
        let mut recorded = Vec::with_capacity(outputs.len());
        for asset in outputs {
            let hash = asset.content_hash().to_hex();
            let blob = self.blob_path(&hash);
            if !blob.exists() {
                fs::write(&blob, asset.content()).map_err(|e| BuildError::io(&blob, e))?;
            }
            recorded.push(CachedOutput {
                path: asset.path().to_string(),
                hash,
                meta: asset.meta().clone(),
            });
        }

        let mut index = self.index.lock();
        index
            .entries
            .insert(key.as_str().to_string(), CacheEntry { outputs: recorded });
        self.persist(&index)
    }

    /// Number of recorded entries.
    pub fn len(&self) -> usize {
        self.index.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn persist(&self, index: &CacheIndex) -> Result<(), BuildError> {
        let index_path = self.root.join(INDEX_FILE);
        let data = serde_json::to_vec(index)
            .map_err(|e| BuildError::io(&index_path, std::io::Error::other(e)))?;
        fs::write(&index_path, data).map_err(|e| BuildError::io(&index_path, e))
    }

    fn blob_path(&self, hash: &str) -> PathBuf {
        self.root.join(BLOBS_DIR).join(hash)
    }
}

/// Remove a cache directory entirely (used by `--clean`).
pub fn clear_cache_dir(root: &Path) -> Result<(), BuildError> {
    if root.exists() {
        fs::remove_dir_all(root).map_err(|e| BuildError::io(root, e))?;
    }
    Ok(())
}

fn verify_blob(content: &[u8], expected_hex: &str) -> bool {
    match ContentHash::from_hex(expected_hex) {
        Some(expected) => ContentHash::of(content) == expected,
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn key(tag: &str) -> CacheKey {
        CacheKey::compute("s", "g", "test", &[AssetRef::new("a.js", tag)], "fp")
    }

    #[test]
    fn test_miss_then_hit() {
        let dir = TempDir::new().unwrap();
        let store = CacheStore::open(dir.path().join(".conveyor")).unwrap();
        let k = key("one");

        assert!(store.get(&k).is_none());

        let outputs = vec![AssetRef::new("out.js", "built").with_meta("module_id", "app/out")];
        store.put(&k, &outputs).unwrap();

        let hit = store.get(&k).unwrap();
        assert_eq!(hit.len(), 1);
        assert_eq!(hit[0].path(), "out.js");
        assert_eq!(hit[0].content(), b"built");
        assert_eq!(hit[0].meta().get("module_id").unwrap(), "app/out");
    }

    #[test]
    fn test_survives_reopen() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join(".conveyor");
        let k = key("persist");

        {
            let store = CacheStore::open(&root).unwrap();
            store.put(&k, &[AssetRef::new("out.js", "x")]).unwrap();
        }

        let reopened = CacheStore::open(&root).unwrap();
        assert_eq!(reopened.get(&k).unwrap()[0].content(), b"x");
    }

    #[test]
    fn test_missing_blob_is_a_miss() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join(".conveyor");
        let store = CacheStore::open(&root).unwrap();
        let k = key("integrity");

        store.put(&k, &[AssetRef::new("out.js", "x")]).unwrap();

        // Remove the blob behind the index's back
        let hash = AssetRef::new("out.js", "x").content_hash().to_hex();
        fs::remove_file(root.join(BLOBS_DIR).join(hash)).unwrap();

        assert!(store.get(&k).is_none());
        // Entry dropped, second lookup is a plain miss
        assert!(store.get(&k).is_none());
    }

    #[test]
    fn test_corrupt_blob_is_a_miss() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join(".conveyor");
        let store = CacheStore::open(&root).unwrap();
        let k = key("corrupt");

        store.put(&k, &[AssetRef::new("out.js", "x")]).unwrap();

        let hash = AssetRef::new("out.js", "x").content_hash().to_hex();
        fs::write(root.join(BLOBS_DIR).join(hash), b"tampered").unwrap();

        assert!(store.get(&k).is_none());
    }

    #[test]
    fn test_corrupt_index_tolerated() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join(".conveyor");
        fs::create_dir_all(&root).unwrap();
        fs::write(root.join(INDEX_FILE), b"not json").unwrap();

        let store = CacheStore::open(&root).unwrap();
        assert!(store.is_empty());
    }

    #[test]
    fn test_clear_cache_dir() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join(".conveyor");
        let store = CacheStore::open(&root).unwrap();
        store.put(&key("x"), &[AssetRef::new("o.js", "x")]).unwrap();
        drop(store);

        clear_cache_dir(&root).unwrap();
        assert!(!root.exists());
        // Clearing an absent dir is fine
        clear_cache_dir(&root).unwrap();
    }
}
