//! Synchronized output writing with collision detection.
//!
//! A stage's output root is shared by all of its match groups, so every
//! write is funneled through one [`OutputWriter`]. Writing the same path
//! twice with identical bytes is allowed (idempotent re-copy) but logged;
//! differing bytes raise [`BuildError::Collision`].

use dashmap::DashMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::cache::ContentHash;
use crate::error::BuildError;
use crate::log;

/// Writes assets to a stage's output root, tracking written paths.
pub struct OutputWriter {
    stage: String,
    root: PathBuf,
    written: DashMap<String, ContentHash>,
}

impl OutputWriter {
    pub fn new(stage: impl Into<String>, root: impl Into<PathBuf>) -> Self {
        Self {
            stage: stage.into(),
            root: root.into(),
            written: DashMap::new(),
        }
    }

    /// Write one asset, detecting path collisions across match groups.
    ///
    /// Returns `true` for a fresh path and `false` for an idempotent
    /// re-write of identical bytes, so callers can count distinct outputs.
    pub fn write(&self, asset: &crate::asset::AssetRef) -> Result<bool, BuildError> {
        use dashmap::mapref::entry::Entry;

        let hash = asset.content_hash();
        match self.written.entry(asset.path().to_string()) {
            Entry::Occupied(prev) => {
                if *prev.get() == hash {
                    // Duplicate identical write: allowed but worth noticing
                    log!("warn"; "duplicate identical write to `{}` in stage `{}`",
                        asset.path(), self.stage);
                    return Ok(false);
                }
                return Err(BuildError::Collision {
                    path: asset.path().to_string(),
                    stage: self.stage.clone(),
                });
            }
            Entry::Vacant(slot) => {
                slot.insert(hash);
            }
        }

        let target = self.target_path(asset.path());
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).map_err(|e| BuildError::io(parent, e))?;
        }
        fs::write(&target, asset.content()).map_err(|e| BuildError::io(&target, e))?;
        Ok(true)
    }

    /// Absolute path an asset will be written to.
    pub fn target_path(&self, rel: &str) -> PathBuf {
        let mut target = self.root.clone();
        for part in rel.split('/') {
            target.push(part);
        }
        target
    }

    /// The output root this writer materializes into.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Number of distinct paths written so far.
    pub fn written_count(&self) -> usize {
        self.written.len()
    }
}
