//! In-memory asset representation.
//!
//! An [`AssetRef`] is the unit of work flowing through a stage: one file's
//! relative path, its byte content, and optional side metadata (module id,
//! source map). Assets are immutable once produced; a filter that "modifies"
//! a file returns a new value.

mod scan;
mod write;

pub use scan::load_assets;
pub use write::OutputWriter;

use std::collections::BTreeMap;

use crate::cache::ContentHash;

/// One file during processing: relative path, content, side metadata.
///
/// Identity is the relative path within its stage. Paths are always
/// '/'-separated, independent of platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetRef {
    path: String,
    content: Vec<u8>,
    meta: BTreeMap<String, String>,
}

impl AssetRef {
    /// Create an asset from a relative path and content.
    pub fn new(path: impl Into<String>, content: impl Into<Vec<u8>>) -> Self {
        Self {
            path: path.into(),
            content: content.into(),
            meta: BTreeMap::new(),
        }
    }

    /// Relative path within the stage ('/'-separated).
    #[inline]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Raw content bytes.
    #[inline]
    pub fn content(&self) -> &[u8] {
        &self.content
    }

    /// Content as UTF-8 text, or `None` for binary assets.
    pub fn text(&self) -> Option<&str> {
        std::str::from_utf8(&self.content).ok()
    }

    /// Side metadata attached by filters.
    #[inline]
    pub fn meta(&self) -> &BTreeMap<String, String> {
        &self.meta
    }

    /// Blake3 hash of the content.
    pub fn content_hash(&self) -> ContentHash {
        ContentHash::of(&self.content)
    }

    /// New asset with the same content under a different path.
    pub fn with_path(&self, path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            content: self.content.clone(),
            meta: self.meta.clone(),
        }
    }

    /// New asset with replaced content, keeping path and metadata.
    pub fn with_content(&self, content: impl Into<Vec<u8>>) -> Self {
        Self {
            path: self.path.clone(),
            content: content.into(),
            meta: self.meta.clone(),
        }
    }

    /// New asset with an additional metadata entry.
    pub fn with_meta(&self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let mut meta = self.meta.clone();
        meta.insert(key.into(), value.into());
        Self {
            path: self.path.clone(),
            content: self.content.clone(),
            meta,
        }
    }

    /// Consume the asset and return its content.
    pub fn into_content(self) -> Vec<u8> {
        self.content
    }
}
