//! Cache key derivation.
//!
//! A key covers everything that can change a match group's output: the
//! stage and group identity, the environment name (threaded into every
//! plugin invocation), each input's path and content hash (sorted, so
//! enumeration order is irrelevant), and the chain's configuration
//! fingerprint. Any mismatch produces a different key, which is how
//! invalidation works - there is no time-based expiry.

use crate::asset::AssetRef;

use super::ContentHash;

/// Stable key over inputs and chain configuration.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    /// Compute the key for one stage+group invocation.
    pub fn compute(
        stage: &str,
        group: &str,
        env: &str,
        inputs: &[AssetRef],
        fingerprint: &str,
    ) -> Self {
        let mut pairs: Vec<(&str, ContentHash)> = inputs
            .iter()
            .map(|a| (a.path(), a.content_hash()))
            .collect();
        pairs.sort_by(|a, b| a.0.cmp(b.0));

        let mut hasher = blake3::Hasher::new();
        hasher.update(stage.as_bytes());
        hasher.update(b"\0");
        hasher.update(group.as_bytes());
        hasher.update(b"\0");
        hasher.update(env.as_bytes());
        hasher.update(b"\0");
        for (path, hash) in pairs {
            hasher.update(path.as_bytes());
            hasher.update(b"\0");
            hasher.update(hash.as_bytes());
        }
        hasher.update(fingerprint.as_bytes());

        Self(hex::encode(hasher.finalize().as_bytes()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // First 16 chars are plenty for logs
        write!(f, "{}", &self.0[..16])
    }
}
