//! Deterministic ordering for concat steps.
//!
//! Three tiers, independent of filesystem enumeration order and of how
//! parallel group processing completes:
//!
//! 1. files named in the explicit order, in that exact order
//! 2. remaining files matching a priority prefix ("engines first")
//! 3. everything else
//!
//! Ties within a tier break lexicographically by relative path, so two runs
//! over the same inputs always merge in the same order.

use crate::asset::AssetRef;

/// Resolves the final file order for a concat step.
#[derive(Debug, Clone, Default)]
pub struct Orderer {
    explicit: Vec<String>,
    priority_prefixes: Vec<String>,
}

impl Orderer {
    pub fn new(explicit: Vec<String>, priority_prefixes: Vec<String>) -> Self {
        Self {
            explicit,
            priority_prefixes,
        }
    }

    /// Names in the explicit order list.
    pub fn explicit(&self) -> &[String] {
        &self.explicit
    }

    /// Arrange assets into the three-tier order.
    ///
    /// Explicit names match a path exactly or as a trailing path component
    /// (`a.js` claims both `a.js` and `vendor/a.js`). Names not present in
    /// the input are skipped; the caller decides whether that is an error.
    pub fn arrange(&self, assets: Vec<AssetRef>) -> Vec<AssetRef> {
        let mut remaining: Vec<AssetRef> = assets;
        let mut ordered = Vec::with_capacity(remaining.len());

        // Tier 1: explicit order, skipping absent names
        for name in &self.explicit {
            let mut claimed: Vec<AssetRef> = Vec::new();
            let mut rest = Vec::with_capacity(remaining.len());
            for asset in remaining {
                if Self::name_matches(asset.path(), name) {
                    claimed.push(asset);
                } else {
                    rest.push(asset);
                }
            }
            remaining = rest;
            claimed.sort_by(|a, b| a.path().cmp(b.path()));
            ordered.extend(claimed);
        }

        // Tier 2: priority-prefixed remainder, then tier 3: the rest
        let (mut priority, mut rest): (Vec<_>, Vec<_>) = remaining
            .into_iter()
            .partition(|a| self.has_priority(a.path()));
        priority.sort_by(|a, b| a.path().cmp(b.path()));
        rest.sort_by(|a, b| a.path().cmp(b.path()));

        ordered.extend(priority);
        ordered.extend(rest);
        ordered
    }

    /// Which explicit names are absent from the given paths.
    pub fn missing_from<'a>(&'a self, paths: &[&str]) -> Vec<&'a str> {
        self.explicit
            .iter()
            .filter(|name| !paths.iter().any(|p| Self::name_matches(p, name)))
            .map(String::as_str)
            .collect()
    }

    fn has_priority(&self, path: &str) -> bool {
        self.priority_prefixes.iter().any(|p| path.starts_with(p.as_str()))
    }

    /// `name` matches `path` exactly or as a trailing component sequence.
    fn name_matches(path: &str, name: &str) -> bool {
        path == name || path.ends_with(name) && path.as_bytes()[path.len() - name.len() - 1] == b'/'
    }
}
