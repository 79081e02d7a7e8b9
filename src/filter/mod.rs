//! Filter contract and plugin registry.
//!
//! Every content transform, built-in or external, runs through the same
//! shape: `(assets, context, config) -> assets | error`. External plugins
//! (language compilers, minifiers) are registered by name and referenced
//! from `compile` steps; the engine has no built-in knowledge of any
//! specific compiler.

mod chain;
mod steps;

pub use chain::{ChainError, FilterChain};

use rustc_hash::FxHashMap;
use std::fmt;
use std::sync::Arc;

use crate::asset::AssetRef;
use crate::error::BuildError;

/// Configuration map passed to a plugin invocation.
pub type PluginConfig = serde_json::Map<String, serde_json::Value>;

/// Explicit context threaded into every filter invocation.
///
/// Carries only what filters need; there is no ambient global
/// configuration reachable from filter logic.
#[derive(Debug, Clone)]
pub struct BuildContext {
    /// Environment name (e.g. "production").
    pub env: String,
    /// Stage being executed.
    pub stage: String,
    /// Match group owning this chain.
    pub group: String,
}

/// An external content transform.
///
/// Transforms must be pure with respect to their inputs: identical assets
/// and config produce identical output. The engine relies on this for
/// caching and never retries a failed invocation.
pub trait Filter: Send + Sync {
    fn transform(
        &self,
        assets: Vec<AssetRef>,
        ctx: &BuildContext,
        config: &PluginConfig,
    ) -> Result<Vec<AssetRef>, BuildError>;
}

/// Named plugin registry consulted by `compile` steps.
#[derive(Default, Clone)]
pub struct FilterRegistry {
    plugins: FxHashMap<String, Arc<dyn Filter>>,
}

impl FilterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a plugin under a name. Later registrations win.
    pub fn register(&mut self, name: impl Into<String>, plugin: Arc<dyn Filter>) {
        self.plugins.insert(name.into(), plugin);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Filter>> {
        self.plugins.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.plugins.contains_key(name)
    }
}

impl fmt::Debug for FilterRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.plugins.keys().collect();
        names.sort();
        f.debug_struct("FilterRegistry").field("plugins", &names).finish()
    }
}

/// A pure name-deriving function with a stable label.
///
/// Used for module-id and output-name functions. The only input is the
/// relative path being processed; the label participates in the chain
/// fingerprint so swapping the function invalidates cached outputs.
#[derive(Clone)]
pub struct NameFn {
    label: String,
    f: Arc<dyn Fn(&str) -> String + Send + Sync>,
}

impl NameFn {
    pub fn new(
        label: impl Into<String>,
        f: impl Fn(&str) -> String + Send + Sync + 'static,
    ) -> Self {
        Self {
            label: label.into(),
            f: Arc::new(f),
        }
    }

    /// Derive a name from a relative path.
    pub fn apply(&self, path: &str) -> String {
        (self.f)(path)
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Default module-id function: strip an optional prefix and the file
    /// extension, then prepend the namespace.
    ///
    /// `module_id("app", Some("src/"))` maps `src/models/user.js` to
    /// `app/models/user`.
    pub fn module_id(namespace: &str, strip_prefix: Option<&str>) -> Self {
        let ns = namespace.to_string();
        let strip = strip_prefix.map(str::to_string);
        let label = format!("module_id:{namespace}:{}", strip_prefix.unwrap_or(""));
        Self::new(label, move |path| {
            let path = strip
                .as_deref()
                .and_then(|p| path.strip_prefix(p))
                .unwrap_or(path);
            let stem = match path.rfind('.') {
                Some(dot) if !path[dot + 1..].contains('/') => &path[..dot],
                _ => path,
            };
            format!("{ns}/{stem}")
        })
    }

    /// Rename function from a declarative spec.
    pub fn rename(spec: &crate::config::RenameSpec) -> Self {
        let spec = spec.clone();
        let label = format!(
            "rename:{}:{}:{}",
            spec.strip_prefix.as_deref().unwrap_or(""),
            spec.add_prefix.as_deref().unwrap_or(""),
            spec.extension.as_deref().unwrap_or("")
        );
        Self::new(label, move |path| {
            let mut out = spec
                .strip_prefix
                .as_deref()
                .and_then(|p| path.strip_prefix(p))
                .unwrap_or(path)
                .to_string();
            if let Some(ext) = &spec.extension {
                if let Some(dot) = out.rfind('.')
                    && !out[dot + 1..].contains('/')
                {
                    out.truncate(dot);
                }
                out.push('.');
                out.push_str(ext);
            }
            if let Some(prefix) = &spec.add_prefix {
                out.insert_str(0, prefix);
            }
            out
        })
    }
}

impl fmt::Debug for NameFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("NameFn").field(&self.label).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_module_id_default() {
        let f = NameFn::module_id("app", Some("src/"));
        assert_eq!(f.apply("src/models/user.js"), "app/models/user");
        assert_eq!(f.apply("other/thing.coffee"), "app/other/thing");
    }

    #[test]
    fn test_module_id_no_extension() {
        let f = NameFn::module_id("lib", None);
        assert_eq!(f.apply("Makefile"), "lib/Makefile");
    }

    #[test]
    fn test_rename_strip_add_ext() {
        let spec = crate::config::RenameSpec {
            strip_prefix: Some("src/".into()),
            add_prefix: Some("out/".into()),
            extension: Some("js".into()),
        };
        let f = NameFn::rename(&spec);
        assert_eq!(f.apply("src/app.coffee"), "out/app.js");
    }

    #[test]
    fn test_registry_lookup() {
        struct Nop;
        impl Filter for Nop {
            fn transform(
                &self,
                assets: Vec<AssetRef>,
                _ctx: &BuildContext,
                _config: &PluginConfig,
            ) -> Result<Vec<AssetRef>, BuildError> {
                Ok(assets)
            }
        }

        let mut registry = FilterRegistry::new();
        assert!(!registry.contains("nop"));
        registry.register("nop", Arc::new(Nop));
        assert!(registry.contains("nop"));
        assert!(registry.get("nop").is_some());
    }
}
