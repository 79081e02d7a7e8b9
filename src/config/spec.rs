//! Declarative pipeline descriptors.
//!
//! A pipeline manifest is an ordered list of stages; each stage routes its
//! input root through named match groups into its output root. These types
//! are plain data: the engine consumes them and never re-enters caller
//! control flow except through the filter plugin interface.
//!
//! # Example
//!
//! ```toml
//! env = "production"
//!
//! [[stage]]
//! name = "bundle"
//! input = "app/assets"
//! output = "tmp/bundle"
//!
//! [[stage.group]]
//! name = "scripts"
//! pattern = "**/*.{js,coffee}"
//! skip = ["**/*.spec.js"]
//! steps = [
//!     { kind = "compile", plugin = "coffee" },
//!     { kind = "concat", output = "application.js", order = ["boot.js"] },
//! ]
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// The full pipeline declaration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineSpec {
    /// Environment name threaded into every filter invocation.
    #[serde(default = "default_env")]
    pub env: String,

    /// Cache directory (defaults to `.conveyor` next to the manifest).
    #[serde(default)]
    pub cache_dir: Option<PathBuf>,

    /// Ordered stages; stage n+1 conventionally reads stage n's output.
    #[serde(rename = "stage", default)]
    pub stages: Vec<StageSpec>,
}

fn default_env() -> String {
    "development".to_string()
}

impl PipelineSpec {
    pub fn new(env: impl Into<String>) -> Self {
        Self {
            env: env.into(),
            cache_dir: None,
            stages: Vec::new(),
        }
    }

    /// Append a stage (builder style).
    pub fn stage(mut self, stage: StageSpec) -> Self {
        self.stages.push(stage);
        self
    }

    /// Resolve relative roots against a base directory.
    pub fn normalize(&mut self, base: &Path) {
        if let Some(dir) = &mut self.cache_dir
            && dir.is_relative()
        {
            *dir = base.join(&*dir);
        }
        for stage in &mut self.stages {
            if stage.input.is_relative() {
                stage.input = base.join(&stage.input);
            }
            if stage.output.is_relative() {
                stage.output = base.join(&stage.output);
            }
        }
    }

    /// The publish target: the last stage's output root.
    pub fn publish_root(&self) -> Option<&Path> {
        self.stages.last().map(|s| s.output.as_path())
    }
}

/// One input-root to output-root transformation phase.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageSpec {
    pub name: String,
    pub input: PathBuf,
    pub output: PathBuf,

    /// Ordered match groups. Insertion order determines precedence for
    /// error reporting and write order; groups may overlap in the files
    /// they select.
    #[serde(rename = "group", default)]
    pub groups: Vec<MatchGroupSpec>,
}

impl StageSpec {
    pub fn new(
        name: impl Into<String>,
        input: impl Into<PathBuf>,
        output: impl Into<PathBuf>,
    ) -> Self {
        Self {
            name: name.into(),
            input: input.into(),
            output: output.into(),
            groups: Vec::new(),
        }
    }

    /// Append a match group (builder style).
    pub fn group(mut self, group: MatchGroupSpec) -> Self {
        self.groups.push(group);
        self
    }
}

/// A pattern plus the filter chain applied to files it selects.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchGroupSpec {
    pub name: String,
    pub pattern: String,

    /// Exclusion patterns. Applied stage-wide: a skipped file is invisible
    /// to every group in the stage, not just the one declaring the skip.
    #[serde(default)]
    pub skip: Vec<String>,

    #[serde(default)]
    pub steps: Vec<StepSpec>,
}

impl MatchGroupSpec {
    pub fn new(name: impl Into<String>, pattern: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            pattern: pattern.into(),
            skip: Vec::new(),
            steps: Vec::new(),
        }
    }

    /// Add an exclusion pattern (builder style).
    pub fn skip(mut self, pattern: impl Into<String>) -> Self {
        self.skip.push(pattern.into());
        self
    }

    /// Append a filter step (builder style).
    pub fn step(mut self, step: StepSpec) -> Self {
        self.steps.push(step);
        self
    }
}

/// One step of a filter chain.
///
/// The serialized form of a step list is the chain fingerprint input, so a
/// configuration change invalidates the cache entries that depend on it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StepSpec {
    /// 1:1 source-language transform, delegated to a registered plugin.
    Compile {
        plugin: String,
        #[serde(default)]
        config: serde_json::Map<String, serde_json::Value>,
    },

    /// 1:1 content rewrite via regex rules. No I/O.
    Rewrite { rules: Vec<RewriteRule> },

    /// 1:1 prefix/suffix envelope, optionally recording a source map.
    Wrap {
        #[serde(default)]
        prefix: String,
        #[serde(default)]
        suffix: String,
        #[serde(default)]
        source_maps: bool,
    },

    /// 1:1 module-registration envelope. The module id is derived from the
    /// relative path and the namespace prefix.
    ModuleRegister {
        namespace: String,
        #[serde(default)]
        strip_prefix: Option<String>,
    },

    /// N:1 merge in Orderer-resolved order.
    Concat {
        output: String,
        #[serde(default)]
        order: Vec<String>,
        /// Priority prefixes placing vendor/engine files ahead of the rest.
        #[serde(default)]
        engines_first: Vec<String>,
        /// Treat absent `order` entries as an error instead of skipping.
        #[serde(default)]
        required: bool,
        #[serde(default = "default_join")]
        join: String,
    },

    /// 1:1 passthrough with optional renaming.
    Copy {
        #[serde(default)]
        rename: Option<RenameSpec>,
    },

    /// Gzip, alongside the original (`keep_original`) or replacing it.
    Compress {
        #[serde(default = "default_true")]
        keep_original: bool,
        #[serde(default = "default_level")]
        level: u32,
    },

    /// N:1 manifest of all input assets' content hashes.
    ManifestEmit { output: String },
}

fn default_join() -> String {
    "\n".to_string()
}

const fn default_true() -> bool {
    true
}

const fn default_level() -> u32 {
    6
}

impl StepSpec {
    /// Short step kind label for logs and failure context.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Compile { .. } => "compile",
            Self::Rewrite { .. } => "rewrite",
            Self::Wrap { .. } => "wrap",
            Self::ModuleRegister { .. } => "module_register",
            Self::Concat { .. } => "concat",
            Self::Copy { .. } => "copy",
            Self::Compress { .. } => "compress",
            Self::ManifestEmit { .. } => "manifest_emit",
        }
    }
}

/// A single find/replace rewrite rule (`pattern` is a regex).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RewriteRule {
    pub pattern: String,
    pub replace: String,
}

/// Declarative output-name mapping for copy steps.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RenameSpec {
    #[serde(default)]
    pub strip_prefix: Option<String>,
    #[serde(default)]
    pub add_prefix: Option<String>,
    #[serde(default)]
    pub extension: Option<String>,
}
