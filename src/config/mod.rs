//! Pipeline configuration: loading, descriptors, validation.
//!
//! Configuration is declarative data. Stages, match groups, and steps are
//! plain descriptors; the engine consumes only these structures. All
//! configuration problems are detected here, before any stage runs.

mod error;
mod spec;

pub use error::ConfigError;
pub use spec::{
    MatchGroupSpec, PipelineSpec, RenameSpec, RewriteRule, StageSpec, StepSpec,
};

use rustc_hash::FxHashSet;
use std::fs;
use std::path::Path;

use crate::filter::{FilterChain, FilterRegistry};
use crate::matcher::Matcher;

/// Default manifest file name.
pub const MANIFEST_FILE: &str = "conveyor.toml";

/// Default cache directory name, relative to the manifest.
pub const CACHE_DIR: &str = ".conveyor";

/// Load a pipeline manifest, resolving relative roots against its parent
/// directory.
pub fn load(path: &Path) -> Result<PipelineSpec, ConfigError> {
    let data =
        fs::read_to_string(path).map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;
    let mut spec: PipelineSpec = toml::from_str(&data)?;

    let base = path.parent().unwrap_or(Path::new("."));
    if spec.cache_dir.is_none() {
        spec.cache_dir = Some(base.join(CACHE_DIR));
    }
    spec.normalize(base);
    Ok(spec)
}

/// Validate a pipeline against a plugin registry.
///
/// Collects every problem (malformed patterns, unknown plugins, duplicate
/// names) instead of stopping at the first, so a broken manifest is fixed
/// in one pass.
pub fn validate(spec: &PipelineSpec, registry: &FilterRegistry) -> Result<(), ConfigError> {
    let mut problems = Vec::new();

    let mut stage_names = FxHashSet::default();
    for stage in &spec.stages {
        if !stage_names.insert(stage.name.as_str()) {
            problems.push(format!("duplicate stage name `{}`", stage.name));
        }
        validate_stage(stage, registry, &mut problems);
    }

    if problems.is_empty() {
        Ok(())
    } else {
        Err(ConfigError::from_problems(problems))
    }
}

fn validate_stage(stage: &StageSpec, registry: &FilterRegistry, problems: &mut Vec<String>) {
    let mut group_names = FxHashSet::default();
    for group in &stage.groups {
        if !group_names.insert(group.name.as_str()) {
            problems.push(format!(
                "stage `{}`: duplicate group name `{}`",
                stage.name, group.name
            ));
        }

        if let Err(e) = Matcher::compile(&group.pattern) {
            problems.push(format!("stage `{}` group `{}`: {e}", stage.name, group.name));
        }
        for skip in &group.skip {
            if let Err(e) = Matcher::compile(skip) {
                problems.push(format!(
                    "stage `{}` group `{}` skip: {e}",
                    stage.name, group.name
                ));
            }
        }

        if let Err(step_problems) = FilterChain::compile(group, registry) {
            for p in step_problems {
                problems.push(format!("stage `{}` {p}", stage.name));
            }
        }
    }
}
