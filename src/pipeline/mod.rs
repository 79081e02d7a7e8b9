//! Pipeline orchestration.
//!
//! Stages run strictly in declaration order; each stage conventionally
//! reads the previous stage's output root. A failed stage stops the
//! pipeline: later stages never observe partial upstream output.

use crate::cache::CacheStore;
use crate::config::{self, ConfigError, PipelineSpec};
use crate::filter::FilterRegistry;
use crate::log;
use crate::stage::{StageResult, StageRunner};

/// Per-stage results of one pipeline run, in execution order.
///
/// At most the last entry is failed; stages after a failure are never
/// started and have no entry.
#[derive(Debug)]
pub struct BuildReport {
    pub stages: Vec<StageResult>,
}

impl BuildReport {
    pub fn success(&self) -> bool {
        self.stages.iter().all(|s| !s.is_failed())
    }

    pub fn first_failure(&self) -> Option<&StageResult> {
        self.stages.iter().find(|s| s.is_failed())
    }

    /// Total files written across all completed stages.
    pub fn files_written(&self) -> usize {
        self.stages.iter().map(|s| s.produced.len()).sum()
    }
}

/// Drives a full pipeline run over a shared cache store.
pub struct Orchestrator<'a> {
    spec: &'a PipelineSpec,
    registry: &'a FilterRegistry,
    cache: &'a CacheStore,
}

impl<'a> Orchestrator<'a> {
    pub fn new(
        spec: &'a PipelineSpec,
        registry: &'a FilterRegistry,
        cache: &'a CacheStore,
    ) -> Self {
        Self {
            spec,
            registry,
            cache,
        }
    }

    /// Validate the whole pipeline, then run stages in order, stopping at
    /// the first failure.
    pub fn run_all(&self) -> Result<BuildReport, ConfigError> {
        config::validate(self.spec, self.registry)?;

        let mut stages = Vec::with_capacity(self.spec.stages.len());
        for stage_spec in &self.spec.stages {
            // Validation already vetted every matcher and chain
            let runner = StageRunner::prepare(stage_spec, self.registry, self.cache, &self.spec.env)
                .map_err(ConfigError::from_problems)?;
            let result = runner.run();
            let failed = result.is_failed();
            stages.push(result);
            if failed {
                log!("error"; "pipeline stopped at stage `{}`", stage_spec.name);
                break;
            }
        }

        Ok(BuildReport { stages })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{MatchGroupSpec, StageSpec, StepSpec};
    use std::fs;
    use std::path::Path;
    use tempfile::TempDir;

    fn write_files(root: &Path, files: &[(&str, &str)]) {
        for (path, content) in files {
            let full = root.join(path);
            fs::create_dir_all(full.parent().unwrap()).unwrap();
            fs::write(full, content).unwrap();
        }
    }

    fn two_stage_spec(dir: &Path) -> PipelineSpec {
        PipelineSpec::new("test")
            .stage(
                StageSpec::new("bundle", dir.join("in"), dir.join("mid")).group(
                    MatchGroupSpec::new("scripts", "**/*.js").step(StepSpec::Concat {
                        output: "app.js".into(),
                        order: vec![],
                        engines_first: vec![],
                        required: false,
                        join: "\n".into(),
                    }),
                ),
            )
            .stage(
                StageSpec::new("publish", dir.join("mid"), dir.join("out")).group(
                    MatchGroupSpec::new("all", "**/*").step(StepSpec::Compress {
                        keep_original: true,
                        level: 6,
                    }),
                ),
            )
    }

    #[test]
    fn test_stages_chain_through_roots() {
        let dir = TempDir::new().unwrap();
        write_files(&dir.path().join("in"), &[("b.js", "B"), ("a.js", "A")]);
        let cache = CacheStore::open(dir.path().join(".conveyor")).unwrap();
        let spec = two_stage_spec(dir.path());

        let report = Orchestrator::new(&spec, &FilterRegistry::new(), &cache)
            .run_all()
            .unwrap();
        assert!(report.success());
        assert_eq!(report.stages.len(), 2);

        assert_eq!(
            fs::read_to_string(dir.path().join("out/app.js")).unwrap(),
            "A\nB"
        );
        assert!(dir.path().join("out/app.js.gz").exists());
    }

    #[test]
    fn test_repeat_run_is_byte_identical() {
        let dir = TempDir::new().unwrap();
        write_files(&dir.path().join("in"), &[("a.js", "A"), ("b.js", "B")]);
        let cache = CacheStore::open(dir.path().join(".conveyor")).unwrap();
        let spec = two_stage_spec(dir.path());
        let registry = FilterRegistry::new();

        let run = || {
            let report = Orchestrator::new(&spec, &registry, &cache)
                .run_all()
                .unwrap();
            assert!(report.success());
            (
                fs::read(dir.path().join("out/app.js")).unwrap(),
                fs::read(dir.path().join("out/app.js.gz")).unwrap(),
            )
        };

        let first = run();
        fs::remove_dir_all(dir.path().join("out")).unwrap();
        let second = run();
        assert_eq!(first, second);
    }

    #[test]
    fn test_failed_stage_stops_pipeline() {
        let dir = TempDir::new().unwrap();
        write_files(&dir.path().join("in"), &[("a.js", "A")]);
        let cache = CacheStore::open(dir.path().join(".conveyor")).unwrap();

        let copy_stage = |name: &str, input: &str, output: &str| {
            StageSpec::new(name, dir.path().join(input), dir.path().join(output)).group(
                MatchGroupSpec::new("all", "**/*").step(StepSpec::Copy { rename: None }),
            )
        };
        let spec = PipelineSpec::new("test")
            .stage(copy_stage("collect", "in", "mid1"))
            .stage(
                StageSpec::new("bundle", dir.path().join("mid1"), dir.path().join("mid2")).group(
                    MatchGroupSpec::new("scripts", "**/*.js").step(StepSpec::Concat {
                        output: "app.js".into(),
                        order: vec!["missing.js".into()],
                        engines_first: vec![],
                        required: true,
                        join: "\n".into(),
                    }),
                ),
            )
            .stage(copy_stage("publish", "mid2", "out"));

        let report = Orchestrator::new(&spec, &FilterRegistry::new(), &cache)
            .run_all()
            .unwrap();
        assert!(!report.success());
        // Stage one completed, stage two failed with its own context, stage
        // three never ran
        assert_eq!(report.stages.len(), 2);
        let failed = report.first_failure().unwrap();
        assert_eq!(failed.stage, "bundle");
        let failure = failed.failure.as_ref().unwrap();
        assert_eq!(failure.group.as_deref(), Some("scripts"));
        assert_eq!(failure.step, Some("concat"));
        assert!(!dir.path().join("out").exists());
    }

    #[test]
    fn test_invalid_config_runs_nothing() {
        let dir = TempDir::new().unwrap();
        write_files(&dir.path().join("in"), &[("a.js", "A")]);
        let cache = CacheStore::open(dir.path().join(".conveyor")).unwrap();

        let spec = PipelineSpec::new("test").stage(
            StageSpec::new("bundle", dir.path().join("in"), dir.path().join("out"))
                .group(MatchGroupSpec::new("bad", "{broken"))
                .group(
                    MatchGroupSpec::new("good", "**/*.js").step(StepSpec::Copy { rename: None }),
                ),
        );

        let err = Orchestrator::new(&spec, &FilterRegistry::new(), &cache)
            .run_all()
            .unwrap_err();
        assert!(err.to_string().contains("{broken"));
        // Even the valid group produced nothing
        assert!(!dir.path().join("out").exists());
    }
}
