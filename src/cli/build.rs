//! Build and validate commands.

use anyhow::{Context, Result, bail};

use crate::cache::{CacheStore, clear_cache_dir};
use crate::cli::Cli;
use crate::config::{self, PipelineSpec};
use crate::filter::FilterRegistry;
use crate::log;
use crate::pipeline::Orchestrator;

/// Run every pipeline stage against the manifest next to the CLI's config
/// path. `registry` carries the host application's compiled-in plugins.
pub fn run_build(cli: &Cli, registry: &FilterRegistry, clean: bool) -> Result<()> {
    let spec = load_manifest(cli)?;
    // load() always fills in the default
    let cache_dir = spec
        .cache_dir
        .clone()
        .context("manifest has no cache directory")?;

    if clean {
        clear_cache_dir(&cache_dir)?;
        log!("cache"; "cleared {}", cache_dir.display());
    }
    let cache = CacheStore::open(&cache_dir)?;

    let report = Orchestrator::new(&spec, registry, &cache).run_all()?;

    if let Some(failed) = report.first_failure() {
        let detail = failed
            .failure
            .as_ref()
            .map(|f| f.to_string())
            .unwrap_or_default();
        bail!("stage `{}` failed: {detail}", failed.stage);
    }

    log!("build"; "{} stages, {} files written", report.stages.len(), report.files_written());
    if let Some(root) = spec.publish_root() {
        log!("build"; "output at {}", root.display());
    }
    Ok(())
}

/// Validate the manifest without running any stage.
pub fn run_validate(cli: &Cli, registry: &FilterRegistry) -> Result<()> {
    let spec = load_manifest(cli)?;
    config::validate(&spec, registry)?;
    log!("config"; "{} ok ({} stages)", cli.config.display(), spec.stages.len());
    Ok(())
}

fn load_manifest(cli: &Cli) -> Result<PipelineSpec> {
    config::load(&cli.config)
        .with_context(|| format!("failed to load manifest {}", cli.config.display()))
}
