//! Stage execution.
//!
//! One stage loads its input root, applies stage-wide skip exclusions,
//! routes the remaining snapshot through its match groups (in parallel),
//! and writes every group's outputs to the output root. Groups read a
//! shared immutable snapshot and are independent: a failing group lets
//! its scheduled siblings finish, but the stage result is Failed.

use rayon::prelude::*;

use crate::asset::{AssetRef, OutputWriter, load_assets};
use crate::cache::{CacheKey, CacheStore};
use crate::config::{MatchGroupSpec, StageSpec};
use crate::error::BuildError;
use crate::filter::{BuildContext, FilterChain, FilterRegistry};
use crate::matcher::{Matcher, any_match};
use crate::{debug, log};

/// Per-stage lifecycle.
///
/// No transition skips a state; `Failed` is terminal and reachable from
/// `Matching`, `Transforming`, and `Writing`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageState {
    Pending,
    Loading,
    Matching,
    Transforming,
    Writing,
    Done,
    Failed,
}

impl StageState {
    /// Whether `next` is a legal successor of this state.
    pub fn can_transition(self, next: Self) -> bool {
        use StageState::*;
        matches!(
            (self, next),
            (Pending, Loading)
                | (Loading, Matching)
                | (Matching, Transforming)
                | (Transforming, Writing)
                | (Writing, Done)
                | (Matching | Transforming | Writing, Failed)
        )
    }
}

/// Outcome of one stage run.
#[derive(Debug)]
pub struct StageResult {
    pub stage: String,
    pub status: StageStatus,
    /// Relative paths written to the output root.
    pub produced: Vec<String>,
    pub failure: Option<StageFailure>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageStatus {
    Done,
    Failed,
}

impl StageResult {
    pub fn is_failed(&self) -> bool {
        self.status == StageStatus::Failed
    }
}

/// Full failure context: which group, which step, what went wrong.
#[derive(Debug)]
pub struct StageFailure {
    /// Group the failure occurred in, if it was group-scoped.
    pub group: Option<String>,
    /// Step kind label, for chain failures.
    pub step: Option<&'static str>,
    pub error: BuildError,
}

impl std::fmt::Display for StageFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(group) = &self.group {
            write!(f, "group `{group}`")?;
            if let Some(step) = self.step {
                write!(f, " step `{step}`")?;
            }
            write!(f, ": ")?;
        }
        write!(f, "{}", self.error)
    }
}

/// A match group with its compiled matcher and chain.
struct PreparedGroup<'a> {
    spec: &'a MatchGroupSpec,
    matcher: Matcher,
    chain: FilterChain,
}

/// Executes one pipeline stage.
pub struct StageRunner<'a> {
    spec: &'a StageSpec,
    groups: Vec<PreparedGroup<'a>>,
    /// Union of every group's skip patterns, applied stage-wide.
    skip: Vec<Matcher>,
    cache: &'a CacheStore,
    env: &'a str,
    state: StageState,
}

impl<'a> StageRunner<'a> {
    /// Compile matchers and chains for a stage.
    ///
    /// Configuration is validated before any stage runs, so problems here
    /// are reported as a plain error list (they indicate validation was
    /// skipped).
    pub fn prepare(
        spec: &'a StageSpec,
        registry: &FilterRegistry,
        cache: &'a CacheStore,
        env: &'a str,
    ) -> Result<Self, Vec<String>> {
        let mut problems = Vec::new();
        let mut groups = Vec::with_capacity(spec.groups.len());
        let mut skip = Vec::new();

        for group in &spec.groups {
            let matcher = match Matcher::compile(&group.pattern) {
                Ok(m) => Some(m),
                Err(e) => {
                    problems.push(format!("group `{}`: {e}", group.name));
                    None
                }
            };
            for pattern in &group.skip {
                match Matcher::compile(pattern) {
                    Ok(m) => skip.push(m),
                    Err(e) => problems.push(format!("group `{}` skip: {e}", group.name)),
                }
            }
            let chain = match FilterChain::compile(group, registry) {
                Ok(c) => Some(c),
                Err(step_problems) => {
                    problems.extend(step_problems);
                    None
                }
            };
            if let (Some(matcher), Some(chain)) = (matcher, chain) {
                groups.push(PreparedGroup {
                    spec: group,
                    matcher,
                    chain,
                });
            }
        }

        if !problems.is_empty() {
            return Err(problems);
        }

        Ok(Self {
            spec,
            groups,
            skip,
            cache,
            env,
            state: StageState::Pending,
        })
    }

    /// Run the stage to completion.
    pub fn run(mut self) -> StageResult {
        log!("stage"; "{}: {} -> {}",
            self.spec.name, self.spec.input.display(), self.spec.output.display());

        self.advance(StageState::Loading);
        let loaded = load_assets(&self.spec.input);

        self.advance(StageState::Matching);
        let snapshot = match loaded {
            Ok(assets) => assets,
            Err(error) => {
                return self.fail(StageFailure {
                    group: None,
                    step: None,
                    error,
                });
            }
        };

        // Skip exclusions are stage-wide: a skipped file is invisible to
        // every group, not just the one declaring the skip.
        let snapshot: Vec<AssetRef> = snapshot
            .into_iter()
            .filter(|a| !any_match(&self.skip, a.path()))
            .collect();
        debug!("stage"; "{}: {} candidate files after skips", self.spec.name, snapshot.len());

        self.advance(StageState::Transforming);
        // Independent groups over a shared read-only snapshot. collect()
        // waits for every group, so a failing group never cancels its
        // scheduled siblings - all independent errors surface in logs.
        let outcomes: Vec<Result<Vec<AssetRef>, StageFailure>> = self
            .groups
            .par_iter()
            .map(|group| self.process_group(group, &snapshot))
            .collect();

        self.advance(StageState::Writing);
        let writer = OutputWriter::new(&self.spec.name, &self.spec.output);
        let mut produced = Vec::new();
        let mut first_failure = None;

        // Writes happen in group declaration order, so collisions are
        // attributed deterministically regardless of parallel completion
        // order.
        for outcome in outcomes {
            match outcome {
                Ok(outputs) => {
                    for asset in &outputs {
                        match writer.write(asset) {
                            // Idempotent duplicates count once
                            Ok(fresh) => {
                                if fresh {
                                    produced.push(asset.path().to_string());
                                }
                            }
                            Err(error) => {
                                first_failure.get_or_insert(StageFailure {
                                    group: None,
                                    step: None,
                                    error,
                                });
                            }
                        }
                    }
                }
                Err(failure) => {
                    log!("error"; "stage `{}` {failure}", self.spec.name);
                    first_failure.get_or_insert(failure);
                }
            }
        }

        if let Some(failure) = first_failure {
            let mut result = self.fail(failure);
            result.produced = produced;
            return result;
        }

        self.advance(StageState::Done);
        debug!("stage"; "{}: wrote {} files", self.spec.name, produced.len());
        StageResult {
            stage: self.spec.name.clone(),
            status: StageStatus::Done,
            produced,
            failure: None,
        }
    }

    /// Match, consult the cache, and run the chain for one group.
    fn process_group(
        &self,
        group: &PreparedGroup<'_>,
        snapshot: &[AssetRef],
    ) -> Result<Vec<AssetRef>, StageFailure> {
        let inputs: Vec<AssetRef> = snapshot
            .iter()
            .filter(|a| group.matcher.is_match(a.path()))
            .cloned()
            .collect();

        if inputs.is_empty() {
            debug!("stage"; "{}/{}: no matching files", self.spec.name, group.spec.name);
            return Ok(Vec::new());
        }

        let key = CacheKey::compute(
            &self.spec.name,
            &group.spec.name,
            self.env,
            &inputs,
            group.chain.fingerprint(),
        );
        if let Some(outputs) = self.cache.get(&key) {
            debug!("cache"; "hit for {}/{} ({key})", self.spec.name, group.spec.name);
            return Ok(outputs);
        }

        let ctx = BuildContext {
            env: self.env.to_string(),
            stage: self.spec.name.clone(),
            group: group.spec.name.clone(),
        };
        let outputs = group
            .chain
            .run(inputs, &ctx)
            .map_err(|e| StageFailure {
                group: Some(group.spec.name.clone()),
                step: Some(e.step),
                error: e.error,
            })?;

        if let Err(error) = self.cache.put(&key, &outputs) {
            // A broken cache write must not fail the build
            debug!("cache"; "failed to record {}/{}: {}", self.spec.name, group.spec.name, error);
        }
        Ok(outputs)
    }

    fn advance(&mut self, next: StageState) {
        debug_assert!(
            self.state.can_transition(next),
            "illegal stage transition {:?} -> {next:?}",
            self.state
        );
        self.state = next;
    }

    fn fail(&mut self, failure: StageFailure) -> StageResult {
        self.advance(StageState::Failed);
        log!("error"; "stage `{}` failed: {failure}", self.spec.name);
        StageResult {
            stage: self.spec.name.clone(),
            status: StageStatus::Failed,
            produced: Vec::new(),
            failure: Some(failure),
        }
    }
}
