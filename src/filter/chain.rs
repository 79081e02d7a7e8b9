//! Filter chain compilation and execution.
//!
//! A chain is compiled once from its declarative step specs: plugin names
//! are resolved against the registry and rewrite regexes are built, so all
//! configuration problems surface before any stage runs. Execution is
//! strictly sequential - step i's output set is exactly step i+1's input
//! set.

use regex::Regex;
use std::fmt;
use std::sync::Arc;

use crate::asset::AssetRef;
use crate::config::{MatchGroupSpec, StepSpec};
use crate::error::BuildError;
use crate::order::Orderer;

use super::steps;
use super::{BuildContext, Filter, FilterRegistry, NameFn, PluginConfig};

/// A chain failure with the step it occurred in.
#[derive(Debug)]
pub struct ChainError {
    /// Index of the failing step within the chain.
    pub index: usize,
    /// Step kind label.
    pub step: &'static str,
    pub error: BuildError,
}

/// An ordered sequence of compiled filter steps.
pub struct FilterChain {
    steps: Vec<Step>,
    fingerprint: String,
}

// Compile steps hold `Arc<dyn Filter>`, so Debug is written by hand over
// the step labels, like the registry's impl.
impl fmt::Debug for FilterChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let labels: Vec<_> = self.steps.iter().map(Step::label).collect();
        f.debug_struct("FilterChain")
            .field("steps", &labels)
            .field("fingerprint", &self.fingerprint)
            .finish()
    }
}

/// One compiled step.
pub(super) enum Step {
    Compile {
        plugin: Arc<dyn Filter>,
        config: PluginConfig,
    },
    Rewrite {
        rules: Vec<(Regex, String)>,
    },
    Wrap {
        prefix: String,
        suffix: String,
        source_maps: bool,
    },
    ModuleRegister {
        id_fn: NameFn,
    },
    Concat {
        orderer: Orderer,
        output: String,
        required: bool,
        join: Vec<u8>,
    },
    Copy {
        rename: Option<NameFn>,
    },
    Compress {
        keep_original: bool,
        level: u32,
    },
    ManifestEmit {
        output: String,
    },
}

impl Step {
    fn label(&self) -> &'static str {
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

    fn apply(
        &self,
        assets: Vec<AssetRef>,
        ctx: &BuildContext,
    ) -> Result<Vec<AssetRef>, BuildError> {
        match self {
            Self::Compile { plugin, config } => plugin.transform(assets, ctx, config),
            Self::Rewrite { rules } => steps::rewrite(assets, rules),
            Self::Wrap {
                prefix,
                suffix,
                source_maps,
            } => steps::wrap(assets, prefix, suffix, *source_maps),
            Self::ModuleRegister { id_fn } => steps::module_register(assets, id_fn),
            Self::Concat {
                orderer,
                output,
                required,
                join,
            } => steps::concat(assets, orderer, output, *required, join),
            Self::Copy { rename } => steps::copy(assets, rename.as_ref()),
            Self::Compress {
                keep_original,
                level,
            } => steps::compress(assets, *keep_original, *level),
            Self::ManifestEmit { output } => steps::manifest_emit(assets, output),
        }
    }
}

impl FilterChain {
    /// Compile a match group's step specs, resolving plugins and regexes.
    ///
    /// Returns every problem found, not just the first, so configuration
    /// errors can be reported together.
    pub fn compile(group: &MatchGroupSpec, registry: &FilterRegistry) -> Result<Self, Vec<String>> {
        let mut steps = Vec::with_capacity(group.steps.len());
        let mut problems = Vec::new();

        for (i, spec) in group.steps.iter().enumerate() {
            match Self::compile_step(spec, registry) {
                Ok(step) => steps.push(step),
                Err(reason) => problems.push(format!(
                    "group `{}` step {} ({}): {reason}",
                    group.name,
                    i,
                    spec.label()
                )),
            }
        }

        if !problems.is_empty() {
            return Err(problems);
        }

        // The serialized spec list is the configuration half of the cache
        // key; name-fn labels are appended by the override methods below.
        let fingerprint =
            serde_json::to_string(&group.steps).unwrap_or_else(|_| group.name.clone());

        Ok(Self { steps, fingerprint })
    }

    fn compile_step(spec: &StepSpec, registry: &FilterRegistry) -> Result<Step, String> {
        match spec {
            StepSpec::Compile { plugin, config } => {
                let resolved = registry
                    .get(plugin)
                    .ok_or_else(|| format!("unknown filter plugin `{plugin}`"))?;
                Ok(Step::Compile {
                    plugin: resolved,
                    config: config.clone(),
                })
            }
            StepSpec::Rewrite { rules } => {
                let mut compiled = Vec::with_capacity(rules.len());
                for rule in rules {
                    let regex = Regex::new(&rule.pattern)
                        .map_err(|e| format!("invalid rewrite pattern `{}`: {e}", rule.pattern))?;
                    compiled.push((regex, rule.replace.clone()));
                }
                Ok(Step::Rewrite { rules: compiled })
            }
            StepSpec::Wrap {
                prefix,
                suffix,
                source_maps,
            } => Ok(Step::Wrap {
                prefix: prefix.clone(),
                suffix: suffix.clone(),
                source_maps: *source_maps,
            }),
            StepSpec::ModuleRegister {
                namespace,
                strip_prefix,
            } => Ok(Step::ModuleRegister {
                id_fn: NameFn::module_id(namespace, strip_prefix.as_deref()),
            }),
            StepSpec::Concat {
                output,
                order,
                engines_first,
                required,
                join,
            } => {
                if output.is_empty() {
                    return Err("concat output name must not be empty".to_string());
                }
                Ok(Step::Concat {
                    orderer: Orderer::new(order.clone(), engines_first.clone()),
                    output: output.clone(),
                    required: *required,
                    join: join.clone().into_bytes(),
                })
            }
            StepSpec::Copy { rename } => Ok(Step::Copy {
                rename: rename.as_ref().map(NameFn::rename),
            }),
            StepSpec::Compress {
                keep_original,
                level,
            } => {
                if *level > 9 {
                    return Err(format!("compression level {level} out of range (0-9)"));
                }
                Ok(Step::Compress {
                    keep_original: *keep_original,
                    level: *level,
                })
            }
            StepSpec::ManifestEmit { output } => {
                if output.is_empty() {
                    return Err("manifest output name must not be empty".to_string());
                }
                Ok(Step::ManifestEmit {
                    output: output.clone(),
                })
            }
        }
    }

    /// Replace the module-id function of every module_register step.
    ///
    /// The function's label extends the fingerprint, so a different
    /// function invalidates cached outputs even with identical specs.
    pub fn with_module_id_fn(mut self, id_fn: NameFn) -> Self {
        self.fingerprint.push_str(";module_id=");
        self.fingerprint.push_str(id_fn.label());
        for step in &mut self.steps {
            if let Step::ModuleRegister { id_fn: f } = step {
                *f = id_fn.clone();
            }
        }
        self
    }

    /// Replace the rename function of every copy step.
    pub fn with_rename_fn(mut self, rename: NameFn) -> Self {
        self.fingerprint.push_str(";rename=");
        self.fingerprint.push_str(rename.label());
        for step in &mut self.steps {
            if let Step::Copy { rename: r } = step {
                *r = Some(rename.clone());
            }
        }
        self
    }

    /// Serialized configuration, hashed into cache keys.
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Run all steps in declaration order. The first failing step aborts
    /// the remainder and reports which step failed.
    pub fn run(
        &self,
        mut assets: Vec<AssetRef>,
        ctx: &BuildContext,
    ) -> Result<Vec<AssetRef>, ChainError> {
        for (index, step) in self.steps.iter().enumerate() {
            assets = step.apply(assets, ctx).map_err(|error| ChainError {
                index,
                step: step.label(),
                error,
            })?;
        }
        Ok(assets)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RewriteRule;

    fn ctx() -> BuildContext {
        BuildContext {
            env: "test".into(),
            stage: "s1".into(),
            group: "g1".into(),
        }
    }

    fn compile(group: MatchGroupSpec) -> FilterChain {
        FilterChain::compile(&group, &FilterRegistry::new()).unwrap()
    }

    #[test]
    fn test_steps_run_in_declaration_order() {
        let group = MatchGroupSpec::new("g1", "**/*")
            .step(StepSpec::Rewrite {
                rules: vec![RewriteRule {
                    pattern: "a".into(),
                    replace: "b".into(),
                }],
            })
            .step(StepSpec::Wrap {
                prefix: "<".into(),
                suffix: ">".into(),
                source_maps: false,
            });
        let chain = compile(group);
        let out = chain
            .run(vec![AssetRef::new("x.txt", "aaa")], &ctx())
            .unwrap();
        // Rewrite happened before wrap
        assert_eq!(out[0].content(), b"<bbb>");
    }

    #[test]
    fn test_debug_lists_step_labels() {
        let group = MatchGroupSpec::new("g1", "**/*")
            .step(StepSpec::Copy { rename: None })
            .step(StepSpec::Compress {
                keep_original: true,
                level: 6,
            });
        let rendered = format!("{:?}", compile(group));
        assert!(rendered.contains("copy"));
        assert!(rendered.contains("compress"));
    }

    #[test]
    fn test_unknown_plugin_rejected() {
        let group = MatchGroupSpec::new("g1", "**/*").step(StepSpec::Compile {
            plugin: "nonexistent".into(),
            config: PluginConfig::new(),
        });
        let problems = FilterChain::compile(&group, &FilterRegistry::new()).unwrap_err();
        assert!(problems[0].contains("nonexistent"));
    }

    #[test]
    fn test_malformed_rewrite_pattern_rejected() {
        let group = MatchGroupSpec::new("g1", "**/*").step(StepSpec::Rewrite {
            rules: vec![RewriteRule {
                pattern: "(".into(),
                replace: "".into(),
            }],
        });
        assert!(FilterChain::compile(&group, &FilterRegistry::new()).is_err());
    }

    #[test]
    fn test_failing_step_aborts_chain() {
        // Rewrite on binary content fails; the following wrap must not run
        let group = MatchGroupSpec::new("g1", "**/*")
            .step(StepSpec::Rewrite {
                rules: vec![RewriteRule {
                    pattern: "a".into(),
                    replace: "b".into(),
                }],
            })
            .step(StepSpec::Wrap {
                prefix: "<".into(),
                suffix: ">".into(),
                source_maps: false,
            });
        let chain = compile(group);
        let err = chain
            .run(vec![AssetRef::new("x.bin", vec![0xff, 0xfe])], &ctx())
            .unwrap_err();
        assert_eq!(err.index, 0);
        assert_eq!(err.step, "rewrite");
    }

    #[test]
    fn test_fingerprint_changes_with_config() {
        let a = compile(MatchGroupSpec::new("g", "**/*").step(StepSpec::Wrap {
            prefix: "x".into(),
            suffix: "".into(),
            source_maps: false,
        }));
        let b = compile(MatchGroupSpec::new("g", "**/*").step(StepSpec::Wrap {
            prefix: "y".into(),
            suffix: "".into(),
            source_maps: false,
        }));
        assert_ne!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn test_fingerprint_tracks_name_fn_label() {
        let make = || {
            compile(MatchGroupSpec::new("g", "**/*").step(StepSpec::ModuleRegister {
                namespace: "app".into(),
                strip_prefix: None,
            }))
        };
        let default = make();
        let custom = make().with_module_id_fn(NameFn::new("flat", |p| p.replace('/', "_")));
        assert_ne!(default.fingerprint(), custom.fingerprint());
    }

}
