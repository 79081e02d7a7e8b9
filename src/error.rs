//! Engine error types.
//!
//! Stage-internal errors never auto-retry: transforms are deterministic, so
//! re-running a failed chain reproduces the same error. `CacheIntegrity` is
//! the one recoverable kind - the runner logs it and recomputes.

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while a stage is running.
#[derive(Debug, Error)]
pub enum BuildError {
    /// A filter step rejected input content. Fatal for the owning stage.
    #[error("compile error in `{file}`{}: {message}", match .line {
        Some(l) => format!(" line {l}"),
        None => String::new(),
    })]
    Compile {
        file: String,
        message: String,
        line: Option<u32>,
    },

    /// Two match groups wrote the same output path with differing content.
    #[error("output collision at `{path}` in stage `{stage}`")]
    Collision { path: String, stage: String },

    /// Filesystem read/write failure.
    #[error("IO error at `{path}`")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A cache entry's recorded outputs are missing on disk.
    /// Treated as a cache miss by the runner, never surfaced as fatal.
    #[error("cache entry `{key}` has missing outputs on disk")]
    CacheIntegrity { key: String },

    /// A file named as required in a concat order was absent from the input.
    #[error("required concat input `{file}` is missing")]
    MissingInput { file: String },
}

impl BuildError {
    /// Shorthand for a compile error without location info.
    pub fn compile(file: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Compile {
            file: file.into(),
            message: message.into(),
            line: None,
        }
    }

    /// Wrap an IO error with the path it occurred at.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
