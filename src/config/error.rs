//! Configuration errors, reported before any stage runs.

use std::path::PathBuf;
use thiserror::Error;

/// A malformed or inconsistent pipeline manifest.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error when reading `{0}`")]
    Io(PathBuf, #[source] std::io::Error),

    #[error("manifest parsing error")]
    Toml(#[from] toml::de::Error),

    /// One or more validation problems, newline-joined.
    /// Covers malformed patterns and references to unregistered plugins.
    #[error("invalid pipeline configuration:\n{0}")]
    Validation(String),
}

impl ConfigError {
    /// Join collected problems into a single validation error.
    pub fn from_problems(problems: Vec<String>) -> Self {
        Self::Validation(problems.join("\n"))
    }
}
