//! Glob matching for match group patterns.
//!
//! The grammar supports `*` (within one path component), `**` (across
//! components), character classes `[...]`, and brace alternation `{a,b}`.
//! Braces are expanded into plain glob patterns before compilation since
//! the glob crate does not support them natively.
//!
//! Matching is pattern-only: the same file may legitimately be selected by
//! several match groups in one stage. Exclusion (`skip`) patterns are
//! evaluated by the stage runner before any group matches, so a skipped
//! file is invisible to every group.

use glob::{MatchOptions, Pattern};
use thiserror::Error;

/// A malformed glob pattern.
#[derive(Debug, Error)]
pub enum MatchError {
    #[error("unbalanced braces in pattern `{0}`")]
    UnbalancedBrace(String),

    #[error("invalid glob `{pattern}`: {source}")]
    Glob {
        pattern: String,
        #[source]
        source: glob::PatternError,
    },
}

/// `*` must not cross path separators; `**` may.
const OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

/// A compiled glob pattern deciding which relative paths it claims.
#[derive(Debug, Clone)]
pub struct Matcher {
    raw: String,
    patterns: Vec<Pattern>,
}

impl Matcher {
    /// Compile a pattern, expanding brace alternation.
    pub fn compile(pattern: &str) -> Result<Self, MatchError> {
        let expanded = expand_braces(pattern)
            .ok_or_else(|| MatchError::UnbalancedBrace(pattern.to_string()))?;

        let patterns = expanded
            .iter()
            .map(|p| {
                Pattern::new(p).map_err(|source| MatchError::Glob {
                    pattern: p.clone(),
                    source,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            raw: pattern.to_string(),
            patterns,
        })
    }

    /// The original pattern text.
    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// Check whether a relative path matches.
    pub fn is_match(&self, path: &str) -> bool {
        self.patterns
            .iter()
            .any(|p| p.matches_with(path, OPTIONS))
    }

    /// Select the matching subset of candidate paths, preserving input order.
    pub fn select<'a>(&self, candidates: &'a [String]) -> Vec<&'a str> {
        candidates
            .iter()
            .map(String::as_str)
            .filter(|p| self.is_match(p))
            .collect()
    }
}

/// Check a path against a set of matchers.
pub fn any_match(matchers: &[Matcher], path: &str) -> bool {
    matchers.iter().any(|m| m.is_match(path))
}

/// Expand brace alternation `{a,b}` into plain glob patterns.
///
/// Handles nesting by expanding the first group and recursing. Returns
/// `None` on unbalanced braces.
fn expand_braces(pattern: &str) -> Option<Vec<String>> {
    let Some(open) = pattern.find('{') else {
        if pattern.contains('}') {
            return None;
        }
        return Some(vec![pattern.to_string()]);
    };

    // Find the matching close brace, tracking nesting depth
    let bytes = pattern.as_bytes();
    let mut depth = 0usize;
    let mut close = None;
    for (i, &b) in bytes.iter().enumerate().skip(open) {
        match b {
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    close = Some(i);
                    break;
                }
            }
            _ => {}
        }
    }
    let close = close?;

    let prefix = &pattern[..open];
    let body = &pattern[open + 1..close];
    let suffix = &pattern[close + 1..];

    // Split alternatives on top-level commas only
    let mut alternatives = Vec::new();
    let mut depth = 0usize;
    let mut start = 0usize;
    for (i, b) in body.bytes().enumerate() {
        match b {
            b'{' => depth += 1,
            b'}' => depth = depth.checked_sub(1)?,
            b',' if depth == 0 => {
                alternatives.push(&body[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    alternatives.push(&body[start..]);

    let mut out = Vec::new();
    for alt in alternatives {
        let combined = format!("{prefix}{alt}{suffix}");
        out.extend(expand_braces(&combined)?);
    }
    Some(out)
}
