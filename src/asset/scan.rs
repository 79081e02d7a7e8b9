//! Input loading for a stage.
//!
//! Walks the stage's input root and materializes every file as an
//! [`AssetRef`]. Results are sorted by relative path so the candidate set
//! never depends on OS directory enumeration order.

use jwalk::WalkDir;
use std::fs;
use std::path::Path;

use crate::debug;
use crate::error::BuildError;

use super::AssetRef;

/// Load all files under `root` into assets, sorted by relative path.
///
/// Relative paths are normalized to '/'-separated form. Files whose paths
/// are not valid UTF-8 are skipped with a debug note.
pub fn load_assets(root: &Path) -> Result<Vec<AssetRef>, BuildError> {
    if !root.is_dir() {
        return Err(BuildError::io(
            root,
            std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "input root is not a directory",
            ),
        ));
    }

    let mut files: Vec<_> = WalkDir::new(root)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_file())
        .map(|e| e.path())
        .collect();
    files.sort();

    let mut assets = Vec::with_capacity(files.len());
    for path in files {
        let Some(rel) = relative_path(&path, root) else {
            debug!("scan"; "skipping non-UTF-8 path: {}", path.display());
            continue;
        };
        let content = fs::read(&path).map_err(|e| BuildError::io(&path, e))?;
        assets.push(AssetRef::new(rel, content));
    }

    Ok(assets)
}

/// Relative '/'-separated path of `path` under `root`.
fn relative_path(path: &Path, root: &Path) -> Option<String> {
    let rel = path.strip_prefix(root).ok()?;
    let mut out = String::new();
    for component in rel.components() {
        if !out.is_empty() {
            out.push('/');
        }
        out.push_str(component.as_os_str().to_str()?);
    }
    Some(out)
}
