use std::fs;
use std::path::Path;

use crate::error::IoError;

/// List the regular, non-hidden files directly inside `dir`.
///
/// Returns `Ok(None)` when `dir` does not exist or is not a directory, so
/// callers can fall back to another location. Names are sorted
/// lexicographically.
pub fn list_files(dir: &Path) -> Result<Option<Vec<String>>, IoError> {
    if !dir.is_dir() {
        return Ok(None);
    }

    let entries = fs::read_dir(dir).map_err(|e| IoError::from_io(dir, e))?;
    let mut names = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| IoError::from_io(dir, e))?;
        let file_type = entry.file_type().map_err(|e| IoError::from_io(dir, e))?;
        if file_type.is_dir() {
            continue;
        }

        let name = entry.file_name().to_string_lossy().into_owned();
        if name.starts_with('.') {
            continue;
        }
        names.push(name);
    }

    names.sort();
    Ok(Some(names))
}

/// Final path component as UTF-8, if any.
pub fn file_name(path: &Path) -> Option<&str> {
    path.file_name().and_then(|n| n.to_str())
}

/// Case-insensitive extension check.
pub fn has_suffix(path: &Path, suffix: &str) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case(suffix))
        .unwrap_or(false)
}
