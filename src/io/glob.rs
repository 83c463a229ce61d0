//! Resolving data path entries into concrete files.
//!
//! A data path entry is one of:
//!
//! - a glob pattern such as `data/**/*.csv` (`*`, `?` or `[` present),
//! - a directory, whose regular files are listed (non-recursively),
//! - a plain file.
//!
//! Results are always sorted so every run visits files in the same order.

use crate::io::compression::logical_name;
use anyhow::{Context, Result, bail};
use glob::glob;
use std::fs;
use std::path::{Path, PathBuf};

/// Whether `entry` contains glob metacharacters.
#[must_use]
pub fn is_glob_pattern(entry: &str) -> bool {
    entry.contains(['*', '?', '['])
}

/// Expand a glob pattern into the sorted list of files it matches.
/// Directories matched by the pattern are skipped.
///
/// # Errors
/// Invalid patterns and unreadable entries.
pub fn expand_glob(pattern: &str) -> Result<Vec<PathBuf>> {
    let mut files = glob(pattern)
        .with_context(|| format!("bad glob pattern '{pattern}'"))?
        .filter(|entry| !matches!(entry, Ok(p) if !p.is_file()))
        .map(|entry| entry.with_context(|| format!("read a match of '{pattern}'")))
        .collect::<Result<Vec<_>>>()?;
    files.sort();
    Ok(files)
}

/// The regular files directly inside `dir`, sorted.
///
/// # Errors
/// IO errors while listing.
pub fn list_dir(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in fs::read_dir(dir).with_context(|| format!("list {}", dir.display()))? {
        let path = entry
            .with_context(|| format!("read entry in {}", dir.display()))?
            .path();
        if path.is_file() {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Resolve a list of data path entries into files, preserving entry order
/// and sorting within each entry.
///
/// # Errors
/// An entry that is neither a glob, a directory nor an existing file.
pub fn resolve_paths<S: AsRef<str>>(entries: &[S]) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in entries {
        let entry = entry.as_ref();
        if is_glob_pattern(entry) {
            files.extend(expand_glob(entry)?);
            continue;
        }
        let path = Path::new(entry);
        if path.is_dir() {
            files.extend(list_dir(path)?);
        } else if path.is_file() {
            files.push(path.to_path_buf());
        } else {
            bail!("data path does not exist: {entry}");
        }
    }
    Ok(files)
}

/// Keep the files whose logical name (compression suffix removed) ends with
/// `extension`, compared case-insensitively.
#[must_use]
pub fn filter_by_extension(files: Vec<PathBuf>, extension: &str) -> Vec<PathBuf> {
    let extension = extension.to_lowercase();
    files
        .into_iter()
        .filter(|f| logical_name(f).ends_with(&extension))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;

    #[test]
    fn resolves_dirs_files_and_globs() -> Result<()> {
        let dir = tempfile::tempdir()?;
        for name in ["b.csv", "a.csv", "notes.txt"] {
            File::create(dir.path().join(name))?;
        }
        let dir_str = dir.path().to_string_lossy().to_string();

        let listed = resolve_paths(&[dir_str.clone()])?;
        assert_eq!(listed.len(), 3);
        assert!(listed[0].ends_with("a.csv"));

        let globbed = resolve_paths(&[format!("{dir_str}/*.csv")])?;
        assert_eq!(globbed.len(), 2);

        let csv_only = filter_by_extension(listed, ".CSV");
        assert_eq!(csv_only.len(), 2);

        assert!(resolve_paths(&[format!("{dir_str}/missing.csv")]).is_err());
        Ok(())
    }
}
