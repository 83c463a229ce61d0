//! Built-in source preprocessors.
//!
//! Both rewrite a path parameter (by default `data_path`) of the
//! [`SourceConfig`] into an explicit list of files before the reader opens
//! it, so every run reads a fixed, inspectable set of inputs.

use crate::config::{DATA_PATH, SourceConfig};
use crate::describe::{Describe, Signature};
use crate::io::glob::{filter_by_extension, resolve_paths};
use crate::reader::PreProcessor;
use crate::utils::SplitMix64;
use anyhow::{Result, bail};
use std::path::PathBuf;
use tracing::debug;

fn expand(source: &SourceConfig, key: &str, extension: Option<&str>) -> Result<Vec<PathBuf>> {
    let entries = source.get_paths(key)?;
    let mut files = resolve_paths(&entries)?;
    if let Some(ext) = extension {
        files = filter_by_extension(files, ext);
    }
    if files.is_empty() {
        bail!("no valid files found under '{key}': {entries:?}");
    }
    Ok(files)
}

fn into_param(files: &[PathBuf]) -> Vec<String> {
    files
        .iter()
        .map(|f| f.to_string_lossy().into_owned())
        .collect()
}

/// Replaces globs and directories under `key` by the sorted files they
/// resolve to.
#[derive(Clone, Debug)]
pub struct ExpandPaths {
    key: String,
    extension: Option<String>,
}

impl Default for ExpandPaths {
    fn default() -> Self {
        Self {
            key: DATA_PATH.to_string(),
            extension: None,
        }
    }
}

impl ExpandPaths {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = key.into();
        self
    }

    /// Keep only files with this extension (compression suffixes ignored).
    #[must_use]
    pub fn with_extension(mut self, extension: impl Into<String>) -> Self {
        self.extension = Some(extension.into());
        self
    }
}

impl PreProcessor for ExpandPaths {
    fn process(&self, mut source: SourceConfig) -> Result<SourceConfig> {
        let files = expand(&source, &self.key, self.extension.as_deref())?;
        debug!(key = %self.key, files = files.len(), "expanded source paths");
        source.set(self.key.clone(), into_param(&files));
        Ok(source)
    }
}

impl Describe for ExpandPaths {
    fn name(&self) -> String {
        "ExpandPaths".into()
    }

    fn signature(&self) -> Signature {
        let mut sig = Signature::new().with("key", &self.key);
        if let Some(ext) = &self.extension {
            sig.push("extension", ext);
        }
        sig
    }
}

/// Expands the paths under `key` like [`ExpandPaths`], then shuffles the
/// file order. Each run draws a new order from the same generator.
#[derive(Debug)]
pub struct ShufflePaths {
    expand: ExpandPaths,
    seed: Option<u64>,
    rng: std::sync::Mutex<SplitMix64>,
}

impl Default for ShufflePaths {
    fn default() -> Self {
        Self::new()
    }
}

impl ShufflePaths {
    #[must_use]
    pub fn new() -> Self {
        Self {
            expand: ExpandPaths::new(),
            seed: None,
            rng: std::sync::Mutex::new(SplitMix64::from_entropy()),
        }
    }

    #[must_use]
    pub fn seeded(seed: u64) -> Self {
        Self {
            expand: ExpandPaths::new(),
            seed: Some(seed),
            rng: std::sync::Mutex::new(SplitMix64::new(seed)),
        }
    }

    #[must_use]
    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.expand = self.expand.with_key(key);
        self
    }

    #[must_use]
    pub fn with_extension(mut self, extension: impl Into<String>) -> Self {
        self.expand = self.expand.with_extension(extension);
        self
    }
}

impl PreProcessor for ShufflePaths {
    fn process(&self, mut source: SourceConfig) -> Result<SourceConfig> {
        let mut files = expand(&source, &self.expand.key, self.expand.extension.as_deref())?;
        self.rng
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .shuffle(&mut files);
        source.set(self.expand.key.clone(), into_param(&files));
        Ok(source)
    }
}

impl Describe for ShufflePaths {
    fn name(&self) -> String {
        "ShufflePaths".into()
    }

    fn signature(&self) -> Signature {
        let mut sig = self.expand.signature();
        if let Some(seed) = self.seed {
            sig.push("seed", seed);
        }
        sig
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;

    fn files_in(dir: &std::path::Path, names: &[&str]) -> Result<()> {
        for name in names {
            File::create(dir.join(name))?;
        }
        Ok(())
    }

    #[test]
    fn expands_directory_sorted_and_filtered() -> Result<()> {
        let dir = tempfile::tempdir()?;
        files_in(dir.path(), &["b.csv", "a.csv", "skip.txt"])?;
        let source = SourceConfig::new().with(DATA_PATH, dir.path().to_string_lossy().to_string());

        let out = ExpandPaths::new().with_extension(".csv").process(source)?;
        let paths = out.get_paths(DATA_PATH)?;
        assert_eq!(paths.len(), 2);
        assert!(paths[0].ends_with("a.csv"));
        assert!(paths[1].ends_with("b.csv"));
        Ok(())
    }

    #[test]
    fn seeded_shuffles_repeat() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let names: Vec<String> = (0..12).map(|i| format!("{i:02}.csv")).collect();
        files_in(dir.path(), &names.iter().map(String::as_str).collect::<Vec<_>>())?;
        let source = SourceConfig::new().with(DATA_PATH, dir.path().to_string_lossy().to_string());

        let a = ShufflePaths::seeded(3).process(source.clone())?.get_paths(DATA_PATH)?;
        let b = ShufflePaths::seeded(3).process(source)?.get_paths(DATA_PATH)?;
        assert_eq!(a, b);
        let mut sorted = a.clone();
        sorted.sort();
        assert_ne!(a, sorted);
        Ok(())
    }

    #[test]
    fn empty_expansion_is_an_error() -> Result<()> {
        let dir = tempfile::tempdir()?;
        files_in(dir.path(), &["notes.txt"])?;
        let source = SourceConfig::new().with(DATA_PATH, dir.path().to_string_lossy().to_string());
        assert!(ExpandPaths::new().with_extension(".csv").process(source).is_err());
        Ok(())
    }
}
