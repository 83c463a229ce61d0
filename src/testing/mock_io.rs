//! Temporary files and directories for I/O tests.

use crate::chunk::{Chunk, DumpOptions};
use anyhow::Result;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::{NamedTempFile, TempDir};

/// A temporary file deleted on drop.
pub struct TempFilePath {
    _file: NamedTempFile,
    path: PathBuf,
}

impl TempFilePath {
    /// # Errors
    /// The file cannot be created.
    pub fn new() -> std::io::Result<Self> {
        Self::with_suffix("")
    }

    /// A temporary file whose name ends with `suffix`, e.g. `.csv.gz`.
    ///
    /// # Errors
    /// The file cannot be created.
    pub fn with_suffix(suffix: &str) -> std::io::Result<Self> {
        let file = tempfile::Builder::new().suffix(suffix).tempfile()?;
        let path = file.path().to_path_buf();
        Ok(Self { _file: file, path })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// A temporary directory removed with its contents on drop.
pub struct TempDirPath {
    _dir: TempDir,
    path: PathBuf,
}

impl TempDirPath {
    /// # Errors
    /// The directory cannot be created.
    pub fn new() -> std::io::Result<Self> {
        let dir = TempDir::new()?;
        let path = dir.path().to_path_buf();
        Ok(Self { _dir: dir, path })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The path of `name` inside this directory.
    #[must_use]
    pub fn join(&self, name: impl AsRef<Path>) -> PathBuf {
        self.path.join(name)
    }

    /// The path as a string, ready to be a `data_path` parameter.
    #[must_use]
    pub fn to_param(&self) -> String {
        self.path.to_string_lossy().into_owned()
    }
}

/// Write `contents` to `dir/name` and return the path.
///
/// # Errors
/// I/O failures.
pub fn mock_csv_file(dir: &Path, name: &str, contents: &str) -> std::io::Result<PathBuf> {
    let path = dir.join(name);
    fs::write(&path, contents)?;
    Ok(path)
}

/// Write each chunk to its own `part-NNNN.csv` file in `dir` with a header
/// row and `delimiter`.
///
/// # Errors
/// An invalid chunk or I/O failures.
pub fn write_chunks_as_csv(dir: &Path, chunks: &[Chunk], delimiter: u8) -> Result<Vec<PathBuf>> {
    let options = DumpOptions::new().with_delimiter(delimiter);
    chunks
        .iter()
        .enumerate()
        .map(|(i, chunk)| {
            let path = dir.join(format!("part-{i:04}.csv"));
            chunk.write_to_path(&path, &options)?;
            Ok(path)
        })
        .collect()
}
