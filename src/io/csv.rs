//! A chunked CSV reader.
//!
//! [`CsvReader`] reads the `data_path` source parameter (a file, a directory,
//! a glob pattern, or a list of those), keeps the files whose name ends with
//! the configured extension (`.csv` by default, compressed variants like
//! `.csv.gz` included) and yields chunks of at most `chunk_size` rows per
//! file; the last chunk of a file may be smaller.
//!
//! Column kinds are inferred per chunk from the raw cells:
//!
//! - all cells parse as integers: [`Column::Int`]
//! - all cells are `true`/`false` in any case: [`Column::Bool`]
//! - all non-empty cells parse as floats: [`Column::Float`], empty cells
//!   becoming `NaN`
//! - otherwise [`Column::Str`]
//!
//! With `worker_threads > 1` files are read concurrently on a rayon pool
//! and chunks of different files interleave. Each file task pushes its chunks
//! into one bounded queue followed by a termination token; the stream ends
//! once every file has delivered its token.

use crate::chunk::Chunk;
use crate::config::SourceConfig;
use crate::describe::{Describe, Signature};
use crate::error::ConfigError;
use crate::io::compression::{DynRead, auto_detect_reader};
use crate::io::glob::{filter_by_extension, resolve_paths};
use crate::reader::{Reader, ReaderStream};
use crate::value::Column;
use anyhow::{Context, Result, anyhow, bail};
use crossbeam_channel::{Receiver, RecvTimeoutError, bounded};
use csv::StringRecord;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

pub use crate::config::DATA_PATH;

/// Reads CSV files into chunks.
#[derive(Clone, Debug)]
pub struct CsvReader {
    chunk_size: usize,
    worker_threads: usize,
    buffer_size: usize,
    delimiter: u8,
    has_headers: bool,
    extension: String,
    read_timeout: Option<Duration>,
    name_prefix: Option<String>,
}

impl Default for CsvReader {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            worker_threads: 1,
            buffer_size: 5,
            delimiter: b',',
            has_headers: true,
            extension: ".csv".to_string(),
            read_timeout: Some(Duration::from_secs(5)),
            name_prefix: None,
        }
    }
}

fn positive(name: &str, value: usize) -> std::result::Result<usize, ConfigError> {
    if value == 0 {
        return Err(ConfigError::InvalidParameter {
            name: name.to_string(),
            message: "must be a positive integer".to_string(),
        });
    }
    Ok(value)
}

impl CsvReader {
    /// # Errors
    /// `chunk_size` of 0.
    pub fn with_chunk_size(mut self, chunk_size: usize) -> std::result::Result<Self, ConfigError> {
        self.chunk_size = positive("chunk_size", chunk_size)?;
        Ok(self)
    }

    /// # Errors
    /// `worker_threads` of 0.
    pub fn with_worker_threads(mut self, worker_threads: usize) -> std::result::Result<Self, ConfigError> {
        self.worker_threads = positive("worker_threads", worker_threads)?;
        Ok(self)
    }

    /// Capacity of the queue shared by file tasks when reading concurrently.
    ///
    /// # Errors
    /// `buffer_size` of 0.
    pub fn with_buffer_size(mut self, buffer_size: usize) -> std::result::Result<Self, ConfigError> {
        self.buffer_size = positive("buffer_size", buffer_size)?;
        Ok(self)
    }

    #[must_use]
    pub const fn with_delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = delimiter;
        self
    }

    /// Without headers, fields are named by position: `"0"`, `"1"`, ...
    #[must_use]
    pub const fn with_headers(mut self, has_headers: bool) -> Self {
        self.has_headers = has_headers;
        self
    }

    #[must_use]
    pub fn with_extension(mut self, extension: impl Into<String>) -> Self {
        self.extension = extension.into();
        self
    }

    /// Longest wait for the next chunk when reading concurrently; `None`
    /// waits forever.
    #[must_use]
    pub const fn with_read_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.read_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.name_prefix = Some(prefix.into());
        self
    }

    #[must_use]
    pub const fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// The files a source config resolves to.
    ///
    /// # Errors
    /// Bad `data_path` values or no matching files.
    pub fn files(&self, source: &SourceConfig) -> Result<Vec<PathBuf>> {
        let entries = source.get_paths(DATA_PATH)?;
        let files = filter_by_extension(resolve_paths(&entries)?, &self.extension);
        if files.is_empty() {
            bail!(
                "no valid files to open in {entries:?}; files without the {} extension are ignored",
                self.extension
            );
        }
        Ok(files)
    }

    fn open(&self, path: &Path) -> Result<CsvChunks> {
        let file = File::open(path).with_context(|| format!("open {}", path.display()))?;
        let input = auto_detect_reader(file, path)
            .with_context(|| format!("setup decompression for {}", path.display()))?;
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(self.has_headers)
            .delimiter(self.delimiter)
            .from_reader(input);
        let headers = if self.has_headers {
            let row = reader
                .headers()
                .with_context(|| format!("read header of {}", path.display()))?;
            Some(row.iter().map(String::from).collect())
        } else {
            None
        };
        Ok(CsvChunks {
            path: path.to_path_buf(),
            records: reader.into_records(),
            headers,
            chunk_size: self.chunk_size,
            row: 0,
            done: false,
        })
    }

    fn sequential(&self, files: Vec<PathBuf>) -> ReaderStream {
        let this = self.clone();
        Box::new(files.into_iter().flat_map(move |path| {
            let chunks: Box<dyn Iterator<Item = Result<Chunk>> + Send> = match this.open(&path) {
                Ok(chunks) => Box::new(chunks),
                Err(e) => Box::new(std::iter::once(Err(e))),
            };
            chunks
        }))
    }

    fn concurrent(&self, files: Vec<PathBuf>) -> Result<ReaderStream> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.worker_threads)
            .thread_name(|i| format!("mldp-csv-{i}"))
            .build()
            .context("build csv reader thread pool")?;
        let (tx, rx) = bounded::<FileEvent>(self.buffer_size);

        let expected = files.len();
        for path in files {
            let tx = tx.clone();
            let this = self.clone();
            pool.spawn(move || {
                let chunks = match this.open(&path) {
                    Ok(chunks) => chunks,
                    Err(e) => {
                        let _ = tx.send(FileEvent::Failed(e));
                        return;
                    }
                };
                for chunk in chunks {
                    let event = match chunk {
                        Ok(chunk) => FileEvent::Chunk(chunk),
                        Err(e) => {
                            let _ = tx.send(FileEvent::Failed(e));
                            return;
                        }
                    };
                    if tx.send(event).is_err() {
                        return;
                    }
                }
                debug!(file = %path.display(), "file read");
                let _ = tx.send(FileEvent::Done);
            });
        }

        Ok(Box::new(ConcurrentChunks {
            queue: rx,
            _pool: pool,
            expected,
            received: 0,
            timeout: self.read_timeout,
            finished: false,
        }))
    }
}

impl Reader for CsvReader {
    fn read(&self, source: &SourceConfig) -> Result<ReaderStream> {
        let files = self.files(source)?;
        debug!(files = files.len(), threads = self.worker_threads, "reading csv");
        if self.worker_threads > 1 {
            self.concurrent(files)
        } else {
            Ok(self.sequential(files))
        }
    }
}

impl Describe for CsvReader {
    fn name(&self) -> String {
        "CsvReader".into()
    }

    fn signature(&self) -> Signature {
        let mut sig = Signature::new()
            .with("chunk_size", self.chunk_size)
            .with("worker_threads", self.worker_threads);
        if self.worker_threads > 1 {
            sig.push("buffer_size", self.buffer_size);
        }
        sig.push("delimiter", (self.delimiter as char).escape_default());
        sig.push("extension", &self.extension);
        sig
    }

    fn name_prefix(&self) -> Option<&str> {
        self.name_prefix.as_deref()
    }
}

/// Chunks of one file.
struct CsvChunks {
    path: PathBuf,
    records: csv::StringRecordsIntoIter<DynRead>,
    headers: Option<Vec<String>>,
    chunk_size: usize,
    row: usize,
    done: bool,
}

impl Iterator for CsvChunks {
    type Item = Result<Chunk>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let mut rows: Vec<StringRecord> = Vec::with_capacity(self.chunk_size);
        while rows.len() < self.chunk_size {
            match self.records.next() {
                Some(Ok(record)) => rows.push(record),
                Some(Err(e)) => {
                    self.done = true;
                    let row = self.row + rows.len() + 1;
                    return Some(Err(anyhow::Error::new(e)
                        .context(format!("parse row {row} of {}", self.path.display()))));
                }
                None => {
                    self.done = true;
                    break;
                }
            }
        }
        if rows.is_empty() {
            return None;
        }
        self.row += rows.len();

        let headers = self
            .headers
            .get_or_insert_with(|| (0..rows[0].len()).map(|i| i.to_string()).collect());
        let mut chunk = Chunk::new();
        for (i, name) in headers.iter().enumerate() {
            let cells: Vec<&str> = rows.iter().map(|r| r.get(i).unwrap_or("")).collect();
            chunk.insert(name.clone(), infer_column(&cells));
        }
        Some(Ok(chunk))
    }
}

/// Pick the narrowest column kind that fits every cell.
#[must_use]
pub fn infer_column(cells: &[&str]) -> Column {
    if !cells.is_empty() && cells.iter().all(|c| c.parse::<i64>().is_ok()) {
        return Column::Int(cells.iter().filter_map(|c| c.parse().ok()).collect());
    }
    if !cells.is_empty() && cells.iter().all(|c| parse_bool(c).is_some()) {
        return Column::Bool(cells.iter().filter_map(|c| parse_bool(c)).collect());
    }
    let any_value = cells.iter().any(|c| !c.is_empty());
    if any_value && cells.iter().all(|c| c.is_empty() || c.parse::<f64>().is_ok()) {
        return Column::Float(
            cells
                .iter()
                .map(|c| c.parse().unwrap_or(f64::NAN))
                .collect(),
        );
    }
    Column::Str(cells.iter().map(|c| (*c).to_string()).collect())
}

fn parse_bool(cell: &str) -> Option<bool> {
    if cell.eq_ignore_ascii_case("true") {
        Some(true)
    } else if cell.eq_ignore_ascii_case("false") {
        Some(false)
    } else {
        None
    }
}

enum FileEvent {
    Chunk(Chunk),
    Failed(anyhow::Error),
    Done,
}

/// Merges the chunk queue filled by concurrent file tasks.
struct ConcurrentChunks {
    queue: Receiver<FileEvent>,
    _pool: rayon::ThreadPool,
    expected: usize,
    received: usize,
    timeout: Option<Duration>,
    finished: bool,
}

impl ConcurrentChunks {
    fn fail(&mut self, e: anyhow::Error) -> Option<Result<Chunk>> {
        self.finished = true;
        Some(Err(e))
    }
}

impl Iterator for ConcurrentChunks {
    type Item = Result<Chunk>;

    fn next(&mut self) -> Option<Self::Item> {
        while !self.finished {
            let event = match self.timeout {
                Some(timeout) => self.queue.recv_timeout(timeout),
                None => self
                    .queue
                    .recv()
                    .map_err(|_| RecvTimeoutError::Disconnected),
            };
            match event {
                Ok(FileEvent::Chunk(chunk)) => return Some(Ok(chunk)),
                Ok(FileEvent::Failed(e)) => return self.fail(e),
                Ok(FileEvent::Done) => {
                    self.received += 1;
                    if self.received == self.expected {
                        self.finished = true;
                    }
                }
                Err(RecvTimeoutError::Timeout) => {
                    let waited = self.timeout.unwrap_or_default();
                    return self.fail(anyhow!("no chunk arrived from the file readers within {waited:?}"));
                }
                Err(RecvTimeoutError::Disconnected) => {
                    let (received, expected) = (self.received, self.expected);
                    return self.fail(anyhow!(
                        "file readers stopped after {received} of {expected} files"
                    ));
                }
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn infers_kinds() {
        assert_eq!(infer_column(&["1", "-2"]), Column::Int(vec![1, -2]));
        assert_eq!(infer_column(&["True", "false"]), Column::Bool(vec![true, false]));
        assert_eq!(infer_column(&["a", "1"]), Column::from(vec!["a", "1"]));
        assert_eq!(infer_column(&["", ""]), Column::from(vec!["", ""]));

        let Column::Float(v) = infer_column(&["1.5", "", "2"]) else {
            panic!("expected floats");
        };
        assert_eq!(v[0], 1.5);
        assert!(v[1].is_nan());
        assert_eq!(v[2], 2.0);
    }

    #[test]
    fn zero_chunk_size_rejected() {
        assert!(CsvReader::default().with_chunk_size(0).is_err());
        assert!(CsvReader::default().with_worker_threads(0).is_err());
    }
}
