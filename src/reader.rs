//! Data sources and source preprocessing.
//!
//! A [`Reader`] turns a [`SourceConfig`] into a lazy stream of chunks. The
//! stream is pulled on whichever thread runs reading (the consumer's thread
//! or a reader worker), so it must be `Send`. Every chunk leaving a reader is
//! validated before any step sees it.
//!
//! A [`PreProcessor`] rewrites the source config once per run before the
//! reader sees it (expanding paths, shuffling file order).

use crate::chain::ChunkStream;
use crate::chunk::Chunk;
use crate::config::SourceConfig;
use crate::describe::{Describe, Signature};
use crate::error::{PipelineError, Stage};
use std::fmt;
use std::sync::Arc;

/// Chunks as produced by user reading logic.
pub type ReaderStream = Box<dyn Iterator<Item = anyhow::Result<Chunk>> + Send>;

/// Produces the chunks of one data source.
pub trait Reader: Describe + Send + Sync {
    /// Open the source. Errors here are raised before any worker starts.
    ///
    /// # Errors
    /// Missing or malformed source parameters, unreadable inputs.
    fn read(&self, source: &SourceConfig) -> anyhow::Result<ReaderStream>;
}

/// Rewrites a source config before reading.
pub trait PreProcessor: Describe + Send + Sync {
    /// # Errors
    /// Whatever the rewrite fails on.
    fn process(&self, source: SourceConfig) -> anyhow::Result<SourceConfig>;
}

/// Attach reader attribution and validation to a raw reader stream.
pub(crate) fn validated(reader: String, stream: ReaderStream) -> ChunkStream {
    Box::new(stream.map(move |chunk| {
        let chunk = chunk.map_err(|source| PipelineError::Reader {
            reader: reader.clone(),
            source,
        })?;
        chunk.validate().map_err(|source| PipelineError::Validation {
            component: reader.clone(),
            stage: Stage::Reader,
            source,
        })?;
        Ok(chunk)
    }))
}

/// Replays a fixed list of chunks.
#[derive(Clone, Debug, Default)]
pub struct VecReader {
    chunks: Arc<Vec<Chunk>>,
}

impl VecReader {
    #[must_use]
    pub fn new(chunks: Vec<Chunk>) -> Self {
        Self {
            chunks: Arc::new(chunks),
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }
}

impl Reader for VecReader {
    fn read(&self, _source: &SourceConfig) -> anyhow::Result<ReaderStream> {
        let chunks = Arc::clone(&self.chunks);
        Ok(Box::new(
            (0..chunks.len()).map(move |i| Ok(chunks[i].clone())),
        ))
    }
}

impl Describe for VecReader {
    fn name(&self) -> String {
        "VecReader".into()
    }

    fn signature(&self) -> Signature {
        Signature::new().with("chunks", self.chunks.len())
    }
}

/// A reader backed by a closure.
#[derive(Clone)]
pub struct FnReader<F> {
    name: String,
    f: F,
}

impl<F> FnReader<F>
where
    F: Fn(&SourceConfig) -> anyhow::Result<ReaderStream> + Send + Sync,
{
    pub fn new(name: impl Into<String>, f: F) -> Self {
        Self {
            name: name.into(),
            f,
        }
    }
}

impl<F> Reader for FnReader<F>
where
    F: Fn(&SourceConfig) -> anyhow::Result<ReaderStream> + Send + Sync,
{
    fn read(&self, source: &SourceConfig) -> anyhow::Result<ReaderStream> {
        (self.f)(source)
    }
}

impl<F> Describe for FnReader<F> {
    fn name(&self) -> String {
        self.name.clone()
    }
}

impl<F> fmt::Debug for FnReader<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnReader").field("name", &self.name).finish()
    }
}

/// A preprocessor backed by a closure.
#[derive(Clone)]
pub struct FnPreProcessor<F> {
    name: String,
    f: F,
}

impl<F> FnPreProcessor<F>
where
    F: Fn(SourceConfig) -> anyhow::Result<SourceConfig> + Send + Sync,
{
    pub fn new(name: impl Into<String>, f: F) -> Self {
        Self {
            name: name.into(),
            f,
        }
    }
}

impl<F> PreProcessor for FnPreProcessor<F>
where
    F: Fn(SourceConfig) -> anyhow::Result<SourceConfig> + Send + Sync,
{
    fn process(&self, source: SourceConfig) -> anyhow::Result<SourceConfig> {
        (self.f)(source)
    }
}

impl<F> Describe for FnPreProcessor<F> {
    fn name(&self) -> String {
        self.name.clone()
    }
}

impl<F> fmt::Debug for FnPreProcessor<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnPreProcessor").field("name", &self.name).finish()
    }
}
