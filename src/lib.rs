//! # mldp
//!
//! A **chunked data processing pipeline** for feeding machine learning models.
//! Data travels in [`Chunk`]s: column-oriented batches of data units. A
//! [`Reader`] produces chunks from a source, a chain of [`Step`]s transforms,
//! re-batches and finally formats them, and a [`Pipeline`] runs the whole
//! thing on the caller's thread or on a small set of worker threads.
//!
//! ## Key Features
//!
//! - **Chunk model** - named columns of equal length, validated at every step
//! - **Step chaining** - transforms, one optional trailing format, and
//!   [`ChunkSizeAdjuster`] re-batching to a fixed chunk size
//! - **Three execution architectures** - inline, one background worker, or a
//!   reader worker feeding `N - 1` processing workers through bounded queues
//! - **Errors that arrive** - worker failures travel to the consumer in-band
//!   and end the run; dropping the iterator early joins every worker
//! - **Batteries** - CSV reader, field selection, shuffling, padding,
//!   vocabularies, record and text formatters
//!
//! ## Quick Start
//!
//! ```
//! use mldp::prelude::*;
//! use mldp::testing::generate_chunk;
//!
//! # fn main() -> anyhow::Result<()> {
//! let reader = VecReader::new(vec![generate_chunk(0, 10), generate_chunk(10, 7)]);
//! let mut pipeline = Pipeline::new(reader, PipelineConfig::default().with_workers(3))?;
//! pipeline
//!     .add_step(FieldsSelector::new(["id", "label"]))?
//!     .add_step(ChunkSizeAdjuster::new(5)?)?;
//!
//! let mut units = 0;
//! for chunk in pipeline.iter(SourceConfig::new())?.chunks() {
//!     units += chunk?.len();
//! }
//! assert_eq!(units, 17);
//! # Ok(())
//! # }
//! ```
//!
//! ## Execution Architectures
//!
//! [`PipelineConfig::worker_count`] picks one of the [`ExecMode`]s:
//!
//! - **0** - reading and every step run lazily on the consumer's thread.
//! - **1** - one worker reads and processes; results pass through an output
//!   queue of `output_buffer_size` items.
//! - **N > 1** - one reader worker fills an input queue of
//!   `input_buffer_size` chunks, `N - 1` processing workers each run their
//!   own copy of the chain and feed the output queue. Chunk order across
//!   workers is not preserved.
//!
//! ## Feature Flags
//!
//! - `io-csv` (default) - [`CsvReader`]
//! - `compression-gzip` (default), `compression-zstd` (default),
//!   `compression-bzip2`, `compression-xz` - transparent (de)compression of
//!   input and output files by extension
//!
//! ## Module Overview
//!
//! - [`chunk`], [`value`] - the data model
//! - [`step`], [`chain`], [`accumulator`] - steps and how they compose
//! - [`pipeline`], [`runner`], [`config`] - running a chain over a reader
//! - [`reader`], [`preprocessors`], [`io`] - data sources
//! - [`transformers`], [`formatters`], [`vocabulary`] - built-in steps
//! - [`describe`], [`metrics`] - setup reports and run statistics
//! - [`testing`] - helpers for tests of pipelines and steps

pub mod accumulator;
pub mod chain;
pub mod chunk;
pub mod config;
pub mod describe;
pub mod error;
pub mod formatters;
pub mod io;
pub mod metrics;
pub mod pipeline;
pub mod preprocessors;
pub mod reader;
pub mod runner;
pub mod step;
pub mod testing;
pub mod transformers;
pub mod utils;
pub mod value;
pub mod vocabulary;

pub use accumulator::{ChunkAccumulator, ChunkSizeAdjuster};
pub use chain::{ChunkStream, ItemStream, StepChain};
pub use chunk::{Chunk, DumpOptions};
pub use config::{DATA_PATH, PipelineConfig, SourceConfig};
pub use describe::{Describe, Signature};
pub use error::{ChunkError, ConfigError, KindError, PipelineError, Stage};
pub use formatters::{Records, RecordsFormatter, TextFormatter};
pub use metrics::MetricsCollector;
pub use pipeline::Pipeline;
pub use preprocessors::{ExpandPaths, ShufflePaths};
pub use reader::{FnPreProcessor, FnReader, PreProcessor, Reader, ReaderStream, VecReader};
pub use runner::{ExecMode, PipelineIter};
pub use step::{Format, Formatted, Item, Step, Transform};
pub use transformers::{FieldsSelector, FunctionApplier, Padder, PaddingMode, Shuffler, VocabMapper};
pub use value::{Column, Value, ValueKind};
pub use vocabulary::{PAD_TOKEN, Symbol, UNK_TOKEN, Vocabulary};

#[cfg(feature = "io-csv")]
pub use io::csv::CsvReader;

/// The types most pipelines need, for a single glob import.
pub mod prelude {
    pub use crate::accumulator::ChunkSizeAdjuster;
    pub use crate::chunk::Chunk;
    pub use crate::config::{PipelineConfig, SourceConfig};
    pub use crate::describe::Describe;
    pub use crate::formatters::{RecordsFormatter, TextFormatter};
    pub use crate::pipeline::Pipeline;
    pub use crate::reader::{FnReader, Reader, VecReader};
    pub use crate::step::{Format, Formatted, Item, Step, Transform};
    pub use crate::transformers::{FieldsSelector, FunctionApplier, Padder, Shuffler, VocabMapper};
    pub use crate::value::{Column, Value};
    pub use crate::vocabulary::Vocabulary;

    #[cfg(feature = "io-csv")]
    pub use crate::io::csv::CsvReader;
}
