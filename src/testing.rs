//! Testing utilities for mldp pipelines.
//!
//! Helpers for writing tests of readers, steps and whole pipelines:
//!
//! - **Builders**: assemble chunks field by field, generate and split them
//! - **Assertions**: compare chunk streams exactly or as multisets of units
//! - **Fixtures**: small ready-made chunks and CSV contents
//! - **Mock I/O**: temporary files and directories that clean up after
//!   themselves
//!
//! # Quick Start
//!
//! ```
//! use mldp::prelude::*;
//! use mldp::testing::*;
//!
//! # fn main() -> anyhow::Result<()> {
//! let chunks = vec![generate_chunk(0, 7), generate_chunk(7, 5)];
//! let mut pipeline = Pipeline::new(VecReader::new(chunks.clone()), PipelineConfig::default())?;
//! pipeline.add_step(ChunkSizeAdjuster::new(4)?)?;
//!
//! let out = collect_chunks(&pipeline, SourceConfig::new())?;
//! assert_chunk_sizes(&out, &[4, 4, 4]);
//! assert_same_units(&out, &chunks);
//! # Ok(())
//! # }
//! ```

pub mod assertions;
pub mod builders;
pub mod fixtures;
pub mod mock_io;

pub use assertions::*;
pub use builders::*;
pub use fixtures::*;
pub use mock_io::*;

use crate::chunk::Chunk;
use crate::config::SourceConfig;
use crate::pipeline::Pipeline;
use anyhow::Result;

/// Run `pipeline` over `source` and collect every chunk it yields.
///
/// # Errors
/// The first error of the run, or a formatted item where a chunk was
/// expected.
pub fn collect_chunks(pipeline: &Pipeline, source: SourceConfig) -> Result<Vec<Chunk>> {
    pipeline.iter(source)?.chunks().collect()
}
