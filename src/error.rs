//! Error types for chunk validation, pipeline configuration and execution.
//!
//! Three layers, matching where a failure can first be observed:
//!
//! - [`ChunkError`] - a chunk broke its own invariants (unequal field lengths,
//!   mixed value kinds, unexpected field sets).
//! - [`ConfigError`] - the pipeline or one of its steps was configured wrongly.
//!   These are raised synchronously, before any data is read.
//! - [`PipelineError`] - anything surfaced while iterating a pipeline. It wraps
//!   the two above plus failures raised by user logic (readers, steps,
//!   preprocessors) and by the worker/queue protocol.
//!
//! `PipelineError` is `Send + 'static` so it can travel across the worker
//! queues in place of a chunk.

use crate::value::ValueKind;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Result alias used throughout the execution engine.
pub type Result<T, E = PipelineError> = std::result::Result<T, E>;

/// A value of one kind was found where another kind was required.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("expected {expected} values, found {found}")]
pub struct KindError {
    pub expected: ValueKind,
    pub found: ValueKind,
}

/// Violations of the chunk invariants.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ChunkError {
    #[error("all fields of a chunk must have the same length: '{field}' has {found} units, expected {expected}")]
    LengthMismatch {
        field: String,
        expected: usize,
        found: usize,
    },

    #[error("field '{field}' is not homogeneous: {source}")]
    Kind {
        field: String,
        #[source]
        source: KindError,
    },

    #[error("field '{0}' is not present in the chunk")]
    MissingField(String),

    #[error("chunk has no fields")]
    NoFields,

    #[error("field sets differ: expected {expected:?}, found {found:?}")]
    FieldSetMismatch {
        expected: Vec<String>,
        found: Vec<String>,
    },
}

/// Misconfiguration of a pipeline, step or reader.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("cannot add step '{step}': the chain already ends with the format step '{format}', which must be the last one")]
    StepAfterFormat { step: String, format: String },

    #[error("the target chunk size must be a positive integer")]
    ZeroTargetSize,

    #[error("{name} must be a positive integer")]
    ZeroBufferSize { name: &'static str },

    #[error("{name} must be a positive duration")]
    ZeroTimeout { name: &'static str },

    #[error("invalid parameter '{name}': {message}")]
    InvalidParameter { name: String, message: String },

    #[error("failed to parse the pipeline configuration: {0}")]
    Parse(#[from] serde_json::Error),
}

/// The component boundary at which an invalid chunk was caught.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// A chunk leaving a reader.
    Reader,
    /// A chunk entering a transform or format step.
    StepInput,
    /// A chunk produced by a transform step.
    StepOutput,
    /// A chunk absorbed by a chunk size adjuster.
    Resize,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Reader => "the output of reader",
            Self::StepInput => "the input of step",
            Self::StepOutput => "the output of step",
            Self::Resize => "the input of resize step",
        };
        f.write_str(s)
    }
}

/// Everything that can go wrong while a pipeline is being built or iterated.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("invalid chunk at {stage} '{component}': {source}")]
    Validation {
        component: String,
        stage: Stage,
        #[source]
        source: ChunkError,
    },

    #[error("step '{step}' failed: {source:#}")]
    Step {
        step: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("reader '{reader}' failed: {source:#}")]
    Reader {
        reader: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("preprocessor '{name}' failed: {source:#}")]
    PreProcessor {
        name: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("failed to spawn worker '{worker}': {source}")]
    Spawn {
        worker: String,
        #[source]
        source: std::io::Error,
    },

    #[error("worker '{worker}' panicked: {message}")]
    WorkerPanicked { worker: String, message: String },

    #[error("nothing arrived on the {queue} queue within {timeout:?}")]
    QueueTimeout {
        queue: &'static str,
        timeout: Duration,
    },

    #[error("the {queue} queue closed after {received} of {expected} termination sentinels")]
    Disconnected {
        queue: &'static str,
        received: usize,
        expected: usize,
    },
}

impl PipelineError {
    /// `true` for errors caused by configuration rather than data or workers.
    #[must_use]
    pub const fn is_config(&self) -> bool {
        matches!(self, Self::Config(_))
    }

    /// `true` for chunk invariant violations.
    #[must_use]
    pub const fn is_validation(&self) -> bool {
        matches!(self, Self::Validation { .. })
    }
}
