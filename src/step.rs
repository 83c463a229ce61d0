//! Processing steps and the items they produce.
//!
//! A pipeline chains three kinds of step:
//!
//! - [`Transform`] - chunk in, chunk out. The input is validated before the
//!   call, the output after it, and a chunk with zero units passes through
//!   untouched.
//! - [`Format`] - chunk in, arbitrary value out. At most one, always last.
//! - [`ChunkSizeAdjuster`] - re-batches the stream into chunks of a fixed
//!   size (see [`crate::accumulator`]).
//!
//! Transforms and formats are cloned once per processing worker, so each
//! worker owns private state (a shuffler's generator, for example).

use crate::accumulator::ChunkSizeAdjuster;
use crate::chunk::Chunk;
use crate::describe::{Describe, Signature};
use crate::error::{ConfigError, PipelineError, Result, Stage};
use std::any::Any;
use std::fmt;

/// Chunk-to-chunk processing.
pub trait Transform: Describe + Send + TransformClone {
    /// Process one valid, non-empty chunk.
    ///
    /// # Errors
    /// Any failure of the step's own logic.
    fn transform(&mut self, chunk: Chunk) -> anyhow::Result<Chunk>;
}

/// Object-safe cloning for boxed transforms.
pub trait TransformClone {
    fn clone_box(&self) -> Box<dyn Transform>;
}

impl<T> TransformClone for T
where
    T: Transform + Clone + 'static,
{
    fn clone_box(&self) -> Box<dyn Transform> {
        Box::new(self.clone())
    }
}

impl Clone for Box<dyn Transform> {
    fn clone(&self) -> Self {
        self.clone_box()
    }
}

/// Chunk-to-output conversion, ending a chain.
pub trait Format: Describe + Send + FormatClone {
    /// Convert one valid chunk.
    ///
    /// # Errors
    /// Any failure of the formatter's own logic.
    fn format(&mut self, chunk: Chunk) -> anyhow::Result<Formatted>;
}

/// Object-safe cloning for boxed formats.
pub trait FormatClone {
    fn clone_box(&self) -> Box<dyn Format>;
}

impl<T> FormatClone for T
where
    T: Format + Clone + 'static,
{
    fn clone_box(&self) -> Box<dyn Format> {
        Box::new(self.clone())
    }
}

impl Clone for Box<dyn Format> {
    fn clone(&self) -> Self {
        self.clone_box()
    }
}

/// Type-erased output of a [`Format`] step.
pub struct Formatted(Box<dyn Any + Send>);

impl Formatted {
    pub fn new<T: Any + Send>(value: T) -> Self {
        Self(Box::new(value))
    }

    #[must_use]
    pub fn is<T: Any>(&self) -> bool {
        self.0.is::<T>()
    }

    #[must_use]
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.0.downcast_ref::<T>()
    }

    /// Recover the concrete value.
    ///
    /// # Errors
    /// Gives `self` back when the value is not a `T`.
    pub fn downcast<T: Any>(self) -> std::result::Result<T, Self> {
        self.0.downcast::<T>().map(|b| *b).map_err(Self)
    }
}

impl fmt::Debug for Formatted {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Formatted(..)")
    }
}

/// What a pipeline yields: chunks, or formatted values when the chain ends
/// with a format step.
#[derive(Debug)]
pub enum Item {
    Chunk(Chunk),
    Formatted(Formatted),
}

impl Item {
    #[must_use]
    pub fn as_chunk(&self) -> Option<&Chunk> {
        match self {
            Self::Chunk(c) => Some(c),
            Self::Formatted(_) => None,
        }
    }

    #[must_use]
    pub fn into_chunk(self) -> Option<Chunk> {
        match self {
            Self::Chunk(c) => Some(c),
            Self::Formatted(_) => None,
        }
    }

    /// The formatted value as a `T`, if that is what this item holds.
    #[must_use]
    pub fn downcast<T: Any>(self) -> Option<T> {
        match self {
            Self::Formatted(f) => f.downcast::<T>().ok(),
            Self::Chunk(_) => None,
        }
    }
}

/// One link of a step chain.
#[derive(Clone)]
pub enum Step {
    Transform(Box<dyn Transform>),
    Format(Box<dyn Format>),
    Resize(ChunkSizeAdjuster),
}

impl Step {
    pub fn transform<T: Transform + 'static>(step: T) -> Self {
        Self::Transform(Box::new(step))
    }

    pub fn format<F: Format + 'static>(step: F) -> Self {
        Self::Format(Box::new(step))
    }

    /// A re-batching step producing chunks of `new_size` units.
    ///
    /// # Errors
    /// [`ConfigError::ZeroTargetSize`] when `new_size` is 0.
    pub fn resize(new_size: usize) -> std::result::Result<Self, ConfigError> {
        ChunkSizeAdjuster::new(new_size).map(Self::Resize)
    }

    #[must_use]
    pub const fn is_format(&self) -> bool {
        matches!(self, Self::Format(_))
    }

    fn describe(&self) -> &dyn Describe {
        match self {
            Self::Transform(t) => t.as_ref(),
            Self::Format(f) => f.as_ref(),
            Self::Resize(r) => r,
        }
    }
}

impl Describe for Step {
    fn name(&self) -> String {
        self.describe().name()
    }

    fn signature(&self) -> Signature {
        self.describe().signature()
    }

    fn title(&self) -> String {
        self.describe().title()
    }
}

impl fmt::Debug for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Step").field(&self.title()).finish()
    }
}

impl From<ChunkSizeAdjuster> for Step {
    fn from(adjuster: ChunkSizeAdjuster) -> Self {
        Self::Resize(adjuster)
    }
}

/// Run one transform with validation on both sides.
pub(crate) fn apply_transform(step: &mut dyn Transform, chunk: Chunk) -> Result<Chunk> {
    chunk
        .validate()
        .map_err(|source| PipelineError::Validation {
            component: step.title(),
            stage: Stage::StepInput,
            source,
        })?;
    if chunk.is_empty() {
        return Ok(chunk);
    }
    let out = step
        .transform(chunk)
        .map_err(|source| PipelineError::Step {
            step: step.title(),
            source,
        })?;
    out.validate().map_err(|source| PipelineError::Validation {
        component: step.title(),
        stage: Stage::StepOutput,
        source,
    })?;
    Ok(out)
}

/// Run one format step on a validated chunk.
pub(crate) fn apply_format(step: &mut dyn Format, chunk: Chunk) -> Result<Formatted> {
    chunk
        .validate()
        .map_err(|source| PipelineError::Validation {
            component: step.title(),
            stage: Stage::StepInput,
            source,
        })?;
    step.format(chunk).map_err(|source| PipelineError::Step {
        step: step.title(),
        source,
    })
}
