//! Lazy composition of steps over a chunk stream.
//!
//! [`StepChain::apply`] wraps an upstream iterator in one adapter per step.
//! Nothing runs until the result is pulled, and pulling one item pulls only
//! the upstream chunks needed to produce it. The same chain is applied on
//! the caller's thread (inline execution) or once per processing worker.

use crate::chunk::Chunk;
use crate::describe::Describe;
use crate::error::{ConfigError, Result};
use crate::step::{Format, Item, Step, Transform, apply_format, apply_transform};

/// A fallible stream of chunks.
pub type ChunkStream = Box<dyn Iterator<Item = Result<Chunk>> + Send>;

/// A fallible stream of pipeline outputs.
pub type ItemStream = Box<dyn Iterator<Item = Result<Item>> + Send>;

/// An ordered list of steps in which a format step, if any, comes last.
#[derive(Clone, Debug, Default)]
pub struct StepChain {
    steps: Vec<Step>,
}

impl StepChain {
    #[must_use]
    pub const fn new() -> Self {
        Self { steps: Vec::new() }
    }

    /// Append a step.
    ///
    /// # Errors
    /// [`ConfigError::StepAfterFormat`] once the chain ends with a format step.
    pub fn push(&mut self, step: Step) -> std::result::Result<(), ConfigError> {
        if let Some(last) = self.steps.last()
            && last.is_format()
        {
            return Err(ConfigError::StepAfterFormat {
                step: step.title(),
                format: last.title(),
            });
        }
        self.steps.push(step);
        Ok(())
    }

    #[must_use]
    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    #[must_use]
    pub fn ends_with_format(&self) -> bool {
        self.steps.last().is_some_and(Step::is_format)
    }

    /// Thread `upstream` through every step.
    #[must_use]
    pub fn apply(self, upstream: ChunkStream) -> ItemStream {
        let mut stream = upstream;
        for step in self.steps {
            match step {
                Step::Transform(step) => stream = Box::new(Transformed { upstream: stream, step }),
                Step::Resize(adjuster) => stream = adjuster.adjust(stream),
                Step::Format(step) => return Box::new(Formatting { upstream: stream, step }),
            }
        }
        Box::new(stream.map(|chunk| chunk.map(Item::Chunk)))
    }
}

struct Transformed {
    upstream: ChunkStream,
    step: Box<dyn Transform>,
}

impl Iterator for Transformed {
    type Item = Result<Chunk>;

    fn next(&mut self) -> Option<Self::Item> {
        let chunk = self.upstream.next()?;
        Some(chunk.and_then(|c| apply_transform(self.step.as_mut(), c)))
    }
}

struct Formatting {
    upstream: ChunkStream,
    step: Box<dyn Format>,
}

impl Iterator for Formatting {
    type Item = Result<Item>;

    fn next(&mut self) -> Option<Self::Item> {
        let chunk = self.upstream.next()?;
        Some(chunk.and_then(|c| apply_format(self.step.as_mut(), c).map(Item::Formatted)))
    }
}
