use crate::chunk::Chunk;
use crate::describe::{Describe, Signature};
use crate::step::{Step, Transform};
use crate::utils::SplitMix64;
use anyhow::Result;

/// Randomly permutes the units of every chunk.
///
/// Useful to break sequential order before re-batching:
/// reader, `Shuffler`, transforms, [`crate::ChunkSizeAdjuster`], formatter.
///
/// With a seed, every copy of the step (one per processing worker) starts
/// from the same state, so a single-worker run is reproducible.
#[derive(Clone, Debug)]
pub struct Shuffler {
    seed: Option<u64>,
    rng: SplitMix64,
    name_prefix: Option<String>,
}

impl Shuffler {
    #[must_use]
    pub fn new() -> Self {
        Self {
            seed: None,
            rng: SplitMix64::from_entropy(),
            name_prefix: None,
        }
    }

    #[must_use]
    pub const fn seeded(seed: u64) -> Self {
        Self {
            seed: Some(seed),
            rng: SplitMix64::new(seed),
            name_prefix: None,
        }
    }

    #[must_use]
    pub fn with_name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.name_prefix = Some(prefix.into());
        self
    }
}

impl Default for Shuffler {
    fn default() -> Self {
        Self::new()
    }
}

impl Transform for Shuffler {
    fn transform(&mut self, chunk: Chunk) -> Result<Chunk> {
        let order = self.rng.permutation(chunk.len());
        Ok(chunk.select(&order))
    }
}

impl Describe for Shuffler {
    fn name(&self) -> String {
        "Shuffler".into()
    }

    fn signature(&self) -> Signature {
        match self.seed {
            Some(seed) => Signature::new().with("seed", seed),
            None => Signature::new().with("seed", "none"),
        }
    }

    fn name_prefix(&self) -> Option<&str> {
        self.name_prefix.as_deref()
    }
}

impl From<Shuffler> for Step {
    fn from(step: Shuffler) -> Self {
        Self::transform(step)
    }
}
