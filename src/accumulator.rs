//! Re-batching a chunk stream into chunks of a fixed size.
//!
//! [`ChunkAccumulator`] buffers slices of incoming chunks until it holds
//! exactly `target_size` units, then concatenates them into one chunk. Each
//! absorb takes `min(missing, remaining)` units at a time, so a large input
//! chunk is split across as many outputs as needed and a small one is merged
//! with its neighbours.
//!
//! [`ChunkSizeAdjuster`] drives an accumulator over a whole stream: every full
//! buffer is yielded as soon as it forms, and the partial remainder is
//! yielded once the upstream ends.
//!
//! ```
//! use mldp::{ChunkSizeAdjuster, Chunk, Column};
//! # fn main() -> anyhow::Result<()> {
//! let chunk = |n: i64| Chunk::from_fields([("x", Column::Int((0..n).collect()))]);
//! let adjuster = ChunkSizeAdjuster::new(4)?;
//! let sizes: Vec<usize> = adjuster
//!     .adjust_chunks(vec![chunk(3)?, chunk(3)?, chunk(2)?])
//!     .map(|c| c.map(|c| c.len()))
//!     .collect::<Result<_, _>>()?;
//! assert_eq!(sizes, vec![4, 4]);
//! # Ok(())
//! # }
//! ```

use crate::chain::ChunkStream;
use crate::chunk::Chunk;
use crate::describe::{Describe, Signature};
use crate::error::{ChunkError, ConfigError, KindError, PipelineError, Result, Stage};
use crate::value::Column;
use std::collections::VecDeque;
use std::ops::Range;

/// Buffers chunk slices until exactly `target_size` units are held.
#[derive(Debug)]
pub struct ChunkAccumulator {
    target_size: usize,
    /// One entry per field, in the order of the first absorbed chunk.
    buffer: Vec<(String, Vec<Column>)>,
    size: usize,
}

impl ChunkAccumulator {
    /// # Errors
    /// [`ConfigError::ZeroTargetSize`] when `target_size` is 0.
    pub fn new(target_size: usize) -> std::result::Result<Self, ConfigError> {
        if target_size == 0 {
            return Err(ConfigError::ZeroTargetSize);
        }
        Ok(Self {
            target_size,
            buffer: Vec::new(),
            size: 0,
        })
    }

    #[must_use]
    pub const fn target_size(&self) -> usize {
        self.target_size
    }

    /// Units currently buffered.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.size
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.size == 0
    }

    #[must_use]
    pub const fn is_full(&self) -> bool {
        self.size == self.target_size
    }

    /// Absorb all units of `chunk`, returning every chunk that filled up on
    /// the way. Leftover units stay buffered.
    ///
    /// # Errors
    /// An invalid or field-less chunk, or one whose field set or value kinds
    /// differ from what is already buffered.
    pub fn absorb(&mut self, chunk: &Chunk) -> std::result::Result<Vec<Chunk>, ChunkError> {
        if chunk.num_fields() == 0 {
            return Err(ChunkError::NoFields);
        }
        chunk.validate()?;
        self.check_compatible(chunk)?;

        let end = chunk.len();
        let mut start = 0;
        let mut full = Vec::new();
        while start < end {
            let missing = self.target_size - self.size;
            let stop = end.min(start + missing);
            self.collect(chunk, start..stop)?;
            start = stop;
            if let Some(out) = self.drain_if_full()? {
                full.push(out);
            }
        }
        Ok(full)
    }

    /// Take the buffer as one chunk if it holds exactly `target_size` units.
    ///
    /// # Errors
    /// Buffered slices that cannot be concatenated into a valid chunk.
    pub fn drain_if_full(&mut self) -> std::result::Result<Option<Chunk>, ChunkError> {
        if self.is_full() {
            self.take().map(Some)
        } else {
            Ok(None)
        }
    }

    /// Take whatever is buffered, full or not. `None` when empty.
    ///
    /// # Errors
    /// Buffered slices that cannot be concatenated into a valid chunk.
    pub fn flush(&mut self) -> std::result::Result<Option<Chunk>, ChunkError> {
        if self.is_empty() {
            Ok(None)
        } else {
            self.take().map(Some)
        }
    }

    fn check_compatible(&self, chunk: &Chunk) -> std::result::Result<(), ChunkError> {
        if self.buffer.is_empty() {
            return Ok(());
        }
        let mut expected: Vec<String> = self.buffer.iter().map(|(n, _)| n.clone()).collect();
        expected.sort();
        let found = chunk.sorted_field_names();
        if expected != found {
            return Err(ChunkError::FieldSetMismatch { expected, found });
        }
        for (name, parts) in &self.buffer {
            let column = chunk.column(name)?;
            if let Some(first) = parts.first()
                && !first.kind().compatible_with(column.kind())
            {
                return Err(ChunkError::Kind {
                    field: name.clone(),
                    source: KindError {
                        expected: first.kind(),
                        found: column.kind(),
                    },
                });
            }
        }
        Ok(())
    }

    fn collect(&mut self, chunk: &Chunk, range: Range<usize>) -> std::result::Result<(), ChunkError> {
        if self.buffer.is_empty() {
            self.buffer = chunk
                .field_names()
                .map(|n| (n.to_string(), Vec::new()))
                .collect();
        }
        for (name, parts) in &mut self.buffer {
            parts.push(chunk.column(name)?.slice(range.clone()));
        }
        self.size += range.len();
        Ok(())
    }

    fn take(&mut self) -> std::result::Result<Chunk, ChunkError> {
        let buffer = std::mem::take(&mut self.buffer);
        self.size = 0;

        let mut chunk = Chunk::new();
        for (name, parts) in buffer {
            let mut parts = parts.into_iter();
            let Some(mut column) = parts.next() else {
                continue;
            };
            for part in parts {
                column.append(part).map_err(|source| ChunkError::Kind {
                    field: name.clone(),
                    source,
                })?;
            }
            chunk.insert(name, column);
        }
        // list parts only agree on the outer kind; their items may still clash
        chunk.validate()?;
        Ok(chunk)
    }
}

/// A step that re-batches the stream into chunks of `new_size` units.
#[derive(Clone, Debug)]
pub struct ChunkSizeAdjuster {
    new_size: usize,
    name_prefix: Option<String>,
}

impl ChunkSizeAdjuster {
    /// # Errors
    /// [`ConfigError::ZeroTargetSize`] when `new_size` is 0.
    pub fn new(new_size: usize) -> std::result::Result<Self, ConfigError> {
        if new_size == 0 {
            return Err(ConfigError::ZeroTargetSize);
        }
        Ok(Self {
            new_size,
            name_prefix: None,
        })
    }

    #[must_use]
    pub fn with_name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.name_prefix = Some(prefix.into());
        self
    }

    #[must_use]
    pub const fn new_size(&self) -> usize {
        self.new_size
    }

    /// Re-batch a pipeline stream. Lazy: upstream chunks are pulled only
    /// when no adjusted chunk is pending.
    #[must_use]
    pub fn adjust(&self, upstream: ChunkStream) -> ChunkStream {
        Box::new(self.resized(upstream))
    }

    /// Re-batch an in-memory sequence of chunks.
    pub fn adjust_chunks<I>(&self, chunks: I) -> impl Iterator<Item = Result<Chunk>> + use<I>
    where
        I: IntoIterator<Item = Chunk>,
    {
        self.resized(chunks.into_iter().map(Ok))
    }

    fn resized<I>(&self, upstream: I) -> Resized<I>
    where
        I: Iterator<Item = Result<Chunk>>,
    {
        Resized {
            upstream,
            // new() rejects 0, so the accumulator target is always valid
            accumulator: ChunkAccumulator {
                target_size: self.new_size,
                buffer: Vec::new(),
                size: 0,
            },
            pending: VecDeque::new(),
            component: self.title(),
            finished: false,
        }
    }
}

impl Describe for ChunkSizeAdjuster {
    fn name(&self) -> String {
        "ChunkSizeAdjuster".into()
    }

    fn signature(&self) -> Signature {
        Signature::new().with("new_size", self.new_size)
    }

    fn name_prefix(&self) -> Option<&str> {
        self.name_prefix.as_deref()
    }
}

struct Resized<I> {
    upstream: I,
    accumulator: ChunkAccumulator,
    pending: VecDeque<Chunk>,
    component: String,
    finished: bool,
}

impl<I> Resized<I> {
    fn fail(&mut self, source: ChunkError) -> Option<Result<Chunk>> {
        self.finished = true;
        Some(Err(PipelineError::Validation {
            component: self.component.clone(),
            stage: Stage::Resize,
            source,
        }))
    }
}

impl<I> Iterator for Resized<I>
where
    I: Iterator<Item = Result<Chunk>>,
{
    type Item = Result<Chunk>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(chunk) = self.pending.pop_front() {
                return Some(Ok(chunk));
            }
            if self.finished {
                return None;
            }
            match self.upstream.next() {
                Some(Ok(chunk)) => match self.accumulator.absorb(&chunk) {
                    Ok(full) => self.pending.extend(full),
                    Err(e) => return self.fail(e),
                },
                Some(Err(e)) => {
                    self.finished = true;
                    return Some(Err(e));
                }
                None => {
                    self.finished = true;
                    return match self.accumulator.flush() {
                        Ok(rest) => rest.map(Ok),
                        Err(e) => self.fail(e),
                    };
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;

    fn ints(name: &str, range: Range<i64>) -> Chunk {
        Chunk::from_fields([(name, Column::Int(range.collect()))]).unwrap()
    }

    fn sizes(target: usize, inputs: &[usize]) -> Vec<usize> {
        let mut start = 0;
        let chunks: Vec<Chunk> = inputs
            .iter()
            .map(|&n| {
                let c = ints("x", start..start + n as i64);
                start += n as i64;
                c
            })
            .collect();
        ChunkSizeAdjuster::new(target)
            .unwrap()
            .adjust_chunks(chunks)
            .map(|c| c.unwrap().len())
            .collect()
    }

    #[test]
    fn merges_small_chunks() {
        assert_eq!(sizes(4, &[3, 3, 2]), vec![4, 4]);
        assert_eq!(sizes(5, &[3, 3, 2]), vec![5, 3]);
    }

    #[test]
    fn splits_large_chunk() {
        assert_eq!(sizes(3, &[10]), vec![3, 3, 3, 1]);
        assert_eq!(sizes(1, &[2, 1]), vec![1, 1, 1]);
    }

    #[test]
    fn preserves_unit_order_for_many_shapes() {
        for target in 1..8 {
            for inputs in [vec![1, 2, 3], vec![7], vec![5, 0, 5], vec![2, 2, 2, 2, 1]] {
                let total: usize = inputs.iter().sum();
                let mut start = 0;
                let chunks: Vec<Chunk> = inputs
                    .iter()
                    .map(|&n| {
                        let c = ints("x", start..start + n as i64);
                        start += n as i64;
                        c
                    })
                    .collect();
                let out: Vec<Chunk> = ChunkSizeAdjuster::new(target)
                    .unwrap()
                    .adjust_chunks(chunks)
                    .collect::<Result<_>>()
                    .unwrap();

                let (last, full) = out.split_last().unwrap();
                assert!(full.iter().all(|c| c.len() == target));
                assert!(last.len() <= target && last.len() > 0);

                let values: Vec<Value> = out
                    .iter()
                    .flat_map(|c| c.get("x").unwrap().values().collect::<Vec<_>>())
                    .collect();
                let expected: Vec<Value> = (0..total as i64).map(Value::Int).collect();
                assert_eq!(values, expected);
            }
        }
    }

    #[test]
    fn zero_target_rejected() {
        assert!(matches!(
            ChunkAccumulator::new(0),
            Err(ConfigError::ZeroTargetSize)
        ));
        assert!(ChunkSizeAdjuster::new(0).is_err());
    }

    #[test]
    fn field_sets_must_match_while_buffering() {
        let mut acc = ChunkAccumulator::new(10).unwrap();
        assert!(acc.absorb(&ints("x", 0..3)).unwrap().is_empty());
        let err = acc.absorb(&ints("y", 0..3)).unwrap_err();
        assert!(matches!(err, ChunkError::FieldSetMismatch { .. }));
        assert_eq!(acc.len(), 3);
    }

    #[test]
    fn fieldless_chunk_rejected() {
        let mut acc = ChunkAccumulator::new(2).unwrap();
        assert_eq!(acc.absorb(&Chunk::new()).unwrap_err(), ChunkError::NoFields);
    }

    #[test]
    fn list_parts_with_clashing_items_fail_the_resize() {
        let lists = |v: Value| Chunk::from_fields([("x", Column::List(vec![vec![v]]))]).unwrap();
        let chunks = vec![lists(Value::Int(1)), lists(Value::from("a"))];

        let out: Vec<Result<Chunk>> = ChunkSizeAdjuster::new(2).unwrap().adjust_chunks(chunks).collect();
        assert_eq!(out.len(), 1);
        assert!(matches!(
            out[0],
            Err(PipelineError::Validation {
                stage: Stage::Resize,
                ..
            })
        ));

        let mut acc = ChunkAccumulator::new(3).unwrap();
        acc.absorb(&lists(Value::Int(1))).unwrap();
        acc.absorb(&lists(Value::from("a"))).unwrap();
        assert!(matches!(acc.flush(), Err(ChunkError::Kind { .. })));
    }

    #[test]
    fn int_and_float_parts_widen() {
        let mut acc = ChunkAccumulator::new(3).unwrap();
        acc.absorb(&ints("x", 0..2)).unwrap();
        let floats = Chunk::from_fields([("x", Column::Float(vec![0.5]))]).unwrap();
        let out = acc.absorb(&floats).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].get("x"), Some(&Column::Float(vec![0.0, 1.0, 0.5])));
        assert!(acc.flush().unwrap().is_none());
    }
}
