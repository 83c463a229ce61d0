//! Builders for test chunks.

use crate::chunk::Chunk;
use crate::error::ChunkError;
use crate::value::{Column, Value};

/// A fluent builder for chunks.
///
/// # Example
///
/// ```
/// use mldp::testing::ChunkBuilder;
///
/// let chunk = ChunkBuilder::new()
///     .int("id", [1, 2])
///     .str("name", ["a", "b"])
///     .build()
///     .unwrap();
///
/// assert_eq!(chunk.len(), 2);
/// ```
#[derive(Clone, Debug, Default)]
pub struct ChunkBuilder {
    fields: Vec<(String, Column)>,
}

impl ChunkBuilder {
    #[must_use]
    pub const fn new() -> Self {
        Self { fields: Vec::new() }
    }

    #[must_use]
    pub fn column(mut self, name: impl Into<String>, column: Column) -> Self {
        self.fields.push((name.into(), column));
        self
    }

    #[must_use]
    pub fn int(self, name: impl Into<String>, values: impl IntoIterator<Item = i64>) -> Self {
        self.column(name, Column::Int(values.into_iter().collect()))
    }

    #[must_use]
    pub fn float(self, name: impl Into<String>, values: impl IntoIterator<Item = f64>) -> Self {
        self.column(name, Column::Float(values.into_iter().collect()))
    }

    #[must_use]
    pub fn bool(self, name: impl Into<String>, values: impl IntoIterator<Item = bool>) -> Self {
        self.column(name, Column::Bool(values.into_iter().collect()))
    }

    #[must_use]
    pub fn str<S: Into<String>>(self, name: impl Into<String>, values: impl IntoIterator<Item = S>) -> Self {
        self.column(name, Column::Str(values.into_iter().map(Into::into).collect()))
    }

    /// A list field; each inner iterator is one unit's sequence.
    #[must_use]
    pub fn list<I, V>(self, name: impl Into<String>, rows: impl IntoIterator<Item = I>) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        let rows = rows
            .into_iter()
            .map(|row| row.into_iter().map(Into::into).collect())
            .collect();
        self.column(name, Column::List(rows))
    }

    /// # Errors
    /// The fields do not form a valid chunk.
    pub fn build(self) -> Result<Chunk, ChunkError> {
        Chunk::from_fields(self.fields)
    }
}

/// A deterministic chunk of `size` units with ids `start..start + size`.
///
/// Fields: `id` (int), `score` (float), `label` (string) and `tokens` (a list
/// of one to three strings).
#[must_use]
#[allow(clippy::cast_possible_wrap, clippy::cast_precision_loss)]
pub fn generate_chunk(start: usize, size: usize) -> Chunk {
    let ids: Vec<i64> = (start..start + size).map(|i| i as i64).collect();
    let mut chunk = Chunk::new();
    chunk.insert("id", Column::Int(ids.clone()));
    chunk.insert("score", Column::Float(ids.iter().map(|&i| i as f64 / 2.0).collect()));
    chunk.insert(
        "label",
        Column::Str(ids.iter().map(|i| format!("label_{}", i % 3)).collect()),
    );
    chunk.insert(
        "tokens",
        Column::List(
            ids.iter()
                .map(|&i| (0..=i % 3).map(|t| Value::Str(format!("tok{}", i + t))).collect())
                .collect(),
        ),
    );
    chunk
}

/// Cut `chunk` into consecutive pieces of the given sizes. Units beyond the
/// sum of `sizes` are dropped.
#[must_use]
pub fn split_chunk(chunk: &Chunk, sizes: &[usize]) -> Vec<Chunk> {
    let mut start = 0;
    sizes
        .iter()
        .map(|&size| {
            let end = (start + size).min(chunk.len());
            let piece = chunk.slice(start..end);
            start = end;
            piece
        })
        .collect()
}

/// Concatenate chunks that share one field set.
///
/// # Errors
/// Mismatched field sets or incompatible kinds.
pub fn concat_chunks(chunks: &[Chunk]) -> Result<Chunk, ChunkError> {
    let Some((first, rest)) = chunks.split_first() else {
        return Ok(Chunk::new());
    };
    let mut out = first.clone();
    let expected = out.sorted_field_names();
    for chunk in rest {
        let found = chunk.sorted_field_names();
        if found != expected {
            return Err(ChunkError::FieldSetMismatch {
                expected: expected.clone(),
                found,
            });
        }
        for (name, column) in chunk.fields() {
            let target = out.get_mut(name).ok_or_else(|| ChunkError::MissingField(name.to_string()))?;
            target.append(column.clone()).map_err(|source| ChunkError::Kind {
                field: name.to_string(),
                source,
            })?;
        }
    }
    Ok(out)
}
