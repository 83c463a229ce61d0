use crate::chunk::Chunk;
use crate::describe::{Describe, Signature, list_repr};
use crate::error::{ChunkError, KindError};
use crate::step::{Step, Transform};
use crate::value::{Column, Value, ValueKind};
use crate::vocabulary::Vocabulary;
use anyhow::{Result, bail};
use std::sync::Arc;

/// Replaces string tokens with vocabulary ids.
///
/// String fields become integer fields; list fields keep their nesting with
/// every token replaced. Vocabularies are shared read-only between fan-out
/// copies of the step.
#[derive(Clone, Debug, Default)]
pub struct VocabMapper {
    fields: Vec<(String, Arc<Vocabulary>)>,
    name_prefix: Option<String>,
}

impl VocabMapper {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Map `field` through `vocab`.
    #[must_use]
    pub fn with(mut self, field: impl Into<String>, vocab: Arc<Vocabulary>) -> Self {
        self.fields.push((field.into(), vocab));
        self
    }

    #[must_use]
    pub fn with_name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.name_prefix = Some(prefix.into());
        self
    }
}

fn map_value(vocab: &Vocabulary, value: &Value) -> Result<Value> {
    match value {
        Value::Str(token) => Ok(Value::Int(id_value(vocab, token)?)),
        Value::List(items) => items
            .iter()
            .map(|item| map_value(vocab, item))
            .collect::<Result<Vec<_>>>()
            .map(Value::List),
        other => bail!("cannot map a {} value through a vocabulary", other.kind()),
    }
}

fn id_value(vocab: &Vocabulary, token: &str) -> Result<i64> {
    Ok(i64::try_from(vocab.id_of(token)?)?)
}

impl Transform for VocabMapper {
    fn transform(&mut self, mut chunk: Chunk) -> Result<Chunk> {
        for (field, vocab) in &self.fields {
            let column = chunk
                .get_mut(field)
                .ok_or_else(|| ChunkError::MissingField(field.clone()))?;
            *column = match column.take() {
                Column::Str(tokens) => Column::Int(
                    tokens
                        .iter()
                        .map(|t| id_value(vocab, t))
                        .collect::<Result<_>>()?,
                ),
                Column::List(rows) => Column::List(
                    rows.iter()
                        .map(|row| row.iter().map(|v| map_value(vocab, v)).collect::<Result<Vec<_>>>())
                        .collect::<Result<_>>()?,
                ),
                other => {
                    return Err(ChunkError::Kind {
                        field: field.clone(),
                        source: KindError {
                            expected: ValueKind::Str,
                            found: other.kind(),
                        },
                    }
                    .into());
                }
            };
        }
        Ok(chunk)
    }
}

impl Describe for VocabMapper {
    fn name(&self) -> String {
        "VocabMapper".into()
    }

    fn signature(&self) -> Signature {
        let fields = self
            .fields
            .iter()
            .map(|(field, vocab)| format!("{field} -> {}({})", vocab.title(), vocab.len()));
        Signature::new().with("fields", list_repr(fields))
    }

    fn name_prefix(&self) -> Option<&str> {
        self.name_prefix.as_deref()
    }
}

impl From<VocabMapper> for Step {
    fn from(step: VocabMapper) -> Self {
        Self::transform(step)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_scalars_and_sequences() -> Result<()> {
        let source = Chunk::from_fields([("w", Column::from(vec!["a", "b", "a"]))])?;
        let mut vocab = Vocabulary::new();
        vocab.create([Ok(source)], &["w"])?;
        let vocab = Arc::new(vocab);

        let chunk = Chunk::from_fields([
            ("w", Column::from(vec!["b", "zzz"])),
            (
                "seq",
                Column::List(vec![vec![Value::from("a"), Value::from("b")], vec![]]),
            ),
        ])?;
        let mut mapper = VocabMapper::new()
            .with("w", Arc::clone(&vocab))
            .with("seq", vocab);
        let out = mapper.transform(chunk)?;

        assert_eq!(out.get("w"), Some(&Column::Int(vec![1, 3])));
        assert_eq!(
            out.get("seq"),
            Some(&Column::List(vec![vec![Value::Int(0), Value::Int(1)], vec![]]))
        );
        Ok(())
    }
}
