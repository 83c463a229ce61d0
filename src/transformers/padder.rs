use crate::chunk::Chunk;
use crate::describe::{Describe, Signature, list_repr};
use crate::error::{ChunkError, KindError};
use crate::step::{Step, Transform};
use crate::transformers::derived_field_name;
use crate::value::{Column, Value, ValueKind};
use anyhow::{Result, bail};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Where padding symbols go.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaddingMode {
    Left,
    Right,
    /// Split between both sides; an odd remainder goes to the right.
    #[default]
    Both,
}

impl fmt::Display for PaddingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Left => "left",
            Self::Right => "right",
            Self::Both => "both",
        })
    }
}

/// Pad every sequence to the length of the longest one.
///
/// Returns the padded sequences and a mask per sequence holding `1.0` for
/// real symbols and `0.0` for padding and for occurrences of
/// `symbol_to_mask`.
#[must_use]
pub fn pad_sequences(
    sequences: &[Vec<Value>],
    pad_symbol: &Value,
    symbol_to_mask: Option<&Value>,
    mode: PaddingMode,
) -> (Vec<Vec<Value>>, Vec<Vec<Value>>) {
    let max_len = sequences.iter().map(Vec::len).max().unwrap_or(0);
    let mut padded = Vec::with_capacity(sequences.len());
    let mut masks = Vec::with_capacity(sequences.len());

    for seq in sequences {
        let missing = max_len - seq.len();
        let left = match mode {
            PaddingMode::Left => missing,
            PaddingMode::Right => 0,
            PaddingMode::Both => missing / 2,
        };
        let right = missing - left;

        let mut values = Vec::with_capacity(max_len);
        let mut mask = Vec::with_capacity(max_len);
        values.extend(std::iter::repeat_n(pad_symbol.clone(), left));
        mask.extend(std::iter::repeat_n(Value::Float(0.0), left));
        for symbol in seq {
            let hidden = symbol_to_mask.is_some_and(|m| m == symbol);
            mask.push(Value::Float(if hidden { 0.0 } else { 1.0 }));
            values.push(symbol.clone());
        }
        values.extend(std::iter::repeat_n(pad_symbol.clone(), right));
        mask.extend(std::iter::repeat_n(Value::Float(0.0), right));

        padded.push(values);
        masks.push(mask);
    }
    (padded, masks)
}

/// Pads list fields so all sequences of a chunk share one length, adding a
/// `{field}_{mask_suffix}` mask field for each.
///
/// By default each unit holds one flat sequence. With
/// [`with_nested`](Self::with_nested) each unit holds a list of sequences,
/// which are padded to the longest sequence of that unit; the mask keeps the
/// same nesting.
#[derive(Clone, Debug)]
pub struct Padder {
    field_names: Vec<String>,
    pad_symbol: Value,
    symbol_to_mask: Option<Value>,
    mode: PaddingMode,
    nested: bool,
    mask_suffix: String,
    name_prefix: Option<String>,
}

impl Padder {
    pub fn new<I, S>(field_names: I, pad_symbol: impl Into<Value>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            field_names: field_names.into_iter().map(Into::into).collect(),
            pad_symbol: pad_symbol.into(),
            symbol_to_mask: None,
            mode: PaddingMode::default(),
            nested: false,
            mask_suffix: "mask".to_string(),
            name_prefix: None,
        }
    }

    /// Also mask this symbol inside sequences, e.g. an `<UNK>` id.
    #[must_use]
    pub fn with_symbol_to_mask(mut self, symbol: impl Into<Value>) -> Self {
        self.symbol_to_mask = Some(symbol.into());
        self
    }

    #[must_use]
    pub const fn with_mode(mut self, mode: PaddingMode) -> Self {
        self.mode = mode;
        self
    }

    /// Treat every unit as a list of sequences and pad those.
    #[must_use]
    pub const fn with_nested(mut self, nested: bool) -> Self {
        self.nested = nested;
        self
    }

    #[must_use]
    pub fn with_mask_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.mask_suffix = suffix.into();
        self
    }

    #[must_use]
    pub fn with_name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.name_prefix = Some(prefix.into());
        self
    }

    #[must_use]
    pub fn mask_field_name(&self, field: &str) -> String {
        derived_field_name(field, &self.mask_suffix)
    }

    fn pad(&self, sequences: &[Vec<Value>]) -> (Vec<Vec<Value>>, Vec<Vec<Value>>) {
        pad_sequences(sequences, &self.pad_symbol, self.symbol_to_mask.as_ref(), self.mode)
    }

    fn pad_nested(&self, field: &str, units: &[Vec<Value>]) -> Result<(Vec<Vec<Value>>, Vec<Vec<Value>>)> {
        let mut padded = Vec::with_capacity(units.len());
        let mut masks = Vec::with_capacity(units.len());
        for unit in units {
            let sequences = unit
                .iter()
                .map(|item| match item {
                    Value::List(seq) => Ok(seq.clone()),
                    other => Err(ChunkError::Kind {
                        field: field.to_string(),
                        source: KindError {
                            expected: ValueKind::List,
                            found: other.kind(),
                        },
                    }),
                })
                .collect::<std::result::Result<Vec<_>, _>>()?;
            let (seqs, mask) = self.pad(&sequences);
            padded.push(seqs.into_iter().map(Value::List).collect());
            masks.push(mask.into_iter().map(Value::List).collect());
        }
        Ok((padded, masks))
    }
}

impl Transform for Padder {
    fn transform(&mut self, mut chunk: Chunk) -> Result<Chunk> {
        for field in &self.field_names {
            let column = chunk
                .get(field)
                .ok_or_else(|| ChunkError::MissingField(field.clone()))?;
            let Column::List(sequences) = column else {
                return Err(ChunkError::Kind {
                    field: field.clone(),
                    source: KindError {
                        expected: ValueKind::List,
                        found: column.kind(),
                    },
                }
                .into());
            };
            let (padded, masks) = if self.nested {
                self.pad_nested(field, sequences)?
            } else {
                if sequences.iter().flatten().any(|v| v.kind() == ValueKind::List) {
                    bail!("field '{field}' holds nested sequences; pad them with `with_nested(true)`");
                }
                self.pad(sequences)
            };
            chunk.insert(field.clone(), Column::List(padded));
            chunk.insert(self.mask_field_name(field), Column::List(masks));
        }
        Ok(chunk)
    }
}

impl Describe for Padder {
    fn name(&self) -> String {
        "Padder".into()
    }

    fn signature(&self) -> Signature {
        let mut sig = Signature::new()
            .with("field_names", list_repr(&self.field_names))
            .with("pad_symbol", &self.pad_symbol)
            .with("padding_mode", self.mode)
            .with("nested", self.nested)
            .with("mask_suffix", &self.mask_suffix);
        if let Some(symbol) = &self.symbol_to_mask {
            sig.push("symbol_to_mask", symbol);
        }
        sig
    }

    fn name_prefix(&self) -> Option<&str> {
        self.name_prefix.as_deref()
    }
}

impl From<Padder> for Step {
    fn from(step: Padder) -> Self {
        Self::transform(step)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ints(v: &[i64]) -> Vec<Value> {
        v.iter().copied().map(Value::Int).collect()
    }

    #[test]
    fn both_sides_put_odd_remainder_right() {
        let (padded, mask) = pad_sequences(
            &[ints(&[1]), ints(&[1, 2, 3, 4])],
            &Value::Int(0),
            None,
            PaddingMode::Both,
        );
        assert_eq!(padded[0], ints(&[0, 1, 0, 0]));
        assert_eq!(
            mask[0],
            vec![Value::Float(0.0), Value::Float(1.0), Value::Float(0.0), Value::Float(0.0)]
        );
        assert_eq!(padded[1], ints(&[1, 2, 3, 4]));
    }

    #[test]
    fn nested_units_pad_their_own_sequences() -> Result<()> {
        let seqs = |rows: &[&[i64]]| rows.iter().map(|r| Value::List(ints(r))).collect::<Vec<_>>();
        let chunk = Chunk::from_fields([(
            "x",
            Column::List(vec![seqs(&[&[1], &[2, 3]]), seqs(&[&[4, 5, 6]])]),
        )])?;

        let out = Padder::new(["x"], 0).with_mode(PaddingMode::Right).with_nested(true).transform(chunk)?;
        assert_eq!(
            out.get("x"),
            Some(&Column::List(vec![seqs(&[&[1, 0], &[2, 3]]), seqs(&[&[4, 5, 6]])]))
        );
        let Some(Column::List(masks)) = out.get("x_mask") else {
            panic!("mask field missing");
        };
        assert_eq!(
            masks[0],
            vec![
                Value::List(vec![Value::Float(1.0), Value::Float(0.0)]),
                Value::List(vec![Value::Float(1.0), Value::Float(1.0)]),
            ]
        );

        let flat = Chunk::from_fields([("x", Column::List(vec![ints(&[1, 2])]))])?;
        assert!(Padder::new(["x"], 0).with_nested(true).transform(flat).is_err());
        Ok(())
    }

    #[test]
    fn masks_requested_symbol() {
        let (_, mask) = pad_sequences(
            &[ints(&[5, 9])],
            &Value::Int(0),
            Some(&Value::Int(9)),
            PaddingMode::Left,
        );
        assert_eq!(mask[0], vec![Value::Float(1.0), Value::Float(0.0)]);
    }
}
