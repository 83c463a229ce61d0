//! Field values and homogeneous columns.
//!
//! A [`Column`] is the ordered sequence of values a chunk stores under one
//! field name. Scalar columns are stored unboxed; [`Column::List`] holds one
//! nested sequence per unit (token ids, padded sequences, embeddings) and is
//! homogeneous when every leaf scalar shares one kind.
//!
//! Integer and float data are both numeric: appending floats to an integer
//! column widens it to floats instead of failing.

use crate::error::KindError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Range;

/// The kind of a scalar value or of a whole column.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueKind {
    Bool,
    Int,
    Float,
    Str,
    List,
}

impl ValueKind {
    #[must_use]
    pub const fn is_numeric(self) -> bool {
        matches!(self, Self::Int | Self::Float)
    }

    /// Whether values of `self` and `other` may live in one column.
    #[must_use]
    pub fn compatible_with(self, other: Self) -> bool {
        self == other || (self.is_numeric() && other.is_numeric())
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Bool => "bool",
            Self::Int => "int",
            Self::Float => "float",
            Self::Str => "str",
            Self::List => "list",
        };
        f.write_str(s)
    }
}

/// A single field value of one unit.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<Value>),
}

impl Value {
    #[must_use]
    pub const fn kind(&self) -> ValueKind {
        match self {
            Self::Bool(_) => ValueKind::Bool,
            Self::Int(_) => ValueKind::Int,
            Self::Float(_) => ValueKind::Float,
            Self::Str(_) => ValueKind::Str,
            Self::List(_) => ValueKind::List,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Numeric view; integers are widened.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub const fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int(i) => Some(*i as f64),
            Self::Float(x) => Some(*x),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Self::List(items) => Some(items),
            _ => None,
        }
    }

    /// Visit every scalar reachable from this value, depth first.
    pub fn for_each_leaf(&self, f: &mut impl FnMut(&Value)) {
        match self {
            Self::List(items) => {
                for item in items {
                    item.for_each_leaf(f);
                }
            }
            scalar => f(scalar),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Float(x) => write!(f, "{x}"),
            Self::Str(s) => f.write_str(s),
            Self::List(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str("]")
            }
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Self::Int(i64::from(v))
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::Str(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::Str(v.to_string())
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(v: Vec<T>) -> Self {
        Self::List(v.into_iter().map(Into::into).collect())
    }
}

/// The values a chunk stores under one field name.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Column {
    Bool(Vec<bool>),
    Int(Vec<i64>),
    Float(Vec<f64>),
    Str(Vec<String>),
    List(Vec<Vec<Value>>),
}

impl Column {
    /// An empty column of the given kind.
    #[must_use]
    pub const fn with_kind(kind: ValueKind) -> Self {
        match kind {
            ValueKind::Bool => Self::Bool(Vec::new()),
            ValueKind::Int => Self::Int(Vec::new()),
            ValueKind::Float => Self::Float(Vec::new()),
            ValueKind::Str => Self::Str(Vec::new()),
            ValueKind::List => Self::List(Vec::new()),
        }
    }

    /// Build a column from loose values. An empty input yields an empty
    /// float column.
    ///
    /// # Errors
    /// Returns a [`KindError`] when the values do not share one kind.
    pub fn from_values<I>(values: I) -> Result<Self, KindError>
    where
        I: IntoIterator<Item = Value>,
    {
        let mut values = values.into_iter().peekable();
        let kind = values.peek().map_or(ValueKind::Float, Value::kind);
        let mut column = Self::with_kind(kind);
        for value in values {
            column.push(value)?;
        }
        Ok(column)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Bool(v) => v.len(),
            Self::Int(v) => v.len(),
            Self::Float(v) => v.len(),
            Self::Str(v) => v.len(),
            Self::List(v) => v.len(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub const fn kind(&self) -> ValueKind {
        match self {
            Self::Bool(_) => ValueKind::Bool,
            Self::Int(_) => ValueKind::Int,
            Self::Float(_) => ValueKind::Float,
            Self::Str(_) => ValueKind::Str,
            Self::List(_) => ValueKind::List,
        }
    }

    /// An empty column of the same kind.
    #[must_use]
    pub const fn empty_like(&self) -> Self {
        Self::with_kind(self.kind())
    }

    /// Move the values out, leaving an empty column of the same kind.
    pub fn take(&mut self) -> Self {
        let empty = self.empty_like();
        std::mem::replace(self, empty)
    }

    /// The value of unit `index`.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<Value> {
        match self {
            Self::Bool(v) => v.get(index).map(|x| Value::Bool(*x)),
            Self::Int(v) => v.get(index).map(|x| Value::Int(*x)),
            Self::Float(v) => v.get(index).map(|x| Value::Float(*x)),
            Self::Str(v) => v.get(index).map(|x| Value::Str(x.clone())),
            Self::List(v) => v.get(index).map(|x| Value::List(x.clone())),
        }
    }

    pub fn values(&self) -> impl Iterator<Item = Value> + '_ {
        (0..self.len()).filter_map(|i| self.get(i))
    }

    /// Copy the units in `range`.
    ///
    /// # Panics
    /// Panics if `range` is out of bounds.
    #[must_use]
    pub fn slice(&self, range: Range<usize>) -> Self {
        match self {
            Self::Bool(v) => Self::Bool(v[range].to_vec()),
            Self::Int(v) => Self::Int(v[range].to_vec()),
            Self::Float(v) => Self::Float(v[range].to_vec()),
            Self::Str(v) => Self::Str(v[range].to_vec()),
            Self::List(v) => Self::List(v[range].to_vec()),
        }
    }

    /// Gather the units at `indices`, in that order.
    ///
    /// # Panics
    /// Panics if an index is out of bounds.
    #[must_use]
    pub fn select(&self, indices: &[usize]) -> Self {
        fn gather<T: Clone>(v: &[T], indices: &[usize]) -> Vec<T> {
            indices.iter().map(|&i| v[i].clone()).collect()
        }
        match self {
            Self::Bool(v) => Self::Bool(gather(v, indices)),
            Self::Int(v) => Self::Int(gather(v, indices)),
            Self::Float(v) => Self::Float(gather(v, indices)),
            Self::Str(v) => Self::Str(gather(v, indices)),
            Self::List(v) => Self::List(gather(v, indices)),
        }
    }

    /// Whether `value` may be pushed without breaking homogeneity.
    #[must_use]
    pub fn accepts(&self, value: &Value) -> bool {
        self.kind().compatible_with(value.kind())
    }

    /// Append one value, widening an integer column when a float arrives.
    ///
    /// # Errors
    /// Returns a [`KindError`] if the value's kind does not fit the column.
    #[allow(clippy::cast_precision_loss)]
    pub fn push(&mut self, value: Value) -> Result<(), KindError> {
        if let (Self::Int(_), Value::Float(_)) = (&*self, &value) {
            self.widen_to_float();
        }
        match (self, value) {
            (Self::Bool(v), Value::Bool(x)) => v.push(x),
            (Self::Int(v), Value::Int(x)) => v.push(x),
            (Self::Float(v), Value::Float(x)) => v.push(x),
            (Self::Float(v), Value::Int(x)) => v.push(x as f64),
            (Self::Str(v), Value::Str(x)) => v.push(x),
            (Self::List(v), Value::List(x)) => v.push(x),
            (column, value) => {
                return Err(KindError {
                    expected: column.kind(),
                    found: value.kind(),
                });
            }
        }
        Ok(())
    }

    /// Append all units of `other`.
    ///
    /// # Errors
    /// Returns a [`KindError`] if the two columns hold incompatible kinds.
    #[allow(clippy::cast_precision_loss)]
    pub fn append(&mut self, other: Self) -> Result<(), KindError> {
        if let (Self::Int(_), Self::Float(_)) = (&*self, &other) {
            self.widen_to_float();
        }
        match (self, other) {
            (Self::Bool(a), Self::Bool(b)) => a.extend(b),
            (Self::Int(a), Self::Int(b)) => a.extend(b),
            (Self::Float(a), Self::Float(b)) => a.extend(b),
            (Self::Float(a), Self::Int(b)) => a.extend(b.into_iter().map(|x| x as f64)),
            (Self::Str(a), Self::Str(b)) => a.extend(b),
            (Self::List(a), Self::List(b)) => a.extend(b),
            (a, b) => {
                return Err(KindError {
                    expected: a.kind(),
                    found: b.kind(),
                });
            }
        }
        Ok(())
    }

    /// Convert an integer column to floats in place. Other kinds are untouched.
    #[allow(clippy::cast_precision_loss)]
    pub fn widen_to_float(&mut self) {
        if let Self::Int(v) = self {
            *self = Self::Float(v.iter().map(|&x| x as f64).collect());
        }
    }

    /// Check that nested sequences share one leaf kind. Scalar columns are
    /// homogeneous by construction.
    ///
    /// # Errors
    /// Returns the first pair of conflicting leaf kinds.
    pub fn check_homogeneous(&self) -> Result<(), KindError> {
        let Self::List(units) = self else {
            return Ok(());
        };
        let mut expected: Option<ValueKind> = None;
        let mut conflict: Option<KindError> = None;
        for unit in units {
            for item in unit {
                item.for_each_leaf(&mut |leaf| {
                    if conflict.is_some() {
                        return;
                    }
                    let found = leaf.kind();
                    match expected {
                        None => expected = Some(found),
                        Some(kind) if kind.compatible_with(found) => {}
                        Some(kind) => {
                            conflict = Some(KindError {
                                expected: kind,
                                found,
                            });
                        }
                    }
                });
            }
            if let Some(err) = conflict.take() {
                return Err(err);
            }
        }
        Ok(())
    }
}

impl From<Vec<bool>> for Column {
    fn from(v: Vec<bool>) -> Self {
        Self::Bool(v)
    }
}

impl From<Vec<i64>> for Column {
    fn from(v: Vec<i64>) -> Self {
        Self::Int(v)
    }
}

impl From<Vec<f64>> for Column {
    fn from(v: Vec<f64>) -> Self {
        Self::Float(v)
    }
}

impl From<Vec<String>> for Column {
    fn from(v: Vec<String>) -> Self {
        Self::Str(v)
    }
}

impl From<Vec<&str>> for Column {
    fn from(v: Vec<&str>) -> Self {
        Self::Str(v.into_iter().map(String::from).collect())
    }
}

impl From<Vec<Vec<Value>>> for Column {
    fn from(v: Vec<Vec<Value>>) -> Self {
        Self::List(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_widens_int_column() {
        let mut col = Column::Int(vec![1, 2]);
        col.push(Value::Float(2.5)).unwrap();
        assert_eq!(col, Column::Float(vec![1.0, 2.0, 2.5]));
    }

    #[test]
    fn push_rejects_other_kinds() {
        let mut col = Column::Str(vec!["a".into()]);
        let err = col.push(Value::Int(1)).unwrap_err();
        assert_eq!(err.expected, ValueKind::Str);
        assert_eq!(err.found, ValueKind::Int);
        assert_eq!(col.len(), 1);
    }

    #[test]
    fn append_float_onto_int() {
        let mut col = Column::Int(vec![1]);
        col.append(Column::Float(vec![0.5])).unwrap();
        assert_eq!(col, Column::Float(vec![1.0, 0.5]));
    }

    #[test]
    fn list_leaf_kinds_must_agree() {
        let ok = Column::List(vec![
            vec![Value::Int(1), Value::Float(2.0)],
            vec![Value::List(vec![Value::Int(3)])],
        ]);
        assert!(ok.check_homogeneous().is_ok());

        let bad = Column::List(vec![vec![Value::Int(1)], vec![Value::Str("x".into())]]);
        let err = bad.check_homogeneous().unwrap_err();
        assert_eq!(err.found, ValueKind::Str);
    }

    #[test]
    fn select_and_slice() {
        let col = Column::Str(vec!["a".into(), "b".into(), "c".into()]);
        assert_eq!(col.slice(1..3), Column::from(vec!["b", "c"]));
        assert_eq!(col.select(&[2, 0]), Column::from(vec!["c", "a"]));
    }

    #[test]
    fn untagged_value_from_json() {
        let v: Value = serde_json::from_str("[1, 2.5, \"x\", true]").unwrap();
        assert_eq!(
            v,
            Value::List(vec![
                Value::Int(1),
                Value::Float(2.5),
                Value::Str("x".into()),
                Value::Bool(true)
            ])
        );
        assert_eq!(v.to_string(), "[1, 2.5, x, true]");
    }
}
