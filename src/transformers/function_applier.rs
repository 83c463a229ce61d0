use crate::chunk::Chunk;
use crate::describe::{Describe, Signature};
use crate::error::ChunkError;
use crate::step::{Step, Transform};
use crate::value::Column;
use anyhow::{Context, Result};
use std::fmt;
use std::sync::Arc;

/// A whole-column function.
pub type ColumnFn = Arc<dyn Fn(Column) -> Result<Column> + Send + Sync>;

/// Replaces the column of each configured field with `f(column)`.
///
/// ```
/// use mldp::{FunctionApplier, Column};
///
/// let log = FunctionApplier::new().with("sales", |col| match col {
///     Column::Float(v) => Ok(Column::Float(v.into_iter().map(f64::ln).collect())),
///     other => anyhow::bail!("expected floats, got {}", other.kind()),
/// });
/// ```
#[derive(Clone, Default)]
pub struct FunctionApplier {
    funcs: Vec<(String, ColumnFn)>,
    name_prefix: Option<String>,
}

impl FunctionApplier {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply `f` to `field`. Functions run in the order they were added.
    #[must_use]
    pub fn with<F>(mut self, field: impl Into<String>, f: F) -> Self
    where
        F: Fn(Column) -> Result<Column> + Send + Sync + 'static,
    {
        self.funcs.push((field.into(), Arc::new(f)));
        self
    }

    #[must_use]
    pub fn with_name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.name_prefix = Some(prefix.into());
        self
    }
}

impl Transform for FunctionApplier {
    fn transform(&mut self, mut chunk: Chunk) -> Result<Chunk> {
        for (field, f) in &self.funcs {
            let column = chunk
                .get_mut(field)
                .ok_or_else(|| ChunkError::MissingField(field.clone()))?;
            let input = column.take();
            *column = f(input).with_context(|| format!("apply function to field '{field}'"))?;
        }
        Ok(chunk)
    }
}

impl Describe for FunctionApplier {
    fn name(&self) -> String {
        "FunctionApplier".into()
    }

    fn signature(&self) -> Signature {
        self.funcs
            .iter()
            .fold(Signature::new(), |sig, (field, _)| sig.with(field.as_str(), "<fn>"))
    }

    fn name_prefix(&self) -> Option<&str> {
        self.name_prefix.as_deref()
    }
}

impl fmt::Debug for FunctionApplier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let fields: Vec<&str> = self.funcs.iter().map(|(n, _)| n.as_str()).collect();
        f.debug_struct("FunctionApplier").field("fields", &fields).finish()
    }
}

impl From<FunctionApplier> for Step {
    fn from(step: FunctionApplier) -> Self {
        Self::transform(step)
    }
}
