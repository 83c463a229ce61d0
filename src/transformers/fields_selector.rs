use crate::chunk::Chunk;
use crate::describe::{Describe, Signature, list_repr};
use crate::error::ChunkError;
use crate::step::{Step, Transform};
use anyhow::Result;

/// Keeps the named fields, in the given order, and drops the rest.
#[derive(Clone, Debug)]
pub struct FieldsSelector {
    field_names: Vec<String>,
    name_prefix: Option<String>,
}

impl FieldsSelector {
    pub fn new<I, S>(field_names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            field_names: field_names.into_iter().map(Into::into).collect(),
            name_prefix: None,
        }
    }

    #[must_use]
    pub fn with_name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.name_prefix = Some(prefix.into());
        self
    }
}

impl Transform for FieldsSelector {
    fn transform(&mut self, mut chunk: Chunk) -> Result<Chunk> {
        let mut selected = Chunk::new();
        for name in &self.field_names {
            let column = chunk
                .remove(name)
                .ok_or_else(|| ChunkError::MissingField(name.clone()))?;
            selected.insert(name.clone(), column);
        }
        Ok(selected)
    }
}

impl Describe for FieldsSelector {
    fn name(&self) -> String {
        "FieldsSelector".into()
    }

    fn signature(&self) -> Signature {
        Signature::new().with("field_names", list_repr(&self.field_names))
    }

    fn name_prefix(&self) -> Option<&str> {
        self.name_prefix.as_deref()
    }
}

impl From<FieldsSelector> for Step {
    fn from(step: FieldsSelector) -> Self {
        Self::transform(step)
    }
}
