//! The [`Chunk`] data model.
//!
//! A chunk is a bundle of named fields, each holding a [`Column`] of values,
//! where position `i` across all fields forms one data unit. A chunk is
//! *valid* when every column has the same length and every list column is
//! homogeneous; the pipeline checks validity at each component boundary.
//!
//! Field order is kept for display and dumps, but two chunks compare equal
//! when they hold the same columns under the same names in any order.

use crate::error::ChunkError;
use crate::io::compression::auto_detect_writer;
use crate::value::{Column, Value};
use anyhow::{Context, Result};
use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::io::Write;
use std::ops::Range;
use std::path::Path;

/// Per-field cell renderer used by [`Chunk::write`].
pub type CellFormatter = Box<dyn Fn(&Value) -> String + Send + Sync>;

/// Options for writing a chunk as delimited text.
pub struct DumpOptions {
    /// Column separator, tab by default.
    pub delimiter: u8,
    /// Emit a header row with the field names.
    pub header: bool,
    formatters: HashMap<String, CellFormatter>,
}

impl Default for DumpOptions {
    fn default() -> Self {
        Self {
            delimiter: b'\t',
            header: true,
            formatters: HashMap::new(),
        }
    }
}

impl DumpOptions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub const fn with_delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = delimiter;
        self
    }

    #[must_use]
    pub const fn with_header(mut self, header: bool) -> Self {
        self.header = header;
        self
    }

    /// Render the cells of `field` with `f` instead of [`Value`]'s `Display`.
    #[must_use]
    pub fn with_formatter<F>(mut self, field: impl Into<String>, f: F) -> Self
    where
        F: Fn(&Value) -> String + Send + Sync + 'static,
    {
        self.formatters.insert(field.into(), Box::new(f));
        self
    }

    fn render(&self, field: &str, value: &Value) -> String {
        self.formatters
            .get(field)
            .map_or_else(|| value.to_string(), |f| f(value))
    }
}

impl fmt::Debug for DumpOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DumpOptions")
            .field("delimiter", &(self.delimiter as char))
            .field("header", &self.header)
            .field("formatters", &self.formatters.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// A batch of data units stored column-wise.
#[derive(Clone, Debug, Default)]
pub struct Chunk {
    fields: Vec<(String, Column)>,
}

impl Chunk {
    #[must_use]
    pub const fn new() -> Self {
        Self { fields: Vec::new() }
    }

    /// Build a chunk from `(name, column)` pairs and check it is valid.
    ///
    /// # Errors
    /// Returns a [`ChunkError`] if the columns violate the chunk invariants.
    pub fn from_fields<I, K>(fields: I) -> Result<Self, ChunkError>
    where
        I: IntoIterator<Item = (K, Column)>,
        K: Into<String>,
    {
        let mut chunk = Self::new();
        for (name, column) in fields {
            chunk.insert(name, column);
        }
        chunk.validate()?;
        Ok(chunk)
    }

    /// Set `name` to `column`, replacing any previous column in place.
    /// Returns the replaced column.
    pub fn insert(&mut self, name: impl Into<String>, column: Column) -> Option<Column> {
        let name = name.into();
        if let Some((_, slot)) = self.fields.iter_mut().find(|(n, _)| *n == name) {
            return Some(std::mem::replace(slot, column));
        }
        self.fields.push((name, column));
        None
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Column> {
        self.fields.iter().find(|(n, _)| n == name).map(|(_, c)| c)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Column> {
        self.fields
            .iter_mut()
            .find(|(n, _)| n == name)
            .map(|(_, c)| c)
    }

    /// Like [`Chunk::get`], but a missing field is an error.
    ///
    /// # Errors
    /// [`ChunkError::MissingField`] if there is no such field.
    pub fn column(&self, name: &str) -> Result<&Column, ChunkError> {
        self.get(name)
            .ok_or_else(|| ChunkError::MissingField(name.to_string()))
    }

    pub fn remove(&mut self, name: &str) -> Option<Column> {
        let pos = self.fields.iter().position(|(n, _)| n == name)?;
        Some(self.fields.remove(pos).1)
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(n, _)| n.as_str())
    }

    /// Field names in ascending order, for set comparisons.
    #[must_use]
    pub fn sorted_field_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.fields.iter().map(|(n, _)| n.clone()).collect();
        names.sort();
        names
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &Column)> {
        self.fields.iter().map(|(n, c)| (n.as_str(), c))
    }

    #[must_use]
    pub fn into_fields(self) -> Vec<(String, Column)> {
        self.fields
    }

    #[must_use]
    pub fn num_fields(&self) -> usize {
        self.fields.len()
    }

    /// Number of units: the shared length of the columns, 0 when there are
    /// no fields.
    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.first().map_or(0, |(_, c)| c.len())
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Check the chunk invariants.
    ///
    /// # Errors
    /// The first violation found, field by field.
    pub fn validate(&self) -> Result<(), ChunkError> {
        let expected = self.len();
        for (name, column) in &self.fields {
            if column.len() != expected {
                return Err(ChunkError::LengthMismatch {
                    field: name.clone(),
                    expected,
                    found: column.len(),
                });
            }
            column
                .check_homogeneous()
                .map_err(|source| ChunkError::Kind {
                    field: name.clone(),
                    source,
                })?;
        }
        Ok(())
    }

    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.validate().is_ok()
    }

    /// Copy the units in `range` into a new chunk with the same fields.
    ///
    /// # Panics
    /// Panics if `range` exceeds [`Chunk::len`].
    #[must_use]
    pub fn slice(&self, range: Range<usize>) -> Self {
        Self {
            fields: self
                .fields
                .iter()
                .map(|(n, c)| (n.clone(), c.slice(range.clone())))
                .collect(),
        }
    }

    /// Reorder (or subset) units by position.
    ///
    /// # Panics
    /// Panics if an index is out of bounds.
    #[must_use]
    pub fn select(&self, indices: &[usize]) -> Self {
        Self {
            fields: self
                .fields
                .iter()
                .map(|(n, c)| (n.clone(), c.select(indices)))
                .collect(),
        }
    }

    /// The value of every field at unit `index`.
    #[must_use]
    pub fn unit(&self, index: usize) -> Option<Vec<(&str, Value)>> {
        if index >= self.len() {
            return None;
        }
        self.fields
            .iter()
            .map(|(n, c)| c.get(index).map(|v| (n.as_str(), v)))
            .collect()
    }

    /// Iterate over units in order.
    pub fn units(&self) -> impl Iterator<Item = Vec<(&str, Value)>> + '_ {
        (0..self.len()).filter_map(|i| self.unit(i))
    }

    /// Append one unit. An empty chunk adopts the unit's fields; otherwise
    /// the unit must carry exactly the chunk's fields with compatible kinds.
    /// The chunk is left untouched when an error is returned.
    ///
    /// # Errors
    /// [`ChunkError::FieldSetMismatch`] or [`ChunkError::Kind`].
    pub fn append_unit<I, K>(&mut self, unit: I) -> Result<(), ChunkError>
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        let unit: Vec<(String, Value)> = unit.into_iter().map(|(k, v)| (k.into(), v)).collect();

        if self.fields.is_empty() {
            for (name, value) in unit {
                let mut column = Column::with_kind(value.kind());
                column.push(value).map_err(|source| ChunkError::Kind {
                    field: name.clone(),
                    source,
                })?;
                self.fields.push((name, column));
            }
            return self.validate();
        }

        let mut found: Vec<String> = unit.iter().map(|(n, _)| n.clone()).collect();
        found.sort();
        let expected = self.sorted_field_names();
        if found != expected {
            return Err(ChunkError::FieldSetMismatch { expected, found });
        }
        for (name, value) in &unit {
            let column = self.column(name)?;
            if !column.accepts(value) {
                return Err(ChunkError::Kind {
                    field: name.clone(),
                    source: crate::error::KindError {
                        expected: column.kind(),
                        found: value.kind(),
                    },
                });
            }
        }
        for (name, value) in unit {
            if let Some(column) = self.get_mut(&name) {
                column.push(value).map_err(|source| ChunkError::Kind {
                    field: name.clone(),
                    source,
                })?;
            }
        }
        Ok(())
    }

    /// Write the chunk as delimited text, one line per unit. Returns the
    /// number of units written.
    ///
    /// # Errors
    /// Fails if the chunk is invalid or the writer fails.
    pub fn write<W: Write>(&self, writer: W, options: &DumpOptions) -> Result<usize> {
        self.validate().context("refusing to write an invalid chunk")?;
        let mut out = csv::WriterBuilder::new()
            .delimiter(options.delimiter)
            .has_headers(false)
            .from_writer(writer);

        if options.header {
            out.write_record(self.field_names())?;
        }
        for unit in self.units() {
            let record: Vec<String> = unit
                .iter()
                .map(|(name, value)| options.render(name, value))
                .collect();
            out.write_record(&record)?;
        }
        out.flush()?;
        Ok(self.len())
    }

    /// Write the chunk to `path`, creating parent directories. A compression
    /// extension such as `.gz` compresses the output.
    ///
    /// # Errors
    /// Fails on IO errors or if the chunk is invalid.
    pub fn write_to_path(&self, path: impl AsRef<Path>, options: &DumpOptions) -> Result<usize> {
        let path = path.as_ref();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)
                .with_context(|| format!("create parent dirs for {}", path.display()))?;
        }
        let file = fs::File::create(path).with_context(|| format!("create {}", path.display()))?;
        let writer = auto_detect_writer(file, path)?;
        let written = self
            .write(writer, options)
            .with_context(|| format!("write chunk to {}", path.display()))?;
        Ok(written)
    }
}

impl PartialEq for Chunk {
    fn eq(&self, other: &Self) -> bool {
        self.fields.len() == other.fields.len()
            && self
                .fields
                .iter()
                .all(|(name, column)| other.get(name) == Some(column))
    }
}

impl fmt::Display for Chunk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Chunk(size={}, fields=[", self.len())?;
        for (i, (name, column)) in self.fields.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{name}: {}", column.kind())?;
        }
        f.write_str("])")
    }
}
