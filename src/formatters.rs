//! Built-in format steps: the last link of a chain, turning chunks into
//! values for external consumers.

use crate::chunk::{Chunk, DumpOptions};
use crate::describe::{Describe, Signature};
use crate::step::{Format, Formatted, Step};
use anyhow::Result;
use serde_json::{Map, Value as JsonValue};

/// One JSON object per unit, keyed by field name.
pub type Records = Vec<Map<String, JsonValue>>;

/// Formats chunks as [`Records`], the row-oriented shape tabular tools
/// import.
#[derive(Clone, Debug, Default)]
pub struct RecordsFormatter {
    name_prefix: Option<String>,
}

impl RecordsFormatter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.name_prefix = Some(prefix.into());
        self
    }

    /// The records of `chunk`, without the type erasure of [`Format`].
    ///
    /// # Errors
    /// A value that cannot be represented in JSON.
    pub fn records(chunk: &Chunk) -> Result<Records> {
        let mut rows = Vec::with_capacity(chunk.len());
        for unit in chunk.units() {
            let mut row = Map::with_capacity(unit.len());
            for (name, value) in unit {
                row.insert(name.to_string(), serde_json::to_value(value)?);
            }
            rows.push(row);
        }
        Ok(rows)
    }
}

impl Format for RecordsFormatter {
    fn format(&mut self, chunk: Chunk) -> Result<Formatted> {
        Self::records(&chunk).map(Formatted::new)
    }
}

impl Describe for RecordsFormatter {
    fn name(&self) -> String {
        "RecordsFormatter".into()
    }

    fn name_prefix(&self) -> Option<&str> {
        self.name_prefix.as_deref()
    }
}

impl From<RecordsFormatter> for Step {
    fn from(step: RecordsFormatter) -> Self {
        Self::format(step)
    }
}

/// Formats chunks as delimited text (a `String` per chunk).
#[derive(Clone, Debug)]
pub struct TextFormatter {
    delimiter: u8,
    header: bool,
    name_prefix: Option<String>,
}

impl Default for TextFormatter {
    fn default() -> Self {
        let options = DumpOptions::default();
        Self {
            delimiter: options.delimiter,
            header: options.header,
            name_prefix: None,
        }
    }
}

impl TextFormatter {
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

    #[must_use]
    pub fn with_name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.name_prefix = Some(prefix.into());
        self
    }
}

impl Format for TextFormatter {
    fn format(&mut self, chunk: Chunk) -> Result<Formatted> {
        let options = DumpOptions::new()
            .with_delimiter(self.delimiter)
            .with_header(self.header);
        let mut buf = Vec::new();
        chunk.write(&mut buf, &options)?;
        Ok(Formatted::new(String::from_utf8(buf)?))
    }
}

impl Describe for TextFormatter {
    fn name(&self) -> String {
        "TextFormatter".into()
    }

    fn signature(&self) -> Signature {
        Signature::new()
            .with("delimiter", format!("{:?}", self.delimiter as char))
            .with("header", self.header)
    }

    fn name_prefix(&self) -> Option<&str> {
        self.name_prefix.as_deref()
    }
}

impl From<TextFormatter> for Step {
    fn from(step: TextFormatter) -> Self {
        Self::format(step)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Column;
    use serde_json::json;

    fn sample() -> Result<Chunk> {
        Ok(Chunk::from_fields([
            ("id", Column::from(vec![1_i64, 2])),
            ("name", Column::from(vec!["a", "b"])),
        ])?)
    }

    #[test]
    fn records_are_row_objects() -> Result<()> {
        let rows = RecordsFormatter::records(&sample()?)?;
        assert_eq!(rows.len(), 2);
        assert_eq!(JsonValue::Object(rows[1].clone()), json!({"id": 2, "name": "b"}));
        Ok(())
    }

    #[test]
    fn text_has_header_and_rows() -> Result<()> {
        let out = TextFormatter::new()
            .with_delimiter(b',')
            .format(sample()?)?
            .downcast::<String>()
            .map_err(|_| anyhow::anyhow!("not a string"))?;
        assert_eq!(out, "id,name\n1,a\n2,b\n");
        Ok(())
    }
}
