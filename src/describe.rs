//! Human-readable descriptions of pipeline components.
//!
//! Every reader, preprocessor and step implements [`Describe`]: a display
//! name plus a [`Signature`] of its configuration attributes. A pipeline
//! renders those into a boxed setup report:
//!
//! ```text
//! ############################################
//! #          PIPELINE'S SETUP                #
//! ############################################
//!
//!   reader: CsvReader
//!   worker_count: 2
//!
//! ######      FieldsSelector      ############
//!   fields: [text, label]
//! ...
//! ```

use std::fmt;

/// Ordered configuration attributes of a component.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Signature {
    attrs: Vec<(String, String)>,
}

impl Signature {
    #[must_use]
    pub const fn new() -> Self {
        Self { attrs: Vec::new() }
    }

    /// Builder form of [`Signature::push`].
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: impl fmt::Display) -> Self {
        self.push(name, value);
        self
    }

    pub fn push(&mut self, name: impl Into<String>, value: impl fmt::Display) {
        self.attrs.push((name.into(), value.to_string()));
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.attrs.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.attrs.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.attrs.is_empty()
    }
}

/// A component that can describe itself in a setup report.
pub trait Describe {
    /// Display name, usually the type name.
    fn name(&self) -> String;

    /// Configuration attributes worth reporting.
    fn signature(&self) -> Signature {
        Signature::new()
    }

    /// Optional prefix distinguishing several instances of one component.
    fn name_prefix(&self) -> Option<&str> {
        None
    }

    /// `name` with the capitalised prefix in front.
    fn title(&self) -> String {
        format_title(&self.name(), self.name_prefix())
    }
}

/// Join an optional prefix (first letter capitalised) and a title.
#[must_use]
pub fn format_title(title: &str, name_prefix: Option<&str>) -> String {
    match name_prefix.filter(|p| !p.is_empty()) {
        Some(prefix) => format!("{} {title}", capitalize(prefix)),
        None => title.to_string(),
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    chars.next().map_or_else(String::new, |first| {
        first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect()
    })
}

/// Wrap `message` into a three-line box of `#`, padded by `ws_offset`
/// spaces split over both sides.
#[must_use]
pub fn format_big_box(message: &str, ws_offset: usize) -> String {
    let total = message.chars().count() + ws_offset;
    let border = "#".repeat(total + 2);
    let left = ws_offset / 2;
    let right = ws_offset - left;
    format!(
        "\n{border}\n#{}{message}{}#\n{border}\n",
        " ".repeat(left),
        " ".repeat(right)
    )
}

/// Center `message` in a one-line band of `#` that is `box_width` wide.
#[must_use]
pub fn format_small_box(message: &str, ws_offset: usize, box_width: usize) -> String {
    let hashes = box_width.saturating_sub(message.chars().count() + ws_offset);
    let (hash_left, ws_left) = (hashes / 2, ws_offset / 2);
    format!(
        "\n{}{}{message}{}{}",
        "#".repeat(hash_left),
        " ".repeat(ws_left),
        " ".repeat(ws_offset - ws_left),
        "#".repeat(hashes - hash_left)
    )
}

/// One `name: value` line per attribute, indented by `indent` spaces.
#[must_use]
pub fn format_signature_attrs(signature: &Signature, indent: usize) -> String {
    let pad = " ".repeat(indent);
    signature
        .iter()
        .map(|(name, value)| format!("{pad}{name}: {value}\n"))
        .collect()
}

const PARENT_WS_OFFSET: usize = 40;
const CHILD_WS_OFFSET: usize = 6;
const INDENT: usize = 2;

/// A full report: the parent in a big box, each child in a small band of the
/// same width, closed by an empty big box.
#[must_use]
pub fn format_report(title: &str, parent: &Signature, children: &[(String, Signature)]) -> String {
    let mut out = format_big_box(title, PARENT_WS_OFFSET);
    out.push('\n');
    out.push_str(&format_signature_attrs(parent, INDENT));

    let width = title.chars().count() + PARENT_WS_OFFSET + 2;
    for (child_title, attrs) in children {
        out.push_str(&format_small_box(child_title, CHILD_WS_OFFSET, width));
        out.push('\n');
        out.push_str(&format_signature_attrs(attrs, INDENT));
    }
    out.push_str(&format_big_box("", title.chars().count() + PARENT_WS_OFFSET));
    out
}

/// The report of a single component.
pub fn describe(component: &dyn Describe) -> String {
    format_report(&component.title(), &component.signature(), &[])
}

/// Render a list for a signature value: `[a, b, c]`.
pub fn list_repr<I, T>(items: I) -> String
where
    I: IntoIterator<Item = T>,
    T: fmt::Display,
{
    let parts: Vec<String> = items.into_iter().map(|i| i.to_string()).collect();
    format!("[{}]", parts.join(", "))
}
