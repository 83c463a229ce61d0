//! Token vocabularies built from chunk streams.
//!
//! A [`Vocabulary`] maps string tokens to [`Symbol`]s carrying a dense id and
//! a frequency. It is created by scanning fields of a chunk stream (any
//! reader or pipeline run), or loaded from a plain text file with one
//! `{token}{sep}{count}` entry per line.
//!
//! ```
//! use mldp::{Chunk, Column, Vocabulary};
//! # fn main() -> anyhow::Result<()> {
//! let chunk = Chunk::from_fields([("word", Column::from(vec!["a", "b", "a"]))])?;
//! let mut vocab = Vocabulary::new();
//! vocab.create([Ok(chunk)], &["word"])?;
//!
//! assert_eq!(vocab.get("a")?.id, 0);
//! assert_eq!(vocab.get("never seen")?.token, "<UNK>");
//! # Ok(())
//! # }
//! ```

use crate::chunk::Chunk;
use crate::describe::{Describe, Signature};
use crate::io::compression::{auto_detect_reader, auto_detect_writer};
use crate::value::Value;
use anyhow::{Context, Result, anyhow, bail};
use regex::Regex;
use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{BufRead, BufReader, Write};
use std::path::Path;
use std::sync::LazyLock;
use tracing::info;

pub const PAD_TOKEN: &str = "<PAD>";
pub const UNK_TOKEN: &str = "<UNK>";

const DEFAULT_SPECIAL_TOKENS: [&str; 2] = [PAD_TOKEN, UNK_TOKEN];

static SPECIAL_SYMBOL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^<[A-Z]+>").expect("valid special symbol pattern"));

/// Whether `token` looks like a special symbol such as `<PAD>` or `<EOS>`.
#[must_use]
pub fn is_special_symbol(token: &str) -> bool {
    SPECIAL_SYMBOL.is_match(token)
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Symbol {
    pub token: String,
    pub id: usize,
    pub count: u64,
}

/// Maps tokens to ids and counts.
///
/// A fresh vocabulary is empty; special symbols are only added by
/// [`create`](Vocabulary::create) and [`load`](Vocabulary::load).
#[derive(Clone, Debug)]
pub struct Vocabulary {
    min_count: u64,
    max_size: Option<usize>,
    sep: String,
    add_default_special_symbols: bool,
    name_prefix: Option<String>,
    symbols: Vec<Symbol>,
    token_to_id: HashMap<String, usize>,
    special_symbols: Vec<String>,
    total_count: u64,
}

impl Default for Vocabulary {
    fn default() -> Self {
        Self {
            min_count: 1,
            max_size: None,
            sep: " ".to_string(),
            add_default_special_symbols: true,
            name_prefix: None,
            symbols: Vec::new(),
            token_to_id: HashMap::new(),
            special_symbols: Vec::new(),
            total_count: 0,
        }
    }
}

impl Vocabulary {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Tokens seen fewer times are left out.
    #[must_use]
    pub const fn with_min_count(mut self, min_count: u64) -> Self {
        self.min_count = min_count;
        self
    }

    /// Cap on regular symbols; default special symbols come on top.
    #[must_use]
    pub const fn with_max_size(mut self, max_size: usize) -> Self {
        self.max_size = Some(max_size);
        self
    }

    #[must_use]
    pub fn with_sep(mut self, sep: impl Into<String>) -> Self {
        self.sep = sep.into();
        self
    }

    #[must_use]
    pub const fn with_default_special_symbols(mut self, add: bool) -> Self {
        self.add_default_special_symbols = add;
        self
    }

    #[must_use]
    pub fn with_name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.name_prefix = Some(prefix.into());
        self
    }

    /// Count the tokens of `field_names` over `chunks` and populate the
    /// vocabulary, most frequent first.
    ///
    /// List values are flattened, numbers are stringified and empty strings
    /// are skipped.
    ///
    /// # Errors
    /// A failed chunk, a missing field, or a boolean token.
    pub fn create<I, S>(&mut self, chunks: I, field_names: &[S]) -> Result<()>
    where
        I: IntoIterator<Item = Result<Chunk>>,
        S: AsRef<str>,
    {
        if field_names.is_empty() {
            bail!("a vocabulary needs at least one field to count tokens from");
        }
        let names: Vec<&str> = field_names.iter().map(AsRef::as_ref).collect();
        info!(fields = ?names, "creating vocabulary");

        let mut counts: HashMap<String, u64> = HashMap::new();
        for chunk in chunks {
            let chunk = chunk?;
            for name in &names {
                count_tokens(chunk.column(name)?.values(), &mut counts)?;
            }
        }

        let mut entries: Vec<(String, u64)> = counts.into_iter().collect();
        entries.sort_by(|(ta, ca), (tb, cb)| cb.cmp(ca).then_with(|| ta.cmp(tb)));
        for (token, count) in entries {
            if self.max_size.is_some_and(|max| self.len() >= max) {
                break;
            }
            if count >= self.min_count {
                self.add_symbol(&token, count);
            }
        }
        if self.add_default_special_symbols {
            self.add_default_specials();
        }
        Ok(())
    }

    /// Read entries from a `{token}{sep}{count}` file; compressed files are
    /// detected by extension.
    ///
    /// # Errors
    /// An unreadable file or a malformed line.
    pub fn load(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let file = File::open(path).with_context(|| format!("opening vocabulary {}", path.display()))?;
        let reader = BufReader::new(auto_detect_reader(file, path)?);

        for (lineno, line) in reader.lines().enumerate() {
            if self.max_size.is_some_and(|max| lineno >= max) {
                break;
            }
            let line = line?;
            let entry = line.trim_end();
            let parts: Vec<&str> = entry.split(self.sep.as_str()).collect();
            let [token, count] = parts.as_slice() else {
                bail!(
                    "{}:{}: expected '{{token}}{}{{count}}', got '{entry}'",
                    path.display(),
                    lineno + 1,
                    self.sep
                );
            };
            let count: u64 = count
                .parse()
                .with_context(|| format!("{}:{}: bad count '{count}'", path.display(), lineno + 1))?;
            if count >= self.min_count {
                self.add_symbol(token, count);
            }
        }
        if self.add_default_special_symbols {
            self.add_default_specials();
        }
        info!(path = %path.display(), size = self.len(), "vocabulary loaded");
        Ok(())
    }

    /// Write every symbol as `{token}{sep}{count}`, skipping the default
    /// special symbols when they are added automatically.
    ///
    /// # Errors
    /// I/O failures.
    pub fn write(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }
        let file = File::create(path).with_context(|| format!("creating {}", path.display()))?;
        let mut out = auto_detect_writer(file, path)?;
        for symbol in &self.symbols {
            if self.add_default_special_symbols && DEFAULT_SPECIAL_TOKENS.contains(&symbol.token.as_str()) {
                continue;
            }
            writeln!(out, "{}{}{}", symbol.token, self.sep, symbol.count)?;
        }
        out.flush()?;
        info!(path = %path.display(), "vocabulary written");
        Ok(())
    }

    /// Load from `path` if it exists, otherwise create from `chunks` and
    /// write the result to `path`.
    ///
    /// # Errors
    /// See [`load`](Self::load), [`create`](Self::create) and
    /// [`write`](Self::write).
    pub fn load_or_create<I, S>(&mut self, path: impl AsRef<Path>, chunks: I, field_names: &[S]) -> Result<()>
    where
        I: IntoIterator<Item = Result<Chunk>>,
        S: AsRef<str>,
    {
        let path = path.as_ref();
        if path.is_file() {
            self.load(path)
        } else {
            self.create(chunks, field_names)?;
            self.write(path)
        }
    }

    /// The symbol of `token`, or `<UNK>` when the token is unknown.
    ///
    /// # Errors
    /// Unknown token and no `<UNK>` symbol.
    pub fn get(&self, token: &str) -> Result<&Symbol> {
        self.symbol(token)
            .or_else(|| self.symbol(UNK_TOKEN))
            .ok_or_else(|| anyhow!("token '{token}' is not in the vocabulary"))
    }

    /// The exact symbol of `token`, without falling back.
    #[must_use]
    pub fn symbol(&self, token: &str) -> Option<&Symbol> {
        self.token_to_id.get(token).map(|&id| &self.symbols[id])
    }

    #[must_use]
    pub fn by_id(&self, id: usize) -> Option<&Symbol> {
        self.symbols.get(id)
    }

    /// Id lookup with the `<UNK>` fallback of [`get`](Self::get).
    ///
    /// # Errors
    /// See [`get`](Self::get).
    pub fn id_of(&self, token: &str) -> Result<usize> {
        self.get(token).map(|s| s.id)
    }

    #[must_use]
    pub fn contains(&self, token: &str) -> bool {
        self.token_to_id.contains_key(token)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Symbol> {
        self.symbols.iter()
    }

    /// Tokens of the special symbols, in the order they were added.
    #[must_use]
    pub fn special_symbols(&self) -> &[String] {
        &self.special_symbols
    }

    #[must_use]
    pub const fn total_count(&self) -> u64 {
        self.total_count
    }

    fn add_symbol(&mut self, token: &str, count: u64) -> usize {
        let id = if let Some(&id) = self.token_to_id.get(token) {
            let symbol = &mut self.symbols[id];
            self.total_count = self.total_count - symbol.count + count;
            symbol.count = count;
            id
        } else {
            let id = self.symbols.len();
            self.symbols.push(Symbol {
                token: token.to_string(),
                id,
                count,
            });
            self.token_to_id.insert(token.to_string(), id);
            self.total_count += count;
            id
        };
        if is_special_symbol(token) && !self.special_symbols.iter().any(|s| s == token) {
            self.special_symbols.push(token.to_string());
        }
        id
    }

    fn add_default_specials(&mut self) {
        for token in DEFAULT_SPECIAL_TOKENS {
            let count = self.symbol(token).map_or(1, |s| s.count);
            self.add_symbol(token, count);
        }
    }
}

fn count_tokens(values: impl Iterator<Item = Value>, counts: &mut HashMap<String, u64>) -> Result<()> {
    let mut failure = None;
    for value in values {
        value.for_each_leaf(&mut |leaf| {
            let token = match leaf {
                Value::Str(s) if s.is_empty() => return,
                Value::Str(s) => s.clone(),
                Value::Int(i) => i.to_string(),
                Value::Float(f) => f.to_string(),
                other => {
                    failure.get_or_insert_with(|| anyhow!("{} values cannot be tokens", other.kind()));
                    return;
                }
            };
            *counts.entry(token).or_insert(0) += 1;
        });
    }
    failure.map_or(Ok(()), Err)
}

impl Describe for Vocabulary {
    fn name(&self) -> String {
        "Vocabulary".into()
    }

    fn signature(&self) -> Signature {
        let mut sig = Signature::new().with("min_count", self.min_count);
        if let Some(max) = self.max_size {
            sig.push("max_size", max);
        }
        sig.with("sep", format!("{:?}", self.sep))
            .with("add_default_special_symbols", self.add_default_special_symbols)
            .with("vocab_size", self.len())
    }

    fn name_prefix(&self) -> Option<&str> {
        self.name_prefix.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Column;

    fn words(tokens: &[&str]) -> Result<Chunk> {
        Ok(Chunk::from_fields([("w", Column::from(tokens.to_vec()))])?)
    }

    #[test]
    fn orders_by_count_then_token() -> Result<()> {
        let mut vocab = Vocabulary::new();
        vocab.create([words(&["b", "a", "c", "c"])], &["w"])?;
        let tokens: Vec<&str> = vocab.iter().map(|s| s.token.as_str()).collect();
        assert_eq!(tokens, ["c", "a", "b", PAD_TOKEN, UNK_TOKEN]);
        assert_eq!(vocab.total_count(), 6);
        Ok(())
    }

    #[test]
    fn max_size_excludes_specials() -> Result<()> {
        let mut vocab = Vocabulary::new().with_max_size(1);
        vocab.create([words(&["x", "y", "y"])], &["w"])?;
        assert_eq!(vocab.len(), 3);
        assert!(vocab.contains("y"));
        assert!(!vocab.contains("x"));
        Ok(())
    }

    #[test]
    fn tracks_special_tokens_in_data() -> Result<()> {
        let mut vocab = Vocabulary::new();
        vocab.create([words(&["<EOS>", "hi"])], &["w"])?;
        assert_eq!(vocab.special_symbols(), ["<EOS>", PAD_TOKEN, UNK_TOKEN]);
        Ok(())
    }

    #[test]
    fn unknown_without_unk_errors() -> Result<()> {
        let mut vocab = Vocabulary::new().with_default_special_symbols(false);
        vocab.create([words(&["a"])], &["w"])?;
        assert!(vocab.get("zzz").is_err());
        assert_eq!(vocab.id_of("a")?, 0);
        Ok(())
    }
}
