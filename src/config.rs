//! Pipeline and data source configuration.
//!
//! [`PipelineConfig`] fixes the execution architecture and queue sizes and
//! can be loaded from JSON; missing keys take their defaults.
//! [`SourceConfig`] is the free-form parameter map handed to a reader for one
//! run (for the CSV reader, `data_path` and friends).

use crate::error::ConfigError;
use crate::runner::ExecMode;
use anyhow::{Context, Result, anyhow, bail};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Source parameter holding the paths to read.
pub const DATA_PATH: &str = "data_path";

/// Execution settings of a pipeline.
///
/// `worker_count` selects the architecture: `0` runs everything on the
/// caller's thread, `1` runs reading and processing on one background worker,
/// and `N > 1` runs one reader worker feeding `N - 1` processing workers.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub worker_count: usize,
    /// Capacity of the reader-to-processors queue; used when `worker_count > 1`.
    pub input_buffer_size: usize,
    /// Capacity of the workers-to-consumer queue; used when `worker_count >= 1`.
    pub output_buffer_size: usize,
    /// Give up when the consumer waits longer than this for one item.
    pub output_timeout_ms: Option<u64>,
    pub name_prefix: Option<String>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            worker_count: 0,
            input_buffer_size: 5,
            output_buffer_size: 5,
            output_timeout_ms: None,
            name_prefix: None,
        }
    }
}

impl PipelineConfig {
    /// One worker per CPU: a reader plus `cpus - 1` processors.
    #[must_use]
    pub fn auto() -> Self {
        Self {
            worker_count: num_cpus::get(),
            ..Self::default()
        }
    }

    #[must_use]
    pub const fn with_workers(mut self, worker_count: usize) -> Self {
        self.worker_count = worker_count;
        self
    }

    #[must_use]
    pub const fn with_input_buffer_size(mut self, size: usize) -> Self {
        self.input_buffer_size = size;
        self
    }

    #[must_use]
    pub const fn with_output_buffer_size(mut self, size: usize) -> Self {
        self.output_buffer_size = size;
        self
    }

    /// Bound the consumer's wait on the output queue. Sub-millisecond parts
    /// round up, so only a zero duration is rejected by [`validate`](Self::validate).
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn with_output_timeout(mut self, timeout: Duration) -> Self {
        self.output_timeout_ms = Some(timeout.as_nanos().div_ceil(1_000_000) as u64);
        self
    }

    #[must_use]
    pub fn with_name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.name_prefix = Some(prefix.into());
        self
    }

    #[must_use]
    pub const fn exec_mode(&self) -> ExecMode {
        ExecMode::from_worker_count(self.worker_count)
    }

    #[must_use]
    pub const fn output_timeout(&self) -> Option<Duration> {
        match self.output_timeout_ms {
            Some(ms) => Some(Duration::from_millis(ms)),
            None => None,
        }
    }

    /// Reject buffer sizes of zero where the architecture uses them, and a
    /// zero output timeout.
    ///
    /// # Errors
    /// [`ConfigError::ZeroBufferSize`] naming the offending setting, or
    /// [`ConfigError::ZeroTimeout`].
    pub const fn validate(&self) -> Result<(), ConfigError> {
        if self.worker_count > 1 && self.input_buffer_size == 0 {
            return Err(ConfigError::ZeroBufferSize {
                name: "input_buffer_size",
            });
        }
        if self.worker_count >= 1 && self.output_buffer_size == 0 {
            return Err(ConfigError::ZeroBufferSize {
                name: "output_buffer_size",
            });
        }
        if let Some(0) = self.output_timeout_ms {
            return Err(ConfigError::ZeroTimeout {
                name: "output_timeout_ms",
            });
        }
        Ok(())
    }

    /// Parse and validate a JSON document.
    ///
    /// # Errors
    /// Malformed JSON or an invalid configuration.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load, parse and validate a JSON file.
    ///
    /// # Errors
    /// IO failures, malformed JSON or an invalid configuration.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
        Self::from_json_str(&json).with_context(|| format!("load pipeline config from {}", path.display()))
    }
}

/// Parameters of one data source, keyed by name.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SourceConfig {
    params: Map<String, JsonValue>,
}

impl SourceConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder form of [`SourceConfig::set`].
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<JsonValue>) -> Self {
        self.set(key, value);
        self
    }

    /// Set a parameter, returning the previous value.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<JsonValue>) -> Option<JsonValue> {
        self.params.insert(key.into(), value.into())
    }

    #[must_use]
    pub fn get_value(&self, key: &str) -> Option<&JsonValue> {
        self.params.get(key)
    }

    /// Deserialize a required parameter.
    ///
    /// # Errors
    /// Missing key or a value of the wrong shape.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Result<T> {
        let value = self
            .params
            .get(key)
            .ok_or_else(|| anyhow!("missing source parameter '{key}'"))?;
        serde_json::from_value(value.clone())
            .with_context(|| format!("invalid source parameter '{key}'"))
    }

    /// Deserialize an optional parameter, falling back to `default`.
    ///
    /// # Errors
    /// A present value of the wrong shape.
    pub fn get_or<T: DeserializeOwned>(&self, key: &str, default: T) -> Result<T> {
        if self.params.contains_key(key) {
            self.get(key)
        } else {
            Ok(default)
        }
    }

    /// A path parameter given either as one string or as a list of strings.
    ///
    /// # Errors
    /// Missing key, an empty list, or non-string entries.
    pub fn get_paths(&self, key: &str) -> Result<Vec<String>> {
        let paths = match self.params.get(key) {
            None => bail!("missing source parameter '{key}'"),
            Some(JsonValue::String(s)) => vec![s.clone()],
            Some(JsonValue::Array(items)) => items
                .iter()
                .map(|item| {
                    item.as_str()
                        .map(String::from)
                        .ok_or_else(|| anyhow!("'{key}' must contain only strings, found {item}"))
                })
                .collect::<Result<Vec<_>>>()?,
            Some(other) => bail!("'{key}' must be a string or a list of strings, found {other}"),
        };
        if paths.is_empty() {
            bail!("'{key}' is an empty list");
        }
        Ok(paths)
    }

    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.params.contains_key(key)
    }

    pub fn remove(&mut self, key: &str) -> Option<JsonValue> {
        self.params.remove(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.params.keys().map(String::as_str)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.params.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }
}

impl<K: Into<String>, V: Into<JsonValue>> FromIterator<(K, V)> for SourceConfig {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            params: iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        }
    }
}
