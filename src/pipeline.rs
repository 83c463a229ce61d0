//! The [`Pipeline`] entry point.
//!
//! A pipeline owns one reader, an optional preprocessor, an ordered chain of
//! steps and its [`PipelineConfig`]. Each call to [`Pipeline::iter`] starts an
//! independent run over one [`SourceConfig`]:
//!
//! ```no_run
//! use mldp::prelude::*;
//! # fn main() -> anyhow::Result<()> {
//! let reader = CsvReader::default().with_chunk_size(100)?;
//! let mut pipeline = Pipeline::new(reader, PipelineConfig::default().with_workers(3))?;
//! pipeline
//!     .add_step(FieldsSelector::new(["text", "label"]))?
//!     .add_step(ChunkSizeAdjuster::new(32)?)?;
//!
//! for chunk in pipeline.iter(SourceConfig::new().with("data_path", "data/train/"))?.chunks() {
//!     let chunk = chunk?;
//!     assert!(chunk.len() <= 32);
//! }
//! # Ok(())
//! # }
//! ```

use crate::chain::StepChain;
use crate::config::{PipelineConfig, SourceConfig};
use crate::describe::{Describe, Signature, format_report};
use crate::error::{ConfigError, PipelineError, Result};
use crate::metrics::{CHUNKS_READ, MetricsCollector};
use crate::reader::{PreProcessor, Reader, validated};
use crate::runner::{ExecMode, PipelineIter, Runner};
use crate::step::Step;
use std::fmt;
use std::sync::Arc;
use tracing::info;

const SETUP_TITLE: &str = "PIPELINE'S SETUP";

/// A reader, a step chain and an execution architecture.
pub struct Pipeline {
    reader: Arc<dyn Reader>,
    preprocessor: Option<Arc<dyn PreProcessor>>,
    chain: StepChain,
    config: PipelineConfig,
    metrics: Option<MetricsCollector>,
}

impl Pipeline {
    /// # Errors
    /// An invalid `config`.
    pub fn new<R: Reader + 'static>(reader: R, config: PipelineConfig) -> std::result::Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            reader: Arc::new(reader),
            preprocessor: None,
            chain: StepChain::new(),
            config,
            metrics: None,
        })
    }

    #[must_use]
    pub fn with_preprocessor<P: PreProcessor + 'static>(mut self, preprocessor: P) -> Self {
        self.preprocessor = Some(Arc::new(preprocessor));
        self
    }

    /// Record run statistics into `metrics`. The collector is shared, so
    /// keep a clone to read the results.
    #[must_use]
    pub fn with_metrics(mut self, metrics: MetricsCollector) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Append a step to the chain.
    ///
    /// # Errors
    /// [`ConfigError::StepAfterFormat`] once a format step has been added.
    pub fn add_step(&mut self, step: impl Into<Step>) -> std::result::Result<&mut Self, ConfigError> {
        self.chain.push(step.into())?;
        Ok(self)
    }

    #[must_use]
    pub const fn config(&self) -> &PipelineConfig {
        &self.config
    }

    #[must_use]
    pub const fn exec_mode(&self) -> ExecMode {
        self.config.exec_mode()
    }

    #[must_use]
    pub fn steps(&self) -> &[Step] {
        self.chain.steps()
    }

    #[must_use]
    pub const fn metrics(&self) -> Option<&MetricsCollector> {
        self.metrics.as_ref()
    }

    /// Start a run over `source`.
    ///
    /// Preprocessing and opening the reader happen here, on the caller's
    /// thread, so their errors are returned directly. Everything after that
    /// surfaces through the returned iterator.
    ///
    /// # Errors
    /// Preprocessor or reader failures, or a worker that could not be spawned.
    pub fn iter(&self, source: SourceConfig) -> Result<PipelineIter> {
        let mode = self.exec_mode();
        info!(
            pipeline = %self.title(),
            ?mode,
            steps = self.chain.len(),
            "starting pipeline run"
        );

        let source = match &self.preprocessor {
            Some(p) => p.process(source).map_err(|source| PipelineError::PreProcessor {
                name: p.title(),
                source,
            })?,
            None => source,
        };
        let reader_name = self.reader.title();
        let raw = self
            .reader
            .read(&source)
            .map_err(|source| PipelineError::Reader {
                reader: reader_name.clone(),
                source,
            })?;

        let mut stream = validated(reader_name, raw);
        if let Some(m) = &self.metrics {
            let m = m.clone();
            stream = Box::new(stream.inspect(move |chunk| {
                if chunk.is_ok() {
                    m.increment_counter(CHUNKS_READ, 1);
                }
            }));
        }

        Runner {
            mode,
            input_buffer_size: self.config.input_buffer_size,
            output_buffer_size: self.config.output_buffer_size,
            output_timeout: self.config.output_timeout(),
            name: self
                .config
                .name_prefix
                .clone()
                .unwrap_or_else(|| "mldp".to_string()),
            metrics: self.metrics.clone(),
        }
        .run(stream, self.chain.clone())
    }

    /// The setup report: configuration, then reader, preprocessor and steps.
    #[must_use]
    pub fn describe(&self) -> String {
        let mut children = vec![(self.reader.title(), self.reader.signature())];
        if let Some(p) = &self.preprocessor {
            children.push((p.title(), p.signature()));
        }
        children.extend(self.chain.steps().iter().map(|s| (s.title(), s.signature())));
        format_report(&self.title(), &self.signature(), &children)
    }
}

impl Describe for Pipeline {
    fn name(&self) -> String {
        SETUP_TITLE.into()
    }

    fn name_prefix(&self) -> Option<&str> {
        self.config.name_prefix.as_deref()
    }

    /// Buffer sizes appear only for the architectures that use them.
    fn signature(&self) -> Signature {
        let mut sig = Signature::new()
            .with("reader", self.reader.title())
            .with("worker_count", self.config.worker_count);
        if self.config.worker_count > 1 {
            sig.push("input_buffer_size", self.config.input_buffer_size);
        }
        if self.config.worker_count >= 1 {
            sig.push("output_buffer_size", self.config.output_buffer_size);
        }
        if let Some(timeout) = self.config.output_timeout() {
            sig.push("output_timeout", format!("{timeout:?}"));
        }
        if let Some(p) = &self.preprocessor {
            sig.push("preprocessor", p.title());
        }
        sig
    }
}

impl fmt::Display for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.describe())
    }
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("reader", &self.reader.title())
            .field("steps", &self.chain.steps())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
