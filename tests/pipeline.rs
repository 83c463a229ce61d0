use anyhow::{Result, bail};
use mldp::metrics::{CHUNKS_READ, SENTINELS_RECEIVED, UNITS_EMITTED, WORKERS_JOINED, WORKERS_SPAWNED};
use mldp::prelude::*;
use mldp::testing::*;
use mldp::{ConfigError, ExecMode, FnPreProcessor, MetricsCollector, PipelineError, ReaderStream, Stage};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::{Duration, Instant};

const WORKER_COUNTS: [usize; 4] = [0, 1, 2, 5];

fn source_chunks() -> Vec<Chunk> {
    vec![
        generate_chunk(0, 7),
        generate_chunk(7, 3),
        generate_chunk(10, 12),
        generate_chunk(22, 1),
    ]
}

fn build(workers: usize, chunks: Vec<Chunk>) -> Result<Pipeline> {
    let mut pipeline = Pipeline::new(VecReader::new(chunks), PipelineConfig::default().with_workers(workers))?;
    pipeline
        .add_step(FieldsSelector::new(["id", "label", "tokens"]))?
        .add_step(FunctionApplier::new().with("id", |col| match col {
            Column::Int(v) => Ok(Column::Int(v.into_iter().map(|x| x * 10).collect())),
            other => bail!("unexpected {}", other.kind()),
        }))?
        .add_step(ChunkSizeAdjuster::new(4)?)?;
    Ok(pipeline)
}

/// Fails on the chunk that holds unit `id`.
#[derive(Clone)]
struct FailOn {
    id: i64,
}

impl Describe for FailOn {
    fn name(&self) -> String {
        "FailOn".into()
    }
}

impl Transform for FailOn {
    fn transform(&mut self, chunk: Chunk) -> Result<Chunk> {
        if matches!(chunk.get("id"), Some(Column::Int(ids)) if ids.contains(&self.id)) {
            bail!("refusing unit {}", self.id);
        }
        Ok(chunk)
    }
}

impl From<FailOn> for Step {
    fn from(step: FailOn) -> Self {
        Self::transform(step)
    }
}

#[derive(Clone)]
struct Panicky;

impl From<Panicky> for Step {
    fn from(step: Panicky) -> Self {
        Self::transform(step)
    }
}

impl Describe for Panicky {
    fn name(&self) -> String {
        "Panicky".into()
    }
}

impl Transform for Panicky {
    fn transform(&mut self, chunk: Chunk) -> Result<Chunk> {
        if chunk.len() == 3 {
            panic!("step blew up");
        }
        Ok(chunk)
    }
}

fn drain(pipeline: &Pipeline) -> Result<(Vec<Chunk>, Vec<PipelineError>)> {
    let mut chunks = Vec::new();
    let mut errors = Vec::new();
    for item in pipeline.iter(SourceConfig::new())? {
        match item {
            Ok(item) => chunks.extend(item.into_chunk()),
            Err(e) => errors.push(e),
        }
    }
    Ok((chunks, errors))
}

#[test]
fn every_architecture_yields_the_same_units() -> Result<()> {
    let expected = collect_chunks(&build(0, source_chunks())?, SourceConfig::new())?;
    assert_chunk_sizes(&expected, &[4, 4, 4, 4, 4, 3]);

    for workers in WORKER_COUNTS {
        let out = collect_chunks(&build(workers, source_chunks())?, SourceConfig::new())?;
        assert_same_units(&out, &expected);
        assert!(out.iter().all(|c| c.len() <= 4 && !c.is_empty()), "workers={workers}");
        if workers <= 1 {
            assert_chunks_equal(&out, &expected);
        }
    }
    Ok(())
}

#[test]
fn exec_mode_follows_worker_count() -> Result<()> {
    assert_eq!(build(0, vec![])?.exec_mode(), ExecMode::Inline);
    assert_eq!(build(1, vec![])?.exec_mode(), ExecMode::Offload);
    assert_eq!(build(5, vec![])?.exec_mode(), ExecMode::FanOut { processors: 4 });
    assert_eq!(ExecMode::FanOut { processors: 4 }.expected_sentinels(), 4);
    Ok(())
}

#[test]
fn empty_reader_terminates_in_every_architecture() -> Result<()> {
    for workers in WORKER_COUNTS {
        let (chunks, errors) = drain(&build(workers, vec![])?)?;
        assert!(chunks.is_empty(), "workers={workers}");
        assert!(errors.is_empty(), "workers={workers}: {errors:?}");
    }
    Ok(())
}

#[test]
fn step_errors_reach_the_consumer() -> Result<()> {
    for workers in WORKER_COUNTS {
        let mut pipeline = build(workers, source_chunks())?;
        pipeline.add_step(FailOn { id: 130 })?;

        let (_, errors) = drain(&pipeline)?;
        assert_eq!(errors.len(), 1, "workers={workers}");
        match &errors[0] {
            PipelineError::Step { step, source } => {
                assert_eq!(step, "FailOn");
                assert!(source.to_string().contains("refusing unit 130"));
            }
            other => panic!("workers={workers}: unexpected error {other}"),
        }
    }
    Ok(())
}

#[test]
fn reader_errors_reach_the_consumer() -> Result<()> {
    let reader = FnReader::new("Flaky", |_: &SourceConfig| -> Result<ReaderStream> {
        Ok(Box::new(
            vec![Ok(generate_chunk(0, 2)), Ok(generate_chunk(2, 2))]
                .into_iter()
                .chain(std::iter::once_with(|| Err(anyhow::anyhow!("disk on fire")))),
        ))
    });
    let reader = Arc::new(reader);

    for workers in WORKER_COUNTS {
        let shared = Arc::clone(&reader);
        let pipeline = Pipeline::new(
            FnReader::new("Flaky", move |src: &SourceConfig| shared.read(src)),
            PipelineConfig::default().with_workers(workers),
        )?;
        let results: Vec<_> = pipeline.iter(SourceConfig::new())?.collect();
        let last = results.last().expect("at least the error");
        assert!(
            matches!(last, Err(PipelineError::Reader { reader, .. }) if reader == "Flaky"),
            "workers={workers}: {last:?}"
        );
        assert_eq!(results.iter().filter(|r| r.is_err()).count(), 1);
    }
    Ok(())
}

#[test]
fn invalid_reader_chunks_are_rejected() -> Result<()> {
    let mut ragged = Chunk::new();
    ragged.insert("a", Column::Int(vec![1, 2]));
    ragged.insert("b", Column::Int(vec![1]));

    for workers in WORKER_COUNTS {
        let pipeline = Pipeline::new(
            VecReader::new(vec![ragged.clone()]),
            PipelineConfig::default().with_workers(workers),
        )?;
        let (_, errors) = drain(&pipeline)?;
        assert!(
            matches!(
                errors.as_slice(),
                [PipelineError::Validation { stage: Stage::Reader, .. }]
            ),
            "workers={workers}: {errors:?}"
        );
    }
    Ok(())
}

#[test]
fn iterator_is_fused_after_an_error() -> Result<()> {
    let mut pipeline = build(2, source_chunks())?;
    pipeline.add_step(FailOn { id: 0 })?;
    let mut iter = pipeline.iter(SourceConfig::new())?;
    while let Some(item) = iter.next() {
        if item.is_err() {
            break;
        }
    }
    assert!(iter.next().is_none());
    Ok(())
}

#[test]
fn worker_panics_are_reported() -> Result<()> {
    for workers in [1, 3] {
        let mut pipeline = Pipeline::new(
            VecReader::new(source_chunks()),
            PipelineConfig::default().with_workers(workers),
        )?;
        pipeline.add_step(Panicky)?;
        let (_, errors) = drain(&pipeline)?;
        assert!(
            matches!(errors.as_slice(), [PipelineError::WorkerPanicked { message, .. }] if message == "step blew up"),
            "workers={workers}: {errors:?}"
        );
    }
    Ok(())
}

#[test]
fn dropping_early_joins_every_worker() -> Result<()> {
    let chunks: Vec<Chunk> = (0..200).map(|i| generate_chunk(i * 5, 5)).collect();
    for workers in [1, 4] {
        let metrics = MetricsCollector::new();
        let pipeline = Pipeline::new(
            VecReader::new(chunks.clone()),
            PipelineConfig::default()
                .with_workers(workers)
                .with_input_buffer_size(1)
                .with_output_buffer_size(1),
        )?
        .with_metrics(metrics.clone());

        let taken: Vec<_> = pipeline.iter(SourceConfig::new())?.take(3).collect();
        assert_eq!(taken.len(), 3);
        assert_eq!(metrics.counter(WORKERS_JOINED), metrics.counter(WORKERS_SPAWNED));
        assert_eq!(metrics.counter(WORKERS_SPAWNED), Some(workers as u64));
    }
    Ok(())
}

#[mark_flaky_tests::flaky]
#[test]
fn slow_producers_hit_the_output_timeout() -> Result<()> {
    for workers in [1, 2] {
        let reader = FnReader::new("Stuck", |_: &SourceConfig| -> Result<ReaderStream> {
            let mut pulled = false;
            Ok(Box::new(std::iter::from_fn(move || {
                if pulled {
                    return None;
                }
                pulled = true;
                thread::sleep(Duration::from_secs(3));
                Some(Ok(generate_chunk(0, 1)))
            })))
        });
        let pipeline = Pipeline::new(
            reader,
            PipelineConfig::default()
                .with_workers(workers)
                .with_output_timeout(Duration::from_millis(50)),
        )?;

        let started = Instant::now();
        let results: Vec<_> = pipeline.iter(SourceConfig::new())?.collect();
        let waited = started.elapsed();
        assert!(matches!(
            results.as_slice(),
            [Err(PipelineError::QueueTimeout { queue: "output", .. })]
        ));
        assert!(waited < Duration::from_secs(1), "waited {waited:?} for a stuck worker");
    }
    Ok(())
}

#[test]
fn zero_buffers_are_rejected_where_used() {
    let config = PipelineConfig::default().with_workers(2).with_input_buffer_size(0);
    assert!(matches!(
        Pipeline::new(VecReader::default(), config),
        Err(ConfigError::ZeroBufferSize { name: "input_buffer_size" })
    ));

    let config = PipelineConfig::default().with_workers(1).with_input_buffer_size(0);
    assert!(Pipeline::new(VecReader::default(), config).is_ok());

    let config = PipelineConfig::default().with_workers(1).with_output_buffer_size(0);
    assert!(Pipeline::new(VecReader::default(), config).is_err());
}

#[test]
fn config_loads_from_json_with_defaults() -> Result<()> {
    let config = PipelineConfig::from_json_str(r#"{"worker_count": 3, "output_timeout_ms": 250}"#)?;
    assert_eq!(config.worker_count, 3);
    assert_eq!(config.input_buffer_size, PipelineConfig::default().input_buffer_size);
    assert_eq!(config.output_timeout(), Some(Duration::from_millis(250)));

    assert!(PipelineConfig::from_json_str(r#"{"worker_count": -1}"#).is_err());
    Ok(())
}

#[test]
fn preprocessor_rewrites_the_source() -> Result<()> {
    let reader = FnReader::new("Counted", |src: &SourceConfig| -> Result<ReaderStream> {
        let n: usize = src.get("n")?;
        Ok(Box::new((0..n).map(|i| Ok(generate_chunk(i, 1)))))
    });
    let pipeline = Pipeline::new(reader, PipelineConfig::default())?.with_preprocessor(FnPreProcessor::new(
        "Doubler",
        |src: SourceConfig| -> Result<SourceConfig> {
            let n: usize = src.get("n")?;
            Ok(src.with("n", n * 2))
        },
    ));

    let out = collect_chunks(&pipeline, SourceConfig::new().with("n", 3))?;
    assert_eq!(out.len(), 6);

    let err = pipeline.iter(SourceConfig::new()).unwrap_err();
    assert!(matches!(err, PipelineError::PreProcessor { ref name, .. } if name == "Doubler"));
    Ok(())
}

#[test]
fn reader_is_called_once_per_run() -> Result<()> {
    let opened = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&opened);
    let reader = FnReader::new("Counting", move |_: &SourceConfig| -> Result<ReaderStream> {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(std::iter::once(Ok(generate_chunk(0, 2)))))
    });
    let pipeline = Pipeline::new(reader, PipelineConfig::default().with_workers(3))?;
    for _ in 0..3 {
        assert_eq!(collect_chunks(&pipeline, SourceConfig::new())?.len(), 1);
    }
    assert_eq!(opened.load(Ordering::SeqCst), 3);
    Ok(())
}

#[test]
fn metrics_track_a_fan_out_run() -> Result<()> {
    let metrics = MetricsCollector::new();
    let pipeline = build(3, source_chunks())?.with_metrics(metrics.clone());
    let out = collect_chunks(&pipeline, SourceConfig::new())?;

    assert_eq!(metrics.counter(CHUNKS_READ), Some(4));
    assert_eq!(metrics.counter(UNITS_EMITTED), Some(23));
    assert_eq!(metrics.counter(WORKERS_SPAWNED), Some(3));
    assert_eq!(metrics.counter(SENTINELS_RECEIVED), Some(2));
    assert_eq!(metrics.counter(WORKERS_JOINED), Some(3));
    assert_eq!(out.iter().map(Chunk::len).sum::<usize>(), 23);
    assert!(metrics.elapsed().is_some());
    Ok(())
}

#[test]
fn setup_report_lists_configuration_and_steps() -> Result<()> {
    let fan_out = build(2, vec![])?.describe();
    assert!(fan_out.contains("PIPELINE'S SETUP"));
    assert!(fan_out.contains("  worker_count: 2\n"));
    assert!(fan_out.contains("  input_buffer_size: 5\n"));
    assert!(fan_out.contains("FieldsSelector"));
    assert!(fan_out.contains("  new_size: 4\n"));

    let inline = build(0, vec![])?.describe();
    assert!(!inline.contains("output_buffer_size"));
    assert!(!inline.contains("input_buffer_size"));

    let offload = build(1, vec![])?.describe();
    assert!(offload.contains("output_buffer_size"));
    assert!(!offload.contains("input_buffer_size"));

    let named = Pipeline::new(VecReader::default(), PipelineConfig::default().with_name_prefix("train"))?;
    assert!(named.describe().contains("Train PIPELINE'S SETUP"));
    Ok(())
}
