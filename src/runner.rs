//! Execution architectures and the consumer-side iterator.
//!
//! [`ExecMode`] is derived from the configured worker count:
//!
//! - **Inline** (`0`): the step chain runs lazily on the consumer's thread.
//! - **Offload** (`1`): one background worker reads and processes, pushing
//!   results into a bounded output queue.
//! - **FanOut** (`N > 1`): one reader worker fills a bounded input queue and
//!   `N - 1` processing workers, each with its own copy of the step chain,
//!   drain it into the bounded output queue.
//!
//! Queue protocol. The input queue is closed by the reader worker dropping
//! its sender, so every processing worker observes end-of-input exactly once
//! it has drained the queue. Each processing worker then puts one
//! `Done` sentinel on the output queue. The consumer stops after
//! as many sentinels as there are processing workers and joins all workers.
//! A failure anywhere travels as a `Failed` message and is re-raised on the
//! consumer's thread; the failing worker sends no sentinel.
//!
//! Outputs of different processing workers interleave in no particular
//! order. With one processor (modes Inline and Offload) the order follows the
//! reader.
//!
//! Dropping a [`PipelineIter`] early closes the output queue, which unblocks
//! every worker, and joins them. After an output timeout the workers are
//! joined on a background thread instead and the error is returned at once.

use crate::chain::{ChunkStream, ItemStream, StepChain};
use crate::chunk::Chunk;
use crate::error::{PipelineError, Result};
use crate::metrics::{
    EMITTED_CHUNK_SIZES, ITEMS_EMITTED, MetricsCollector, SENTINELS_RECEIVED, UNITS_EMITTED,
    WORKERS_JOINED, WORKERS_SPAWNED,
};
use crate::step::Item;
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, bounded};
use std::any::Any;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, warn};

const OUTPUT_QUEUE: &str = "output";

/// How a pipeline distributes reading and processing.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExecMode {
    Inline,
    Offload,
    FanOut { processors: usize },
}

impl ExecMode {
    #[must_use]
    pub const fn from_worker_count(worker_count: usize) -> Self {
        match worker_count {
            0 => Self::Inline,
            1 => Self::Offload,
            n => Self::FanOut { processors: n - 1 },
        }
    }

    #[must_use]
    pub const fn worker_count(self) -> usize {
        match self {
            Self::Inline => 0,
            Self::Offload => 1,
            Self::FanOut { processors } => processors + 1,
        }
    }

    /// Sentinels the consumer waits for: one per worker running the chain.
    #[must_use]
    pub const fn expected_sentinels(self) -> usize {
        match self {
            Self::Inline => 0,
            Self::Offload => 1,
            Self::FanOut { processors } => processors,
        }
    }
}

/// What travels over a queue.
pub(crate) enum Message<T> {
    Item(T),
    Failed(PipelineError),
    Done,
}

/// Everything the runner needs besides the stream and the chain.
pub(crate) struct Runner {
    pub mode: ExecMode,
    pub input_buffer_size: usize,
    pub output_buffer_size: usize,
    pub output_timeout: Option<Duration>,
    pub name: String,
    pub metrics: Option<MetricsCollector>,
}

impl Runner {
    pub fn run(self, source: ChunkStream, chain: StepChain) -> Result<PipelineIter> {
        if let Some(m) = &self.metrics {
            m.record_start();
        }
        let state = match self.mode {
            ExecMode::Inline => State::Inline(chain.apply(source)),
            ExecMode::Offload => State::Queued(self.offload(source, chain)?),
            ExecMode::FanOut { processors } => {
                State::Queued(self.fan_out(source, chain, processors)?)
            }
        };
        Ok(PipelineIter {
            state,
            metrics: self.metrics,
        })
    }

    fn offload(&self, source: ChunkStream, chain: StepChain) -> Result<Collector> {
        let (out_tx, out_rx) = bounded(self.output_buffer_size);
        let worker_name = format!("{}-worker", self.name);
        let name = worker_name.clone();
        let worker = spawn(&worker_name, move || {
            pump(&name, chain.apply(source), &out_tx, true);
        })?;
        self.count_spawned(1);
        Ok(self.collector(out_rx, vec![worker], 1))
    }

    fn fan_out(&self, source: ChunkStream, chain: StepChain, processors: usize) -> Result<Collector> {
        let (in_tx, in_rx) = bounded::<Message<Chunk>>(self.input_buffer_size);
        let (out_tx, out_rx) = bounded::<Message<Item>>(self.output_buffer_size);
        let mut workers = Vec::with_capacity(processors + 1);

        let reader_name = format!("{}-reader", self.name);
        let name = reader_name.clone();
        workers.push(spawn(&reader_name, move || {
            pump(&name, source, &in_tx, false);
        })?);

        for i in 0..processors {
            let worker_name = format!("{}-processor-{i}", self.name);
            let name = worker_name.clone();
            let input: ChunkStream = Box::new(QueueStream {
                queue: in_rx.clone(),
                done: false,
            });
            let out_tx = out_tx.clone();
            let chain = chain.clone();
            match spawn(&worker_name, move || {
                pump(&name, chain.apply(input), &out_tx, true);
            }) {
                Ok(worker) => workers.push(worker),
                Err(e) => {
                    drop(in_rx);
                    drop(out_rx);
                    join_all(workers, self.metrics.as_ref());
                    return Err(e);
                }
            }
        }
        self.count_spawned(processors + 1);
        Ok(self.collector(out_rx, workers, processors))
    }

    fn collector(&self, queue: Receiver<Message<Item>>, workers: Vec<Worker>, expected: usize) -> Collector {
        Collector {
            queue,
            workers,
            expected,
            received: 0,
            timeout: self.output_timeout,
        }
    }

    fn count_spawned(&self, n: usize) {
        if let Some(m) = &self.metrics {
            m.increment_counter(WORKERS_SPAWNED, n as u64);
        }
    }
}

struct Worker {
    name: String,
    handle: JoinHandle<()>,
}

fn spawn<F>(name: &str, f: F) -> Result<Worker>
where
    F: FnOnce() + Send + 'static,
{
    let handle = thread::Builder::new()
        .name(name.to_string())
        .spawn(f)
        .map_err(|source| PipelineError::Spawn {
            worker: name.to_string(),
            source,
        })?;
    debug!(worker = name, "spawned");
    Ok(Worker {
        name: name.to_string(),
        handle,
    })
}

/// Forward a stream into a queue. Stops at the first error, forwarding it,
/// or when the receiving side has gone away.
fn pump<T, I>(worker: &str, stream: I, queue: &Sender<Message<T>>, sentinel: bool)
where
    I: IntoIterator<Item = Result<T>>,
{
    let mut sent = 0_usize;
    for result in stream {
        match result {
            Ok(item) => {
                if queue.send(Message::Item(item)).is_err() {
                    debug!(worker, sent, "queue closed by consumer, stopping");
                    return;
                }
                sent += 1;
            }
            Err(e) => {
                warn!(worker, error = %e, "forwarding failure");
                let _ = queue.send(Message::Failed(e));
                return;
            }
        }
    }
    if sentinel {
        let _ = queue.send(Message::Done);
    }
    debug!(worker, sent, "finished");
}

/// The input queue seen as a chunk stream by one processing worker.
struct QueueStream {
    queue: Receiver<Message<Chunk>>,
    done: bool,
}

impl Iterator for QueueStream {
    type Item = Result<Chunk>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.queue.recv() {
            Ok(Message::Item(chunk)) => Some(Ok(chunk)),
            Ok(Message::Failed(e)) => {
                self.done = true;
                Some(Err(e))
            }
            Ok(Message::Done) | Err(_) => {
                self.done = true;
                None
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "non-string panic payload".to_string())
}

/// Join every worker, returning the first panic as an error.
fn join_all(workers: Vec<Worker>, metrics: Option<&MetricsCollector>) -> Option<PipelineError> {
    let mut first_panic = None;
    for worker in workers {
        match worker.handle.join() {
            Ok(()) => debug!(worker = %worker.name, "joined"),
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                warn!(worker = %worker.name, %message, "worker panicked");
                first_panic.get_or_insert(PipelineError::WorkerPanicked {
                    worker: worker.name,
                    message,
                });
            }
        }
        if let Some(m) = metrics {
            m.increment_counter(WORKERS_JOINED, 1);
        }
    }
    first_panic
}

struct Collector {
    queue: Receiver<Message<Item>>,
    workers: Vec<Worker>,
    expected: usize,
    received: usize,
    timeout: Option<Duration>,
}

impl Collector {
    fn recv(&self) -> std::result::Result<Message<Item>, RecvTimeoutError> {
        match self.timeout {
            Some(timeout) => self.queue.recv_timeout(timeout),
            None => self.queue.recv().map_err(|_| RecvTimeoutError::Disconnected),
        }
    }

    /// Close the queue so blocked workers give up, then join them.
    fn shutdown(self, metrics: Option<&MetricsCollector>) -> Option<PipelineError> {
        drop(self.queue);
        join_all(self.workers, metrics)
    }

    /// Close the queue and join the workers on a reaper thread, so a worker
    /// stuck inside a step does not hold up the caller.
    fn abandon(self, metrics: Option<MetricsCollector>) {
        drop(self.queue);
        let workers = self.workers;
        let names: Vec<String> = workers.iter().map(|w| w.name.clone()).collect();
        let reaper = thread::Builder::new()
            .name("mldp-reaper".to_string())
            .spawn(move || {
                if let Some(e) = join_all(workers, metrics.as_ref()) {
                    warn!(error = %e, "worker failed after timeout");
                }
            });
        match reaper {
            Ok(_) => debug!(?names, "workers left to the reaper"),
            Err(e) => warn!(?names, error = %e, "no reaper thread, workers detached"),
        }
    }
}

enum State {
    Inline(ItemStream),
    Queued(Collector),
    Finished,
}

/// The consumer's view of a running pipeline.
///
/// Yields items until the input is exhausted or the first error, after which
/// it is fused. Never blocks forever on a queue whose producers have all
/// exited.
pub struct PipelineIter {
    state: State,
    metrics: Option<MetricsCollector>,
}

impl PipelineIter {
    /// Only the chunk items; a formatted item is reported as an error.
    pub fn chunks(self) -> impl Iterator<Item = anyhow::Result<Chunk>> {
        self.map(|item| {
            item.map_err(anyhow::Error::from).and_then(|item| {
                item.into_chunk()
                    .ok_or_else(|| anyhow::anyhow!("pipeline yields formatted items, not chunks"))
            })
        })
    }

    fn record(&self, item: &Item) {
        if let Some(m) = &self.metrics {
            m.increment_counter(ITEMS_EMITTED, 1);
            if let Some(chunk) = item.as_chunk() {
                m.increment_counter(UNITS_EMITTED, chunk.len() as u64);
                #[allow(clippy::cast_precision_loss)]
                m.record_value(EMITTED_CHUNK_SIZES, chunk.len() as f64);
            }
        }
    }

    fn finish(&mut self, error: Option<PipelineError>) -> Option<Result<Item>> {
        let panic = match std::mem::replace(&mut self.state, State::Finished) {
            State::Queued(collector) => collector.shutdown(self.metrics.as_ref()),
            _ => None,
        };
        if let Some(m) = &self.metrics {
            m.record_end();
        }
        if let Some(panic) = panic {
            warn!(error = %panic, "pipeline stopped");
            return Some(Err(panic));
        }
        error.map(Err)
    }

    /// Give up on the output queue without waiting for the workers.
    fn time_out(&mut self, timeout: Duration) -> PipelineError {
        if let State::Queued(collector) = std::mem::replace(&mut self.state, State::Finished) {
            collector.abandon(self.metrics.clone());
        }
        if let Some(m) = &self.metrics {
            m.record_end();
        }
        let error = PipelineError::QueueTimeout {
            queue: OUTPUT_QUEUE,
            timeout,
        };
        warn!(%error, "pipeline stopped");
        error
    }

    fn next_queued(&mut self) -> Option<Result<Item>> {
        loop {
            let State::Queued(collector) = &mut self.state else {
                return None;
            };
            match collector.recv() {
                Ok(Message::Item(item)) => return Some(Ok(item)),
                Ok(Message::Done) => {
                    collector.received += 1;
                    if let Some(m) = &self.metrics {
                        m.increment_counter(SENTINELS_RECEIVED, 1);
                    }
                    if collector.received == collector.expected {
                        debug!(sentinels = collector.received, "all workers finished");
                        return self.finish(None);
                    }
                }
                Ok(Message::Failed(e)) => return self.finish(Some(e)),
                Err(RecvTimeoutError::Timeout) => {
                    let timeout = collector.timeout.unwrap_or_default();
                    return Some(Err(self.time_out(timeout)));
                }
                Err(RecvTimeoutError::Disconnected) => {
                    let error = PipelineError::Disconnected {
                        queue: OUTPUT_QUEUE,
                        received: collector.received,
                        expected: collector.expected,
                    };
                    return self.finish(Some(error));
                }
            }
        }
    }
}

impl Iterator for PipelineIter {
    type Item = Result<Item>;

    fn next(&mut self) -> Option<Self::Item> {
        let next = match &mut self.state {
            State::Finished => return None,
            State::Inline(stream) => match stream.next() {
                Some(Ok(item)) => Some(Ok(item)),
                Some(Err(e)) => self.finish(Some(e)),
                None => self.finish(None),
            },
            State::Queued(_) => self.next_queued(),
        };
        if let Some(Ok(item)) = &next {
            self.record(item);
        }
        next
    }
}

impl Drop for PipelineIter {
    fn drop(&mut self) {
        if let State::Queued(collector) = std::mem::replace(&mut self.state, State::Finished) {
            debug!(pending = collector.expected - collector.received, "dropped early, joining workers");
            if let Some(e) = collector.shutdown(self.metrics.as_ref()) {
                warn!(error = %e, "worker failed during shutdown");
            }
        }
    }
}

impl std::fmt::Debug for PipelineIter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = match &self.state {
            State::Inline(_) => "inline",
            State::Queued(_) => "queued",
            State::Finished => "finished",
        };
        f.debug_struct("PipelineIter").field("state", &state).finish()
    }
}
