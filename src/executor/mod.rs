//! Worker execution strategies
//!
//! An [`Executor`] turns a list of partitions into one [`Batch`] per
//! partition. Three strategies are available and must produce
//! schema-identical, row-equivalent output:
//!
//! - [`SequentialExecutor`]: one connection, partitions in order on the
//!   caller's task.
//! - [`ThreadedExecutor`]: OS threads pulling partitions from a shared queue,
//!   each with its own runtime and connection.
//! - [`ProcessExecutor`]: one child process per partition, bounded by the
//!   worker count. Children speak the protocol in [`worker`].
//!
//! All strategies are fail-fast: the first failure stops scheduling, workers
//! already running are awaited, and the error of the lowest partition index
//! is returned. Other failures are logged.

pub mod process;
pub mod progress;
pub mod sequential;
pub mod threaded;
pub mod worker;

use std::collections::VecDeque;
use std::fmt;
use std::num::NonZeroUsize;
use std::str::FromStr;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use mongodb::bson::Document;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::batch::{Batch, BatchBuilder};
use crate::config::ExportConfig;
use crate::error::{ExportError, Result};
use crate::partition::Partition;
use crate::schema::SchemaDescriptor;
use crate::source::{ConnectOptions, DocumentSource, ReadOptions, RecordStream, SourceSpec};

pub use process::ProcessExecutor;
pub use progress::ProgressTracker;
pub use sequential::SequentialExecutor;
pub use threaded::ThreadedExecutor;
pub use worker::{WorkerFailure, WorkerRequest, run_worker};

/// Upper bound on rows pre-allocated for one partition.
const MAX_ROWS_HINT: usize = 65_536;

/// How partitions are executed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    Sequential,
    Multiprocess,
    Multithreaded,
}

/// Everything a worker needs besides its partition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportJob {
    pub source: SourceSpec,
    pub predicate: Document,
    pub schema: Arc<SchemaDescriptor>,
    pub read: ReadOptions,
    pub connect: ConnectOptions,
}

/// Strategy for running partitions to batches
#[async_trait]
pub trait Executor: Send + Sync {
    fn strategy(&self) -> Strategy;

    /// Convert every partition into a batch.
    ///
    /// Batches come back in completion order; each carries its partition index.
    async fn execute(
        &self,
        job: Arc<ExportJob>,
        partitions: Vec<Partition>,
        progress: Arc<ProgressTracker>,
    ) -> Result<Vec<Batch>>;
}

/// Build the executor for `strategy`.
///
/// Only the multi-process strategy resolves the worker program, so a missing
/// `docarrow` binary fails that strategy alone.
pub fn executor_for(
    strategy: Strategy,
    workers: NonZeroUsize,
    config: &ExportConfig,
) -> Result<Box<dyn Executor>> {
    let executor: Box<dyn Executor> = match strategy {
        Strategy::Sequential => Box::new(SequentialExecutor),
        Strategy::Multithreaded => Box::new(ThreadedExecutor::new(workers)),
        Strategy::Multiprocess => {
            Box::new(ProcessExecutor::new(workers, config.worker_program()?))
        }
    };
    Ok(executor)
}

/// Read one partition from `source` into a batch.
///
/// The stream is closed on every path before the result is returned. Errors
/// are attributed to the partition.
pub async fn run_partition(
    source: &dyn DocumentSource,
    job: &ExportJob,
    partition: &Partition,
    progress: Option<&ProgressTracker>,
) -> Result<Batch> {
    let index = partition.index;
    let mut stream = source
        .open(&job.predicate, partition, &job.read)
        .await
        .map_err(|e| e.in_partition(index))?;

    let filled = fill(stream.as_mut(), job, partition, progress).await;
    let closed = stream.close().await;

    let batch = filled.map_err(|e| e.in_partition(index))?;
    closed.map_err(|e| e.in_partition(index))?;

    info!("Partition {} produced {} rows", index, batch.num_rows());
    Ok(batch)
}

async fn fill(
    stream: &mut dyn RecordStream,
    job: &ExportJob,
    partition: &Partition,
    progress: Option<&ProgressTracker>,
) -> Result<Batch> {
    let rows_hint = usize::try_from(partition.limit)
        .unwrap_or(usize::MAX)
        .min(MAX_ROWS_HINT);
    let mut builder = BatchBuilder::new(job.schema.clone(), partition.index, rows_hint);

    while let Some(records) = stream.next_batch().await? {
        for record in &records {
            builder.append_record(record)?;
        }
        if let Some(progress) = progress {
            progress.add(records.len() as u64);
        }
    }

    builder.finish()
}

/// Partitions awaiting a worker, shared between threads
pub(crate) struct PartitionQueue {
    pending: Mutex<VecDeque<Partition>>,
    cancel: CancellationToken,
}

impl PartitionQueue {
    pub(crate) fn new(partitions: Vec<Partition>) -> Self {
        Self {
            pending: Mutex::new(partitions.into()),
            cancel: CancellationToken::new(),
        }
    }

    /// Next partition, or `None` once drained or cancelled.
    pub(crate) fn next(&self) -> Option<Partition> {
        if self.cancel.is_cancelled() {
            return None;
        }
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
    }

    /// Stop handing out partitions.
    pub(crate) fn cancel(&self) {
        if !self.cancel.is_cancelled() {
            debug!("Partition queue cancelled");
        }
        self.cancel.cancel();
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

/// Batches and failures gathered from workers
#[derive(Default)]
pub(crate) struct Outcomes {
    batches: Vec<Batch>,
    failures: Vec<ExportError>,
}

impl Outcomes {
    pub(crate) fn record(&mut self, result: Result<Batch>) {
        match result {
            Ok(batch) => self.batches.push(batch),
            Err(e) => self.failures.push(e),
        }
    }

    pub(crate) fn has_failures(&self) -> bool {
        !self.failures.is_empty()
    }

    /// All batches, or the failure with the lowest partition index.
    pub(crate) fn finish(self) -> Result<Vec<Batch>> {
        if self.failures.is_empty() {
            return Ok(self.batches);
        }

        let mut failures = self.failures;
        failures.sort_by_key(|e| e.partition().unwrap_or(usize::MAX));
        let mut failures = failures.into_iter();
        let first = failures.next();
        for suppressed in failures {
            warn!("Suppressed worker failure: {}", suppressed);
        }
        match first {
            Some(e) => Err(e),
            None => Ok(self.batches),
        }
    }
}

impl Strategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::Sequential => "sequential",
            Strategy::Multiprocess => "multiprocess",
            Strategy::Multithreaded => "multithreaded",
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Strategy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sequential" | "seq" => Ok(Strategy::Sequential),
            "multiprocess" | "process" | "processes" => Ok(Strategy::Multiprocess),
            "multithreaded" | "thread" | "threads" | "threaded" => Ok(Strategy::Multithreaded),
            other => Err(format!(
                "unknown strategy '{other}' (expected sequential, multiprocess or multithreaded)"
            )),
        }
    }
}

#[cfg(test)]
mod tests;
