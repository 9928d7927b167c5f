//! Thread-pool execution
//!
//! Each worker thread owns a current-thread runtime and its own source
//! connection, and pulls partitions from the shared [`PartitionQueue`] until
//! it drains or is cancelled. Batches travel back over a channel; nothing
//! else is shared.

use std::num::NonZeroUsize;
use std::sync::Arc;
use std::thread::JoinHandle;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::batch::Batch;
use crate::error::{Result, WorkerError};
use crate::partition::Partition;

use super::{ExportJob, Executor, Outcomes, PartitionQueue, ProgressTracker, Strategy, run_partition};

/// Runs partitions on a fixed number of OS threads
#[derive(Debug, Clone, Copy)]
pub struct ThreadedExecutor {
    workers: NonZeroUsize,
}

impl ThreadedExecutor {
    pub fn new(workers: NonZeroUsize) -> Self {
        Self { workers }
    }
}

#[async_trait]
impl Executor for ThreadedExecutor {
    fn strategy(&self) -> Strategy {
        Strategy::Multithreaded
    }

    async fn execute(
        &self,
        job: Arc<ExportJob>,
        partitions: Vec<Partition>,
        progress: Arc<ProgressTracker>,
    ) -> Result<Vec<Batch>> {
        let threads = self.workers.get().min(partitions.len()).max(1);
        info!(
            "Multithreaded export of {} partitions on {} threads",
            partitions.len(),
            threads
        );

        let queue = Arc::new(PartitionQueue::new(partitions));
        let (tx, mut rx) = mpsc::unbounded_channel::<Result<Batch>>();
        let mut outcomes = Outcomes::default();
        let mut handles: Vec<JoinHandle<()>> = Vec::with_capacity(threads);

        for id in 0..threads {
            let (worker_queue, job, tx, progress) =
                (queue.clone(), job.clone(), tx.clone(), progress.clone());
            let spawned = std::thread::Builder::new()
                .name(format!("docarrow-worker-{id}"))
                .spawn(move || worker_thread(id, worker_queue, job, tx, progress));
            match spawned {
                Ok(handle) => handles.push(handle),
                Err(e) => {
                    queue.cancel();
                    outcomes.record(Err(WorkerError::Spawn(e.to_string()).into()));
                    break;
                }
            }
        }
        drop(tx);

        while let Some(result) = rx.recv().await {
            if result.is_err() {
                queue.cancel();
            }
            outcomes.record(result);
        }

        for handle in handles {
            match tokio::task::spawn_blocking(move || handle.join()).await {
                Ok(Ok(())) => {}
                Ok(Err(panic)) => {
                    let detail = panic
                        .downcast_ref::<&str>()
                        .map(|s| s.to_string())
                        .or_else(|| panic.downcast_ref::<String>().cloned())
                        .unwrap_or_else(|| "unknown panic".to_string());
                    outcomes.record(Err(WorkerError::Panicked(detail).into()));
                }
                Err(e) => outcomes.record(Err(WorkerError::Panicked(e.to_string()).into())),
            }
        }

        if outcomes.has_failures() {
            debug!("Multithreaded export failed; queue cancelled: {}", queue.is_cancelled());
        }
        outcomes.finish()
    }
}

fn worker_thread(
    id: usize,
    queue: Arc<PartitionQueue>,
    job: Arc<ExportJob>,
    tx: mpsc::UnboundedSender<Result<Batch>>,
    progress: Arc<ProgressTracker>,
) {
    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            queue.cancel();
            let _ = tx.send(Err(WorkerError::Spawn(e.to_string()).into()));
            return;
        }
    };

    runtime.block_on(async move {
        let source = match job.source.connect(&job.connect).await {
            Ok(source) => source,
            Err(e) => {
                queue.cancel();
                let _ = tx.send(Err(e));
                return;
            }
        };

        let mut handled = 0usize;
        while let Some(partition) = queue.next() {
            let result = run_partition(source.as_ref(), &job, &partition, Some(progress.as_ref())).await;
            let failed = result.is_err();
            if failed {
                queue.cancel();
            }
            handled += 1;
            if tx.send(result).is_err() || failed {
                break;
            }
        }

        if let Err(e) = source.close().await {
            warn!("Worker thread {} failed to close its source: {}", id, e);
        }
        debug!("Worker thread {} done after {} partitions", id, handled);
    });
}
