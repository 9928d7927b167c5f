//! Child-process execution
//!
//! One child process per partition, at most `workers` alive at a time. Each
//! child connects to the source itself; the only shared data are the request
//! and reply messages described in [`super::worker`].

use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::batch::{Batch, decode_ipc_stream};
use crate::error::{ExportError, Result, WorkerError};
use crate::partition::Partition;

use super::{ExportJob, Executor, Outcomes, ProgressTracker, Strategy, WorkerFailure, WorkerRequest};

/// Runs each partition in a child process of `program`
#[derive(Debug, Clone)]
pub struct ProcessExecutor {
    workers: NonZeroUsize,
    program: PathBuf,
}

impl ProcessExecutor {
    pub fn new(workers: NonZeroUsize, program: PathBuf) -> Self {
        Self { workers, program }
    }

    pub fn program(&self) -> &Path {
        &self.program
    }
}

#[async_trait]
impl Executor for ProcessExecutor {
    fn strategy(&self) -> Strategy {
        Strategy::Multiprocess
    }

    async fn execute(
        &self,
        job: Arc<ExportJob>,
        partitions: Vec<Partition>,
        progress: Arc<ProgressTracker>,
    ) -> Result<Vec<Batch>> {
        info!(
            "Multiprocess export of {} partitions, up to {} processes ({})",
            partitions.len(),
            self.workers,
            self.program.display()
        );

        let cancel = CancellationToken::new();
        let mut pending = partitions.into_iter();
        let mut running: JoinSet<Result<Batch>> = JoinSet::new();
        let mut outcomes = Outcomes::default();

        loop {
            while running.len() < self.workers.get() && !cancel.is_cancelled() {
                let Some(partition) = pending.next() else {
                    break;
                };
                let request = WorkerRequest {
                    job: (*job).clone(),
                    partition,
                };
                let program = self.program.clone();
                running.spawn(async move { run_child(&program, request).await });
            }

            let Some(joined) = running.join_next().await else {
                break;
            };
            let result = match joined {
                Ok(result) => result,
                Err(e) => Err(WorkerError::Panicked(e.to_string()).into()),
            };
            match &result {
                Ok(batch) => progress.add(batch.num_rows() as u64),
                Err(_) => cancel.cancel(),
            }
            outcomes.record(result);
        }

        outcomes.finish()
    }
}

/// Run one partition in a child process and collect its reply.
async fn run_child(program: &Path, request: WorkerRequest) -> Result<Batch> {
    let index = request.partition.index;
    let payload = bson::to_vec(&request)?;

    let mut child = Command::new(program)
        .arg("worker")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::inherit())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| WorkerError::Spawn(format!("{}: {e}", program.display())))?;
    debug!("Started worker pid {:?} for partition {}", child.id(), index);

    let mut stdin = child
        .stdin
        .take()
        .ok_or_else(|| WorkerError::Protocol("worker stdin unavailable".to_string()))?;
    let send = async move {
        stdin.write_all(&payload).await?;
        stdin.shutdown().await
    };

    // Feed stdin while draining stdout so neither pipe can fill up.
    let (sent, output) = tokio::join!(send, child.wait_with_output());
    let output = output?;

    if output.status.success() {
        if let Err(e) = sent {
            return Err(WorkerError::Protocol(format!("failed to send request: {e}")).into());
        }
        return decode_ipc_stream(&output.stdout, index).map_err(|e| {
            ExportError::from(WorkerError::Protocol(format!(
                "partition {index}: unreadable batch: {e}"
            )))
        });
    }

    match bson::from_slice::<WorkerFailure>(&output.stdout) {
        Ok(failure) => Err(failure.into_error(index)),
        Err(_) => Err(WorkerError::Crashed {
            partition: index,
            detail: format!("exited with {}", output.status),
        }
        .into()),
    }
}
