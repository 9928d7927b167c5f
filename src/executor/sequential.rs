//! Single-connection execution on the caller's task

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};

use crate::batch::Batch;
use crate::error::Result;
use crate::partition::Partition;

use super::{ExportJob, Executor, ProgressTracker, Strategy, run_partition};

/// Runs partitions one after another over one connection
#[derive(Debug, Default, Clone, Copy)]
pub struct SequentialExecutor;

#[async_trait]
impl Executor for SequentialExecutor {
    fn strategy(&self) -> Strategy {
        Strategy::Sequential
    }

    async fn execute(
        &self,
        job: Arc<ExportJob>,
        partitions: Vec<Partition>,
        progress: Arc<ProgressTracker>,
    ) -> Result<Vec<Batch>> {
        info!("Sequential export of {} partitions", partitions.len());
        let source = job.source.connect(&job.connect).await?;

        let mut batches = Vec::with_capacity(partitions.len());
        let mut failure = None;
        for partition in &partitions {
            match run_partition(source.as_ref(), &job, partition, Some(progress.as_ref())).await {
                Ok(batch) => batches.push(batch),
                Err(e) => {
                    failure = Some(e);
                    break;
                }
            }
        }

        let closed = source.close().await;
        if let Some(e) = failure {
            if let Err(close_err) = closed {
                warn!("Failed to close source after error: {}", close_err);
            }
            return Err(e);
        }
        closed?;

        Ok(batches)
    }
}
