//! Worker process protocol
//!
//! The coordinator starts `docarrow worker` and writes one BSON
//! [`WorkerRequest`] to its stdin, then closes it. The worker replies on
//! stdout:
//!
//! - success: an Arrow IPC stream holding the partition's batch, with the
//!   worker's own schema descriptor attached as metadata; exit code 0.
//! - failure: one BSON [`WorkerFailure`] document; non-zero exit code.
//!
//! Logs go to stderr so stdout carries nothing but the reply.

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, error};

use crate::batch::{Batch, encode_ipc_stream};
use crate::error::{
    ConversionError, ExportError, PartitionSourceError, Result, SchemaError, WorkerError,
};
use crate::partition::Partition;

use super::{ExportJob, run_partition};

/// Work order for one partition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerRequest {
    pub job: ExportJob,
    pub partition: Partition,
}

/// Failure reported by a worker process
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum WorkerFailure {
    Conversion(ConversionError),
    Schema(SchemaError),
    Source(String),
    Other(String),
}

impl From<&ExportError> for WorkerFailure {
    fn from(err: &ExportError) -> Self {
        match err {
            ExportError::Conversion { error, .. } => WorkerFailure::Conversion(error.clone()),
            ExportError::Schema(e) => WorkerFailure::Schema(e.clone()),
            ExportError::PartitionSource(e) => WorkerFailure::Source(e.message.clone()),
            ExportError::MongoDb(e) => WorkerFailure::Source(e.to_string()),
            other => WorkerFailure::Other(other.to_string()),
        }
    }
}

impl WorkerFailure {
    /// Rebuild the error on the coordinator side, attributed to `partition`.
    pub fn into_error(self, partition: usize) -> ExportError {
        match self {
            WorkerFailure::Conversion(error) => ExportError::Conversion {
                partition: Some(partition),
                error,
            },
            WorkerFailure::Schema(e) => ExportError::Schema(e).in_partition(partition),
            WorkerFailure::Source(message) => ExportError::PartitionSource(PartitionSourceError {
                partition: Some(partition),
                message,
            }),
            WorkerFailure::Other(detail) => {
                ExportError::Worker(WorkerError::Crashed { partition, detail })
            }
        }
    }
}

/// Serve one request read from `input`, writing the reply to `output`.
///
/// Returns `Ok(true)` when a batch was written and `Ok(false)` when a
/// failure document was written; the caller maps that to the exit code.
/// `Err` means the reply itself could not be written.
pub async fn run_worker<R, W>(mut input: R, mut output: W) -> Result<bool>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut payload = Vec::new();
    input.read_to_end(&mut payload).await?;

    let reply = match serve(&payload).await {
        Ok(batch) => {
            debug!(
                "Worker finished partition {} with {} rows",
                batch.partition(),
                batch.num_rows()
            );
            encode_ipc_stream(&batch).map_err(|e| (e, None))
        }
        Err((e, partition)) => Err((e, partition)),
    };

    let success = match reply {
        Ok(bytes) => {
            output.write_all(&bytes).await?;
            true
        }
        Err((e, partition)) => {
            match partition {
                Some(p) => error!("Worker failed on partition {}: {}", p, e),
                None => error!("Worker failed: {}", e),
            }
            let failure = WorkerFailure::from(&e);
            output.write_all(&bson::to_vec(&failure)?).await?;
            false
        }
    };

    output.flush().await?;
    Ok(success)
}

async fn serve(payload: &[u8]) -> std::result::Result<Batch, (ExportError, Option<usize>)> {
    let request: WorkerRequest = bson::from_slice(payload)
        .map_err(|e| (WorkerError::Protocol(format!("bad request: {e}")).into(), None))?;
    let index = request.partition.index;
    debug!("Worker received partition {}", index);

    let source = request
        .job
        .source
        .connect(&request.job.connect)
        .await
        .map_err(|e| (e.in_partition(index), Some(index)))?;

    let result = run_partition(source.as_ref(), &request.job, &request.partition, None).await;
    if let Err(e) = source.close().await {
        debug!("Worker failed to close source: {}", e);
    }

    result.map_err(|e| (e, Some(index)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use mongodb::bson::doc;

    use crate::batch::decode_ipc_stream;
    use crate::schema::SchemaDescriptor;
    use crate::source::{ConnectOptions, ReadOptions, SourceSpec};

    fn request(documents: Vec<mongodb::bson::Document>, partition: Partition) -> WorkerRequest {
        WorkerRequest {
            job: ExportJob {
                source: SourceSpec::inline(documents),
                predicate: doc! {},
                schema: Arc::new(SchemaDescriptor::parse("id:int64, vec:list<int64>").unwrap()),
                read: ReadOptions::default(),
                connect: ConnectOptions::default(),
            },
            partition,
        }
    }

    #[tokio::test]
    async fn test_worker_replies_with_ipc_batch() {
        let documents = (0..10_i64).map(|i| doc! { "id": i, "vec": [i, i] }).collect();
        let payload = bson::to_vec(&request(documents, Partition::new(1, 4, 3))).unwrap();

        let mut output = Vec::new();
        assert!(run_worker(payload.as_slice(), &mut output).await.unwrap());

        let batch = decode_ipc_stream(&output, 1).unwrap();
        assert_eq!(batch.num_rows(), 3);
        assert_eq!(batch.row(0)[0], crate::convert::Value::Int64(4));
    }

    #[tokio::test]
    async fn test_worker_reports_conversion_failure() {
        let documents = vec![doc! { "id": 1_i64, "vec": [1] }, doc! { "id": "two", "vec": [] }];
        let payload = bson::to_vec(&request(documents, Partition::new(0, 0, 2))).unwrap();

        let mut output = Vec::new();
        assert!(!run_worker(payload.as_slice(), &mut output).await.unwrap());

        let failure: WorkerFailure = bson::from_slice(&output).unwrap();
        let err = failure.into_error(0);
        assert!(err.is_type_mismatch());
        assert_eq!(err.partition(), Some(0));
    }

    #[test]
    fn test_schema_failure_keeps_partition() {
        let failure = WorkerFailure::Schema(SchemaError::RowArity {
            expected: 2,
            found: 3,
        });
        let decoded: WorkerFailure = bson::from_slice(&bson::to_vec(&failure).unwrap()).unwrap();
        let err = decoded.into_error(2);
        assert_eq!(err.partition(), Some(2));

        let mut outcomes = crate::executor::Outcomes::default();
        outcomes.record(Err(ExportError::Conversion {
            partition: Some(3),
            error: ConversionError::Shape {
                path: "m[0]".to_string(),
                expected: 4,
                found: 3,
            },
        }));
        outcomes.record(Err(err));
        let first = outcomes.finish().unwrap_err();
        assert_eq!(first.partition(), Some(2));
        assert!(matches!(first, ExportError::Schema(_)));
    }

    #[tokio::test]
    async fn test_worker_rejects_garbage_request() {
        let mut output = Vec::new();
        assert!(!run_worker(&b"not bson"[..], &mut output).await.unwrap());
        let failure: WorkerFailure = bson::from_slice(&output).unwrap();
        assert!(matches!(failure, WorkerFailure::Other(_)));
    }

    #[test]
    fn test_failure_round_trips_through_bson() {
        let failure = WorkerFailure::Conversion(ConversionError::Shape {
            path: "nested_matrix[3]".to_string(),
            expected: 64,
            found: 63,
        });
        let decoded: WorkerFailure = bson::from_slice(&bson::to_vec(&failure).unwrap()).unwrap();
        assert_eq!(decoded, failure);
    }
}
