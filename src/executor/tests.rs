//! Tests for the in-process execution strategies

use std::sync::Arc;

use mongodb::bson::{Document, doc};

use super::*;
use crate::partition::partition;
use crate::source::MemorySource;

fn job(documents: Vec<Document>, schema: &str) -> Arc<ExportJob> {
    Arc::new(ExportJob {
        source: SourceSpec::inline(documents),
        predicate: doc! {},
        schema: Arc::new(SchemaDescriptor::parse(schema).unwrap()),
        read: ReadOptions {
            fetch_batch_size: 7,
            ..ReadOptions::default()
        },
        connect: ConnectOptions::default(),
    })
}

fn records(n: i64) -> Vec<Document> {
    (0..n).map(|i| doc! { "id": i, "vec": [i, i * 2] }).collect()
}

fn workers(n: usize) -> NonZeroUsize {
    NonZeroUsize::new(n).unwrap()
}

fn ids(batches: &[Batch]) -> Vec<i64> {
    let mut sorted: Vec<&Batch> = batches.iter().collect();
    sorted.sort_by_key(|b| b.partition());
    sorted
        .iter()
        .flat_map(|b| (0..b.num_rows()).map(move |i| b.row(i)[0].as_i64().unwrap()))
        .collect()
}

async fn run(executor: &dyn Executor, job: Arc<ExportJob>, n: usize) -> Result<Vec<Batch>> {
    let total = job.source.connect(&job.connect).await?.count(&job.predicate).await?;
    executor
        .execute(job, partition(total, workers(n)), Arc::new(ProgressTracker::hidden()))
        .await
}

#[tokio::test]
async fn test_run_partition_reads_range() {
    let job = job(records(20), "id:int64, vec:list<int64>");
    let source = MemorySource::new(Arc::new(records(20)), "test");
    let progress = ProgressTracker::hidden();

    let batch = run_partition(&source, &job, &Partition::new(2, 5, 10), Some(&progress))
        .await
        .unwrap();
    assert_eq!(batch.partition(), 2);
    assert_eq!(batch.num_rows(), 10);
    assert_eq!(batch.row(0)[0], crate::convert::Value::Int64(5));
    assert_eq!(progress.processed(), 10);
}

#[tokio::test]
async fn test_run_partition_attributes_conversion_error() {
    let mut documents = records(10);
    documents[6] = doc! { "id": "six", "vec": [] };
    let job = job(documents.clone(), "id:int64, vec:list<int64>");
    let source = MemorySource::new(Arc::new(documents), "test");

    let err = run_partition(&source, &job, &Partition::new(1, 5, 5), None)
        .await
        .unwrap_err();
    assert!(err.is_type_mismatch());
    assert_eq!(err.partition(), Some(1));
}

#[tokio::test]
async fn test_sequential_matches_threaded() {
    let job = job(records(103), "id:int64, vec:list<int64>");

    let sequential = run(&SequentialExecutor, job.clone(), 4).await.unwrap();
    let threaded = run(&ThreadedExecutor::new(workers(4)), job, 4).await.unwrap();

    assert_eq!(sequential.len(), 4);
    assert_eq!(threaded.len(), 4);
    assert_eq!(ids(&sequential), (0..103).collect::<Vec<_>>());
    assert_eq!(ids(&threaded), ids(&sequential));
}

#[tokio::test]
async fn test_threaded_more_workers_than_records() {
    let job = job(records(3), "id:int64, vec:list<int64>");
    let batches = run(&ThreadedExecutor::new(workers(8)), job, 8).await.unwrap();

    assert_eq!(batches.len(), 8);
    assert_eq!(batches.iter().filter(|b| b.is_empty()).count(), 5);
    assert_eq!(ids(&batches), vec![0, 1, 2]);
}

#[tokio::test]
async fn test_empty_match_yields_empty_batches() {
    let mut job = (*job(records(10), "id:int64, vec:list<int64>")).clone();
    job.predicate = doc! { "id": { "$gt": 100 } };
    let job = Arc::new(job);

    for executor in [
        Box::new(SequentialExecutor) as Box<dyn Executor>,
        Box::new(ThreadedExecutor::new(workers(3))),
    ] {
        let batches = run(executor.as_ref(), job.clone(), 3).await.unwrap();
        assert_eq!(batches.len(), 3);
        assert!(batches.iter().all(Batch::is_empty));
    }
}

#[tokio::test]
async fn test_threaded_returns_lowest_failing_partition() {
    let mut documents = records(40);
    documents[35] = doc! { "id": "bad", "vec": [] };
    documents[12] = doc! { "id": 12, "vec": "bad" };
    let job = job(documents, "id:int64, vec:list<int64>");

    let err = run(&ThreadedExecutor::new(workers(4)), job.clone(), 4)
        .await
        .unwrap_err();
    assert_eq!(err.partition(), Some(1));
    assert!(err.is_type_mismatch());

    let err = run(&SequentialExecutor, job, 4).await.unwrap_err();
    assert_eq!(err.partition(), Some(1));
}

#[tokio::test]
async fn test_unsupported_predicate_is_source_error() {
    let mut job = (*job(records(4), "id:int64")).clone();
    job.predicate = doc! { "id": { "$regex": "1" } };
    let job = Arc::new(job);

    let err = SequentialExecutor
        .execute(
            job,
            vec![Partition::new(0, 0, 4)],
            Arc::new(ProgressTracker::hidden()),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, ExportError::PartitionSource(ref e) if e.partition == Some(0)));
}

#[test]
fn test_queue_stops_after_cancel() {
    let queue = PartitionQueue::new(partition(10, workers(5)));
    assert_eq!(queue.next().map(|p| p.index), Some(0));
    queue.cancel();
    assert!(queue.is_cancelled());
    assert!(queue.next().is_none());
}

#[test]
fn test_outcomes_pick_lowest_partition() {
    let mut outcomes = Outcomes::default();
    outcomes.record(Err(ExportError::Generic("no partition".to_string())));
    outcomes.record(Err(crate::error::PartitionSourceError {
        partition: Some(3),
        message: "down".to_string(),
    }
    .into()));
    outcomes.record(Err(ExportError::Conversion {
        partition: Some(1),
        error: crate::error::ConversionError::Shape {
            path: "m[0]".to_string(),
            expected: 4,
            found: 3,
        },
    }));

    let err = outcomes.finish().unwrap_err();
    assert_eq!(err.partition(), Some(1));
    assert!(err.is_shape());
}

#[test]
fn test_strategy_parsing() {
    assert_eq!("sequential".parse::<Strategy>().unwrap(), Strategy::Sequential);
    assert_eq!("Processes".parse::<Strategy>().unwrap(), Strategy::Multiprocess);
    assert_eq!("threads".parse::<Strategy>().unwrap(), Strategy::Multithreaded);
    assert!("gpu".parse::<Strategy>().is_err());
    assert_eq!(Strategy::Multiprocess.to_string(), "multiprocess");
}

#[test]
fn test_executor_for_strategy() {
    let mut config = crate::config::ExportConfig::default();
    config.worker_program = Some(std::path::PathBuf::from("docarrow"));
    for strategy in [Strategy::Sequential, Strategy::Multiprocess, Strategy::Multithreaded] {
        let executor = executor_for(strategy, workers(2), &config).unwrap();
        assert_eq!(executor.strategy(), strategy);
    }
}

#[test]
fn test_in_process_strategies_need_no_worker_program() {
    let config = crate::config::ExportConfig::default();
    for strategy in [Strategy::Sequential, Strategy::Multithreaded] {
        assert!(executor_for(strategy, workers(2), &config).is_ok());
    }
}
