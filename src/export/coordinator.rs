//! Export coordinator for orchestrating export operations
//!
//! Brings together the source count, the partitioner, an executor and the
//! table assembler:
//!
//! 1. Count records matching the predicate
//! 2. Cut the count into one partition per worker
//! 3. Convert partitions to batches with the chosen strategy
//! 4. Assemble the batches into one table

use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use mongodb::bson::Document;
use tracing::{debug, info, warn};

use crate::config::{Config, ExportConfig};
use crate::error::Result;
use crate::executor::{ExportJob, ProgressTracker, Strategy, executor_for};
use crate::partition::partition;
use crate::schema::SchemaDescriptor;
use crate::source::{ConnectOptions, ReadOptions, SourceSpec, new_run_id};
use crate::table::{RowOrder, Table, TableAssembler};

/// Result of an export operation
#[derive(Debug)]
pub struct ExportResult {
    /// Assembled table
    pub table: Table,
    /// Strategy that produced it
    pub strategy: Strategy,
    /// Number of partitions executed
    pub partitions: usize,
    /// Records matching the predicate when the export started
    pub matched: u64,
    /// Time taken for export
    pub elapsed_ms: u64,
}

/// Coordinator for export operations
pub struct ExportCoordinator {
    source: SourceSpec,
    config: ExportConfig,
    connect: ConnectOptions,
    show_progress: bool,
}

impl ExportCoordinator {
    /// Create a coordinator reading from `source` with `config`'s settings
    pub fn new(source: SourceSpec, config: &Config) -> Self {
        Self {
            source,
            config: config.export.clone(),
            connect: config.connection.clone().into(),
            show_progress: false,
        }
    }

    /// Draw a progress bar on stderr while exporting
    pub fn with_progress(mut self, enabled: bool) -> Self {
        self.show_progress = enabled;
        self
    }

    /// Binary started for multi-process workers
    ///
    /// Without one, the program is resolved as described on
    /// [`ExportConfig::worker_program`].
    pub fn with_worker_program(mut self, program: impl Into<PathBuf>) -> Self {
        self.config.worker_program = Some(program.into());
        self
    }

    /// Override the export settings
    pub fn with_export_config(mut self, config: ExportConfig) -> Self {
        self.config = config;
        self
    }

    pub fn source(&self) -> &SourceSpec {
        &self.source
    }

    pub fn config(&self) -> &ExportConfig {
        &self.config
    }

    /// Export records matching `predicate` as a table of `schema`
    ///
    /// # Returns
    /// * `Result<ExportResult>` - Table and statistics, or the first failure
    ///   by partition index
    pub async fn execute(
        &self,
        predicate: Document,
        schema: Arc<SchemaDescriptor>,
        strategy: Strategy,
        workers: NonZeroUsize,
    ) -> Result<ExportResult> {
        let start_time = Instant::now();
        let run_id = new_run_id();
        info!(
            "Starting {} export {} from {} with {} workers",
            strategy,
            run_id,
            self.source.describe(),
            workers
        );

        let executor = executor_for(strategy, workers, &self.config)?;
        let matched = self.count(&predicate).await?;
        let partitions = partition(matched, workers);
        debug!("{} records matched, {} partitions", matched, partitions.len());

        let read = ReadOptions::from_config(&self.config, Some(schema.projection()), run_id);
        let job = Arc::new(ExportJob {
            source: self.source.clone(),
            predicate,
            schema,
            read,
            connect: self.connect.clone(),
        });

        let tracker = Arc::new(ProgressTracker::new(Some(matched), self.show_progress));
        let partition_count = partitions.len();
        let batches = executor.execute(job, partitions, tracker.clone()).await;
        tracker.finish();
        let batches = batches?;

        let order = RowOrder::deterministic(self.config.deterministic_order);
        let table = TableAssembler::new(order).assemble(batches)?;
        if table.num_rows() as u64 != matched {
            warn!(
                "Collection changed during export: counted {} records, read {}",
                matched,
                table.num_rows()
            );
        }

        let elapsed_ms = start_time.elapsed().as_millis() as u64;
        info!(
            "Export completed: {} rows, {} partitions, {} ms",
            table.num_rows(),
            partition_count,
            elapsed_ms
        );

        Ok(ExportResult {
            table,
            strategy,
            partitions: partition_count,
            matched,
            elapsed_ms,
        })
    }

    async fn count(&self, predicate: &Document) -> Result<u64> {
        let source = self.source.connect(&self.connect).await?;
        let counted = source.count(predicate).await;
        let closed = source.close().await;
        let count = counted?;
        closed?;
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mongodb::bson::doc;

    use crate::error::{ConfigError, ExportError};

    fn coordinator(documents: Vec<Document>) -> ExportCoordinator {
        ExportCoordinator::new(SourceSpec::inline(documents), &Config::default())
    }

    fn schema() -> Arc<SchemaDescriptor> {
        Arc::new(SchemaDescriptor::parse("id:int64, vec:list<int64>").unwrap())
    }

    fn workers(n: usize) -> NonZeroUsize {
        NonZeroUsize::new(n).unwrap()
    }

    #[tokio::test]
    async fn test_coordinator_basic() {
        let documents = (0..25_i64).map(|i| doc! { "id": i, "vec": [i] }).collect();
        let result = coordinator(documents)
            .execute(doc! {}, schema(), Strategy::Sequential, workers(3))
            .await
            .unwrap();

        assert_eq!(result.matched, 25);
        assert_eq!(result.partitions, 3);
        assert_eq!(result.table.num_rows(), 25);
        assert_eq!(result.table.row(24).unwrap()[0].as_i64(), Some(24));
    }

    #[tokio::test]
    async fn test_predicate_limits_rows() {
        let documents = (0..25_i64).map(|i| doc! { "id": i, "vec": [i] }).collect();
        let result = coordinator(documents)
            .execute(
                doc! { "id": { "$lt": 10 } },
                schema(),
                Strategy::Multithreaded,
                workers(4),
            )
            .await
            .unwrap();
        assert_eq!(result.table.num_rows(), 10);
        assert_eq!(
            result.table.rows().map(|r| r[0].as_i64().unwrap()).collect::<Vec<_>>(),
            (0..10).collect::<Vec<_>>()
        );
    }

    #[tokio::test]
    async fn test_conversion_failure_returns_no_table() {
        let mut documents: Vec<Document> = (0..8_i64).map(|i| doc! { "id": i, "vec": [i] }).collect();
        documents[5] = doc! { "id": "five", "vec": [] };

        let err = coordinator(documents)
            .execute(doc! {}, schema(), Strategy::Sequential, workers(2))
            .await
            .unwrap_err();
        assert!(err.is_type_mismatch());
        assert_eq!(err.partition(), Some(1));
    }

    #[tokio::test]
    async fn test_multiprocess_without_worker_program_is_config_error() {
        let documents = (0..4_i64).map(|i| doc! { "id": i, "vec": [i] }).collect();
        let err = crate::export::export(
            &SourceSpec::inline(documents),
            doc! {},
            SchemaDescriptor::parse("id:int64, vec:list<int64>").unwrap(),
            Strategy::Multiprocess,
            workers(2),
        )
        .await
        .unwrap_err();

        assert!(
            matches!(err, ExportError::Config(ConfigError::MissingValue { .. })),
            "unexpected error: {err}"
        );
    }

    #[test]
    fn test_worker_program_builder() {
        let c = coordinator(vec![]).with_worker_program("/opt/bin/docarrow");
        assert_eq!(
            c.config().worker_program().unwrap(),
            PathBuf::from("/opt/bin/docarrow")
        );
    }

    #[test]
    fn test_coordinator_takes_config() {
        let mut config = Config::default();
        config.export.fetch_batch_size = 17;
        let c = ExportCoordinator::new(SourceSpec::inline(vec![]), &config).with_progress(true);
        assert_eq!(c.config().fetch_batch_size, 17);
        assert!(c.show_progress);
    }
}
