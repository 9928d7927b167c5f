//! Shared helpers for integration tests

#![allow(dead_code)]

use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::sync::Arc;

use docarrow::config::Config;
use docarrow::error::Result;
use docarrow::export::ExportCoordinator;
use docarrow::{SchemaDescriptor, SourceSpec, Strategy, Table};
use mongodb::bson::{Document, doc};

pub const ALL_STRATEGIES: [Strategy; 3] = [
    Strategy::Sequential,
    Strategy::Multithreaded,
    Strategy::Multiprocess,
];

/// Path of the built binary, used as the worker program
pub fn worker_program() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_docarrow"))
}

/// Default configuration with worker processes pointed at the built binary
pub fn config() -> Config {
    let mut config = Config::default();
    config.export.worker_program = Some(worker_program());
    config
}

pub fn workers(n: usize) -> NonZeroUsize {
    NonZeroUsize::new(n).unwrap()
}

pub fn schema(spec: &str) -> Arc<SchemaDescriptor> {
    Arc::new(SchemaDescriptor::parse(spec).unwrap())
}

/// `count` records shaped `{ id, vec_int: [5 ints], label }`
pub fn records(count: i64) -> Vec<Document> {
    (0..count)
        .map(|i| {
            doc! {
                "id": i,
                "vec_int": (0..5).map(|k| i * 10 + k).collect::<Vec<i64>>(),
                "label": format!("record-{i}"),
            }
        })
        .collect()
}

pub async fn export_with(
    source: &SourceSpec,
    predicate: Document,
    schema: Arc<SchemaDescriptor>,
    strategy: Strategy,
    worker_count: usize,
) -> Result<Table> {
    let result = ExportCoordinator::new(source.clone(), &config())
        .execute(predicate, schema, strategy, workers(worker_count))
        .await?;
    Ok(result.table)
}

/// First column of every row as `i64`
pub fn ids(table: &Table) -> Vec<i64> {
    table.rows().map(|row| row[0].as_i64().unwrap()).collect()
}
