//! Export entry points
//!
//! [`export`] is the one-call form: count, partition, execute and assemble
//! with default settings. [`ExportCoordinator`] exposes the same pipeline with
//! configuration, progress reporting and run statistics.
//!
//! # Example
//!
//! ```rust
//! use std::num::NonZeroUsize;
//! use docarrow::executor::Strategy;
//! use docarrow::export::export;
//! use docarrow::schema::SchemaDescriptor;
//! use docarrow::source::SourceSpec;
//! use mongodb::bson::doc;
//!
//! # tokio_test::block_on(async {
//! let source = SourceSpec::inline((0..10_i64).map(|i| doc! { "id": i }).collect());
//! let schema = SchemaDescriptor::parse("id:int64").unwrap();
//! let table = export(
//!     &source,
//!     doc! { "id": { "$gte": 5 } },
//!     schema,
//!     Strategy::Multithreaded,
//!     NonZeroUsize::new(2).unwrap(),
//! )
//! .await
//! .unwrap();
//! assert_eq!(table.num_rows(), 5);
//! # });
//! ```

pub mod coordinator;

use std::num::NonZeroUsize;
use std::sync::Arc;

use mongodb::bson::Document;

use crate::config::Config;
use crate::error::Result;
use crate::executor::Strategy;
use crate::schema::SchemaDescriptor;
use crate::source::SourceSpec;
use crate::table::Table;

pub use coordinator::{ExportCoordinator, ExportResult};

/// Export records of `source` matching `predicate` into a table of `schema`.
pub async fn export(
    source: &SourceSpec,
    predicate: Document,
    schema: SchemaDescriptor,
    strategy: Strategy,
    worker_count: NonZeroUsize,
) -> Result<Table> {
    let coordinator = ExportCoordinator::new(source.clone(), &Config::default());
    let result = coordinator
        .execute(predicate, Arc::new(schema), strategy, worker_count)
        .await?;
    Ok(result.table)
}
