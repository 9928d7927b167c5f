//! docarrow Library
//!
//! Converts MongoDB documents into typed, columnar Arrow tables. An export
//! counts the matching records, cuts them into one contiguous partition per
//! worker, converts every partition into a batch and concatenates the batches
//! into a single table. Partitions can be read sequentially, on worker threads
//! or in worker processes; all three produce the same table.
//!
//! # Modules
//!
//! - `batch`: Per-partition columnar buffers and Arrow interop
//! - `cli`: Command-line interface and argument parsing
//! - `config`: Configuration management
//! - `convert`: Record to row conversion against a schema
//! - `error`: Error types and handling
//! - `executor`: Sequential, multithreaded and multiprocess execution
//! - `export`: Export entry points
//! - `partition`: Work partitioning
//! - `schema`: Column type descriptors
//! - `source`: Document sources (MongoDB, in-memory, dump files)
//! - `table`: Table assembly, slicing and rendering
//!
//! # Example
//!
//! ```no_run
//! use std::num::NonZeroUsize;
//! use std::sync::Arc;
//! use docarrow::{Config, ExportCoordinator, SchemaDescriptor, SourceSpec, Strategy};
//! use mongodb::bson::doc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let source = SourceSpec::Mongo {
//!         uri: "mongodb://localhost:27017".to_string(),
//!         database: "shop".to_string(),
//!         collection: "orders".to_string(),
//!     };
//!     let schema = SchemaDescriptor::parse("id:int64, items:list<int64>")?;
//!
//!     // Worker processes run `docarrow worker`; name the binary explicitly.
//!     let result = ExportCoordinator::new(source, &Config::default())
//!         .with_worker_program("/usr/local/bin/docarrow")
//!         .execute(
//!             doc! { "status": "shipped" },
//!             Arc::new(schema),
//!             Strategy::Multiprocess,
//!             NonZeroUsize::new(4).unwrap(),
//!         )
//!         .await?;
//!
//!     println!("{}", result.table.render(0, 5));
//!     Ok(())
//! }
//! ```

pub mod batch;
pub mod cli;
pub mod config;
pub mod convert;
pub mod error;
pub mod executor;
pub mod export;
pub mod partition;
pub mod schema;
pub mod source;
pub mod table;

// Re-export commonly used types
pub use batch::{Batch, BatchBuilder};
pub use config::Config;
pub use error::{ExportError, Result};
pub use executor::Strategy;
pub use export::{ExportCoordinator, export};
pub use partition::{Partition, partition};
pub use schema::{ColumnType, ScalarType, SchemaDescriptor, TimeUnit};
pub use source::SourceSpec;
pub use table::{RowOrder, Table, TableAssembler};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Get library version string
///
/// # Returns
/// * `&str` - Version string
pub fn version() -> &'static str {
    VERSION
}
