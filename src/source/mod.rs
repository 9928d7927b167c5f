//! Document sources
//!
//! A [`DocumentSource`] counts records matching a predicate and opens a
//! [`RecordStream`] over one partition's `skip`/`limit` range. Streams yield
//! fetch batches lazily; they are finite and not restartable.
//!
//! Workers never share a source. Each one connects from a serializable
//! [`SourceSpec`], which is also what travels to worker processes.

pub mod filter;
pub mod memory;
pub mod mongo;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use mongodb::bson::Document;
use serde::{Deserialize, Serialize};

use crate::config::{ConnectionConfig, ExportConfig};
use crate::error::Result;
use crate::partition::Partition;

pub use memory::MemorySource;
pub use mongo::MongoSource;

/// Lazily fetched records of one partition
#[async_trait]
pub trait RecordStream: Send {
    /// Fetch the next batch of records, or `None` once exhausted.
    async fn next_batch(&mut self) -> Result<Option<Vec<Document>>>;

    /// Release the underlying cursor.
    async fn close(&mut self) -> Result<()>;
}

/// Store of records that can be counted and read by partition
#[async_trait]
pub trait DocumentSource: Send + Sync {
    /// Number of records matching `predicate` right now.
    async fn count(&self, predicate: &Document) -> Result<u64>;

    /// Open a stream over the records of `partition`, in a stable order.
    async fn open(
        &self,
        predicate: &Document,
        partition: &Partition,
        options: &ReadOptions,
    ) -> Result<Box<dyn RecordStream>>;

    /// Release the connection.
    async fn close(&self) -> Result<()>;
}

/// Where records come from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SourceSpec {
    /// MongoDB collection.
    Mongo {
        uri: String,
        database: String,
        collection: String,
    },

    /// Documents held in memory.
    Inline { documents: Arc<Vec<Document>> },

    /// mongodump-style file of concatenated BSON documents.
    DumpFile { path: PathBuf },
}

/// Connection settings shared by every worker
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectOptions {
    pub app_name: String,
    pub timeout_secs: u64,
}

/// Per-read settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReadOptions {
    /// Records requested per round trip.
    pub fetch_batch_size: u32,

    /// Field giving the stable order that partitions are cut from.
    pub sort_key: String,

    /// Fields to fetch; `None` fetches whole records.
    pub projection: Option<Document>,

    /// Identifies the export run in server-side operation logs.
    pub run_id: String,
}

impl SourceSpec {
    pub fn inline(documents: Vec<Document>) -> Self {
        SourceSpec::Inline {
            documents: Arc::new(documents),
        }
    }

    /// Short description for logs.
    pub fn describe(&self) -> String {
        match self {
            SourceSpec::Mongo {
                database,
                collection,
                ..
            } => format!("mongo {database}.{collection}"),
            SourceSpec::Inline { documents } => format!("{} inline documents", documents.len()),
            SourceSpec::DumpFile { path } => format!("dump file {}", path.display()),
        }
    }

    /// Open a fresh connection to the source.
    pub async fn connect(&self, options: &ConnectOptions) -> Result<Box<dyn DocumentSource>> {
        let source: Box<dyn DocumentSource> = match self {
            SourceSpec::Mongo {
                uri,
                database,
                collection,
            } => Box::new(MongoSource::connect(uri, database, collection, options).await?),
            SourceSpec::Inline { documents } => {
                Box::new(MemorySource::new(documents.clone(), "inline"))
            }
            SourceSpec::DumpFile { path } => Box::new(MemorySource::from_dump_file(path).await?),
        };
        Ok(source)
    }
}

impl ConnectOptions {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for ConnectOptions {
    fn default() -> Self {
        ConnectionConfig::default().into()
    }
}

impl From<ConnectionConfig> for ConnectOptions {
    fn from(config: ConnectionConfig) -> Self {
        Self {
            app_name: config.app_name,
            timeout_secs: config.timeout,
        }
    }
}

impl ReadOptions {
    /// Read settings from the export configuration.
    pub fn from_config(config: &ExportConfig, projection: Option<Document>, run_id: String) -> Self {
        Self {
            fetch_batch_size: config.fetch_batch_size,
            sort_key: config.sort_key.clone(),
            projection,
            run_id,
        }
    }

    /// Server-side comment tagging reads of `partition`.
    pub fn comment(&self, partition: &Partition) -> String {
        format!("{}-p{}", self.run_id, partition.index)
    }
}

impl Default for ReadOptions {
    fn default() -> Self {
        Self::from_config(&ExportConfig::default(), None, new_run_id())
    }
}

/// Unique identifier for one export run: `docarrow-<host>-<uuid>`.
pub fn new_run_id() -> String {
    let host = hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| "unknown".to_string());
    format!("docarrow-{}-{}", host, uuid::Uuid::new_v4())
}

/// Stream that yields nothing.
pub(crate) struct EmptyStream;

#[async_trait]
impl RecordStream for EmptyStream {
    async fn next_batch(&mut self) -> Result<Option<Vec<Document>>> {
        Ok(None)
    }

    async fn close(&mut self) -> Result<()> {
        Ok(())
    }
}
