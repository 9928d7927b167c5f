//! MongoDB-backed source
//!
//! Each partition is one `find` with the export predicate, the schema
//! projection, a sort on the configured key, and `skip`/`limit` taken from the
//! partition. The `comment` option carries the run id and partition index so
//! the operation can be located in `$currentOp`.

use async_trait::async_trait;
use futures::{Stream, TryStreamExt};
use mongodb::bson::{Bson, Document, doc};
use mongodb::options::ClientOptions;
use mongodb::{Client, Collection, Cursor};
use tracing::{debug, info, warn};

use crate::error::{ExportError, PartitionSourceError, Result};
use crate::partition::Partition;

use super::{ConnectOptions, DocumentSource, EmptyStream, ReadOptions, RecordStream};

/// Connection to one collection
pub struct MongoSource {
    client: Client,
    collection: Collection<Document>,
}

impl MongoSource {
    /// Connect to `database.collection`.
    ///
    /// The driver connects lazily; unreachable servers surface on the first
    /// `count` or `open`, bounded by the configured timeout.
    pub async fn connect(
        uri: &str,
        database: &str,
        collection: &str,
        options: &ConnectOptions,
    ) -> Result<Self> {
        let mut client_options = ClientOptions::parse(uri).await?;
        client_options.app_name = Some(options.app_name.clone());
        client_options.connect_timeout = Some(options.timeout());
        client_options.server_selection_timeout = Some(options.timeout());

        let client = Client::with_options(client_options)?;
        let collection = client.database(database).collection(collection);
        debug!("Opened client for {}.{}", database, collection.name());

        Ok(Self { client, collection })
    }
}

#[async_trait]
impl DocumentSource for MongoSource {
    async fn count(&self, predicate: &Document) -> Result<u64> {
        let count = self.collection.count_documents(predicate.clone()).await?;
        debug!(
            "{} documents in {} match {:?}",
            count,
            self.collection.name(),
            predicate
        );
        Ok(count)
    }

    async fn open(
        &self,
        predicate: &Document,
        partition: &Partition,
        options: &ReadOptions,
    ) -> Result<Box<dyn RecordStream>> {
        // limit 0 means "no limit" to the server
        if partition.is_empty() {
            return Ok(Box::new(EmptyStream));
        }

        let mut find_opts = mongodb::options::FindOptions::default();
        find_opts.comment = Some(Bson::String(options.comment(partition)));
        find_opts.batch_size = Some(options.fetch_batch_size);
        find_opts.sort = Some(doc! { options.sort_key.as_str(): 1 });
        find_opts.skip = Some(partition.skip);
        find_opts.limit = Some(i64::try_from(partition.limit).unwrap_or(i64::MAX));
        find_opts.projection = options.projection.clone();

        let cursor = self
            .collection
            .find(predicate.clone())
            .with_options(find_opts)
            .await?;

        debug!(
            "Partition {}: find skip={} limit={}",
            partition.index, partition.skip, partition.limit
        );
        Ok(Box::new(CursorStream::new(
            cursor,
            options.fetch_batch_size,
            partition,
        )))
    }

    async fn close(&self) -> Result<()> {
        self.client.clone().shutdown().await;
        Ok(())
    }
}

/// Record stream over a driver cursor
///
/// Stops after the partition's `limit` documents even if the cursor has
/// more. Cursor failures are reported against the partition.
pub struct CursorStream<S = Cursor<Document>> {
    cursor: Option<S>,
    batch_size: u32,
    partition: usize,
    remaining: u64,
    fetched: u64,
}

impl<S> CursorStream<S>
where
    S: Stream<Item = mongodb::error::Result<Document>> + Unpin + Send,
{
    pub fn new(cursor: S, batch_size: u32, partition: &Partition) -> Self {
        Self {
            cursor: Some(cursor),
            batch_size: batch_size.max(1),
            partition: partition.index,
            remaining: partition.limit,
            fetched: 0,
        }
    }

    fn failed(&mut self, err: mongodb::error::Error, pending: usize) -> ExportError {
        self.cursor = None;
        PartitionSourceError {
            partition: Some(self.partition),
            message: format!(
                "cursor failed after {} documents: {err}",
                self.fetched + pending as u64
            ),
        }
        .into()
    }
}

#[async_trait]
impl<S> RecordStream for CursorStream<S>
where
    S: Stream<Item = mongodb::error::Result<Document>> + Unpin + Send,
{
    async fn next_batch(&mut self) -> Result<Option<Vec<Document>>> {
        let want = u64::from(self.batch_size).min(self.remaining);
        let Some(cursor) = self.cursor.as_mut() else {
            return Ok(None);
        };

        let mut batch = Vec::with_capacity(want as usize);
        while (batch.len() as u64) < want {
            match cursor.try_next().await {
                Ok(Some(doc)) => batch.push(doc),
                Ok(None) => break,
                Err(e) => return Err(self.failed(e, batch.len())),
            }
        }

        let count = batch.len() as u64;
        self.fetched += count;
        self.remaining -= count;

        if count < want || self.remaining == 0 {
            if self.remaining > 0 {
                warn!(
                    "Partition {} cursor ended {} documents short of its limit",
                    self.partition, self.remaining
                );
            }
            self.cursor = None;
        }

        if batch.is_empty() {
            return Ok(None);
        }
        debug!(
            "Partition {}: fetched {} documents (total: {})",
            self.partition, count, self.fetched
        );
        Ok(Some(batch))
    }

    async fn close(&mut self) -> Result<()> {
        self.cursor = None;
        info!(
            "Closed partition {} cursor after fetching {} documents",
            self.partition, self.fetched
        );
        Ok(())
    }
}
