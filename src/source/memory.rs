//! In-memory and dump-file sources
//!
//! Records are read in their natural (insertion or file) order, which is
//! already stable, so the sort key is not consulted. Predicates go through
//! [`filter::matches`].

use std::io::Cursor;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use mongodb::bson::Document;
use tracing::{debug, info};

use crate::error::{ExportError, Result};
use crate::partition::Partition;

use super::filter;
use super::{DocumentSource, EmptyStream, ReadOptions, RecordStream};

/// Source over a shared vector of documents
pub struct MemorySource {
    documents: Arc<Vec<Document>>,
    label: String,
}

impl MemorySource {
    pub fn new(documents: Arc<Vec<Document>>, label: impl Into<String>) -> Self {
        Self {
            documents,
            label: label.into(),
        }
    }

    /// Load every document of a mongodump `.bson` file.
    pub async fn from_dump_file(path: &Path) -> Result<Self> {
        let bytes = tokio::fs::read(path).await?;
        let documents = read_dump(&bytes)
            .map_err(|e| ExportError::Bson(format!("{}: {e}", path.display())))?;
        info!(
            "Loaded {} documents from {}",
            documents.len(),
            path.display()
        );
        Ok(Self::new(Arc::new(documents), path.display().to_string()))
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }
}

/// Split concatenated BSON documents.
pub fn read_dump(bytes: &[u8]) -> std::result::Result<Vec<Document>, bson::de::Error> {
    let mut cursor = Cursor::new(bytes);
    let mut documents = Vec::new();
    while (cursor.position() as usize) < bytes.len() {
        documents.push(Document::from_reader(&mut cursor)?);
    }
    Ok(documents)
}

/// Write documents as concatenated BSON, the layout `read_dump` accepts.
pub fn write_dump<'a>(
    documents: impl IntoIterator<Item = &'a Document>,
) -> std::result::Result<Vec<u8>, bson::ser::Error> {
    let mut bytes = Vec::new();
    for document in documents {
        document.to_writer(&mut bytes)?;
    }
    Ok(bytes)
}

#[async_trait]
impl DocumentSource for MemorySource {
    async fn count(&self, predicate: &Document) -> Result<u64> {
        let mut count = 0u64;
        for document in self.documents.iter() {
            if filter::matches(document, predicate)? {
                count += 1;
            }
        }
        debug!("{} of {} {} documents match", count, self.documents.len(), self.label);
        Ok(count)
    }

    async fn open(
        &self,
        predicate: &Document,
        partition: &Partition,
        options: &ReadOptions,
    ) -> Result<Box<dyn RecordStream>> {
        if partition.is_empty() {
            return Ok(Box::new(EmptyStream));
        }

        Ok(Box::new(MemoryStream {
            documents: self.documents.clone(),
            predicate: predicate.clone(),
            position: 0,
            to_skip: partition.skip,
            remaining: partition.limit,
            batch_size: options.fetch_batch_size.max(1) as usize,
        }))
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

/// Scans the shared documents for one partition's range of matches
struct MemoryStream {
    documents: Arc<Vec<Document>>,
    predicate: Document,
    position: usize,
    to_skip: u64,
    remaining: u64,
    batch_size: usize,
}

#[async_trait]
impl RecordStream for MemoryStream {
    async fn next_batch(&mut self) -> Result<Option<Vec<Document>>> {
        let mut batch = Vec::new();

        while batch.len() < self.batch_size && self.remaining > 0 {
            let Some(document) = self.documents.get(self.position) else {
                break;
            };
            self.position += 1;

            if !filter::matches(document, &self.predicate)? {
                continue;
            }
            if self.to_skip > 0 {
                self.to_skip -= 1;
                continue;
            }
            batch.push(document.clone());
            self.remaining -= 1;
        }

        Ok(if batch.is_empty() { None } else { Some(batch) })
    }

    async fn close(&mut self) -> Result<()> {
        self.remaining = 0;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mongodb::bson::doc;

    fn source(n: i64) -> MemorySource {
        let documents = (0..n).map(|i| doc! { "id": i, "even": i % 2 == 0 }).collect();
        MemorySource::new(Arc::new(documents), "test")
    }

    async fn drain(stream: &mut Box<dyn RecordStream>) -> Vec<i64> {
        let mut ids = Vec::new();
        while let Some(batch) = stream.next_batch().await.unwrap() {
            ids.extend(batch.iter().map(|d| d.get_i64("id").unwrap()));
        }
        ids
    }

    #[tokio::test]
    async fn test_count_applies_predicate() {
        let s = source(10);
        assert_eq!(s.count(&doc! {}).await.unwrap(), 10);
        assert_eq!(s.count(&doc! { "even": true }).await.unwrap(), 5);
    }

    #[tokio::test]
    async fn test_partition_range_over_matches() {
        let s = source(20);
        let options = ReadOptions {
            fetch_batch_size: 2,
            ..ReadOptions::default()
        };
        let mut stream = s
            .open(&doc! { "even": true }, &Partition::new(1, 3, 4), &options)
            .await
            .unwrap();
        assert_eq!(drain(&mut stream).await, vec![6, 8, 10, 12]);
        stream.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_batches_respect_fetch_size() {
        let s = source(5);
        let options = ReadOptions {
            fetch_batch_size: 2,
            ..ReadOptions::default()
        };
        let mut stream = s
            .open(&doc! {}, &Partition::new(0, 0, 5), &options)
            .await
            .unwrap();
        let sizes: Vec<usize> = {
            let mut sizes = Vec::new();
            while let Some(batch) = stream.next_batch().await.unwrap() {
                sizes.push(batch.len());
            }
            sizes
        };
        assert_eq!(sizes, vec![2, 2, 1]);
    }

    #[tokio::test]
    async fn test_empty_partition_yields_nothing() {
        let s = source(5);
        let mut stream = s
            .open(&doc! {}, &Partition::new(4, 5, 0), &ReadOptions::default())
            .await
            .unwrap();
        assert!(stream.next_batch().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_unsupported_predicate_fails_count() {
        let s = source(3);
        assert!(s.count(&doc! { "id": { "$regex": "1" } }).await.is_err());
    }

    #[test]
    fn test_dump_round_trip() {
        let documents = vec![doc! { "id": 1_i64 }, doc! { "id": 2_i64, "v": [1.5] }];
        let bytes = write_dump(&documents).unwrap();
        assert_eq!(read_dump(&bytes).unwrap(), documents);
        assert!(read_dump(&bytes[..bytes.len() - 1]).is_err());
    }

    #[tokio::test]
    async fn test_dump_file_source() {
        let dir = std::env::temp_dir().join(format!("docarrow-dump-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("heavy.bson");
        let documents: Vec<Document> = (0..4_i64).map(|i| doc! { "id": i }).collect();
        std::fs::write(&path, write_dump(&documents).unwrap()).unwrap();

        let s = MemorySource::from_dump_file(&path).await.unwrap();
        assert_eq!(s.len(), 4);
        assert_eq!(s.count(&doc! { "id": { "$gte": 2 } }).await.unwrap(), 2);

        std::fs::remove_dir_all(&dir).unwrap();
    }
}
