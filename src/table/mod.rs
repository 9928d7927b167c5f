//! Table assembly
//!
//! The [`TableAssembler`] concatenates the batches of one export into a
//! single [`Table`]. Every batch must carry a schema identical to the first
//! one; the record batches are then joined with Arrow's `concat_batches`.
//!
//! ```rust
//! use std::sync::Arc;
//! use docarrow::batch::BatchBuilder;
//! use docarrow::schema::SchemaDescriptor;
//! use docarrow::table::{RowOrder, TableAssembler};
//! use mongodb::bson::doc;
//!
//! let schema = Arc::new(SchemaDescriptor::parse("id:int64").unwrap());
//! let mut batches = Vec::new();
//! for partition in [1, 0] {
//!     let mut builder = BatchBuilder::new(schema.clone(), partition, 1);
//!     builder.append_record(&doc! { "id": partition as i64 }).unwrap();
//!     batches.push(builder.finish().unwrap());
//! }
//!
//! let table = TableAssembler::new(RowOrder::PartitionIndex).assemble(batches).unwrap();
//! assert_eq!(table.num_rows(), 2);
//! assert_eq!(table.row(0).unwrap()[0].as_i64(), Some(0));
//! ```

mod display;

use std::fs::File;
use std::path::Path;
use std::sync::Arc;

use arrow::array::ArrayRef;
use arrow::compute::concat_batches;
use arrow::ipc::writer::FileWriter;
use arrow::record_batch::RecordBatch;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::batch::{Batch, value_at};
use crate::convert::Row;
use crate::error::{ExportError, Result, SchemaError};
use crate::schema::SchemaDescriptor;

/// Order of rows in the assembled table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RowOrder {
    /// Batches sorted by partition index; reproducible across runs.
    #[default]
    PartitionIndex,

    /// Batches in the order workers finished them.
    Completion,
}

impl RowOrder {
    pub fn deterministic(deterministic: bool) -> Self {
        if deterministic {
            RowOrder::PartitionIndex
        } else {
            RowOrder::Completion
        }
    }
}

/// Concatenates batches into a table
#[derive(Debug, Clone, Copy, Default)]
pub struct TableAssembler {
    order: RowOrder,
}

/// Final result of an export: one record batch under one schema
#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    schema: Arc<SchemaDescriptor>,
    data: RecordBatch,
}

impl TableAssembler {
    pub fn new(order: RowOrder) -> Self {
        Self { order }
    }

    pub fn order(&self) -> RowOrder {
        self.order
    }

    /// Verify and concatenate `batches`.
    ///
    /// Fails with [`SchemaError::NoBatches`] on empty input and with
    /// [`SchemaError::BatchMismatch`] naming the partition of the first batch
    /// whose schema differs from the first batch's.
    pub fn assemble(&self, mut batches: Vec<Batch>) -> Result<Table> {
        let Some(first) = batches.first() else {
            return Err(SchemaError::NoBatches.into());
        };
        let schema = first.schema().clone();
        let arrow = first.record_batch().schema();

        for batch in &batches[1..] {
            schema
                .ensure_same(batch.schema())
                .map_err(|source| SchemaError::BatchMismatch {
                    batch: batch.partition(),
                    source: Box::new(source),
                })?;
        }

        if self.order == RowOrder::PartitionIndex {
            batches.sort_by_key(Batch::partition);
        }

        let data = concat_batches(&arrow, batches.iter().map(Batch::record_batch))?;

        debug!("Assembled {} batches into {} rows", batches.len(), data.num_rows());
        Ok(Table { schema, data })
    }
}

impl Table {
    pub fn schema(&self) -> &Arc<SchemaDescriptor> {
        &self.schema
    }

    pub fn num_rows(&self) -> usize {
        self.data.num_rows()
    }

    pub fn num_columns(&self) -> usize {
        self.data.num_columns()
    }

    pub fn is_empty(&self) -> bool {
        self.data.num_rows() == 0
    }

    pub fn columns(&self) -> &[ArrayRef] {
        self.data.columns()
    }

    pub fn column_at(&self, position: usize) -> Option<&ArrayRef> {
        self.data.columns().get(position)
    }

    pub fn column(&self, name: &str) -> Option<&ArrayRef> {
        self.schema.index_of(name).and_then(|i| self.column_at(i))
    }

    /// Row `index`, or `None` past the end.
    pub fn row(&self, index: usize) -> Option<Row> {
        (index < self.num_rows()).then(|| self.row_at(index))
    }

    pub fn rows(&self) -> impl Iterator<Item = Row> + '_ {
        (0..self.num_rows()).map(|i| self.row_at(i))
    }

    fn row_at(&self, index: usize) -> Row {
        self.schema
            .columns()
            .iter()
            .zip(self.data.columns())
            .map(|(column, array)| value_at(array.as_ref(), &column.ty, index))
            .collect()
    }

    /// Rows `offset..offset + len`, clamped to the table's bounds.
    pub fn slice(&self, offset: usize, len: usize) -> Table {
        let offset = offset.min(self.num_rows());
        let len = len.min(self.num_rows() - offset);
        Table {
            schema: self.schema.clone(),
            data: self.data.slice(offset, len),
        }
    }

    /// The table as one Arrow `RecordBatch`.
    pub fn record_batch(&self) -> &RecordBatch {
        &self.data
    }

    pub fn into_record_batch(self) -> RecordBatch {
        self.data
    }

    /// Write the table as an Arrow IPC file.
    pub fn write_ipc_file(&self, path: &Path) -> Result<()> {
        let file = File::create(path)?;
        let mut writer = FileWriter::try_new(file, &self.data.schema())?;
        writer.write(&self.data)?;
        writer.finish()?;

        info!("Wrote {} rows to {}", self.num_rows(), path.display());
        Ok(())
    }

    /// Check that `other` has the same schema and the same multiset of rows.
    pub fn verify_equivalent(&self, other: &Table) -> Result<()> {
        self.schema.ensure_same(&other.schema)?;

        if self.num_rows() != other.num_rows() {
            return Err(ExportError::Generic(format!(
                "row counts differ: {} vs {}",
                self.num_rows(),
                other.num_rows()
            )));
        }

        let ours = self.sorted_row_keys();
        let theirs = other.sorted_row_keys();
        if let Some(position) = ours.iter().zip(&theirs).position(|(a, b)| a != b) {
            return Err(ExportError::Generic(format!(
                "row sets differ: {} vs {}",
                ours[position], theirs[position]
            )));
        }
        Ok(())
    }

    fn sorted_row_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.rows().map(|row| format!("{row:?}")).collect();
        keys.sort_unstable();
        keys
    }
}
