//! Columnar batches
//!
//! A [`BatchBuilder`] accumulates converted rows for one partition into Arrow
//! array builders, one per column. `finish()` freezes the builder into an
//! immutable [`Batch`] wrapping a `RecordBatch`; the builder rejects any
//! further use with [`FrozenBatchError`].
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use arrow::array::AsArray;
//! use docarrow::batch::BatchBuilder;
//! use docarrow::schema::SchemaDescriptor;
//! use mongodb::bson::doc;
//!
//! let schema = Arc::new(SchemaDescriptor::parse("id:int64, vec:list<int64>").unwrap());
//! let mut builder = BatchBuilder::new(schema, 0, 2);
//! builder.append_record(&doc! { "id": 1, "vec": [1, 2, 3] }).unwrap();
//! builder.append_record(&doc! { "id": 2, "vec": [4] }).unwrap();
//!
//! let batch = builder.finish().unwrap();
//! assert_eq!(batch.num_rows(), 2);
//! let vec = batch.column("vec").unwrap().as_list::<i32>();
//! assert_eq!(vec.value_offsets(), &[0, 3, 4]);
//! assert!(builder.finish().is_err());
//! ```

mod column;
mod interop;

pub use interop::{
    SCHEMA_METADATA_KEY, arrow_schema, arrow_type, decode_ipc_stream, encode_ipc_stream,
};
pub(crate) use column::value_at;

use std::sync::Arc;

use arrow::array::ArrayRef;
use arrow::record_batch::RecordBatch;
use mongodb::bson::Document;

use crate::convert::{self, Row, Value};
use crate::error::{ConversionError, FrozenBatchError, Result, SchemaError};
use crate::schema::SchemaDescriptor;

use column::ColumnBuilder;

/// Immutable block of rows produced by one partition
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    schema: Arc<SchemaDescriptor>,
    partition: usize,
    data: RecordBatch,
}

/// Growable columnar buffer for one partition
pub struct BatchBuilder {
    schema: Arc<SchemaDescriptor>,
    partition: usize,
    num_rows: usize,
    columns: Vec<ColumnBuilder>,
    frozen: bool,
}

impl BatchBuilder {
    /// Create a builder with room for `rows_hint` top-level rows.
    ///
    /// Nested lists start at the same capacity and grow on demand.
    pub fn new(schema: Arc<SchemaDescriptor>, partition: usize, rows_hint: usize) -> Self {
        let columns = schema
            .columns()
            .iter()
            .map(|column| ColumnBuilder::new(&column.ty, rows_hint))
            .collect();

        Self {
            schema,
            partition,
            num_rows: 0,
            columns,
            frozen: false,
        }
    }

    pub fn schema(&self) -> &Arc<SchemaDescriptor> {
        &self.schema
    }

    pub fn num_rows(&self) -> usize {
        self.num_rows
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    /// Append one converted row.
    ///
    /// The row must hold one value per column, each matching the column
    /// type. A rejected row leaves the builder unchanged.
    pub fn append_row(&mut self, row: &Row) -> Result<()> {
        if self.frozen {
            return Err(FrozenBatchError.into());
        }
        if row.len() != self.columns.len() {
            return Err(SchemaError::RowArity {
                expected: self.columns.len(),
                found: row.len(),
            }
            .into());
        }

        // Arrow builders cannot be truncated, so the whole row is checked first.
        for (i, (column, value)) in self.columns.iter().zip(row).enumerate() {
            column
                .check(value)
                .map_err(|found| self.mismatch(i, value, found))?;
        }
        for (i, (column, value)) in self.columns.iter_mut().zip(row).enumerate() {
            column.append(value).map_err(|found| {
                let column = &self.schema.columns()[i];
                ConversionError::TypeMismatch {
                    path: column.name.clone(),
                    expected: column.ty.to_string(),
                    found,
                }
            })?;
        }

        self.num_rows += 1;
        Ok(())
    }

    /// Convert `record` against the builder's schema and append it.
    pub fn append_record(&mut self, record: &Document) -> Result<()> {
        if self.frozen {
            return Err(FrozenBatchError.into());
        }
        let row = convert::convert(record, &self.schema)?;
        self.append_row(&row)
    }

    /// Freeze the accumulated rows into a [`Batch`].
    pub fn finish(&mut self) -> Result<Batch> {
        if self.frozen {
            return Err(FrozenBatchError.into());
        }
        self.frozen = true;

        let arrays: Vec<ArrayRef> = self.columns.iter_mut().map(ColumnBuilder::finish).collect();
        self.columns.clear();
        let data = RecordBatch::try_new(Arc::new(arrow_schema(&self.schema)?), arrays)?;

        Ok(Batch {
            schema: self.schema.clone(),
            partition: self.partition,
            data,
        })
    }

    fn mismatch(&self, column: usize, value: &Value, detail: String) -> ConversionError {
        let column = &self.schema.columns()[column];
        ConversionError::TypeMismatch {
            path: column.name.clone(),
            expected: column.ty.to_string(),
            found: format!("{} ({detail})", value.kind()),
        }
    }
}

impl std::fmt::Debug for BatchBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchBuilder")
            .field("schema", &self.schema.to_string())
            .field("partition", &self.partition)
            .field("num_rows", &self.num_rows)
            .field("frozen", &self.frozen)
            .finish()
    }
}

impl Batch {
    /// Zero-row batch carrying `schema`.
    pub fn empty(schema: Arc<SchemaDescriptor>, partition: usize) -> Result<Self> {
        let data = RecordBatch::new_empty(Arc::new(arrow_schema(&schema)?));
        Ok(Batch {
            schema,
            partition,
            data,
        })
    }

    pub fn schema(&self) -> &Arc<SchemaDescriptor> {
        &self.schema
    }

    /// Index of the partition that produced this batch.
    pub fn partition(&self) -> usize {
        self.partition
    }

    pub fn num_rows(&self) -> usize {
        self.data.num_rows()
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

    /// Read row `index` back as converted values.
    ///
    /// # Panics
    /// If `index` is not below [`Batch::num_rows`].
    pub fn row(&self, index: usize) -> Row {
        self.schema
            .columns()
            .iter()
            .zip(self.data.columns())
            .map(|(column, array)| value_at(array.as_ref(), &column.ty, index))
            .collect()
    }

    /// The underlying Arrow `RecordBatch`.
    pub fn record_batch(&self) -> &RecordBatch {
        &self.data
    }

    pub fn into_record_batch(self) -> RecordBatch {
        self.data
    }
}
