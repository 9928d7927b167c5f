//! Arrow interop for batches
//!
//! Every column type has one Arrow data type: scalars map to primitive,
//! boolean or string arrays, lists to `List<item>` and matrices to
//! `List<List<item>>`. The originating [`SchemaDescriptor`] travels in the
//! Arrow schema metadata so a decoded batch keeps its declared (not inferred)
//! schema.

use std::collections::HashMap;
use std::io::Cursor;
use std::sync::Arc;

use arrow::compute::concat_batches;
use arrow::datatypes::{DataType, Field, Schema, TimeUnit as ArrowTimeUnit};
use arrow::ipc::reader::StreamReader;
use arrow::ipc::writer::StreamWriter;
use arrow::record_batch::RecordBatch;

use crate::error::{ExportError, Result, SchemaError};
use crate::schema::{ColumnType, ScalarType, SchemaDescriptor, TimeUnit};

use super::Batch;

/// Schema metadata key holding the JSON-encoded [`SchemaDescriptor`].
pub const SCHEMA_METADATA_KEY: &str = "docarrow.schema";

const TIMEZONE: &str = "UTC";
const ITEM: &str = "item";

fn arrow_unit(unit: TimeUnit) -> ArrowTimeUnit {
    match unit {
        TimeUnit::Second => ArrowTimeUnit::Second,
        TimeUnit::Millisecond => ArrowTimeUnit::Millisecond,
        TimeUnit::Microsecond => ArrowTimeUnit::Microsecond,
        TimeUnit::Nanosecond => ArrowTimeUnit::Nanosecond,
    }
}

fn scalar_type(scalar: ScalarType) -> DataType {
    match scalar {
        ScalarType::Int32 => DataType::Int32,
        ScalarType::Int64 => DataType::Int64,
        ScalarType::Float64 => DataType::Float64,
        ScalarType::Boolean => DataType::Boolean,
        ScalarType::Utf8 => DataType::Utf8,
        ScalarType::Timestamp(unit) => DataType::Timestamp(arrow_unit(unit), Some(TIMEZONE.into())),
    }
}

fn list_of(inner: DataType) -> DataType {
    DataType::List(Arc::new(Field::new(ITEM, inner, true)))
}

/// Arrow data type of a column.
pub fn arrow_type(ty: &ColumnType) -> DataType {
    match ty {
        ColumnType::Scalar(scalar) => scalar_type(*scalar),
        ColumnType::List(inner) => list_of(arrow_type(inner)),
        ColumnType::Matrix { element, .. } => list_of(list_of(scalar_type(*element))),
    }
}

/// Arrow schema for a descriptor, with the descriptor attached as metadata.
pub fn arrow_schema(schema: &SchemaDescriptor) -> Result<Schema> {
    let fields: Vec<Field> = schema
        .columns()
        .iter()
        .map(|column| Field::new(column.name.clone(), arrow_type(&column.ty), true))
        .collect();

    let encoded = serde_json::to_string(schema)
        .map_err(|e| ExportError::Generic(format!("Failed to encode schema metadata: {e}")))?;
    let metadata = HashMap::from([(SCHEMA_METADATA_KEY.to_string(), encoded)]);

    Ok(Schema::new_with_metadata(fields, metadata))
}

fn descriptor_from_metadata(schema: &Schema) -> Result<SchemaDescriptor> {
    let encoded = schema.metadata().get(SCHEMA_METADATA_KEY).ok_or_else(|| {
        ExportError::Generic(format!("Arrow schema lacks '{SCHEMA_METADATA_KEY}' metadata"))
    })?;
    serde_json::from_str(encoded)
        .map_err(|e| ExportError::Generic(format!("Invalid schema metadata: {e}")))
}

/// Check that every column of `record_batch` has the Arrow type of its descriptor column.
fn check_columns(record_batch: &RecordBatch, descriptor: &SchemaDescriptor) -> Result<()> {
    if record_batch.num_columns() != descriptor.len() {
        return Err(SchemaError::ColumnCountMismatch {
            expected: descriptor.len(),
            found: record_batch.num_columns(),
        }
        .into());
    }

    for (position, (column, array)) in descriptor
        .columns()
        .iter()
        .zip(record_batch.columns())
        .enumerate()
    {
        let expected = arrow_type(&column.ty);
        if array.data_type() != &expected {
            return Err(SchemaError::ColumnMismatch {
                position,
                expected: format!("{}:{expected}", column.name),
                found: format!("{}:{}", column.name, array.data_type()),
            }
            .into());
        }
    }
    Ok(())
}

impl Batch {
    /// Wrap a `RecordBatch` carrying [`SCHEMA_METADATA_KEY`] metadata.
    ///
    /// Column types are checked against the embedded descriptor.
    pub fn from_record_batch(record_batch: RecordBatch, partition: usize) -> Result<Self> {
        let descriptor = descriptor_from_metadata(record_batch.schema_ref())?;
        check_columns(&record_batch, &descriptor)?;
        Ok(Batch {
            schema: Arc::new(descriptor),
            partition,
            data: record_batch,
        })
    }
}

/// Encode a batch as an Arrow IPC stream.
pub fn encode_ipc_stream(batch: &Batch) -> Result<Vec<u8>> {
    let record_batch = batch.record_batch();
    let mut buf = Vec::new();
    {
        let mut writer = StreamWriter::try_new(&mut buf, &record_batch.schema())?;
        writer.write(record_batch)?;
        writer.finish()?;
    }
    Ok(buf)
}

/// Decode an Arrow IPC stream back into one batch for `partition`.
///
/// A stream holding several record batches is concatenated; a stream with
/// none gives an empty batch under the stream's schema.
pub fn decode_ipc_stream(bytes: &[u8], partition: usize) -> Result<Batch> {
    let reader = StreamReader::try_new(Cursor::new(bytes), None)?;
    let schema = reader.schema();
    let record_batches = reader.collect::<std::result::Result<Vec<_>, _>>()?;
    let merged = concat_batches(&schema, &record_batches)?;
    Batch::from_record_batch(merged, partition)
}
