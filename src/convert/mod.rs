//! Record conversion
//!
//! Maps one BSON document onto a [`Row`] that conforms to a
//! [`SchemaDescriptor`]. Conversion is exhaustive against the declared types:
//! every value is either coerced without loss or rejected with a
//! [`ConversionError`] that names the offending path (`nested_matrix[3][10]`).
//!
//! Missing fields and explicit BSON nulls become [`Value::Null`].

mod coerce;
mod value;

pub use coerce::bson_type_name;
pub use value::{Row, Value, format_timestamp};

use std::fmt;

use mongodb::bson::{Bson, Document};

use crate::error::ConversionError;
use crate::schema::{ColumnType, SchemaDescriptor};

/// Location of a value inside a record, rendered only on failure.
#[derive(Clone, Copy)]
pub(crate) enum Path<'a> {
    Field(&'a str),
    Index(&'a Path<'a>, usize),
}

impl fmt::Display for Path<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Path::Field(name) => write!(f, "{name}"),
            Path::Index(parent, i) => write!(f, "{parent}[{i}]"),
        }
    }
}

/// Convert a record into a row of `schema`.
pub fn convert(record: &Document, schema: &SchemaDescriptor) -> Result<Row, ConversionError> {
    schema
        .columns()
        .iter()
        .map(|column| {
            convert_value(
                lookup(record, &column.name),
                &column.ty,
                Path::Field(&column.name),
            )
        })
        .collect()
}

/// Find a field by exact key, falling back to a dotted path.
pub fn lookup<'a>(record: &'a Document, name: &str) -> Option<&'a Bson> {
    if let Some(value) = record.get(name) {
        return Some(value);
    }
    if !name.contains('.') {
        return None;
    }

    let mut segments = name.split('.');
    let mut current = record.get(segments.next()?)?;
    for segment in segments {
        current = match current {
            Bson::Document(doc) => doc.get(segment)?,
            _ => return None,
        };
    }
    Some(current)
}

fn convert_value(
    value: Option<&Bson>,
    ty: &ColumnType,
    path: Path<'_>,
) -> Result<Value, ConversionError> {
    let value = match value {
        None | Some(Bson::Null) | Some(Bson::Undefined) => return Ok(Value::Null),
        Some(v) => v,
    };

    match ty {
        ColumnType::Scalar(scalar) => coerce::scalar(value, *scalar, path),
        ColumnType::List(inner) => {
            let items = expect_array(value, ty, path)?;
            let mut converted = Vec::with_capacity(items.len());
            for (i, item) in items.iter().enumerate() {
                converted.push(convert_value(Some(item), inner, Path::Index(&path, i))?);
            }
            Ok(Value::List(converted))
        }
        ColumnType::Matrix {
            element,
            rows,
            cols,
        } => {
            let outer = expect_array(value, ty, path)?;
            if outer.len() != *rows {
                return Err(ConversionError::Shape {
                    path: path.to_string(),
                    expected: *rows,
                    found: outer.len(),
                });
            }

            let mut converted = Vec::with_capacity(*rows);
            for (r, row) in outer.iter().enumerate() {
                let row_path = Path::Index(&path, r);
                let cells = match row {
                    Bson::Array(cells) => cells,
                    other => {
                        return Err(ConversionError::TypeMismatch {
                            path: row_path.to_string(),
                            expected: format!("list<{element}>"),
                            found: bson_type_name(other).to_string(),
                        });
                    }
                };
                if cells.len() != *cols {
                    return Err(ConversionError::Shape {
                        path: row_path.to_string(),
                        expected: *cols,
                        found: cells.len(),
                    });
                }

                let mut converted_row = Vec::with_capacity(*cols);
                for (c, cell) in cells.iter().enumerate() {
                    let cell_path = Path::Index(&row_path, c);
                    converted_row.push(match cell {
                        Bson::Null | Bson::Undefined => Value::Null,
                        cell => coerce::scalar(cell, *element, cell_path)?,
                    });
                }
                converted.push(Value::List(converted_row));
            }
            Ok(Value::List(converted))
        }
    }
}

fn expect_array<'a>(
    value: &'a Bson,
    ty: &ColumnType,
    path: Path<'_>,
) -> Result<&'a Vec<Bson>, ConversionError> {
    match value {
        Bson::Array(items) => Ok(items),
        other => Err(ConversionError::TypeMismatch {
            path: path.to_string(),
            expected: ty.to_string(),
            found: bson_type_name(other).to_string(),
        }),
    }
}
