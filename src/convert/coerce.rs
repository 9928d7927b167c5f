//! Lossless scalar coercion

use chrono::DateTime;
use mongodb::bson::Bson;

use crate::error::ConversionError;
use crate::schema::{ScalarType, TimeUnit};

use super::Path;
use super::value::Value;

/// Largest integer magnitude an f64 represents exactly.
const MAX_SAFE_FLOAT_INT: u64 = 1 << 53;

/// Name of a BSON value's type, as reported in conversion errors.
pub fn bson_type_name(value: &Bson) -> &'static str {
    match value {
        Bson::Double(_) => "double",
        Bson::String(_) => "string",
        Bson::Array(_) => "array",
        Bson::Document(_) => "document",
        Bson::Boolean(_) => "bool",
        Bson::Null => "null",
        Bson::RegularExpression(_) => "regex",
        Bson::Int32(_) => "int32",
        Bson::Int64(_) => "int64",
        Bson::Timestamp(_) => "bson timestamp",
        Bson::Binary(_) => "binary",
        Bson::ObjectId(_) => "objectId",
        Bson::DateTime(_) => "date",
        Bson::Decimal128(_) => "decimal128",
        Bson::Undefined => "undefined",
        Bson::MaxKey => "maxKey",
        Bson::MinKey => "minKey",
        _ => "unsupported",
    }
}

fn mismatch(value: &Bson, expected: ScalarType, path: Path<'_>) -> ConversionError {
    ConversionError::TypeMismatch {
        path: path.to_string(),
        expected: expected.to_string(),
        found: bson_type_name(value).to_string(),
    }
}

fn out_of_range(value: &Bson, expected: ScalarType, path: Path<'_>) -> ConversionError {
    ConversionError::TypeMismatch {
        path: path.to_string(),
        expected: expected.to_string(),
        found: format!("{} out of range ({value})", bson_type_name(value)),
    }
}

/// Integral, finite doubles only.
fn integral(f: f64) -> Option<f64> {
    (f.is_finite() && f.fract() == 0.0).then_some(f)
}

/// Coerce a non-null BSON value to `expected`.
pub(super) fn scalar(
    value: &Bson,
    expected: ScalarType,
    path: Path<'_>,
) -> Result<Value, ConversionError> {
    match (expected, value) {
        (ScalarType::Int64, Bson::Int32(n)) => Ok(Value::Int64(i64::from(*n))),
        (ScalarType::Int64, Bson::Int64(n)) => Ok(Value::Int64(*n)),
        (ScalarType::Int64, Bson::Double(f)) => integral(*f)
            .filter(|f| *f >= i64::MIN as f64 && *f < i64::MAX as f64)
            .map(|f| Value::Int64(f as i64))
            .ok_or_else(|| out_of_range(value, expected, path)),

        (ScalarType::Int32, Bson::Int32(n)) => Ok(Value::Int32(*n)),
        (ScalarType::Int32, Bson::Int64(n)) => i32::try_from(*n)
            .map(Value::Int32)
            .map_err(|_| out_of_range(value, expected, path)),
        (ScalarType::Int32, Bson::Double(f)) => integral(*f)
            .filter(|f| *f >= f64::from(i32::MIN) && *f <= f64::from(i32::MAX))
            .map(|f| Value::Int32(f as i32))
            .ok_or_else(|| out_of_range(value, expected, path)),

        (ScalarType::Float64, Bson::Double(f)) => Ok(Value::Float64(*f)),
        (ScalarType::Float64, Bson::Int32(n)) => Ok(Value::Float64(f64::from(*n))),
        (ScalarType::Float64, Bson::Int64(n)) => {
            if n.unsigned_abs() <= MAX_SAFE_FLOAT_INT {
                Ok(Value::Float64(*n as f64))
            } else {
                Err(out_of_range(value, expected, path))
            }
        }

        (ScalarType::Boolean, Bson::Boolean(b)) => Ok(Value::Boolean(*b)),
        (ScalarType::Utf8, Bson::String(s)) => Ok(Value::Utf8(s.clone())),

        (ScalarType::Timestamp(unit), Bson::DateTime(dt)) => {
            let nanos = i128::from(dt.timestamp_millis()) * 1_000_000;
            to_unit(nanos, unit).ok_or_else(|| out_of_range(value, expected, path))
        }
        (ScalarType::Timestamp(unit), Bson::String(s)) => {
            let parsed = DateTime::parse_from_rfc3339(s).map_err(|_| ConversionError::TypeMismatch {
                path: path.to_string(),
                expected: expected.to_string(),
                found: format!("string without timezone-aware instant ({s:?})"),
            })?;
            let nanos = i128::from(parsed.timestamp()) * 1_000_000_000
                + i128::from(parsed.timestamp_subsec_nanos());
            to_unit(nanos, unit).ok_or_else(|| out_of_range(value, expected, path))
        }

        _ => Err(mismatch(value, expected, path)),
    }
}

/// Nanoseconds since the epoch to `unit`, truncating toward zero.
fn to_unit(nanos: i128, unit: TimeUnit) -> Option<Value> {
    i64::try_from(nanos / unit.nanos_per_unit())
        .ok()
        .map(Value::Timestamp)
}
