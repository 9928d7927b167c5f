//! Per-column Arrow builders
//!
//! Each column is backed by the builder `make_builder` picks for its Arrow
//! type. Lists and matrices are `ListBuilder<Box<dyn ArrayBuilder>>` nested
//! one level per list.

use arrow::array::{
    Array, ArrayBuilder, ArrayRef, AsArray, BooleanBuilder, ListBuilder, PrimitiveBuilder,
    StringBuilder, make_builder,
};
use arrow::datatypes::{
    ArrowPrimitiveType, Float64Type, Int32Type, Int64Type, TimestampMicrosecondType,
    TimestampMillisecondType, TimestampNanosecondType, TimestampSecondType,
};

use crate::convert::Value;
use crate::schema::{ColumnType, ScalarType, TimeUnit};

use super::arrow_type;

/// Growable Arrow array for one column
pub(crate) struct ColumnBuilder {
    ty: ColumnType,
    inner: Box<dyn ArrayBuilder>,
}

impl ColumnBuilder {
    pub(crate) fn new(ty: &ColumnType, capacity: usize) -> Self {
        Self {
            ty: ty.clone(),
            inner: make_builder(&arrow_type(ty), capacity),
        }
    }

    /// Check that `value` fits the column without touching the builder.
    pub(crate) fn check(&self, value: &Value) -> Result<(), String> {
        check(&self.ty, value)
    }

    /// Append a value already accepted by [`ColumnBuilder::check`].
    pub(crate) fn append(&mut self, value: &Value) -> Result<(), String> {
        append(&mut *self.inner, &self.ty, value)
    }

    pub(crate) fn finish(&mut self) -> ArrayRef {
        self.inner.finish()
    }
}

fn matrix_row(element: ScalarType) -> ColumnType {
    ColumnType::list(ColumnType::Scalar(element))
}

fn mismatch(expected: impl std::fmt::Display, value: &Value) -> String {
    format!("{} value for {expected} column", value.kind())
}

fn check(ty: &ColumnType, value: &Value) -> Result<(), String> {
    match (ty, value) {
        (_, Value::Null) => Ok(()),
        (ColumnType::Scalar(scalar), value) => {
            let fits = matches!(
                (scalar, value),
                (ScalarType::Int32, Value::Int32(_))
                    | (ScalarType::Int64, Value::Int64(_))
                    | (ScalarType::Float64, Value::Float64(_))
                    | (ScalarType::Boolean, Value::Boolean(_))
                    | (ScalarType::Utf8, Value::Utf8(_))
                    | (ScalarType::Timestamp(_), Value::Timestamp(_))
            );
            if fits { Ok(()) } else { Err(mismatch(scalar, value)) }
        }
        (ColumnType::List(inner), Value::List(items)) => {
            items.iter().try_for_each(|item| check(inner, item))
        }
        (ColumnType::Matrix { element, .. }, Value::List(rows)) => {
            let row = matrix_row(*element);
            rows.iter().try_for_each(|item| check(&row, item))
        }
        (ty, value) => Err(mismatch(ty, value)),
    }
}

fn downcast<B: ArrayBuilder>(builder: &mut dyn ArrayBuilder) -> Result<&mut B, String> {
    builder
        .as_any_mut()
        .downcast_mut::<B>()
        .ok_or_else(|| format!("column builder is not a {}", std::any::type_name::<B>()))
}

fn primitive<T: ArrowPrimitiveType>(
    builder: &mut dyn ArrayBuilder,
    value: Option<T::Native>,
) -> Result<(), String> {
    downcast::<PrimitiveBuilder<T>>(builder)?.append_option(value);
    Ok(())
}

fn append(builder: &mut dyn ArrayBuilder, ty: &ColumnType, value: &Value) -> Result<(), String> {
    match ty {
        ColumnType::Scalar(scalar) => append_scalar(builder, *scalar, value),
        ColumnType::List(inner) => append_list(builder, inner, value),
        ColumnType::Matrix { element, .. } => append_list(builder, &matrix_row(*element), value),
    }
}

fn append_list(
    builder: &mut dyn ArrayBuilder,
    inner: &ColumnType,
    value: &Value,
) -> Result<(), String> {
    let list = downcast::<ListBuilder<Box<dyn ArrayBuilder>>>(builder)?;
    match value {
        Value::Null => list.append_null(),
        Value::List(items) => {
            for item in items {
                append(&mut **list.values(), inner, item)?;
            }
            list.append(true);
        }
        other => return Err(mismatch("list", other)),
    }
    Ok(())
}

fn append_scalar(
    builder: &mut dyn ArrayBuilder,
    scalar: ScalarType,
    value: &Value,
) -> Result<(), String> {
    match (scalar, value) {
        (ScalarType::Int32, Value::Int32(n)) => primitive::<Int32Type>(builder, Some(*n)),
        (ScalarType::Int32, Value::Null) => primitive::<Int32Type>(builder, None),
        (ScalarType::Int64, Value::Int64(n)) => primitive::<Int64Type>(builder, Some(*n)),
        (ScalarType::Int64, Value::Null) => primitive::<Int64Type>(builder, None),
        (ScalarType::Float64, Value::Float64(f)) => primitive::<Float64Type>(builder, Some(*f)),
        (ScalarType::Float64, Value::Null) => primitive::<Float64Type>(builder, None),
        (ScalarType::Boolean, Value::Boolean(b)) => {
            downcast::<BooleanBuilder>(builder)?.append_value(*b);
            Ok(())
        }
        (ScalarType::Boolean, Value::Null) => {
            downcast::<BooleanBuilder>(builder)?.append_null();
            Ok(())
        }
        (ScalarType::Utf8, Value::Utf8(s)) => {
            downcast::<StringBuilder>(builder)?.append_value(s);
            Ok(())
        }
        (ScalarType::Utf8, Value::Null) => {
            downcast::<StringBuilder>(builder)?.append_null();
            Ok(())
        }
        (ScalarType::Timestamp(unit), Value::Timestamp(n)) => timestamp(builder, unit, Some(*n)),
        (ScalarType::Timestamp(unit), Value::Null) => timestamp(builder, unit, None),
        (scalar, value) => Err(mismatch(scalar, value)),
    }
}

fn timestamp(builder: &mut dyn ArrayBuilder, unit: TimeUnit, value: Option<i64>) -> Result<(), String> {
    match unit {
        TimeUnit::Second => primitive::<TimestampSecondType>(builder, value),
        TimeUnit::Millisecond => primitive::<TimestampMillisecondType>(builder, value),
        TimeUnit::Microsecond => primitive::<TimestampMicrosecondType>(builder, value),
        TimeUnit::Nanosecond => primitive::<TimestampNanosecondType>(builder, value),
    }
}

/// Read slot `row` of an array of type `arrow_type(ty)` back as a [`Value`].
pub(crate) fn value_at(array: &dyn Array, ty: &ColumnType, row: usize) -> Value {
    if array.is_null(row) {
        return Value::Null;
    }

    match ty {
        ColumnType::Scalar(scalar) => scalar_at(array, *scalar, row),
        ColumnType::List(inner) => list_at(array, inner, row),
        ColumnType::Matrix { element, .. } => list_at(array, &matrix_row(*element), row),
    }
}

fn list_at(array: &dyn Array, inner: &ColumnType, row: usize) -> Value {
    let items = array.as_list::<i32>().value(row);
    Value::List(
        (0..items.len())
            .map(|i| value_at(items.as_ref(), inner, i))
            .collect(),
    )
}

fn scalar_at(array: &dyn Array, scalar: ScalarType, row: usize) -> Value {
    match scalar {
        ScalarType::Int32 => Value::Int32(array.as_primitive::<Int32Type>().value(row)),
        ScalarType::Int64 => Value::Int64(array.as_primitive::<Int64Type>().value(row)),
        ScalarType::Float64 => Value::Float64(array.as_primitive::<Float64Type>().value(row)),
        ScalarType::Boolean => Value::Boolean(array.as_boolean().value(row)),
        ScalarType::Utf8 => Value::Utf8(array.as_string::<i32>().value(row).to_string()),
        ScalarType::Timestamp(unit) => Value::Timestamp(match unit {
            TimeUnit::Second => array.as_primitive::<TimestampSecondType>().value(row),
            TimeUnit::Millisecond => array.as_primitive::<TimestampMillisecondType>().value(row),
            TimeUnit::Microsecond => array.as_primitive::<TimestampMicrosecondType>().value(row),
            TimeUnit::Nanosecond => array.as_primitive::<TimestampNanosecondType>().value(row),
        }),
    }
}
