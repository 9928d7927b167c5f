//! Compact type grammar for schema descriptors
//!
//! ```text
//! schema  := column ("," column)*
//! column  := name ":" type
//! type    := scalar | "list<" type ">" | "matrix<" scalar "," rows "," cols ">"
//! scalar  := int32 | int64 | int | float64 | float | double | bool | boolean
//!          | string | utf8 | timestamp | timestamp[s|ms|us|ns]
//! ```

use std::str::FromStr;

use crate::error::SchemaError;

use super::{Column, ColumnType, ScalarType, SchemaDescriptor, TimeUnit};

/// Parse a full schema expression.
pub fn parse_schema(input: &str) -> Result<SchemaDescriptor, SchemaError> {
    let mut columns = Vec::new();

    for part in split_top_level(input)? {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }
        let (name, ty) = part
            .split_once(':')
            .ok_or_else(|| SchemaError::InvalidType(format!("expected name:type, got '{part}'")))?;
        let name = name.trim();
        if name.is_empty() {
            return Err(SchemaError::InvalidType(format!("missing column name in '{part}'")));
        }
        columns.push(Column::new(name, ty.parse()?));
    }

    SchemaDescriptor::new(columns)
}

/// Split at commas that are not nested inside `<...>`.
fn split_top_level(input: &str) -> Result<Vec<&str>, SchemaError> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;

    for (i, ch) in input.char_indices() {
        match ch {
            '<' => depth += 1,
            '>' => {
                depth = depth
                    .checked_sub(1)
                    .ok_or_else(|| SchemaError::InvalidType(format!("unbalanced '>' in '{input}'")))?;
            }
            ',' if depth == 0 => {
                parts.push(&input[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }

    if depth != 0 {
        return Err(SchemaError::InvalidType(format!("unbalanced '<' in '{input}'")));
    }
    parts.push(&input[start..]);
    Ok(parts)
}

/// Strip `prefix<` ... `>` and return the inside.
fn generic_args<'a>(input: &'a str, prefix: &str) -> Option<&'a str> {
    let rest = input.strip_prefix(prefix)?.trim_start();
    rest.strip_prefix('<')?.strip_suffix('>')
}

fn parse_dimension(input: &str, what: &str) -> Result<usize, SchemaError> {
    input
        .trim()
        .parse::<usize>()
        .map_err(|_| SchemaError::InvalidType(format!("invalid matrix {what} '{}'", input.trim())))
}

impl FromStr for TimeUnit {
    type Err = SchemaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "s" => Ok(TimeUnit::Second),
            "ms" => Ok(TimeUnit::Millisecond),
            "us" => Ok(TimeUnit::Microsecond),
            "ns" => Ok(TimeUnit::Nanosecond),
            other => Err(SchemaError::InvalidType(format!("unknown time unit '{other}'"))),
        }
    }
}

impl FromStr for ScalarType {
    type Err = SchemaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lowered = s.trim().to_ascii_lowercase();
        let scalar = match lowered.as_str() {
            "int32" => ScalarType::Int32,
            "int64" | "int" => ScalarType::Int64,
            "float64" | "float" | "double" => ScalarType::Float64,
            "bool" | "boolean" => ScalarType::Boolean,
            "string" | "utf8" => ScalarType::Utf8,
            "timestamp" => ScalarType::Timestamp(TimeUnit::Millisecond),
            other => {
                let unit = other
                    .strip_prefix("timestamp[")
                    .and_then(|rest| rest.strip_suffix(']'))
                    .ok_or_else(|| SchemaError::InvalidType(format!("unknown type '{}'", s.trim())))?;
                ScalarType::Timestamp(unit.parse()?)
            }
        };
        Ok(scalar)
    }
}

impl FromStr for ColumnType {
    type Err = SchemaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lowered = s.trim().to_ascii_lowercase();

        if let Some(inner) = generic_args(&lowered, "list") {
            return Ok(ColumnType::list(inner.parse()?));
        }

        if let Some(args) = generic_args(&lowered, "matrix") {
            let parts = split_top_level(args)?;
            let [element, rows, cols] = parts.as_slice() else {
                return Err(SchemaError::InvalidType(format!(
                    "matrix needs <element,rows,cols>, got '{}'",
                    s.trim()
                )));
            };
            return Ok(ColumnType::matrix(
                element.parse()?,
                parse_dimension(rows, "rows")?,
                parse_dimension(cols, "cols")?,
            ));
        }

        Ok(ColumnType::Scalar(lowered.parse()?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_scalars() {
        assert_eq!("int".parse::<ColumnType>().unwrap(), ColumnType::int64());
        assert_eq!("Int32".parse::<ColumnType>().unwrap(), ColumnType::int32());
        assert_eq!("double".parse::<ColumnType>().unwrap(), ColumnType::float64());
        assert_eq!("utf8".parse::<ColumnType>().unwrap(), ColumnType::utf8());
        assert_eq!(
            "timestamp".parse::<ColumnType>().unwrap(),
            ColumnType::timestamp(TimeUnit::Millisecond)
        );
        assert_eq!(
            "timestamp[us]".parse::<ColumnType>().unwrap(),
            ColumnType::timestamp(TimeUnit::Microsecond)
        );
    }

    #[test]
    fn test_parse_nested() {
        assert_eq!(
            "list<list<int32>>".parse::<ColumnType>().unwrap(),
            ColumnType::list(ColumnType::list(ColumnType::int32()))
        );
        assert_eq!(
            "matrix<float64, 64, 64>".parse::<ColumnType>().unwrap(),
            ColumnType::matrix(ScalarType::Float64, 64, 64)
        );
    }

    #[test]
    fn test_display_round_trips_through_parser() {
        let schema = parse_schema(
            "id:int, vec_int:list<int64>, nested_matrix:matrix<float64,64,64>, labels:list<int32>, timestamp:timestamp[ms]",
        )
        .unwrap();
        let reparsed = parse_schema(&schema.to_string()).unwrap();
        assert_eq!(schema, reparsed);
    }

    #[test]
    fn test_parse_errors() {
        assert!("list<int64".parse::<ColumnType>().is_err());
        assert!("matrix<float64,64>".parse::<ColumnType>().is_err());
        assert!("matrix<float64,x,4>".parse::<ColumnType>().is_err());
        assert!("timestamp[hours]".parse::<ColumnType>().is_err());
        assert!("decimal".parse::<ColumnType>().is_err());
        assert!(parse_schema("id").is_err());
        assert!(parse_schema(":int64").is_err());
        assert!(matches!(
            parse_schema("a:int64,a:int64"),
            Err(SchemaError::DuplicateColumn(_))
        ));
    }
}
