//! Schema descriptors for columnar export
//!
//! A [`SchemaDescriptor`] is the caller-declared target layout: an ordered list of
//! named columns, each with a [`ColumnType`]. Descriptors are immutable once
//! built and are shared between workers behind an `Arc`.
//!
//! Column types can be written in a compact grammar, see [`parse`]:
//!
//! ```rust
//! use docarrow::schema::SchemaDescriptor;
//!
//! let schema: SchemaDescriptor =
//!     "id:int64, vec_float:list<float64>, nested_matrix:matrix<float64,64,64>, timestamp:timestamp[ms]"
//!         .parse()
//!         .unwrap();
//! assert_eq!(schema.len(), 4);
//! assert_eq!(schema.index_of("nested_matrix"), Some(2));
//! ```

pub mod parse;

use std::fmt;

use mongodb::bson::Document;
use serde::{Deserialize, Serialize};

use crate::error::SchemaError;

/// Maximum nesting depth accepted for a column type.
pub const MAX_NESTING_DEPTH: usize = 16;

/// Resolution of timestamp columns
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeUnit {
    Second,
    Millisecond,
    Microsecond,
    Nanosecond,
}

/// Primitive column value types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScalarType {
    Int32,
    Int64,
    Float64,
    Boolean,
    Utf8,
    Timestamp(TimeUnit),
}

/// Column type, possibly nested
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    /// Single primitive value per row.
    Scalar(ScalarType),

    /// Variable-length sequence of the inner type.
    List(Box<ColumnType>),

    /// `rows` sequences of exactly `cols` primitive values.
    Matrix {
        element: ScalarType,
        rows: usize,
        cols: usize,
    },
}

/// Named column of a schema
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: ColumnType,
}

/// Ordered, validated set of target columns
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Column>", into = "Vec<Column>")]
pub struct SchemaDescriptor {
    columns: Vec<Column>,
}

impl TimeUnit {
    /// Nanoseconds in one unit.
    pub fn nanos_per_unit(self) -> i128 {
        match self {
            TimeUnit::Second => 1_000_000_000,
            TimeUnit::Millisecond => 1_000_000,
            TimeUnit::Microsecond => 1_000,
            TimeUnit::Nanosecond => 1,
        }
    }

    /// Short suffix used in the type grammar.
    pub fn suffix(self) -> &'static str {
        match self {
            TimeUnit::Second => "s",
            TimeUnit::Millisecond => "ms",
            TimeUnit::Microsecond => "us",
            TimeUnit::Nanosecond => "ns",
        }
    }
}

impl ColumnType {
    pub fn int32() -> Self {
        ColumnType::Scalar(ScalarType::Int32)
    }

    pub fn int64() -> Self {
        ColumnType::Scalar(ScalarType::Int64)
    }

    pub fn float64() -> Self {
        ColumnType::Scalar(ScalarType::Float64)
    }

    pub fn boolean() -> Self {
        ColumnType::Scalar(ScalarType::Boolean)
    }

    pub fn utf8() -> Self {
        ColumnType::Scalar(ScalarType::Utf8)
    }

    pub fn timestamp(unit: TimeUnit) -> Self {
        ColumnType::Scalar(ScalarType::Timestamp(unit))
    }

    pub fn list(inner: ColumnType) -> Self {
        ColumnType::List(Box::new(inner))
    }

    pub fn matrix(element: ScalarType, rows: usize, cols: usize) -> Self {
        ColumnType::Matrix {
            element,
            rows,
            cols,
        }
    }

    /// Number of offset-encoded levels below this type.
    pub fn depth(&self) -> usize {
        match self {
            ColumnType::Scalar(_) => 0,
            ColumnType::List(inner) => 1 + inner.depth(),
            ColumnType::Matrix { .. } => 2,
        }
    }
}

impl Column {
    pub fn new(name: impl Into<String>, ty: ColumnType) -> Self {
        Self {
            name: name.into(),
            ty,
        }
    }
}

impl SchemaDescriptor {
    /// Build a descriptor from ordered columns.
    ///
    /// Fails when no column is given, when two columns share a name, or when a
    /// column nests deeper than [`MAX_NESTING_DEPTH`].
    pub fn new(columns: Vec<Column>) -> Result<Self, SchemaError> {
        if columns.is_empty() {
            return Err(SchemaError::Empty);
        }

        for (i, column) in columns.iter().enumerate() {
            if columns[..i].iter().any(|c| c.name == column.name) {
                return Err(SchemaError::DuplicateColumn(column.name.clone()));
            }
            if let ColumnType::Matrix { rows, cols, .. } = column.ty
                && (rows == 0 || cols == 0)
            {
                return Err(SchemaError::InvalidType(format!(
                    "matrix column '{}' needs non-zero dimensions",
                    column.name
                )));
            }
            let depth = column.ty.depth();
            if depth > MAX_NESTING_DEPTH {
                return Err(SchemaError::TooDeep {
                    column: column.name.clone(),
                    depth,
                });
            }
        }

        Ok(Self { columns })
    }

    /// Build a descriptor from `(name, type)` pairs.
    pub fn from_pairs<I, S>(pairs: I) -> Result<Self, SchemaError>
    where
        I: IntoIterator<Item = (S, ColumnType)>,
        S: Into<String>,
    {
        Self::new(
            pairs
                .into_iter()
                .map(|(name, ty)| Column::new(name, ty))
                .collect(),
        )
    }

    /// Parse a descriptor from `name:type` pairs separated by commas.
    pub fn parse(input: &str) -> Result<Self, SchemaError> {
        parse::parse_schema(input)
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column_at(&self, position: usize) -> Option<&Column> {
        self.columns.get(position)
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    /// Verify `other` is structurally identical: same column count, and the
    /// same name and type at every position.
    pub fn ensure_same(&self, other: &SchemaDescriptor) -> Result<(), SchemaError> {
        if self.columns.len() != other.columns.len() {
            return Err(SchemaError::ColumnCountMismatch {
                expected: self.columns.len(),
                found: other.columns.len(),
            });
        }

        for (position, (expected, found)) in self.columns.iter().zip(&other.columns).enumerate() {
            if expected != found {
                return Err(SchemaError::ColumnMismatch {
                    position,
                    expected: expected.to_string(),
                    found: found.to_string(),
                });
            }
        }

        Ok(())
    }

    /// Projection document limiting a query to the schema's fields.
    pub fn projection(&self) -> Document {
        let mut projection = Document::new();
        for column in &self.columns {
            projection.insert(column.name.clone(), 1);
        }
        if !projection.contains_key("_id") {
            projection.insert("_id", 0);
        }
        projection
    }
}

impl TryFrom<Vec<Column>> for SchemaDescriptor {
    type Error = SchemaError;

    fn try_from(columns: Vec<Column>) -> Result<Self, Self::Error> {
        Self::new(columns)
    }
}

impl From<SchemaDescriptor> for Vec<Column> {
    fn from(schema: SchemaDescriptor) -> Self {
        schema.columns
    }
}

impl std::str::FromStr for SchemaDescriptor {
    type Err = SchemaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for ScalarType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScalarType::Int32 => write!(f, "int32"),
            ScalarType::Int64 => write!(f, "int64"),
            ScalarType::Float64 => write!(f, "float64"),
            ScalarType::Boolean => write!(f, "bool"),
            ScalarType::Utf8 => write!(f, "string"),
            ScalarType::Timestamp(unit) => write!(f, "timestamp[{}]", unit.suffix()),
        }
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColumnType::Scalar(scalar) => write!(f, "{scalar}"),
            ColumnType::List(inner) => write!(f, "list<{inner}>"),
            ColumnType::Matrix {
                element,
                rows,
                cols,
            } => write!(f, "matrix<{element},{rows},{cols}>"),
        }
    }
}

impl fmt::Display for Column {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.name, self.ty)
    }
}

impl fmt::Display for SchemaDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, column) in self.columns.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{column}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn heavy_schema() -> SchemaDescriptor {
        SchemaDescriptor::from_pairs([
            ("id", ColumnType::int64()),
            ("vec_float", ColumnType::list(ColumnType::float64())),
            ("nested_matrix", ColumnType::matrix(ScalarType::Float64, 64, 64)),
            ("timestamp", ColumnType::timestamp(TimeUnit::Millisecond)),
        ])
        .unwrap()
    }

    #[test]
    fn test_lookup_by_name_and_position() {
        let schema = heavy_schema();
        assert_eq!(schema.index_of("vec_float"), Some(1));
        assert_eq!(schema.column_at(3).unwrap().name, "timestamp");
        assert!(schema.column("missing").is_none());
    }

    #[test]
    fn test_duplicate_column_rejected() {
        let err = SchemaDescriptor::from_pairs([
            ("id", ColumnType::int64()),
            ("id", ColumnType::int32()),
        ])
        .unwrap_err();
        assert_eq!(err, SchemaError::DuplicateColumn("id".to_string()));
    }

    #[test]
    fn test_empty_schema_rejected() {
        assert_eq!(SchemaDescriptor::new(vec![]).unwrap_err(), SchemaError::Empty);
    }

    #[test]
    fn test_too_deep_rejected() {
        let mut ty = ColumnType::int64();
        for _ in 0..=MAX_NESTING_DEPTH {
            ty = ColumnType::list(ty);
        }
        let err = SchemaDescriptor::from_pairs([("deep", ty)]).unwrap_err();
        assert!(matches!(err, SchemaError::TooDeep { .. }));
    }

    #[test]
    fn test_ensure_same_reports_column() {
        let a = heavy_schema();
        let b = SchemaDescriptor::from_pairs([
            ("id", ColumnType::int64()),
            ("vec_float", ColumnType::list(ColumnType::int64())),
            ("nested_matrix", ColumnType::matrix(ScalarType::Float64, 64, 64)),
            ("timestamp", ColumnType::timestamp(TimeUnit::Millisecond)),
        ])
        .unwrap();

        assert!(a.ensure_same(&a.clone()).is_ok());
        match a.ensure_same(&b).unwrap_err() {
            SchemaError::ColumnMismatch {
                position,
                expected,
                found,
            } => {
                assert_eq!(position, 1);
                assert_eq!(expected, "vec_float:list<float64>");
                assert_eq!(found, "vec_float:list<int64>");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_ensure_same_detects_matrix_shape() {
        let a = SchemaDescriptor::from_pairs([("m", ColumnType::matrix(ScalarType::Float64, 4, 4))])
            .unwrap();
        let b = SchemaDescriptor::from_pairs([("m", ColumnType::matrix(ScalarType::Float64, 4, 3))])
            .unwrap();
        assert!(a.ensure_same(&b).is_err());
    }

    #[test]
    fn test_projection_excludes_id_unless_declared() {
        let schema = heavy_schema();
        let projection = schema.projection();
        assert_eq!(projection.get_i32("id").unwrap(), 1);
        assert_eq!(projection.get_i32("_id").unwrap(), 0);

        let with_id = SchemaDescriptor::from_pairs([("_id", ColumnType::utf8())]).unwrap();
        assert_eq!(with_id.projection().get_i32("_id").unwrap(), 1);
    }

    #[test]
    fn test_serde_validates_on_deserialize() {
        let json = r#"[{"name":"a","type":{"scalar":"int64"}},{"name":"a","type":{"scalar":"int32"}}]"#;
        assert!(serde_json::from_str::<SchemaDescriptor>(json).is_err());

        let schema = heavy_schema();
        let encoded = serde_json::to_string(&schema).unwrap();
        let decoded: SchemaDescriptor = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded, schema);
    }
}
