use std::{fmt, io};

use serde::{Deserialize, Serialize};

/// Crate-wide `Result` type using [`ExportError`] as the error.
pub type Result<T> = std::result::Result<T, ExportError>;

/// Top-level error type for export operations.
#[derive(Debug)]
pub enum ExportError {
    /// Schema construction or structural mismatch.
    Schema(SchemaError),

    /// A record failed conversion. `partition` is set once the failure has
    /// been attributed to the partition that produced it.
    Conversion {
        partition: Option<usize>,
        error: ConversionError,
    },

    /// Batch builder misuse after `finish()`.
    FrozenBatch(FrozenBatchError),

    /// Source unreachable or predicate evaluation failed for a partition.
    PartitionSource(PartitionSourceError),

    /// Worker thread or process failure.
    Worker(WorkerError),

    /// Configuration errors.
    Config(ConfigError),

    /// I/O errors.
    Io(io::Error),

    /// MongoDB driver errors.
    MongoDb(mongodb::error::Error),

    /// BSON encoding or decoding errors.
    Bson(String),

    /// Arrow conversion or IPC errors.
    Arrow(arrow::error::ArrowError),

    /// Generic error with a free-form message.
    Generic(String),
}

/// Schema-specific errors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SchemaError {
    /// Descriptor declared without columns.
    Empty,

    /// Two columns share a name.
    DuplicateColumn(String),

    /// Column type nests deeper than the supported maximum.
    TooDeep { column: String, depth: usize },

    /// Type expression could not be parsed.
    InvalidType(String),

    /// Descriptors disagree on the number of columns.
    ColumnCountMismatch { expected: usize, found: usize },

    /// Descriptors disagree on one column's name or type.
    ColumnMismatch {
        position: usize,
        expected: String,
        found: String,
    },

    /// A batch's schema diverged from the table schema.
    BatchMismatch {
        batch: usize,
        source: Box<SchemaError>,
    },

    /// A row does not have one value per column.
    RowArity { expected: usize, found: usize },

    /// Assembly was requested without any batch.
    NoBatches,
}

/// Row-level conversion failures.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConversionError {
    /// Value cannot be coerced to the declared type without loss.
    TypeMismatch {
        path: String,
        expected: String,
        found: String,
    },

    /// Nested sequence length differs from the declared shape.
    Shape {
        path: String,
        expected: usize,
        found: usize,
    },
}

/// Append attempted on a batch builder that was already finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrozenBatchError;

/// Source failure scoped to one partition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionSourceError {
    /// Partition index, when known.
    pub partition: Option<usize>,
    /// Failure description.
    pub message: String,
}

/// Worker thread or process errors.
#[derive(Debug)]
pub enum WorkerError {
    /// Worker process could not be started.
    Spawn(String),

    /// Malformed request or reply on the worker channel.
    Protocol(String),

    /// Worker process exited without a usable reply.
    Crashed { partition: usize, detail: String },

    /// Worker thread panicked.
    Panicked(String),
}

/// Configuration-specific errors.
#[derive(Debug)]
pub enum ConfigError {
    /// Config file not found.
    FileNotFound(String),

    /// Invalid config format.
    InvalidFormat(String),

    /// Invalid field value.
    InvalidValue { field: String, value: String },

    /// Required setting that could not be resolved.
    MissingValue { field: String, hint: String },
}

impl ExportError {
    /// Partition the error is attributed to, if any.
    pub fn partition(&self) -> Option<usize> {
        match self {
            ExportError::Conversion { partition, .. } => *partition,
            ExportError::PartitionSource(e) => e.partition,
            ExportError::Worker(WorkerError::Crashed { partition, .. }) => Some(*partition),
            ExportError::Schema(SchemaError::BatchMismatch { batch, .. }) => Some(*batch),
            _ => None,
        }
    }

    /// Attribute the error to a partition.
    ///
    /// Conversion errors keep their kind; schema errors are wrapped in
    /// [`SchemaError::BatchMismatch`]; driver and I/O failures become
    /// [`PartitionSourceError`].
    pub fn in_partition(self, index: usize) -> Self {
        match self {
            ExportError::Schema(SchemaError::NoBatches) => SchemaError::NoBatches.into(),
            ExportError::Schema(SchemaError::BatchMismatch { source, .. }) => {
                SchemaError::BatchMismatch {
                    batch: index,
                    source,
                }
                .into()
            }
            ExportError::Schema(e) => SchemaError::BatchMismatch {
                batch: index,
                source: Box::new(e),
            }
            .into(),
            ExportError::Conversion { error, .. } => ExportError::Conversion {
                partition: Some(index),
                error,
            },
            ExportError::PartitionSource(e) => ExportError::PartitionSource(PartitionSourceError {
                partition: Some(index),
                message: e.message,
            }),
            ExportError::MongoDb(e) => ExportError::PartitionSource(PartitionSourceError {
                partition: Some(index),
                message: e.to_string(),
            }),
            ExportError::Io(e) => ExportError::PartitionSource(PartitionSourceError {
                partition: Some(index),
                message: e.to_string(),
            }),
            ExportError::Bson(msg) => ExportError::PartitionSource(PartitionSourceError {
                partition: Some(index),
                message: msg,
            }),
            other => other,
        }
    }

    /// The conversion error carried by this error, if any.
    pub fn conversion(&self) -> Option<&ConversionError> {
        match self {
            ExportError::Conversion { error, .. } => Some(error),
            _ => None,
        }
    }

    pub fn is_type_mismatch(&self) -> bool {
        matches!(self.conversion(), Some(ConversionError::TypeMismatch { .. }))
    }

    pub fn is_shape(&self) -> bool {
        matches!(self.conversion(), Some(ConversionError::Shape { .. }))
    }
}

impl PartitionSourceError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            partition: None,
            message: message.into(),
        }
    }
}

/* ========================= Display & Error impls ========================= */

impl fmt::Display for ExportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExportError::Schema(e) => write!(f, "Schema error: {e}"),
            ExportError::Conversion {
                partition: Some(p),
                error,
            } => write!(f, "Conversion error in partition {p}: {error}"),
            ExportError::Conversion {
                partition: None,
                error,
            } => write!(f, "Conversion error: {error}"),
            ExportError::FrozenBatch(e) => write!(f, "{e}"),
            ExportError::PartitionSource(e) => write!(f, "{e}"),
            ExportError::Worker(e) => write!(f, "Worker error: {e}"),
            ExportError::Config(e) => write!(f, "Configuration error: {e}"),
            ExportError::Io(e) => write!(f, "I/O error: {e}"),
            ExportError::MongoDb(e) => write!(f, "MongoDB error: {e}"),
            ExportError::Bson(msg) => write!(f, "BSON error: {msg}"),
            ExportError::Arrow(e) => write!(f, "Arrow error: {e}"),
            ExportError::Generic(msg) => write!(f, "{msg}"),
        }
    }
}

impl fmt::Display for SchemaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SchemaError::Empty => write!(f, "schema declares no columns"),
            SchemaError::DuplicateColumn(name) => write!(f, "duplicate column '{name}'"),
            SchemaError::TooDeep { column, depth } => {
                write!(f, "column '{column}' nests {depth} levels deep")
            }
            SchemaError::InvalidType(msg) => write!(f, "invalid type: {msg}"),
            SchemaError::ColumnCountMismatch { expected, found } => {
                write!(f, "expected {expected} columns, found {found}")
            }
            SchemaError::ColumnMismatch {
                position,
                expected,
                found,
            } => write!(
                f,
                "column {position} differs: expected '{expected}', found '{found}'"
            ),
            SchemaError::BatchMismatch { batch, source } => {
                write!(f, "batch {batch} does not match table schema: {source}")
            }
            SchemaError::RowArity { expected, found } => {
                write!(f, "row has {found} values, schema has {expected} columns")
            }
            SchemaError::NoBatches => write!(f, "no batches to assemble"),
        }
    }
}

impl fmt::Display for ConversionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConversionError::TypeMismatch {
                path,
                expected,
                found,
            } => write!(f, "type mismatch at '{path}': expected {expected}, found {found}"),
            ConversionError::Shape {
                path,
                expected,
                found,
            } => write!(
                f,
                "shape mismatch at '{path}': expected {expected} elements, found {found}"
            ),
        }
    }
}

impl fmt::Display for FrozenBatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "batch builder is frozen; no appends after finish()")
    }
}

impl fmt::Display for PartitionSourceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.partition {
            Some(p) => write!(f, "Source error in partition {p}: {}", self.message),
            None => write!(f, "Source error: {}", self.message),
        }
    }
}

impl fmt::Display for WorkerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkerError::Spawn(msg) => write!(f, "failed to start worker: {msg}"),
            WorkerError::Protocol(msg) => write!(f, "worker protocol error: {msg}"),
            WorkerError::Crashed { partition, detail } => {
                write!(f, "worker for partition {partition} failed: {detail}")
            }
            WorkerError::Panicked(msg) => write!(f, "worker thread panicked: {msg}"),
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::FileNotFound(path) => write!(f, "Config file not found: {path}"),
            ConfigError::InvalidFormat(msg) => write!(f, "Invalid config format: {msg}"),
            ConfigError::MissingValue { field, hint } => {
                write!(f, "No value for field '{field}': {hint}")
            }
            ConfigError::InvalidValue { field, value } => {
                write!(f, "Invalid value '{value}' for field '{field}'")
            }
        }
    }
}

impl std::error::Error for ExportError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ExportError::Io(e) => Some(e),
            ExportError::MongoDb(e) => Some(e),
            ExportError::Arrow(e) => Some(e),
            _ => None,
        }
    }
}
impl std::error::Error for SchemaError {}
impl std::error::Error for ConversionError {}
impl std::error::Error for FrozenBatchError {}
impl std::error::Error for PartitionSourceError {}
impl std::error::Error for WorkerError {}
impl std::error::Error for ConfigError {}

/* ========================= Conversions to ExportError ========================= */

impl From<SchemaError> for ExportError {
    fn from(err: SchemaError) -> Self {
        ExportError::Schema(err)
    }
}

impl From<ConversionError> for ExportError {
    fn from(err: ConversionError) -> Self {
        ExportError::Conversion {
            partition: None,
            error: err,
        }
    }
}

impl From<FrozenBatchError> for ExportError {
    fn from(err: FrozenBatchError) -> Self {
        ExportError::FrozenBatch(err)
    }
}

impl From<PartitionSourceError> for ExportError {
    fn from(err: PartitionSourceError) -> Self {
        ExportError::PartitionSource(err)
    }
}

impl From<WorkerError> for ExportError {
    fn from(err: WorkerError) -> Self {
        ExportError::Worker(err)
    }
}

impl From<ConfigError> for ExportError {
    fn from(err: ConfigError) -> Self {
        ExportError::Config(err)
    }
}

impl From<io::Error> for ExportError {
    fn from(err: io::Error) -> Self {
        ExportError::Io(err)
    }
}

impl From<mongodb::error::Error> for ExportError {
    fn from(err: mongodb::error::Error) -> Self {
        ExportError::MongoDb(err)
    }
}

impl From<bson::ser::Error> for ExportError {
    fn from(err: bson::ser::Error) -> Self {
        ExportError::Bson(err.to_string())
    }
}

impl From<bson::de::Error> for ExportError {
    fn from(err: bson::de::Error) -> Self {
        ExportError::Bson(err.to_string())
    }
}

impl From<arrow::error::ArrowError> for ExportError {
    fn from(err: arrow::error::ArrowError) -> Self {
        ExportError::Arrow(err)
    }
}

impl From<String> for ExportError {
    fn from(msg: String) -> Self {
        ExportError::Generic(msg)
    }
}

impl From<&str> for ExportError {
    fn from(msg: &str) -> Self {
        ExportError::Generic(msg.to_owned())
    }
}
