//! Error handling for export operations.
//!
//! Every fallible operation in the crate returns [`Result`], whose error type
//! [`ExportError`] wraps the more specific kinds:
//! - [`SchemaError`]: descriptor construction and structural mismatches
//! - [`ConversionError`]: a record that cannot be converted losslessly
//! - [`FrozenBatchError`]: a batch builder used after `finish()`
//! - [`PartitionSourceError`]: a partition whose source could not be read
//! - [`WorkerError`]: worker threads or processes that failed outside conversion
//!
//! # Example
//!
//! ```rust
//! use docarrow::error::{ConversionError, ExportError};
//!
//! let err: ExportError = ConversionError::TypeMismatch {
//!     path: "id".to_string(),
//!     expected: "int64".to_string(),
//!     found: "string".to_string(),
//! }
//! .into();
//! assert!(err.is_type_mismatch());
//! ```

pub mod kinds;

// Re-export commonly used types
pub use kinds::{
    ConfigError, ConversionError, ExportError, FrozenBatchError, PartitionSourceError, Result,
    SchemaError, WorkerError,
};
