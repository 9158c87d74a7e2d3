//! Key encoding errors

use thiserror::Error;

/// Errors raised while building an encoded key
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EncodingError {
    /// A field referenced by the schema is absent from the record
    #[error("Missing field: {0}")]
    MissingField(String),

    /// A numeric segment got a value that is not a non-negative integer
    #[error("Field '{field}' is not a non-negative integer: {value:?}")]
    NotNumeric { field: String, value: String },

    /// A numeric value needs more digits than its reserved width
    #[error("Field '{field}' value {value} does not fit in {width} digits")]
    Overflow {
        field: String,
        value: String,
        width: usize,
    },

    /// A text value contains the segment separator
    #[error("Field '{field}' contains the segment separator '::'")]
    ForbiddenSeparator { field: String },

    /// The encoded key exceeds the index key size
    #[error("Encoded key is {len} bytes, key size is {max}")]
    KeyTooLong { len: usize, max: usize },

    /// No schema registered under this name
    #[error("Unknown key schema: {0}")]
    UnknownSchema(String),

    /// The schema template could not be parsed
    #[error("Invalid key template {template:?}: {reason}")]
    InvalidTemplate { template: String, reason: String },
}
