//! Wire decoding errors.

use thiserror::Error;

/// Result alias for protocol operations.
pub type Result<T> = std::result::Result<T, ProtocolError>;

/// Errors raised while encoding or decoding wire data.
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// Input was not valid JSON, or did not match the expected shape.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// Channel frame was not a five-element array.
    #[error("malformed channel frame: {0}")]
    MalformedFrame(String),

    /// A field had the wrong JSON type.
    #[error("unexpected type for {field}: expected {expected}")]
    UnexpectedType {
        /// Field that failed to decode
        field: &'static str,
        /// Expected JSON type
        expected: &'static str,
    },
}
