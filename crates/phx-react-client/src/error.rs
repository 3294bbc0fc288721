//! Client error types.

use thiserror::Error;

/// Errors from HTTP requests and transport setup.
///
/// Domain failures are not errors: they arrive as
/// [`phx_react_proto::ActionEnvelope::Error`]. Nothing here is retried.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClientError {
    /// Request could not be completed (connection refused, reset, timeout).
    #[error("http request failed: {0}")]
    Http(String),

    /// Response body was not a valid envelope.
    #[error("malformed response: {0}")]
    MalformedResponse(String),

    /// Endpoint could not be turned into a request URL.
    #[error("invalid url: {0}")]
    InvalidUrl(String),

    /// Request body could not be encoded.
    #[error("encode failed: {0}")]
    Encode(String),
}

impl From<url::ParseError> for ClientError {
    fn from(err: url::ParseError) -> Self {
        Self::InvalidUrl(err.to_string())
    }
}
