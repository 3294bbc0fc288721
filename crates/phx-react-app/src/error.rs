//! Runtime error types.

use phx_react_client::ClientError;
use thiserror::Error;

/// Bootstrap data is missing or malformed. Fatal: nothing is mounted.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// A required attribute is absent or empty.
    #[error("missing bootstrap field: {0}")]
    MissingField(&'static str),

    /// `initialState` is not a JSON object.
    #[error("invalid initial state: {0}")]
    InvalidInitialState(String),

    /// An endpoint or socket URL cannot be parsed.
    #[error("invalid url for {field}: {reason}")]
    InvalidUrl {
        /// Which setting held the URL.
        field: &'static str,
        /// Parse failure.
        reason: String,
    },
}

/// Errors surfaced by runtime operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RuntimeError {
    /// Operation needs a mounted page.
    #[error("no page mounted")]
    NotMounted,

    /// `mount` called twice.
    #[error("runtime already mounted")]
    AlreadyMounted,

    /// Bootstrap failed.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// HTTP call failed.
    #[error(transparent)]
    Client(#[from] ClientError),

    /// Driver refused the operation.
    #[error("driver error: {0}")]
    Driver(String),

    /// Runtime loop has exited.
    #[error("runtime stopped")]
    Stopped,
}
