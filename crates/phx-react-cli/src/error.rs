//! CLI error type.

use phx_react_app::{ConfigError, RuntimeError};
use phx_react_client::ClientError;
use thiserror::Error;

/// Errors from the CLI and its network driver.
#[derive(Debug, Error)]
pub enum CliError {
    /// Bootstrap or endpoint configuration is invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Runtime refused to mount or stopped.
    #[error(transparent)]
    Runtime(#[from] RuntimeError),

    /// HTTP client setup failed.
    #[error(transparent)]
    Client(#[from] ClientError),

    /// Reading commands failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
