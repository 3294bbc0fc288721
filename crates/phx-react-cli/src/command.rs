//! Line commands read from stdin.
//!
//! ```text
//! event <name> [json object]      push a view event
//! action <name> [json object]     invoke an action and log the envelope
//! refresh [page_key] [key=value]  reload the current page or navigate
//! invalidate [reason]             ask the server to recompute the page
//! help                            list commands
//! quit | q                        unmount and exit
//! ```

use std::collections::BTreeMap;

use phx_react_app::RuntimeHandle;
use phx_react_proto::Params;
use serde_json::Value;
use thiserror::Error;

/// Usage text for `help`.
pub const USAGE: &str = "commands: event <name> [json] | action <name> [json] | \
                         refresh [page_key] [key=value ...] | invalidate [reason] | help | quit";

/// Parsed command line.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Push a view event.
    Event {
        /// Event name.
        name: String,
        /// Event parameters.
        params: Params,
    },
    /// Invoke an action.
    Action {
        /// Action name.
        name: String,
        /// Action parameters.
        params: Params,
    },
    /// Refresh the current page or navigate to another.
    Refresh {
        /// Target page, default current.
        page_key: Option<String>,
        /// Extra query parameters.
        params: BTreeMap<String, String>,
    },
    /// Send an invalidate.
    Invalidate {
        /// Reason, default `"manual"`.
        reason: Option<String>,
    },
    /// Print usage.
    Help,
    /// Unmount and exit.
    Quit,
}

/// Command line could not be parsed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    /// Nothing but whitespace.
    #[error("empty command")]
    Empty,

    /// First word is not a command.
    #[error("unknown command: {0}")]
    Unknown(String),

    /// A required argument is missing.
    #[error("usage: {0}")]
    Usage(&'static str),

    /// Parameters are not a JSON object.
    #[error("parameters must be a JSON object: {0}")]
    InvalidParams(String),
}

impl Command {
    /// Parse one input line.
    pub fn parse(line: &str) -> Result<Self, ParseError> {
        let line = line.trim();
        let (word, rest) = line.split_once(char::is_whitespace).unwrap_or((line, ""));
        let rest = rest.trim();

        match word {
            "" => Err(ParseError::Empty),
            "event" => {
                let (name, params) = named_params(rest, "event <name> [json]")?;
                Ok(Self::Event { name, params })
            },
            "action" => {
                let (name, params) = named_params(rest, "action <name> [json]")?;
                Ok(Self::Action { name, params })
            },
            "refresh" => {
                let mut page_key = None;
                let mut params = BTreeMap::new();
                for token in rest.split_whitespace() {
                    match token.split_once('=') {
                        Some((key, value)) => {
                            params.insert(key.to_string(), value.to_string());
                        },
                        None if page_key.is_none() => page_key = Some(token.to_string()),
                        None => return Err(ParseError::Usage("refresh [page_key] [key=value ...]")),
                    }
                }
                Ok(Self::Refresh { page_key, params })
            },
            "invalidate" => {
                Ok(Self::Invalidate { reason: Some(rest).filter(|r| !r.is_empty()).map(str::to_string) })
            },
            "help" | "?" => Ok(Self::Help),
            "quit" | "q" => Ok(Self::Quit),
            other => Err(ParseError::Unknown(other.to_string())),
        }
    }

    /// Dispatch to the runtime. Returns `false` once the runtime should stop.
    ///
    /// Actions and refreshes resolve in spawned tasks and log their outcome.
    pub fn dispatch(self, handle: &RuntimeHandle) -> bool {
        match self {
            Self::Event { name, params } => handle.push_event(name, params),
            Self::Action { name, params } => {
                let handle = handle.clone();
                tokio::spawn(async move {
                    match handle.invoke_action(name.as_str(), params).await {
                        Ok(envelope) => tracing::info!(action = %name, ?envelope, "action resolved"),
                        Err(e) => tracing::warn!(action = %name, error = %e, "action failed"),
                    }
                });
            },
            Self::Refresh { page_key, params } => {
                let handle = handle.clone();
                tokio::spawn(async move {
                    match handle.refresh_page(page_key.as_deref(), params).await {
                        Ok(outcome) => tracing::info!(?outcome, "page refresh finished"),
                        Err(e) => tracing::warn!(error = %e, "page refresh failed"),
                    }
                });
            },
            Self::Invalidate { reason } => handle.invalidate(reason.as_deref()),
            Self::Help => tracing::info!("{USAGE}"),
            Self::Quit => {
                handle.unmount();
                return false;
            },
        }
        true
    }
}

fn named_params(rest: &str, usage: &'static str) -> Result<(String, Params), ParseError> {
    let (name, json) = rest.split_once(char::is_whitespace).unwrap_or((rest, ""));
    if name.is_empty() {
        return Err(ParseError::Usage(usage));
    }

    let json = json.trim();
    if json.is_empty() {
        return Ok((name.to_string(), Params::new()));
    }
    match serde_json::from_str::<Value>(json) {
        Ok(Value::Object(params)) => Ok((name.to_string(), params)),
        Ok(other) => Err(ParseError::InvalidParams(format!("got {other}"))),
        Err(e) => Err(ParseError::InvalidParams(e.to_string())),
    }
}
