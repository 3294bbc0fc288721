//! Runtime configuration.

use std::time::Duration;

use phx_react_client::{DEFAULT_HEARTBEAT_INTERVAL, DEFAULT_JOIN_TIMEOUT, SessionConfig};
use phx_react_proto::channel::DEFAULT_NAMESPACE;
use url::Url;

use crate::ConfigError;

/// Runtime configuration.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Socket endpoint, e.g. `ws://localhost:4000/phx_react/websocket`.
    pub socket_url: String,
    /// Origin that relative bootstrap endpoints resolve against.
    pub origin: Option<Url>,
    /// Channel topic namespace.
    pub namespace: String,
    /// Heartbeat interval on the channel socket.
    pub heartbeat_interval: Duration,
    /// Time allowed for a join reply.
    pub join_timeout: Duration,
    /// Refresh the page and rejoin after a joined session drops.
    pub rejoin_on_drop: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            socket_url: "ws://localhost:4000/phx_react/websocket".to_string(),
            origin: None,
            namespace: DEFAULT_NAMESPACE.to_string(),
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
            join_timeout: DEFAULT_JOIN_TIMEOUT,
            rejoin_on_drop: true,
        }
    }
}

impl RuntimeConfig {
    /// Session configuration for a session authorized by `csrf_token`.
    pub fn session_config(&self, csrf_token: &str) -> SessionConfig {
        SessionConfig {
            socket_url: self.socket_url.clone(),
            namespace: self.namespace.clone(),
            csrf_token: csrf_token.to_string(),
            heartbeat_interval: self.heartbeat_interval,
            join_timeout: self.join_timeout,
        }
    }

    /// Resolve a bootstrap endpoint. Absolute URLs are used as is; relative
    /// ones are joined onto [`Self::origin`].
    ///
    /// # Errors
    ///
    /// [`ConfigError::InvalidUrl`] if the endpoint is relative and no origin
    /// is configured, or if it cannot be parsed.
    pub fn resolve_endpoint(&self, field: &'static str, endpoint: &str) -> Result<Url, ConfigError> {
        let invalid = |reason: String| ConfigError::InvalidUrl { field, reason };
        match Url::parse(endpoint) {
            Ok(url) => Ok(url),
            Err(url::ParseError::RelativeUrlWithoutBase) => {
                let origin = self
                    .origin
                    .as_ref()
                    .ok_or_else(|| invalid(format!("relative endpoint {endpoint:?} needs an origin")))?;
                origin.join(endpoint).map_err(|e| invalid(e.to_string()))
            },
            Err(e) => Err(invalid(e.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relative_endpoint_joins_origin() {
        let config = RuntimeConfig {
            origin: Some(Url::parse("https://app.example.com").unwrap()),
            ..RuntimeConfig::default()
        };
        let url = config.resolve_endpoint("pageEndpoint", "/phx_react/page").unwrap();
        assert_eq!(url.as_str(), "https://app.example.com/phx_react/page");

        let url = config.resolve_endpoint("actionEndpoint", "http://other/act").unwrap();
        assert_eq!(url.as_str(), "http://other/act");
    }

    #[test]
    fn relative_endpoint_without_origin_is_rejected() {
        let config = RuntimeConfig::default();
        assert!(matches!(
            config.resolve_endpoint("pageEndpoint", "/phx_react/page"),
            Err(ConfigError::InvalidUrl { field: "pageEndpoint", .. })
        ));
    }
}
