use std::fmt;

use serde::{Deserialize, Serialize};

/// Connection status of the active channel session.
///
/// Owned by the session; views only read it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    /// Transport connecting or join in flight.
    Connecting,
    /// Join acknowledged by the server.
    Connected,
    /// Recovering after a dropped transport.
    Reconnecting,
    /// No live connection.
    Disconnected,
    /// Join rejected or transport failed.
    Error,
}

impl ConnectionStatus {
    /// Wire name of the status.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Reconnecting => "reconnecting",
            Self::Disconnected => "disconnected",
            Self::Error => "error",
        }
    }

    /// Whether the session still holds (or is acquiring) a usable channel.
    pub fn is_live(self) -> bool {
        matches!(self, Self::Connecting | Self::Connected)
    }
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_lowercase() {
        let json = serde_json::to_string(&ConnectionStatus::Reconnecting).unwrap();
        assert_eq!(json, "\"reconnecting\"");
        assert_eq!(ConnectionStatus::Error.to_string(), "error");
    }

    #[test]
    fn only_connecting_and_connected_are_live() {
        assert!(ConnectionStatus::Connecting.is_live());
        assert!(ConnectionStatus::Connected.is_live());
        assert!(!ConnectionStatus::Reconnecting.is_live());
        assert!(!ConnectionStatus::Disconnected.is_live());
        assert!(!ConnectionStatus::Error.is_live());
    }
}
