//! Observable runtime state for invariant checks.

use phx_react_app::{Controller, Phase};
use phx_react_client::{ConnectionStatus, SessionTag};
use phx_react_proto::ViewState;

use crate::SimNetwork;

/// Point-in-time view of the controller and the simulated network.
#[derive(Debug, Clone)]
pub struct RuntimeSnapshot {
    /// Whether a page is mounted.
    pub mounted: bool,
    /// Tag of the current session.
    pub current_tag: Option<SessionTag>,
    /// Topic of the current session.
    pub current_topic: Option<String>,
    /// Status of the current session.
    pub status: ConnectionStatus,
    /// Current view state.
    pub state: ViewState,
    /// Tags with an open transport.
    pub open_connections: Vec<SessionTag>,
    /// Topics joined on the server.
    pub joined_topics: Vec<String>,
    /// Every view state the server handed out.
    pub issued_states: Vec<ViewState>,
}

impl RuntimeSnapshot {
    /// Snapshot of nothing mounted and nothing open.
    pub fn empty() -> Self {
        Self {
            mounted: false,
            current_tag: None,
            current_topic: None,
            status: ConnectionStatus::Disconnected,
            state: ViewState::new(),
            open_connections: Vec::new(),
            joined_topics: Vec::new(),
            issued_states: Vec::new(),
        }
    }

    /// Capture `controller` and `network`.
    pub fn capture(controller: &Controller, network: &SimNetwork) -> Self {
        Self {
            mounted: matches!(controller.phase(), Phase::Active | Phase::Transitioning),
            current_tag: controller.current_tag(),
            current_topic: controller.session().map(|s| s.topic().to_string()),
            status: controller.status(),
            state: controller.state().clone(),
            open_connections: network.open_connections(),
            joined_topics: network.server().joined_topics(),
            issued_states: network.server().issued_states().to_vec(),
        }
    }
}
