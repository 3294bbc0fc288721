//! Standard invariant checks.
//!
//! These invariants capture behavioral properties that must always hold.
//! They verify WHAT must be true, not specific test scenarios.

use super::{Invariant, InvariantResult, RuntimeSnapshot, Violation};

/// At most one transport is open, and it belongs to a live current session.
///
/// A replaced or unmounted session must have closed its transport, so a
/// stale session can never keep receiving pushes. A current session that is
/// no longer connecting or connected must have closed it as well.
pub struct SingleTransport;

impl Invariant for SingleTransport {
    fn name(&self) -> &'static str {
        "single_transport"
    }

    fn check(&self, state: &RuntimeSnapshot) -> InvariantResult {
        match state.open_connections.as_slice() {
            [] => Ok(()),
            [tag] if Some(*tag) == state.current_tag => {
                if state.status.is_live() {
                    Ok(())
                } else {
                    Err(Violation {
                        invariant: self.name(),
                        message: format!("transport {tag} still open with status {}", state.status),
                    })
                }
            },
            open => Err(Violation {
                invariant: self.name(),
                message: format!(
                    "open transports {open:?}, current session {:?}",
                    state.current_tag
                ),
            }),
        }
    }
}

/// View state only ever comes from the server.
///
/// While mounted, the state equals some state the server handed out. After
/// unmount it is empty.
pub struct StateFromServer;

impl Invariant for StateFromServer {
    fn name(&self) -> &'static str {
        "state_from_server"
    }

    fn check(&self, state: &RuntimeSnapshot) -> InvariantResult {
        if !state.mounted {
            return if state.state.is_empty() {
                Ok(())
            } else {
                Err(Violation {
                    invariant: self.name(),
                    message: format!("unmounted runtime holds state {:?}", state.state),
                })
            };
        }

        if state.issued_states.contains(&state.state) {
            Ok(())
        } else {
            Err(Violation {
                invariant: self.name(),
                message: format!("state {:?} was never issued by the server", state.state),
            })
        }
    }
}

/// A connected session's topic is joined on the server.
pub struct ConnectedMeansJoined;

impl Invariant for ConnectedMeansJoined {
    fn name(&self) -> &'static str {
        "connected_means_joined"
    }

    fn check(&self, state: &RuntimeSnapshot) -> InvariantResult {
        if state.status != phx_react_client::ConnectionStatus::Connected {
            return Ok(());
        }
        match &state.current_topic {
            Some(topic) if state.joined_topics.contains(topic) => Ok(()),
            topic => Err(Violation {
                invariant: self.name(),
                message: format!(
                    "status connected but topic {topic:?} not joined (joined: {:?})",
                    state.joined_topics
                ),
            }),
        }
    }
}
