//! Channel session state machine.
//!
//! One session owns one persistent connection joined to one page topic. It is
//! bound to a single page identity for its whole life; a new identity means a
//! new session. Methods take time as input and return actions for the driver
//! to execute.
//!
//! # State Machine
//!
//! ```text
//! ┌──────┐  join   ┌──────────────┐ TransportOpened ┌─────────┐  reply ok  ┌────────┐
//! │ Idle │────────>│ AwaitingOpen │────────────────>│ Joining │───────────>│ Joined │
//! └──────┘         └──────────────┘                 └─────────┘            └────────┘
//!                         │                              │ reply error         │
//!                         │ timeout                      │ timeout             │ close/error
//!                         ↓                              ↓                     ↓
//!                    ┌────────┐                     ┌────────┐            ┌────────┐
//!                    │ Failed │                     │ Failed │            │ Closed │
//!                    └────────┘                     └────────┘            └────────┘
//! ```
//!
//! # Invariants
//!
//! - Pushes are sent only while joined. Pushes made while the join is in
//!   flight are buffered and flushed in order on the ok reply; in any other
//!   phase they are dropped.
//! - Frames addressed to another topic, or carrying another join ref, are
//!   ignored.
//! - `leave` is idempotent and always ends in [`ConnectionStatus::Disconnected`].
//! - [`SessionAction::Dropped`] is emitted only for sessions that reached
//!   `Joined`, and at most once.
//! - Losing the channel while the transport is still up (server close or
//!   error, rejected join, heartbeat timeout) also closes the transport.

use std::{
    fmt,
    ops::Sub,
    time::{Duration, Instant},
};

use phx_react_proto::{
    ChannelMessage, ConnectionStatus, Params, Topic,
    channel::{DEFAULT_NAMESPACE, PHOENIX_TOPIC, StatePush, events},
};
use url::Url;

/// Interval between socket heartbeats while connected.
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// Time allowed from `join` until the join reply arrives.
pub const DEFAULT_JOIN_TIMEOUT: Duration = Duration::from_secs(10);

/// Protocol version requested on the socket URL.
const PROTOCOL_VSN: &str = "2.0.0";

/// Reason sent with an outbound invalidate when the caller gives none.
const DEFAULT_INVALIDATE_REASON: &str = "manual";

/// Identifies one session for the lifetime of the runtime.
///
/// Tags are never reused, so events from a torn-down session can always be
/// told apart from events of its replacement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionTag(pub u64);

impl fmt::Display for SessionTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Session configuration.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Socket endpoint, without protocol query parameters.
    pub socket_url: String,
    /// Topic namespace.
    pub namespace: String,
    /// Anti-forgery token sent as a socket parameter.
    pub csrf_token: String,
    /// Heartbeat interval.
    pub heartbeat_interval: Duration,
    /// Join timeout.
    pub join_timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            socket_url: String::new(),
            namespace: DEFAULT_NAMESPACE.to_string(),
            csrf_token: String::new(),
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
            join_timeout: DEFAULT_JOIN_TIMEOUT,
        }
    }
}

/// Authorization context a session joins with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    /// Page key.
    pub page_key: String,
    /// Session id.
    pub session_id: String,
    /// Join token.
    pub token: String,
}

/// Inputs from the transport.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// Connection established.
    TransportOpened,
    /// Frame received.
    MessageReceived(ChannelMessage),
    /// Connection closed by the peer or the network.
    TransportClosed,
    /// Connection failed.
    TransportError {
        /// Failure description.
        reason: String,
    },
}

/// Actions returned by the session state machine.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionAction {
    /// Open the transport to this URL.
    Connect {
        /// Socket URL including protocol query parameters.
        url: String,
    },
    /// Send this frame.
    Send(ChannelMessage),
    /// Close the transport.
    Disconnect,
    /// Status changed.
    Status {
        /// New status.
        status: ConnectionStatus,
        /// Error message, for [`ConnectionStatus::Error`].
        error: Option<String>,
    },
    /// Server replaced the view state.
    StateUpdate(StatePush),
    /// Server marked the page stale.
    Invalidated {
        /// Invalidate payload.
        payload: Params,
    },
    /// A joined session lost its channel.
    Dropped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase<I> {
    Idle,
    AwaitingOpen { since: I },
    Joining { since: I },
    Joined,
    Failed,
    Closed,
}

/// Channel session bound to one page identity.
///
/// Generic over `Instant` so simulations can drive it with virtual time.
#[derive(Debug, Clone)]
pub struct ChannelSession<I = Instant>
where
    I: Copy + Ord + Send + Sync + Sub<Output = Duration>,
{
    tag: SessionTag,
    config: SessionConfig,
    credentials: Credentials,
    topic: Topic,
    phase: Phase<I>,
    status: ConnectionStatus,
    last_error: Option<String>,
    join_ref: Option<String>,
    next_ref: u64,
    buffered: Vec<ChannelMessage>,
    last_heartbeat: Option<I>,
    pending_heartbeat: Option<String>,
    dropped: bool,
}

impl<I> ChannelSession<I>
where
    I: Copy + Ord + Send + Sync + Sub<Output = Duration>,
{
    /// Create an idle session. The topic is fixed from `credentials` here.
    pub fn new(tag: SessionTag, config: SessionConfig, credentials: Credentials) -> Self {
        let topic =
            Topic::for_page(&config.namespace, &credentials.page_key, &credentials.session_id);
        Self {
            tag,
            config,
            credentials,
            topic,
            phase: Phase::Idle,
            status: ConnectionStatus::Disconnected,
            last_error: None,
            join_ref: None,
            next_ref: 0,
            buffered: Vec::new(),
            last_heartbeat: None,
            pending_heartbeat: None,
            dropped: false,
        }
    }

    /// Session tag.
    pub fn tag(&self) -> SessionTag {
        self.tag
    }

    /// Topic this session joins.
    pub fn topic(&self) -> &Topic {
        &self.topic
    }

    /// Current status.
    pub fn status(&self) -> ConnectionStatus {
        self.status
    }

    /// Message of the most recent error, if the status is an error.
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Credentials used for the next join and by callers for HTTP calls.
    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    /// Whether a join reply has been received and the channel is open.
    pub fn is_joined(&self) -> bool {
        self.phase == Phase::Joined
    }

    /// Whether the session still holds a channel reference.
    fn has_channel(&self) -> bool {
        matches!(self.phase, Phase::AwaitingOpen { .. } | Phase::Joining { .. } | Phase::Joined)
    }

    /// Start connecting and joining.
    ///
    /// Never fails synchronously: an unusable socket URL is reported as an
    /// error status. Calling `join` on a session that has left is a no-op;
    /// sessions are not reused.
    pub fn join(&mut self, now: I) -> Vec<SessionAction> {
        if self.phase != Phase::Idle {
            tracing::debug!(tag = %self.tag, "join ignored, session already started");
            return Vec::new();
        }

        let url = match self.socket_url() {
            Ok(url) => url,
            Err(err) => {
                self.phase = Phase::Failed;
                return vec![self.set_status(
                    ConnectionStatus::Error,
                    Some(format!("invalid socket url: {err}")),
                )];
            },
        };

        self.join_ref = Some(self.make_ref());
        self.phase = Phase::AwaitingOpen { since: now };
        tracing::debug!(tag = %self.tag, topic = %self.topic, "connecting");

        vec![
            SessionAction::Connect { url },
            self.set_status(ConnectionStatus::Connecting, None),
        ]
    }

    /// Handle a transport event.
    pub fn handle(&mut self, event: SessionEvent, now: I) -> Vec<SessionAction> {
        match event {
            SessionEvent::TransportOpened => self.handle_opened(now),
            SessionEvent::MessageReceived(msg) => self.handle_message(&msg),
            SessionEvent::TransportClosed => {
                self.transport_lost(ConnectionStatus::Disconnected, None)
            },
            SessionEvent::TransportError { reason } => {
                self.transport_lost(ConnectionStatus::Error, Some(reason))
            },
        }
    }

    /// Process timeouts and heartbeats.
    pub fn tick(&mut self, now: I) -> Vec<SessionAction> {
        match self.phase {
            Phase::AwaitingOpen { since } | Phase::Joining { since } => {
                if now - since >= self.config.join_timeout {
                    tracing::warn!(tag = %self.tag, topic = %self.topic, "join timed out");
                    self.phase = Phase::Failed;
                    self.buffered.clear();
                    return vec![
                        SessionAction::Disconnect,
                        self.set_status(ConnectionStatus::Error, Some("Join timed out".into())),
                    ];
                }
                Vec::new()
            },
            Phase::Joined => self.heartbeat(now),
            Phase::Idle | Phase::Failed | Phase::Closed => Vec::new(),
        }
    }

    /// Push a named view event.
    pub fn push_event(&mut self, name: &str, params: Params) -> Vec<SessionAction> {
        let msg_ref = self.make_ref();
        let Some(join_ref) = self.join_ref.clone() else {
            return self.drop_push(events::EVENT);
        };
        let frame = ChannelMessage::event(&join_ref, &msg_ref, &self.topic, name, params);
        self.push(frame)
    }

    /// Push an invalidate with `reason`, defaulting to `"manual"`.
    pub fn invalidate(&mut self, reason: Option<&str>) -> Vec<SessionAction> {
        let msg_ref = self.make_ref();
        let Some(join_ref) = self.join_ref.clone() else {
            return self.drop_push(events::INVALIDATE);
        };
        let reason = reason.unwrap_or(DEFAULT_INVALIDATE_REASON);
        let frame = ChannelMessage::invalidate(&join_ref, &msg_ref, &self.topic, reason);
        self.push(frame)
    }

    /// Leave the channel and close the transport. Idempotent.
    pub fn leave(&mut self) -> Vec<SessionAction> {
        let mut actions = Vec::new();

        if matches!(self.phase, Phase::Joining { .. } | Phase::Joined)
            && let Some(join_ref) = self.join_ref.clone()
        {
            let msg_ref = self.make_ref();
            actions.push(SessionAction::Send(ChannelMessage::leave(
                &join_ref,
                &msg_ref,
                &self.topic,
            )));
        }

        if self.phase != Phase::Closed {
            tracing::debug!(tag = %self.tag, topic = %self.topic, "leaving");
        }
        self.phase = Phase::Closed;
        self.buffered.clear();
        self.pending_heartbeat = None;
        // A deliberate leave is never reported as a drop.
        self.dropped = true;

        actions.push(SessionAction::Disconnect);
        actions.push(self.set_status(ConnectionStatus::Disconnected, None));
        actions
    }

    /// Replace the credentials without touching the live channel.
    ///
    /// The topic stays the one joined; new values are reported by
    /// [`Self::credentials`] and used by callers for subsequent HTTP calls.
    pub fn update_auth(&mut self, credentials: Credentials) {
        tracing::debug!(tag = %self.tag, session_id = %credentials.session_id, "credentials updated");
        self.credentials = credentials;
    }

    /// Report that the owner is recovering this session's page.
    pub fn mark_reconnecting(&mut self) -> Vec<SessionAction> {
        if self.status.is_live() {
            return Vec::new();
        }
        vec![self.set_status(ConnectionStatus::Reconnecting, None)]
    }

    /// Report that recovery for this session's page failed.
    pub fn recovery_failed(&mut self, reason: &str) -> Vec<SessionAction> {
        vec![self.set_status(ConnectionStatus::Error, Some(format!("reconnect failed: {reason}")))]
    }

    fn handle_opened(&mut self, now: I) -> Vec<SessionAction> {
        let Phase::AwaitingOpen { since } = self.phase else {
            return Vec::new();
        };
        let Some(join_ref) = self.join_ref.clone() else {
            return Vec::new();
        };

        self.phase = Phase::Joining { since };
        self.last_heartbeat = Some(now);
        tracing::debug!(tag = %self.tag, topic = %self.topic, "transport open, joining");

        vec![SessionAction::Send(ChannelMessage::join(
            &join_ref,
            &self.topic,
            &self.credentials.token,
        ))]
    }

    fn handle_message(&mut self, msg: &ChannelMessage) -> Vec<SessionAction> {
        if !self.has_channel() {
            return Vec::new();
        }

        if msg.topic == PHOENIX_TOPIC {
            if msg.event == events::PHX_REPLY && msg.msg_ref == self.pending_heartbeat {
                self.pending_heartbeat = None;
            }
            return Vec::new();
        }

        if msg.topic != self.topic.as_str() {
            tracing::trace!(tag = %self.tag, topic = %msg.topic, "ignoring frame for other topic");
            return Vec::new();
        }
        if msg.join_ref.is_some() && msg.join_ref != self.join_ref {
            tracing::trace!(tag = %self.tag, "ignoring frame for stale join");
            return Vec::new();
        }

        match msg.event.as_str() {
            events::PHX_REPLY => self.handle_reply(msg),
            events::STATE => {
                if self.phase == Phase::Joined {
                    vec![SessionAction::StateUpdate(msg.state_push())]
                } else {
                    Vec::new()
                }
            },
            events::INVALIDATE => vec![SessionAction::Invalidated { payload: msg.payload_map() }],
            events::PHX_ERROR => {
                tracing::warn!(tag = %self.tag, topic = %self.topic, "channel error");
                self.close_channel(ConnectionStatus::Error, Some("Channel error".into()))
            },
            events::PHX_CLOSE => {
                tracing::info!(tag = %self.tag, topic = %self.topic, "channel closed by server");
                self.close_channel(ConnectionStatus::Disconnected, None)
            },
            other => {
                tracing::debug!(tag = %self.tag, event = other, "ignoring unknown event");
                Vec::new()
            },
        }
    }

    fn handle_reply(&mut self, msg: &ChannelMessage) -> Vec<SessionAction> {
        if !matches!(self.phase, Phase::Joining { .. }) || msg.msg_ref != self.join_ref {
            return Vec::new();
        }
        let Some(reply) = msg.reply() else {
            return Vec::new();
        };

        if reply.is_ok() {
            self.phase = Phase::Joined;
            tracing::info!(tag = %self.tag, topic = %self.topic, "joined");

            let mut actions = vec![self.set_status(ConnectionStatus::Connected, None)];
            actions.extend(self.buffered.drain(..).map(SessionAction::Send));
            actions
        } else {
            tracing::warn!(tag = %self.tag, topic = %self.topic, response = %reply.response, "join rejected");
            self.phase = Phase::Failed;
            self.buffered.clear();
            vec![
                SessionAction::Disconnect,
                self.set_status(
                    ConnectionStatus::Error,
                    Some(format!("Join failed: {}", reply.response)),
                ),
            ]
        }
    }

    fn heartbeat(&mut self, now: I) -> Vec<SessionAction> {
        let due = self
            .last_heartbeat
            .is_none_or(|last| now - last >= self.config.heartbeat_interval);
        if !due {
            return Vec::new();
        }

        if self.pending_heartbeat.is_some() {
            tracing::warn!(tag = %self.tag, "heartbeat timeout");
            return self.close_channel(ConnectionStatus::Error, Some("heartbeat timeout".into()));
        }

        let msg_ref = self.make_ref();
        self.pending_heartbeat = Some(msg_ref.clone());
        self.last_heartbeat = Some(now);
        vec![SessionAction::Send(ChannelMessage::heartbeat(&msg_ref))]
    }

    fn transport_lost(
        &mut self,
        status: ConnectionStatus,
        error: Option<String>,
    ) -> Vec<SessionAction> {
        if !self.has_channel() {
            return Vec::new();
        }
        tracing::info!(tag = %self.tag, %status, error = error.as_deref(), "transport lost");
        self.channel_lost(status, error)
    }

    /// Channel is gone but the transport is still up: close it too.
    fn close_channel(
        &mut self,
        status: ConnectionStatus,
        error: Option<String>,
    ) -> Vec<SessionAction> {
        let mut actions = vec![SessionAction::Disconnect];
        actions.extend(self.channel_lost(status, error));
        actions
    }

    fn channel_lost(
        &mut self,
        status: ConnectionStatus,
        error: Option<String>,
    ) -> Vec<SessionAction> {
        let was_joined = self.phase == Phase::Joined;
        self.phase = Phase::Closed;
        self.buffered.clear();
        self.pending_heartbeat = None;

        let mut actions = vec![self.set_status(status, error)];
        if was_joined && !self.dropped {
            self.dropped = true;
            actions.push(SessionAction::Dropped);
        }
        actions
    }

    fn push(&mut self, frame: ChannelMessage) -> Vec<SessionAction> {
        match self.phase {
            Phase::Joined => vec![SessionAction::Send(frame)],
            Phase::AwaitingOpen { .. } | Phase::Joining { .. } => {
                self.buffered.push(frame);
                Vec::new()
            },
            Phase::Idle | Phase::Failed | Phase::Closed => self.drop_push(&frame.event),
        }
    }

    fn drop_push(&self, event: &str) -> Vec<SessionAction> {
        tracing::debug!(tag = %self.tag, event, "no joined channel, push dropped");
        Vec::new()
    }

    fn set_status(&mut self, status: ConnectionStatus, error: Option<String>) -> SessionAction {
        self.status = status;
        self.last_error.clone_from(&error);
        SessionAction::Status { status, error }
    }

    fn make_ref(&mut self) -> String {
        self.next_ref += 1;
        self.next_ref.to_string()
    }

    fn socket_url(&self) -> Result<String, url::ParseError> {
        let mut url = Url::parse(&self.config.socket_url)?;
        url.query_pairs_mut()
            .append_pair("vsn", PROTOCOL_VSN)
            .append_pair("_csrf_token", &self.config.csrf_token);
        Ok(url.into())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    type Session = ChannelSession<Instant>;

    fn config() -> SessionConfig {
        SessionConfig {
            socket_url: "ws://localhost:4000/phx_react/websocket".into(),
            csrf_token: "csrf".into(),
            ..SessionConfig::default()
        }
    }

    fn session() -> Session {
        ChannelSession::new(SessionTag(1), config(), Credentials {
            page_key: "users".into(),
            session_id: "s1".into(),
            token: "t1".into(),
        })
    }

    fn reply(join_ref: &str, status: &str, response: serde_json::Value) -> ChannelMessage {
        ChannelMessage::new(
            Some(join_ref.into()),
            Some(join_ref.into()),
            "phx_react:users:s1",
            events::PHX_REPLY,
            json!({ "status": status, "response": response }),
        )
    }

    fn joined(now: Instant) -> Session {
        let mut s = session();
        s.join(now);
        s.handle(SessionEvent::TransportOpened, now);
        s.handle(SessionEvent::MessageReceived(reply("1", "ok", json!({}))), now);
        assert_eq!(s.status(), ConnectionStatus::Connected);
        s
    }

    #[test]
    fn join_connects_then_sends_join_frame() {
        let now = Instant::now();
        let mut s = session();

        let actions = s.join(now);
        assert_eq!(actions, vec![
            SessionAction::Connect {
                url: "ws://localhost:4000/phx_react/websocket?vsn=2.0.0&_csrf_token=csrf".into()
            },
            SessionAction::Status { status: ConnectionStatus::Connecting, error: None },
        ]);

        let actions = s.handle(SessionEvent::TransportOpened, now);
        let [SessionAction::Send(frame)] = actions.as_slice() else {
            panic!("expected join frame, got {actions:?}");
        };
        assert_eq!(frame.topic, "phx_react:users:s1");
        assert_eq!(frame.event, events::PHX_JOIN);
        assert_eq!(frame.payload, json!({ "token": "t1" }));
    }

    #[test]
    fn join_rejection_reports_error_without_drop() {
        let now = Instant::now();
        let mut s = session();
        s.join(now);
        s.handle(SessionEvent::TransportOpened, now);

        let actions = s.handle(
            SessionEvent::MessageReceived(reply("1", "error", json!({"reason": "unauthorized"}))),
            now,
        );
        assert_eq!(actions, vec![SessionAction::Disconnect, SessionAction::Status {
            status: ConnectionStatus::Error,
            error: Some(r#"Join failed: {"reason":"unauthorized"}"#.into()),
        }]);
        assert_eq!(s.last_error(), Some(r#"Join failed: {"reason":"unauthorized"}"#));
    }

    #[test]
    fn pushes_buffer_until_joined() {
        let now = Instant::now();
        let mut s = session();
        s.join(now);
        assert!(s.push_event("search", Params::new()).is_empty());
        s.handle(SessionEvent::TransportOpened, now);
        assert!(s.invalidate(None).is_empty());

        let actions = s.handle(SessionEvent::MessageReceived(reply("1", "ok", json!({}))), now);
        let sent: Vec<_> = actions
            .iter()
            .filter_map(|a| match a {
                SessionAction::Send(frame) => Some(frame.event.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(sent, vec![events::EVENT, events::INVALIDATE]);
    }

    #[test]
    fn push_before_join_is_dropped() {
        let mut s = session();
        assert!(s.push_event("search", Params::new()).is_empty());
        assert!(s.invalidate(Some("stale")).is_empty());
    }

    #[test]
    fn invalidate_defaults_reason() {
        let mut s = joined(Instant::now());
        let actions = s.invalidate(None);
        let [SessionAction::Send(frame)] = actions.as_slice() else {
            panic!("expected invalidate frame, got {actions:?}");
        };
        assert_eq!(frame.payload, json!({ "reason": "manual" }));
    }

    #[test]
    fn state_push_is_delivered_wholesale() {
        let now = Instant::now();
        let mut s = joined(now);
        let msg = ChannelMessage::new(
            None,
            None,
            "phx_react:users:s1",
            events::STATE,
            json!({ "assigns": { "users": [{"id": 1}] }, "changed_keys": ["users"] }),
        );

        let actions = s.handle(SessionEvent::MessageReceived(msg), now);
        let [SessionAction::StateUpdate(push)] = actions.as_slice() else {
            panic!("expected state update, got {actions:?}");
        };
        assert_eq!(push.assigns["users"], json!([{"id": 1}]));
        assert_eq!(push.changed_keys, vec!["users".to_string()]);
    }

    #[test]
    fn frames_for_other_topic_or_join_are_ignored() {
        let now = Instant::now();
        let mut s = joined(now);
        let other_topic = ChannelMessage::new(
            None,
            None,
            "phx_react:users:s0",
            events::STATE,
            json!({ "assigns": {} }),
        );
        let old_join = ChannelMessage::new(
            Some("99".into()),
            None,
            "phx_react:users:s1",
            events::STATE,
            json!({ "assigns": {} }),
        );
        assert!(s.handle(SessionEvent::MessageReceived(other_topic), now).is_empty());
        assert!(s.handle(SessionEvent::MessageReceived(old_join), now).is_empty());
    }

    #[test]
    fn leave_is_idempotent() {
        let mut s = joined(Instant::now());

        let first = s.leave();
        assert!(matches!(&first[0], SessionAction::Send(frame) if frame.event == events::PHX_LEAVE));
        assert_eq!(s.status(), ConnectionStatus::Disconnected);

        let second = s.leave();
        assert_eq!(second, vec![SessionAction::Disconnect, SessionAction::Status {
            status: ConnectionStatus::Disconnected,
            error: None,
        }]);
        assert!(s.push_event("search", Params::new()).is_empty());
    }

    #[test]
    fn leave_before_join_only_disconnects() {
        let mut s = session();
        let actions = s.leave();
        assert_eq!(actions, vec![SessionAction::Disconnect, SessionAction::Status {
            status: ConnectionStatus::Disconnected,
            error: None,
        }]);
    }

    #[test]
    fn transport_close_after_join_reports_drop_once() {
        let now = Instant::now();
        let mut s = joined(now);

        let actions = s.handle(SessionEvent::TransportClosed, now);
        assert_eq!(actions, vec![
            SessionAction::Status { status: ConnectionStatus::Disconnected, error: None },
            SessionAction::Dropped,
        ]);
        assert!(s.handle(SessionEvent::TransportClosed, now).is_empty());
    }

    #[test]
    fn transport_error_before_join_has_no_drop() {
        let now = Instant::now();
        let mut s = session();
        s.join(now);
        let actions =
            s.handle(SessionEvent::TransportError { reason: "connection refused".into() }, now);
        assert_eq!(actions, vec![SessionAction::Status {
            status: ConnectionStatus::Error,
            error: Some("connection refused".into()),
        }]);
    }

    #[test]
    fn join_times_out() {
        let start = Instant::now();
        let mut s = session();
        s.join(start);
        s.handle(SessionEvent::TransportOpened, start);

        assert!(s.tick(start + Duration::from_secs(5)).is_empty());
        let actions = s.tick(start + DEFAULT_JOIN_TIMEOUT);
        assert_eq!(actions, vec![SessionAction::Disconnect, SessionAction::Status {
            status: ConnectionStatus::Error,
            error: Some("Join timed out".into()),
        }]);
    }

    #[test]
    fn unanswered_heartbeat_drops_session() {
        let start = Instant::now();
        let mut s = joined(start);

        let t1 = start + DEFAULT_HEARTBEAT_INTERVAL;
        let actions = s.tick(t1);
        assert!(
            matches!(actions.as_slice(), [SessionAction::Send(frame)] if frame.event == events::HEARTBEAT)
        );

        let actions = s.tick(t1 + DEFAULT_HEARTBEAT_INTERVAL);
        assert_eq!(actions, vec![
            SessionAction::Disconnect,
            SessionAction::Status {
                status: ConnectionStatus::Error,
                error: Some("heartbeat timeout".into()),
            },
            SessionAction::Dropped,
        ]);
    }

    #[test]
    fn answered_heartbeat_keeps_session() {
        let start = Instant::now();
        let mut s = joined(start);

        let t1 = start + DEFAULT_HEARTBEAT_INTERVAL;
        let actions = s.tick(t1);
        let [SessionAction::Send(heartbeat)] = actions.as_slice() else {
            panic!("expected heartbeat, got {actions:?}");
        };
        let ack = ChannelMessage::new(
            None,
            heartbeat.msg_ref.clone(),
            PHOENIX_TOPIC,
            events::PHX_REPLY,
            json!({ "status": "ok", "response": {} }),
        );
        s.handle(SessionEvent::MessageReceived(ack), t1);

        let actions = s.tick(t1 + DEFAULT_HEARTBEAT_INTERVAL);
        assert!(
            matches!(actions.as_slice(), [SessionAction::Send(frame)] if frame.event == events::HEARTBEAT)
        );
        assert_eq!(s.status(), ConnectionStatus::Connected);
    }

    #[test]
    fn invalid_socket_url_is_an_error_status() {
        let mut s: Session = ChannelSession::new(
            SessionTag(2),
            SessionConfig { socket_url: "not a url".into(), ..SessionConfig::default() },
            Credentials { page_key: "users".into(), session_id: "s1".into(), token: "t1".into() },
        );
        let actions = s.join(Instant::now());
        assert!(matches!(
            actions.as_slice(),
            [SessionAction::Status { status: ConnectionStatus::Error, error: Some(_) }]
        ));
    }

    #[test]
    fn server_close_disconnects_transport() {
        let now = Instant::now();
        let mut s = joined(now);
        let close = ChannelMessage::new(
            Some("1".into()),
            Some("1".into()),
            "phx_react:users:s1",
            events::PHX_CLOSE,
            json!({}),
        );

        let actions = s.handle(SessionEvent::MessageReceived(close), now);
        assert_eq!(actions, vec![
            SessionAction::Disconnect,
            SessionAction::Status { status: ConnectionStatus::Disconnected, error: None },
            SessionAction::Dropped,
        ]);
        assert!(s.push_event("search", Params::new()).is_empty());
    }

    #[test]
    fn server_channel_error_disconnects_transport() {
        let now = Instant::now();
        let mut s = joined(now);
        let crash = ChannelMessage::new(
            Some("1".into()),
            None,
            "phx_react:users:s1",
            events::PHX_ERROR,
            json!({}),
        );

        let actions = s.handle(SessionEvent::MessageReceived(crash), now);
        assert_eq!(actions[0], SessionAction::Disconnect);
        assert_eq!(s.status(), ConnectionStatus::Error);
        assert_eq!(s.last_error(), Some("Channel error"));
    }

    #[test]
    fn update_auth_keeps_topic() {
        let mut s = joined(Instant::now());
        s.update_auth(Credentials {
            page_key: "users".into(),
            session_id: "s2".into(),
            token: "t2".into(),
        });
        assert_eq!(s.topic().as_str(), "phx_react:users:s1");
        assert_eq!(s.credentials().token, "t2");
        assert!(s.is_joined());
    }
}
