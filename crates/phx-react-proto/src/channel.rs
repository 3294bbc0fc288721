//! Channel frame format.
//!
//! The persistent connection speaks the Phoenix Channels V2 JSON serializer:
//! every frame is a five-element array
//!
//! ```text
//! [join_ref, ref, topic, event, payload]
//! ```
//!
//! `join_ref` ties a frame to one join of a topic, `ref` correlates a push
//! with its `phx_reply`. Both are strings or `null`.
//!
//! # Invariants
//!
//! - Topic derivation is deterministic: the same namespace, page key and
//!   session id always produce the same topic.
//! - Decoding never panics. Frames that are not five-element arrays, or whose
//!   topic/event are not strings, are rejected with [`ProtocolError`].

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::{Params, ProtocolError, Result, ViewState};

/// Channel event names.
pub mod events {
    /// Join request.
    pub const PHX_JOIN: &str = "phx_join";
    /// Leave request.
    pub const PHX_LEAVE: &str = "phx_leave";
    /// Reply to a push.
    pub const PHX_REPLY: &str = "phx_reply";
    /// Server-side channel crash.
    pub const PHX_ERROR: &str = "phx_error";
    /// Server closed the channel.
    pub const PHX_CLOSE: &str = "phx_close";
    /// Socket keepalive.
    pub const HEARTBEAT: &str = "heartbeat";
    /// Full-state replacement pushed by the server.
    pub const STATE: &str = "state";
    /// Staleness signal, inbound and outbound.
    pub const INVALIDATE: &str = "invalidate";
    /// View event pushed by the client.
    pub const EVENT: &str = "event";
}

/// Topic used for socket-level heartbeats.
pub const PHOENIX_TOPIC: &str = "phoenix";

/// Default topic namespace.
pub const DEFAULT_NAMESPACE: &str = "phx_react";

/// Channel topic for one page session.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Topic(String);

impl Topic {
    /// Derive the topic `"<namespace>:<page_key>:<session_id>"`.
    pub fn for_page(namespace: &str, page_key: &str, session_id: &str) -> Self {
        Self(format!("{namespace}:{page_key}:{session_id}"))
    }

    /// Topic as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One channel frame.
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelMessage {
    /// Ref of the join this frame belongs to.
    pub join_ref: Option<String>,
    /// Ref correlating a push with its reply.
    pub msg_ref: Option<String>,
    /// Topic.
    pub topic: String,
    /// Event name.
    pub event: String,
    /// Event payload.
    pub payload: Value,
}

/// Join payload carrying the join-time credential.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinPayload {
    /// Page token.
    pub token: String,
}

/// Payload of a `phx_reply`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reply {
    /// `"ok"` or `"error"`.
    pub status: String,
    /// Reply body.
    #[serde(default)]
    pub response: Value,
}

impl Reply {
    /// Whether the reply acknowledges the push.
    pub fn is_ok(&self) -> bool {
        self.status == "ok"
    }
}

/// Inbound full-state push.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct StatePush {
    /// Complete server assigns.
    pub assigns: ViewState,
    /// Keys that changed since the previous push. Advisory only.
    pub changed_keys: Vec<String>,
}

impl ChannelMessage {
    /// Build a frame.
    pub fn new(
        join_ref: Option<String>,
        msg_ref: Option<String>,
        topic: impl Into<String>,
        event: impl Into<String>,
        payload: Value,
    ) -> Self {
        Self { join_ref, msg_ref, topic: topic.into(), event: event.into(), payload }
    }

    /// `phx_join` frame. The join ref doubles as the message ref.
    pub fn join(join_ref: &str, topic: &Topic, token: &str) -> Self {
        Self::new(
            Some(join_ref.to_string()),
            Some(join_ref.to_string()),
            topic.as_str(),
            events::PHX_JOIN,
            json!({ "token": token }),
        )
    }

    /// `phx_leave` frame.
    pub fn leave(join_ref: &str, msg_ref: &str, topic: &Topic) -> Self {
        Self::new(
            Some(join_ref.to_string()),
            Some(msg_ref.to_string()),
            topic.as_str(),
            events::PHX_LEAVE,
            json!({}),
        )
    }

    /// Outbound `event` frame carrying a view event.
    pub fn event(join_ref: &str, msg_ref: &str, topic: &Topic, name: &str, params: Params) -> Self {
        Self::new(
            Some(join_ref.to_string()),
            Some(msg_ref.to_string()),
            topic.as_str(),
            events::EVENT,
            json!({ "name": name, "params": Value::Object(params) }),
        )
    }

    /// Outbound `invalidate` frame.
    pub fn invalidate(join_ref: &str, msg_ref: &str, topic: &Topic, reason: &str) -> Self {
        Self::new(
            Some(join_ref.to_string()),
            Some(msg_ref.to_string()),
            topic.as_str(),
            events::INVALIDATE,
            json!({ "reason": reason }),
        )
    }

    /// Socket heartbeat.
    pub fn heartbeat(msg_ref: &str) -> Self {
        Self::new(None, Some(msg_ref.to_string()), PHOENIX_TOPIC, events::HEARTBEAT, json!({}))
    }

    /// Encode to the wire array.
    pub fn encode(&self) -> Result<String> {
        let frame = json!([self.join_ref, self.msg_ref, self.topic, self.event, self.payload]);
        Ok(serde_json::to_string(&frame)?)
    }

    /// Decode a wire array.
    pub fn decode(text: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(text)?;
        let Value::Array(mut parts) = value else {
            return Err(ProtocolError::MalformedFrame("expected array".to_string()));
        };
        if parts.len() != 5 {
            return Err(ProtocolError::MalformedFrame(format!(
                "expected 5 elements, got {}",
                parts.len()
            )));
        }

        let payload = parts.pop().unwrap_or(Value::Null);
        let event = expect_string(parts.pop(), "event")?;
        let topic = expect_string(parts.pop(), "topic")?;
        let msg_ref = optional_ref(parts.pop(), "ref")?;
        let join_ref = optional_ref(parts.pop(), "join_ref")?;

        Ok(Self { join_ref, msg_ref, topic, event, payload })
    }

    /// Parse the payload as a `phx_reply`. `None` for other events.
    pub fn reply(&self) -> Option<Reply> {
        if self.event != events::PHX_REPLY {
            return None;
        }
        serde_json::from_value(self.payload.clone()).ok()
    }

    /// Parse the payload as a state push.
    ///
    /// Lenient: a missing or non-object `assigns` becomes an empty mapping and
    /// non-string entries of `changed_keys` are skipped.
    pub fn state_push(&self) -> StatePush {
        let assigns = match self.payload.get("assigns") {
            Some(Value::Object(map)) => map.clone(),
            _ => ViewState::new(),
        };
        let changed_keys = match self.payload.get("changed_keys") {
            Some(Value::Array(keys)) => {
                keys.iter().filter_map(|k| k.as_str().map(str::to_string)).collect()
            },
            _ => Vec::new(),
        };
        StatePush { assigns, changed_keys }
    }

    /// Payload as a mapping, or empty when it is not an object.
    pub fn payload_map(&self) -> Params {
        match &self.payload {
            Value::Object(map) => map.clone(),
            _ => Params::new(),
        }
    }
}

fn expect_string(value: Option<Value>, field: &'static str) -> Result<String> {
    match value {
        Some(Value::String(s)) => Ok(s),
        _ => Err(ProtocolError::UnexpectedType { field, expected: "string" }),
    }
}

fn optional_ref(value: Option<Value>, field: &'static str) -> Result<Option<String>> {
    match value {
        Some(Value::String(s)) => Ok(Some(s)),
        Some(Value::Number(n)) => Ok(Some(n.to_string())),
        Some(Value::Null) | None => Ok(None),
        Some(_) => Err(ProtocolError::UnexpectedType { field, expected: "string or null" }),
    }
}
