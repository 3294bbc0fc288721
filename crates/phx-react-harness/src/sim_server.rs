//! Simulated phx-react server.
//!
//! One in-memory process standing in for the page endpoint, the action
//! endpoint and the channel server. Every page payload issues a fresh token;
//! joins and actions are only accepted with a token issued for the session.
//!
//! # Invariants
//!
//! - A session keeps its id across page payloads. Only the token rotates.
//! - Every view state the server hands out (bootstrap, page payload or state
//!   push) is recorded, so tests can check that client state came from the
//!   server.

use std::collections::{BTreeMap, HashMap};

use phx_react_app::{DocumentAttributes, attributes};
use phx_react_client::{ClientError, PageQuery};
use phx_react_proto::{
    ActionEnvelope, ActionError, ActionRequest, ChannelMessage, PagePayload, Params, Topic,
    ViewState,
    channel::{DEFAULT_NAMESPACE, PHOENIX_TOPIC, events},
};
use serde_json::{Value, json};

/// Page endpoint path handed out in bootstrap documents.
pub const PAGE_ENDPOINT: &str = "/phx_react/page";

/// Action endpoint path handed out in bootstrap documents.
pub const ACTION_ENDPOINT: &str = "/phx_react/action";

/// CSRF token handed out in bootstrap documents.
pub const CSRF_TOKEN: &str = "sim-csrf";

/// Server-side action implementation.
pub type ActionHandler = Box<dyn Fn(&Params) -> ActionEnvelope + Send + Sync>;

#[derive(Debug, Clone)]
struct PageFixture {
    page_module: String,
    component_key: String,
    state: ViewState,
}

/// In-memory page, action and channel server.
pub struct SimServer {
    namespace: String,
    pages: HashMap<String, PageFixture>,
    actions: HashMap<String, ActionHandler>,
    /// Tokens issued per session id, oldest first.
    tokens: HashMap<String, Vec<String>>,
    /// Joined topics and their join refs.
    joined: BTreeMap<String, String>,
    next_session: u64,
    next_token: u64,
    reject_joins: bool,
    received: Vec<ChannelMessage>,
    action_log: Vec<ActionRequest>,
    page_log: Vec<PageQuery>,
    issued_states: Vec<ViewState>,
}

impl SimServer {
    /// Server with no pages, using the default topic namespace.
    pub fn new() -> Self {
        Self {
            namespace: DEFAULT_NAMESPACE.to_string(),
            pages: HashMap::new(),
            actions: HashMap::new(),
            tokens: HashMap::new(),
            joined: BTreeMap::new(),
            next_session: 0,
            next_token: 0,
            reject_joins: false,
            received: Vec::new(),
            action_log: Vec::new(),
            page_log: Vec::new(),
            issued_states: Vec::new(),
        }
    }

    /// Serve `page_key` with the given module, component and initial state.
    #[must_use]
    pub fn with_page(
        mut self,
        page_key: impl Into<String>,
        page_module: impl Into<String>,
        component_key: impl Into<String>,
        state: Value,
    ) -> Self {
        let state = match state {
            Value::Object(map) => map,
            _ => ViewState::new(),
        };
        self.pages.insert(page_key.into(), PageFixture {
            page_module: page_module.into(),
            component_key: component_key.into(),
            state,
        });
        self
    }

    /// Register an action handler.
    #[must_use]
    pub fn with_action<F>(mut self, name: impl Into<String>, handler: F) -> Self
    where
        F: Fn(&Params) -> ActionEnvelope + Send + Sync + 'static,
    {
        self.actions.insert(name.into(), Box::new(handler));
        self
    }

    /// Reject every join from now on.
    pub fn set_reject_joins(&mut self, reject: bool) {
        self.reject_joins = reject;
    }

    /// Render the host document for a fresh session on `page_key`.
    pub fn bootstrap(&mut self, page_key: &str) -> Option<DocumentAttributes> {
        let payload = self.issue(page_key, None)?;
        Some(
            DocumentAttributes::new()
                .with_data(attributes::PAGE_KEY, payload.page_key)
                .with_data(attributes::COMPONENT_KEY, payload.component_key)
                .with_data(attributes::PAGE_MODULE, payload.page_module)
                .with_data(attributes::SESSION_ID, payload.session_id)
                .with_data(attributes::TOKEN, payload.token)
                .with_data(
                    attributes::INITIAL_STATE,
                    Value::Object(payload.initial_state).to_string(),
                )
                .with_data(attributes::PAGE_ENDPOINT, PAGE_ENDPOINT)
                .with_data(attributes::ACTION_ENDPOINT, ACTION_ENDPOINT)
                .with_meta(attributes::CSRF_META, CSRF_TOKEN),
        )
    }

    /// Serve a page fetch.
    ///
    /// # Errors
    ///
    /// [`ClientError::MalformedResponse`] for an unknown page, as the page
    /// loader reports an error status.
    pub fn fetch_page(&mut self, query: &PageQuery) -> Result<PagePayload, ClientError> {
        self.page_log.push(query.clone());
        let session_id = Some(query.session_id.as_str()).filter(|id| self.tokens.contains_key(*id));
        let session_id = session_id.map(str::to_string);
        self.issue(&query.page_key, session_id.as_deref()).ok_or_else(|| {
            ClientError::MalformedResponse("page response status \"error\" without payload".into())
        })
    }

    /// Serve an action submission.
    pub fn handle_action(&mut self, request: &ActionRequest) -> ActionEnvelope {
        self.action_log.push(request.clone());

        if !self.token_valid(&request.session_id, &request.token) {
            return error_envelope("unauthorized", "invalid session token");
        }
        match self.actions.get(&request.action) {
            Some(handler) => handler(&request.params),
            None => error_envelope("unknown_action", &format!("no action {:?}", request.action)),
        }
    }

    /// Handle one inbound frame and return the replies.
    pub fn handle_frame(&mut self, message: &ChannelMessage) -> Vec<ChannelMessage> {
        if message.topic == PHOENIX_TOPIC {
            return match message.event.as_str() {
                events::HEARTBEAT => vec![reply(message, "ok", json!({}))],
                _ => Vec::new(),
            };
        }

        match message.event.as_str() {
            events::PHX_JOIN => {
                let token = message.payload.get("token").and_then(Value::as_str);
                if !self.reject_joins && self.authorize(&message.topic, token) {
                    let join_ref = message.join_ref.clone().unwrap_or_default();
                    self.joined.insert(message.topic.clone(), join_ref);
                    vec![reply(message, "ok", json!({}))]
                } else {
                    vec![reply(message, "error", json!({ "reason": "unauthorized" }))]
                }
            },
            events::PHX_LEAVE => {
                self.joined.remove(&message.topic);
                vec![reply(message, "ok", json!({}))]
            },
            events::EVENT | events::INVALIDATE if self.joined.contains_key(&message.topic) => {
                self.received.push(message.clone());
                vec![reply(message, "ok", json!({}))]
            },
            _ => Vec::new(),
        }
    }

    /// The transport carrying `topic` went away.
    pub fn disconnected(&mut self, topic: &str) {
        self.joined.remove(topic);
    }

    /// State push for a joined `topic`.
    pub fn push_state(&mut self, topic: &str, assigns: Value) -> Option<ChannelMessage> {
        if !self.joined.contains_key(topic) {
            return None;
        }
        let changed_keys: Vec<String> = match &assigns {
            Value::Object(map) => map.keys().cloned().collect(),
            _ => Vec::new(),
        };
        if let Value::Object(map) = &assigns {
            self.issued_states.push(map.clone());
        } else {
            self.issued_states.push(ViewState::new());
        }
        Some(ChannelMessage::new(
            None,
            None,
            topic,
            events::STATE,
            json!({ "assigns": assigns, "changed_keys": changed_keys }),
        ))
    }

    /// Invalidate push for a joined `topic`.
    pub fn push_invalidate(&self, topic: &str) -> Option<ChannelMessage> {
        self.joined.contains_key(topic).then(|| {
            ChannelMessage::new(None, None, topic, events::INVALIDATE, json!({ "reason": "stale" }))
        })
    }

    /// Whether `topic` is currently joined.
    pub fn is_joined(&self, topic: &str) -> bool {
        self.joined.contains_key(topic)
    }

    /// Joined topics, in order.
    pub fn joined_topics(&self) -> Vec<String> {
        self.joined.keys().cloned().collect()
    }

    /// Latest token issued for `session_id`.
    pub fn token(&self, session_id: &str) -> Option<&str> {
        self.tokens.get(session_id).and_then(|tokens| tokens.last()).map(String::as_str)
    }

    /// Revoke every token issued for `session_id`.
    pub fn revoke(&mut self, session_id: &str) {
        if let Some(tokens) = self.tokens.get_mut(session_id) {
            tokens.clear();
        }
    }

    /// View events and invalidates received on joined topics.
    pub fn received(&self) -> &[ChannelMessage] {
        &self.received
    }

    /// Every action submission, accepted or not.
    pub fn action_log(&self) -> &[ActionRequest] {
        &self.action_log
    }

    /// Every page fetch, served or not.
    pub fn page_log(&self) -> &[PageQuery] {
        &self.page_log
    }

    /// Every view state handed out.
    pub fn issued_states(&self) -> &[ViewState] {
        &self.issued_states
    }

    /// Issue a payload for `page_key`, continuing `session_id` if given.
    fn issue(&mut self, page_key: &str, session_id: Option<&str>) -> Option<PagePayload> {
        let fixture = self.pages.get(page_key)?.clone();

        let session_id = match session_id {
            Some(id) => id.to_string(),
            None => {
                self.next_session += 1;
                format!("s{}", self.next_session)
            },
        };
        self.next_token += 1;
        let token = format!("t{}", self.next_token);
        self.tokens.entry(session_id.clone()).or_default().push(token.clone());
        self.issued_states.push(fixture.state.clone());

        tracing::debug!(page_key, %session_id, %token, "sim server issued page");
        Some(PagePayload {
            page_key: page_key.to_string(),
            page_module: fixture.page_module,
            component_key: fixture.component_key,
            topic: Topic::for_page(&self.namespace, page_key, &session_id).to_string(),
            session_id,
            token,
            initial_state: fixture.state,
        })
    }

    fn authorize(&self, topic: &str, token: Option<&str>) -> bool {
        let mut parts = topic.splitn(3, ':');
        let (Some(namespace), Some(_page_key), Some(session_id)) =
            (parts.next(), parts.next(), parts.next())
        else {
            return false;
        };
        namespace == self.namespace && token.is_some_and(|t| self.token_valid(session_id, t))
    }

    fn token_valid(&self, session_id: &str, token: &str) -> bool {
        self.tokens.get(session_id).is_some_and(|tokens| tokens.iter().any(|t| t == token))
    }
}

impl Default for SimServer {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for SimServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimServer")
            .field("namespace", &self.namespace)
            .field("pages", &self.pages.keys().collect::<Vec<_>>())
            .field("actions", &self.actions.keys().collect::<Vec<_>>())
            .field("joined", &self.joined)
            .finish_non_exhaustive()
    }
}

fn reply(message: &ChannelMessage, status: &str, response: Value) -> ChannelMessage {
    ChannelMessage::new(
        message.join_ref.clone(),
        message.msg_ref.clone(),
        message.topic.clone(),
        events::PHX_REPLY,
        json!({ "status": status, "response": response }),
    )
}

fn error_envelope(code: &str, message: &str) -> ActionEnvelope {
    ActionEnvelope::Error {
        error: ActionError { code: code.to_string(), message: message.to_string(), details: None },
    }
}
