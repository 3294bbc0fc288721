//! Runtime controller state machine.
//!
//! Binds page identity, view state and the current channel session. Views
//! never mutate state; every change flows through the controller, which
//! returns [`RuntimeAction`]s for the runtime to execute.
//!
//! # State Machine
//!
//! ```text
//! ┌──────────────┐ mount ┌────────┐ refresh_page ┌───────────────┐
//! │ Initializing │──────>│ Active │─────────────>│ Transitioning │
//! └──────────────┘       └────────┘<─────────────└───────────────┘
//!                             │      page loaded/failed
//!                             │ unmount
//!                             ↓
//!                       ┌───────────┐
//!                       │ Unmounted │
//!                       └───────────┘
//! ```
//!
//! # Invariants
//!
//! - At most one session is current. A replacement emits the old session's
//!   leave and disconnect before the new session's connect, and the render
//!   that publishes the new identity comes last.
//! - Transport events carry the [`SessionTag`] of the connection that
//!   produced them. Events for any tag other than the current session's are
//!   discarded.
//! - Page tickets record the identity generation when issued. A payload for
//!   an older generation is discarded, never applied.
//! - View state is replaced wholesale by state pushes and page payloads.

use std::{
    collections::{BTreeMap, BTreeSet},
    ops::Sub,
    time::{Duration, Instant},
};

use phx_react_client::{
    ChannelSession, ClientError, ConnectionStatus, Credentials, PageQuery, SessionAction,
    SessionEvent, SessionTag,
};
use phx_react_proto::{
    ActionEnvelope, ActionRequest, ChannelMessage, PageIdentity, PagePayload, Params, ViewState,
};

use crate::{Bootstrap, RuntimeConfig, RuntimeError};

/// Controller lifecycle phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Nothing mounted yet.
    Initializing,
    /// Page mounted, no fetch outstanding.
    Active,
    /// At least one page fetch is outstanding.
    Transitioning,
    /// Torn down. Terminal.
    Unmounted,
}

/// Identifies one page fetch and the identity generation it was issued in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PageTicket {
    /// Unique fetch id.
    pub id: u64,
    /// Generation at request time.
    pub generation: u64,
}

/// Result of applying a fetched page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// Payload became the current page.
    Applied,
    /// Identity changed while the fetch was in flight; payload dropped.
    Discarded,
}

/// How to answer an action invocation.
#[derive(Debug, Clone, PartialEq)]
pub enum ActionDispatch {
    /// Answer immediately without a network call.
    Resolved(ActionEnvelope),
    /// Submit this request to the action endpoint.
    Submit(ActionRequest),
}

/// Actions returned by the controller for the runtime to execute.
#[derive(Debug, Clone, PartialEq)]
pub enum RuntimeAction {
    /// Open the transport for session `tag`.
    Connect {
        /// Session.
        tag: SessionTag,
        /// Socket URL.
        url: String,
    },
    /// Send a frame on session `tag`'s transport.
    Send {
        /// Session.
        tag: SessionTag,
        /// Frame.
        message: ChannelMessage,
    },
    /// Close session `tag`'s transport.
    Disconnect {
        /// Session.
        tag: SessionTag,
    },
    /// Fetch a page payload.
    FetchPage {
        /// Ticket to report the result under.
        ticket: PageTicket,
        /// Request.
        query: PageQuery,
    },
    /// State, status or identity changed.
    Render,
}

/// Runtime controller.
///
/// Generic over `Instant` so simulations can drive it with virtual time.
#[derive(Debug)]
pub struct Controller<I = Instant>
where
    I: Copy + Ord + Send + Sync + Sub<Output = Duration>,
{
    config: RuntimeConfig,
    phase: Phase,
    page: Option<PageIdentity>,
    csrf_token: String,
    state: ViewState,
    changed_keys: Vec<String>,
    session: Option<ChannelSession<I>>,
    next_tag: u64,
    generation: u64,
    next_ticket: u64,
    in_flight: BTreeSet<u64>,
    recovery: Option<u64>,
}

impl<I> Controller<I>
where
    I: Copy + Ord + Send + Sync + Sub<Output = Duration>,
{
    /// Create a controller in [`Phase::Initializing`].
    pub fn new(config: RuntimeConfig) -> Self {
        Self {
            config,
            phase: Phase::Initializing,
            page: None,
            csrf_token: String::new(),
            state: ViewState::new(),
            changed_keys: Vec::new(),
            session: None,
            next_tag: 0,
            generation: 0,
            next_ticket: 0,
            in_flight: BTreeSet::new(),
            recovery: None,
        }
    }

    /// Current phase.
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Current page identity. `None` before mount and after unmount.
    pub fn page(&self) -> Option<&PageIdentity> {
        self.page.as_ref()
    }

    /// Current view state.
    pub fn state(&self) -> &ViewState {
        &self.state
    }

    /// Keys the last state push reported as changed.
    pub fn changed_keys(&self) -> &[String] {
        &self.changed_keys
    }

    /// Status of the current session, or disconnected if there is none.
    pub fn status(&self) -> ConnectionStatus {
        self.session.as_ref().map_or(ConnectionStatus::Disconnected, ChannelSession::status)
    }

    /// Error message of the current session.
    pub fn last_error(&self) -> Option<&str> {
        self.session.as_ref().and_then(ChannelSession::last_error)
    }

    /// Tag of the current session.
    pub fn current_tag(&self) -> Option<SessionTag> {
        self.session.as_ref().map(ChannelSession::tag)
    }

    /// Current session.
    pub fn session(&self) -> Option<&ChannelSession<I>> {
        self.session.as_ref()
    }

    /// Identity generation. Bumped whenever a page payload is applied.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Mount the bootstrap page and join its session.
    ///
    /// # Errors
    ///
    /// [`RuntimeError::AlreadyMounted`] unless in [`Phase::Initializing`].
    pub fn mount(
        &mut self,
        bootstrap: Bootstrap,
        now: I,
    ) -> Result<Vec<RuntimeAction>, RuntimeError> {
        if self.phase != Phase::Initializing {
            return Err(RuntimeError::AlreadyMounted);
        }

        tracing::info!(
            page_key = %bootstrap.page.page_key,
            component_key = %bootstrap.page.component_key,
            session_id = %bootstrap.page.session_id,
            "mounting page"
        );
        tracing::debug!(initial_state = %bootstrap.initial_state_json(), "bootstrap state");

        self.csrf_token = bootstrap.csrf_token;
        self.page = Some(bootstrap.page);
        self.state = bootstrap.initial_state;
        self.phase = Phase::Active;

        let mut actions = self.replace_session(now);
        actions.push(RuntimeAction::Render);
        Ok(coalesce_renders(actions))
    }

    /// Handle a transport event from session `tag`.
    pub fn handle_session_event(
        &mut self,
        tag: SessionTag,
        event: SessionEvent,
        now: I,
    ) -> Vec<RuntimeAction> {
        let actions = match self.session.as_mut() {
            Some(session) if session.tag() == tag => session.handle(event, now),
            _ => {
                tracing::debug!(%tag, "discarding event from stale session");
                return Vec::new();
            },
        };
        coalesce_renders(self.apply(actions))
    }

    /// Process session timeouts and heartbeats.
    pub fn tick(&mut self, now: I) -> Vec<RuntimeAction> {
        let Some(session) = self.session.as_mut() else {
            return Vec::new();
        };
        let actions = session.tick(now);
        coalesce_renders(self.apply(actions))
    }

    /// Push a view event on the current session.
    pub fn push_event(&mut self, name: &str, params: Params) -> Vec<RuntimeAction> {
        let Some(session) = self.session.as_mut() else {
            tracing::debug!(event = name, "no session, event dropped");
            return Vec::new();
        };
        let actions = session.push_event(name, params);
        self.apply(actions)
    }

    /// Send an invalidate on the current session.
    pub fn invalidate(&mut self, reason: Option<&str>) -> Vec<RuntimeAction> {
        let Some(session) = self.session.as_mut() else {
            tracing::debug!("no session, invalidate dropped");
            return Vec::new();
        };
        let actions = session.invalidate(reason);
        self.apply(actions)
    }

    /// Decide how to answer an action invocation.
    ///
    /// Without a connected session the answer is the local `not_connected`
    /// envelope and nothing is sent.
    pub fn prepare_action(&self, name: &str, params: Params) -> ActionDispatch {
        match (&self.page, &self.session) {
            (Some(page), Some(session)) if session.status() == ConnectionStatus::Connected => {
                ActionDispatch::Submit(ActionRequest {
                    page_key: page.page_key.clone(),
                    session_id: page.session_id.clone(),
                    token: page.token.clone(),
                    action: name.to_string(),
                    params,
                })
            },
            _ => {
                tracing::debug!(action = name, status = %self.status(), "no connected session, action not sent");
                ActionDispatch::Resolved(ActionEnvelope::not_connected())
            },
        }
    }

    /// Request the payload for `target` (default: the current page key).
    ///
    /// # Errors
    ///
    /// [`RuntimeError::NotMounted`] if no page is mounted.
    pub fn refresh_page(
        &mut self,
        target: Option<&str>,
        params: BTreeMap<String, String>,
    ) -> Result<(PageTicket, Vec<RuntimeAction>), RuntimeError> {
        let page = self.page.as_ref().ok_or(RuntimeError::NotMounted)?;

        self.next_ticket += 1;
        let ticket = PageTicket { id: self.next_ticket, generation: self.generation };
        let query = PageQuery {
            page_key: target.unwrap_or(page.page_key.as_str()).to_string(),
            params,
            session_id: page.session_id.clone(),
        };

        tracing::debug!(page_key = %query.page_key, ticket = ticket.id, "requesting page");
        self.in_flight.insert(ticket.id);
        self.phase = Phase::Transitioning;
        Ok((ticket, vec![RuntimeAction::FetchPage { ticket, query }]))
    }

    /// Apply a fetched page payload.
    ///
    /// Same page and component with a joined session: credentials are
    /// updated in place and the session is kept. Otherwise, including while
    /// the join is still in flight, the session is torn down and a new one
    /// joins under the new identity, so the pending join never carries a
    /// token issued for a different session id.
    pub fn page_loaded(
        &mut self,
        ticket: PageTicket,
        payload: PagePayload,
        now: I,
    ) -> (RefreshOutcome, Vec<RuntimeAction>) {
        self.finish_fetch(ticket);

        if ticket.generation != self.generation || self.page.is_none() {
            tracing::debug!(
                ticket = ticket.id,
                page_key = %payload.page_key,
                "discarding page payload for stale identity"
            );
            return (RefreshOutcome::Discarded, Vec::new());
        }

        let identity = payload.identity();
        let joined = self.session.as_ref().is_some_and(|s| s.is_joined());
        let in_place = joined && self.page.as_ref().is_some_and(|page| page.same_page(&identity));

        let mut actions = Vec::new();
        if in_place {
            if let Some(session) = self.session.as_mut() {
                session.update_auth(credentials(&identity));
            }
            tracing::info!(page_key = %identity.page_key, session_id = %identity.session_id, "page refreshed in place");
            self.page = Some(identity);
        } else {
            tracing::info!(
                page_key = %identity.page_key,
                component_key = %identity.component_key,
                session_id = %identity.session_id,
                "page replaced"
            );
            self.page = Some(identity);
            actions.extend(self.replace_session(now));
        }

        self.state = payload.initial_state;
        self.changed_keys.clear();
        self.generation += 1;
        actions.push(RuntimeAction::Render);
        (RefreshOutcome::Applied, coalesce_renders(actions))
    }

    /// Record a failed page fetch.
    pub fn page_failed(&mut self, ticket: PageTicket, error: &ClientError) -> Vec<RuntimeAction> {
        let recovering = self.finish_fetch(ticket);
        tracing::warn!(ticket = ticket.id, %error, "page fetch failed");

        if !recovering || ticket.generation != self.generation {
            return Vec::new();
        }
        let Some(session) = self.session.as_mut() else {
            return Vec::new();
        };
        let actions = session.recovery_failed(&error.to_string());
        coalesce_renders(self.apply(actions))
    }

    /// Tear down the current session and release all state. Idempotent.
    pub fn unmount(&mut self) -> Vec<RuntimeAction> {
        if self.phase != Phase::Unmounted {
            tracing::info!("unmounting");
        }
        let actions = self.teardown_session();

        self.phase = Phase::Unmounted;
        self.page = None;
        self.state.clear();
        self.changed_keys.clear();
        self.in_flight.clear();
        self.recovery = None;
        self.generation += 1;
        actions
    }

    fn replace_session(&mut self, now: I) -> Vec<RuntimeAction> {
        let mut actions = self.teardown_session();
        let Some(page) = &self.page else {
            return actions;
        };

        self.next_tag += 1;
        let tag = SessionTag(self.next_tag);
        let mut session = ChannelSession::new(
            tag,
            self.config.session_config(&self.csrf_token),
            credentials(page),
        );
        tracing::info!(%tag, topic = %session.topic(), "session created");

        let joined = session.join(now);
        self.session = Some(session);
        actions.extend(self.apply(joined));
        actions
    }

    fn teardown_session(&mut self) -> Vec<RuntimeAction> {
        let Some(mut session) = self.session.take() else {
            return Vec::new();
        };
        let tag = session.tag();
        tracing::debug!(%tag, "tearing down session");

        session
            .leave()
            .into_iter()
            .filter_map(|action| match action {
                SessionAction::Send(message) => Some(RuntimeAction::Send { tag, message }),
                SessionAction::Disconnect => Some(RuntimeAction::Disconnect { tag }),
                _ => None,
            })
            .collect()
    }

    /// Translate actions of the current session.
    fn apply(&mut self, actions: Vec<SessionAction>) -> Vec<RuntimeAction> {
        let Some(tag) = self.current_tag() else {
            return Vec::new();
        };

        let mut out = Vec::new();
        for action in actions {
            match action {
                SessionAction::Connect { url } => out.push(RuntimeAction::Connect { tag, url }),
                SessionAction::Send(message) => out.push(RuntimeAction::Send { tag, message }),
                SessionAction::Disconnect => out.push(RuntimeAction::Disconnect { tag }),
                SessionAction::Status { status, error } => {
                    tracing::debug!(%tag, %status, error = error.as_deref(), "status changed");
                    out.push(RuntimeAction::Render);
                },
                SessionAction::StateUpdate(push) => {
                    self.state = push.assigns;
                    self.changed_keys = push.changed_keys;
                    out.push(RuntimeAction::Render);
                },
                SessionAction::Invalidated { payload } => {
                    tracing::info!(%tag, ?payload, "server invalidated page");
                    out.extend(self.refresh_current());
                },
                SessionAction::Dropped => out.extend(self.recover(tag)),
            }
        }
        out
    }

    fn refresh_current(&mut self) -> Vec<RuntimeAction> {
        match self.refresh_page(None, BTreeMap::new()) {
            Ok((_, actions)) => actions,
            Err(e) => {
                tracing::warn!(error = %e, "cannot refresh page");
                Vec::new()
            },
        }
    }

    /// Refresh the page after a joined session dropped, to rejoin with a
    /// fresh token once the payload arrives.
    fn recover(&mut self, tag: SessionTag) -> Vec<RuntimeAction> {
        if !self.config.rejoin_on_drop || self.recovery.is_some() {
            return Vec::new();
        }
        let Some(session) = self.session.as_mut() else {
            return Vec::new();
        };

        tracing::info!(%tag, "session dropped, refreshing page to rejoin");
        let status = session.mark_reconnecting();
        let mut actions = self.apply(status);

        match self.refresh_page(None, BTreeMap::new()) {
            Ok((ticket, fetch)) => {
                self.recovery = Some(ticket.id);
                actions.extend(fetch);
            },
            Err(e) => tracing::warn!(error = %e, "cannot recover session"),
        }
        actions
    }

    /// Returns whether `ticket` was the recovery fetch.
    fn finish_fetch(&mut self, ticket: PageTicket) -> bool {
        self.in_flight.remove(&ticket.id);
        if self.in_flight.is_empty() && self.phase == Phase::Transitioning {
            self.phase = Phase::Active;
        }
        if self.recovery == Some(ticket.id) {
            self.recovery = None;
            return true;
        }
        false
    }
}

fn credentials(page: &PageIdentity) -> Credentials {
    Credentials {
        page_key: page.page_key.clone(),
        session_id: page.session_id.clone(),
        token: page.token.clone(),
    }
}

/// Keep effects in order and collapse renders into one trailing render.
fn coalesce_renders(mut actions: Vec<RuntimeAction>) -> Vec<RuntimeAction> {
    let before = actions.len();
    actions.retain(|action| *action != RuntimeAction::Render);
    if actions.len() != before {
        actions.push(RuntimeAction::Render);
    }
    actions
}

#[cfg(test)]
mod tests {
    use phx_react_proto::channel::events;
    use serde_json::json;

    use super::*;
    use crate::{DocumentAttributes, attributes};

    fn bootstrap() -> Bootstrap {
        let doc = DocumentAttributes::new()
            .with_data(attributes::PAGE_KEY, "users")
            .with_data(attributes::PAGE_MODULE, "App.UsersPage")
            .with_data(attributes::SESSION_ID, "s1")
            .with_data(attributes::TOKEN, "t1")
            .with_data(attributes::INITIAL_STATE, r#"{"users":[]}"#)
            .with_data(attributes::PAGE_ENDPOINT, "/phx_react/page")
            .with_data(attributes::ACTION_ENDPOINT, "/phx_react/action")
            .with_data(attributes::CSRF_TOKEN, "csrf");
        Bootstrap::read(&doc).unwrap()
    }

    fn mounted(now: Instant) -> Controller<Instant> {
        let mut controller = Controller::new(RuntimeConfig::default());
        controller.mount(bootstrap(), now).unwrap();
        controller
    }

    /// Open the transport and answer the join with `status`.
    fn answer_join(
        controller: &mut Controller<Instant>,
        status: &str,
        now: Instant,
    ) -> Vec<RuntimeAction> {
        let tag = controller.current_tag().unwrap();
        let actions = controller.handle_session_event(tag, SessionEvent::TransportOpened, now);
        let [RuntimeAction::Send { message: join, .. }] = actions.as_slice() else {
            panic!("expected join frame, got {actions:?}");
        };
        let reply = ChannelMessage::new(
            join.join_ref.clone(),
            join.msg_ref.clone(),
            join.topic.clone(),
            events::PHX_REPLY,
            json!({ "status": status, "response": {} }),
        );
        controller.handle_session_event(tag, SessionEvent::MessageReceived(reply), now)
    }

    fn state_push(topic: &str, assigns: serde_json::Value) -> SessionEvent {
        SessionEvent::MessageReceived(ChannelMessage::new(
            None,
            None,
            topic,
            events::STATE,
            json!({ "assigns": assigns }),
        ))
    }

    fn payload(page_key: &str, component_key: &str, session_id: &str, token: &str) -> PagePayload {
        PagePayload {
            page_key: page_key.into(),
            page_module: format!("App.{page_key}"),
            component_key: component_key.into(),
            session_id: session_id.into(),
            token: token.into(),
            topic: format!("phx_react:{page_key}:{session_id}"),
            initial_state: json!({ "page": page_key }).as_object().cloned().unwrap(),
        }
    }

    #[test]
    fn mount_connects_one_session_then_renders() {
        let mut controller: Controller<Instant> = Controller::new(RuntimeConfig::default());
        let actions = controller.mount(bootstrap(), Instant::now()).unwrap();

        assert_eq!(actions.len(), 2);
        assert!(matches!(&actions[0], RuntimeAction::Connect { tag: SessionTag(1), .. }));
        assert_eq!(actions[1], RuntimeAction::Render);
        assert_eq!(controller.status(), ConnectionStatus::Connecting);
        assert_eq!(controller.session().unwrap().topic().as_str(), "phx_react:users:s1");
        assert_eq!(controller.phase(), Phase::Active);
    }

    #[test]
    fn mount_twice_is_rejected() {
        let now = Instant::now();
        let mut controller = mounted(now);
        assert_eq!(controller.mount(bootstrap(), now), Err(RuntimeError::AlreadyMounted));
    }

    #[test]
    fn users_scenario() {
        let now = Instant::now();
        let mut controller = mounted(now);

        answer_join(&mut controller, "ok", now);
        assert_eq!(controller.status(), ConnectionStatus::Connected);

        let tag = controller.current_tag().unwrap();
        let actions = controller.handle_session_event(
            tag,
            state_push("phx_react:users:s1", json!({ "users": [{"id": 1}] })),
            now,
        );
        assert_eq!(actions, vec![RuntimeAction::Render]);
        assert_eq!(serde_json::Value::Object(controller.state().clone()), json!({ "users": [{"id": 1}] }));
    }

    #[test]
    fn state_pushes_replace_wholesale() {
        let now = Instant::now();
        let mut controller = mounted(now);
        answer_join(&mut controller, "ok", now);
        let tag = controller.current_tag().unwrap();

        controller.handle_session_event(tag, state_push("phx_react:users:s1", json!({ "a": 1, "b": 2 })), now);
        controller.handle_session_event(tag, state_push("phx_react:users:s1", json!({ "c": 3 })), now);

        assert_eq!(serde_json::Value::Object(controller.state().clone()), json!({ "c": 3 }));
    }

    #[test]
    fn join_failure_sets_error_without_recovery() {
        let now = Instant::now();
        let mut controller = mounted(now);

        let actions = answer_join(&mut controller, "error", now);
        assert_eq!(actions, vec![RuntimeAction::Disconnect { tag: SessionTag(1) }, RuntimeAction::Render]);
        assert_eq!(controller.status(), ConnectionStatus::Error);
        assert_eq!(controller.last_error(), Some("Join failed: {}"));
    }

    #[test]
    fn action_without_connected_session_is_not_sent() {
        let controller = mounted(Instant::now());
        assert_eq!(
            controller.prepare_action("create_user", Params::new()),
            ActionDispatch::Resolved(ActionEnvelope::not_connected())
        );
    }

    #[test]
    fn action_with_connected_session_uses_current_identity() {
        let now = Instant::now();
        let mut controller = mounted(now);
        answer_join(&mut controller, "ok", now);

        let ActionDispatch::Submit(request) = controller.prepare_action("create_user", Params::new())
        else {
            panic!("expected submission");
        };
        assert_eq!(
            (request.page_key.as_str(), request.session_id.as_str(), request.token.as_str()),
            ("users", "s1", "t1")
        );
        assert_eq!(request.action, "create_user");
    }

    #[test]
    fn same_page_refresh_keeps_session() {
        let now = Instant::now();
        let mut controller = mounted(now);
        answer_join(&mut controller, "ok", now);

        let (ticket, actions) = controller.refresh_page(None, BTreeMap::new()).unwrap();
        assert!(matches!(&actions[..], [RuntimeAction::FetchPage { query, .. }] if query.page_key == "users" && query.session_id == "s1"));
        assert_eq!(controller.phase(), Phase::Transitioning);

        let (outcome, actions) =
            controller.page_loaded(ticket, payload("users", "users", "s1", "t2"), now);
        assert_eq!(outcome, RefreshOutcome::Applied);
        assert_eq!(actions, vec![RuntimeAction::Render]);
        assert_eq!(controller.current_tag(), Some(SessionTag(1)));
        assert_eq!(controller.page().unwrap().token, "t2");
        assert_eq!(controller.session().unwrap().credentials().token, "t2");
        assert_eq!(controller.state()["page"], json!("users"));
        assert_eq!(controller.phase(), Phase::Active);
    }

    #[test]
    fn new_page_replaces_session_before_render() {
        let now = Instant::now();
        let mut controller = mounted(now);
        answer_join(&mut controller, "ok", now);

        let (ticket, _) = controller.refresh_page(Some("posts"), BTreeMap::new()).unwrap();
        let (outcome, actions) =
            controller.page_loaded(ticket, payload("posts", "posts", "s1", "t3"), now);

        assert_eq!(outcome, RefreshOutcome::Applied);
        assert!(matches!(&actions[0], RuntimeAction::Send { tag: SessionTag(1), message } if message.event == events::PHX_LEAVE));
        assert_eq!(actions[1], RuntimeAction::Disconnect { tag: SessionTag(1) });
        assert!(matches!(&actions[2], RuntimeAction::Connect { tag: SessionTag(2), .. }));
        assert_eq!(actions.last(), Some(&RuntimeAction::Render));
        assert_eq!(actions.len(), 4);
        assert_eq!(controller.session().unwrap().topic().as_str(), "phx_react:posts:s1");
    }

    #[test]
    fn refresh_during_join_rejoins_with_new_credentials() {
        let now = Instant::now();
        let mut controller = mounted(now);
        assert_eq!(controller.status(), ConnectionStatus::Connecting);

        let (ticket, _) = controller.refresh_page(None, BTreeMap::new()).unwrap();
        let (outcome, actions) =
            controller.page_loaded(ticket, payload("users", "users", "s2", "t2"), now);

        assert_eq!(outcome, RefreshOutcome::Applied);
        assert_eq!(actions[0], RuntimeAction::Disconnect { tag: SessionTag(1) });
        assert!(matches!(&actions[1], RuntimeAction::Connect { tag: SessionTag(2), .. }));
        assert_eq!(actions.last(), Some(&RuntimeAction::Render));

        let session = controller.session().unwrap();
        assert_eq!(session.topic().as_str(), "phx_react:users:s2");
        assert_eq!(session.credentials().token, "t2");

        let tag = controller.current_tag().unwrap();
        let actions = controller.handle_session_event(tag, SessionEvent::TransportOpened, now);
        let [RuntimeAction::Send { message: join, .. }] = actions.as_slice() else {
            panic!("expected join frame, got {actions:?}");
        };
        assert_eq!(join.topic, "phx_react:users:s2");
        assert_eq!(join.payload, json!({ "token": "t2" }));
    }

    #[test]
    fn component_change_replaces_session() {
        let now = Instant::now();
        let mut controller = mounted(now);
        answer_join(&mut controller, "ok", now);

        let (ticket, _) = controller.refresh_page(None, BTreeMap::new()).unwrap();
        controller.page_loaded(ticket, payload("users", "users_table", "s1", "t2"), now);
        assert_eq!(controller.current_tag(), Some(SessionTag(2)));
    }

    #[test]
    fn events_from_replaced_session_are_discarded() {
        let now = Instant::now();
        let mut controller = mounted(now);
        answer_join(&mut controller, "ok", now);

        let (ticket, _) = controller.refresh_page(Some("posts"), BTreeMap::new()).unwrap();
        controller.page_loaded(ticket, payload("posts", "posts", "s1", "t3"), now);

        let actions = controller.handle_session_event(
            SessionTag(1),
            state_push("phx_react:users:s1", json!({ "users": ["stale"] })),
            now,
        );
        assert!(actions.is_empty());
        assert_eq!(controller.state()["page"], json!("posts"));
    }

    #[test]
    fn payload_for_old_generation_is_discarded() {
        let now = Instant::now();
        let mut controller = mounted(now);
        answer_join(&mut controller, "ok", now);

        let (first, _) = controller.refresh_page(Some("posts"), BTreeMap::new()).unwrap();
        let (second, _) = controller.refresh_page(Some("settings"), BTreeMap::new()).unwrap();

        let (outcome, _) = controller.page_loaded(second, payload("settings", "settings", "s1", "t4"), now);
        assert_eq!(outcome, RefreshOutcome::Applied);
        let (outcome, actions) = controller.page_loaded(first, payload("posts", "posts", "s1", "t3"), now);
        assert_eq!(outcome, RefreshOutcome::Discarded);
        assert!(actions.is_empty());
        assert_eq!(controller.page().unwrap().page_key, "settings");
    }

    #[test]
    fn server_invalidation_refreshes_current_page() {
        let now = Instant::now();
        let mut controller = mounted(now);
        answer_join(&mut controller, "ok", now);
        let tag = controller.current_tag().unwrap();

        let invalidate = ChannelMessage::new(
            None,
            None,
            "phx_react:users:s1",
            events::INVALIDATE,
            json!({ "reason": "concurrent_write" }),
        );
        let actions =
            controller.handle_session_event(tag, SessionEvent::MessageReceived(invalidate), now);
        assert!(matches!(&actions[..], [RuntimeAction::FetchPage { query, .. }] if query.page_key == "users"));
    }

    #[test]
    fn drop_refreshes_then_rejoins() {
        let now = Instant::now();
        let mut controller = mounted(now);
        answer_join(&mut controller, "ok", now);

        let actions =
            controller.handle_session_event(SessionTag(1), SessionEvent::TransportClosed, now);
        let Some(RuntimeAction::FetchPage { ticket, query }) =
            actions.iter().find(|a| matches!(a, RuntimeAction::FetchPage { .. }))
        else {
            panic!("expected recovery fetch, got {actions:?}");
        };
        assert_eq!(query.page_key, "users");
        assert_eq!(controller.status(), ConnectionStatus::Reconnecting);

        let (outcome, actions) =
            controller.page_loaded(*ticket, payload("users", "users", "s1", "t2"), now);
        assert_eq!(outcome, RefreshOutcome::Applied);
        assert!(actions.contains(&RuntimeAction::Disconnect { tag: SessionTag(1) }));
        assert!(matches!(&actions[1], RuntimeAction::Connect { tag: SessionTag(2), .. }));
        assert_eq!(controller.status(), ConnectionStatus::Connecting);
    }

    #[test]
    fn drop_without_rejoin_policy_only_reports() {
        let now = Instant::now();
        let mut controller: Controller<Instant> =
            Controller::new(RuntimeConfig { rejoin_on_drop: false, ..RuntimeConfig::default() });
        controller.mount(bootstrap(), now).unwrap();
        answer_join(&mut controller, "ok", now);

        let actions =
            controller.handle_session_event(SessionTag(1), SessionEvent::TransportClosed, now);
        assert_eq!(actions, vec![RuntimeAction::Render]);
        assert_eq!(controller.status(), ConnectionStatus::Disconnected);
    }

    #[test]
    fn failed_recovery_reports_error() {
        let now = Instant::now();
        let mut controller = mounted(now);
        answer_join(&mut controller, "ok", now);

        let actions =
            controller.handle_session_event(SessionTag(1), SessionEvent::TransportClosed, now);
        let Some(RuntimeAction::FetchPage { ticket, .. }) =
            actions.iter().find(|a| matches!(a, RuntimeAction::FetchPage { .. }))
        else {
            panic!("expected recovery fetch");
        };

        let actions = controller.page_failed(*ticket, &ClientError::Http("offline".into()));
        assert_eq!(actions, vec![RuntimeAction::Render]);
        assert_eq!(controller.status(), ConnectionStatus::Error);
        assert_eq!(controller.last_error(), Some("reconnect failed: http request failed: offline"));
    }

    #[test]
    fn unmount_tears_down_and_is_idempotent() {
        let now = Instant::now();
        let mut controller = mounted(now);
        answer_join(&mut controller, "ok", now);

        let actions = controller.unmount();
        assert_eq!(actions.len(), 2);
        assert_eq!(actions[1], RuntimeAction::Disconnect { tag: SessionTag(1) });
        assert!(controller.page().is_none());
        assert!(controller.state().is_empty());
        assert_eq!(controller.status(), ConnectionStatus::Disconnected);

        assert!(controller.unmount().is_empty());
        assert_eq!(controller.refresh_page(None, BTreeMap::new()).unwrap_err(), RuntimeError::NotMounted);
    }

    #[test]
    fn push_event_before_join_is_buffered() {
        let now = Instant::now();
        let mut controller = mounted(now);
        assert!(controller.push_event("search", Params::new()).is_empty());

        let actions = answer_join(&mut controller, "ok", now);
        assert!(matches!(&actions[0], RuntimeAction::Send { message, .. } if message.event == events::EVENT));
        assert_eq!(actions.last(), Some(&RuntimeAction::Render));
    }
}
