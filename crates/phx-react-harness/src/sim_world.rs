//! Synchronous executor over a controller and a simulated network.
//!
//! [`SimWorld`] does what [`phx_react_app::Runtime`] does, minus the async
//! loop: it executes controller actions against a [`SimNetwork`] and feeds
//! queued events back until the network is idle. Every step is deterministic,
//! which makes it the target for property tests.

use std::{collections::BTreeMap, collections::HashMap, time::Duration};

use phx_react_app::{
    ActionDispatch, Bootstrap, Controller, DocumentAttributes, DriverEvent, HostDocument,
    PageTicket, RefreshOutcome, Rendered, RuntimeAction, RuntimeConfig, RuntimeError,
};
use phx_react_client::ClientError;
use phx_react_proto::{ActionEnvelope, Params};
use serde_json::Value;

use crate::{RuntimeSnapshot, SimNetwork, SimServer};

/// Upper bound on events processed by one [`SimWorld::run_until_idle`].
const MAX_STEPS: usize = 10_000;

/// Controller plus simulated network, stepped synchronously.
#[derive(Debug)]
pub struct SimWorld {
    controller: Controller,
    network: SimNetwork,
    action_results: HashMap<u64, Result<ActionEnvelope, ClientError>>,
    page_results: HashMap<u64, Result<RefreshOutcome, ClientError>>,
    next_action: u64,
}

impl SimWorld {
    /// World with nothing mounted.
    pub fn new(server: SimServer, config: RuntimeConfig) -> Self {
        Self {
            controller: Controller::new(config),
            network: SimNetwork::new(server),
            action_results: HashMap::new(),
            page_results: HashMap::new(),
            next_action: 0,
        }
    }

    /// World with `page_key` mounted and its session settled.
    ///
    /// # Errors
    ///
    /// [`RuntimeError::Config`] if the server does not serve `page_key`.
    pub fn mounted(
        server: SimServer,
        config: RuntimeConfig,
        page_key: &str,
    ) -> Result<Self, RuntimeError> {
        let mut world = Self::new(server, config);
        let doc = world.bootstrap(page_key);
        world.mount(&doc)?;
        Ok(world)
    }

    /// Host document for a fresh session on `page_key`. Empty if the server
    /// does not serve the page.
    pub fn bootstrap(&mut self, page_key: &str) -> DocumentAttributes {
        self.network.server_mut().bootstrap(page_key).unwrap_or_default()
    }

    /// Mount from `doc` and run until idle.
    ///
    /// # Errors
    ///
    /// - [`RuntimeError::Config`] if bootstrap data is missing or malformed
    /// - [`RuntimeError::AlreadyMounted`] if already mounted
    pub fn mount(&mut self, doc: &impl HostDocument) -> Result<(), RuntimeError> {
        let bootstrap = Bootstrap::read(doc)?;
        let actions = self.controller.mount(bootstrap, self.network.now())?;
        self.execute(actions);
        self.run_until_idle();
        Ok(())
    }

    /// Controller.
    pub fn controller(&self) -> &Controller {
        &self.controller
    }

    /// Network.
    pub fn network(&self) -> &SimNetwork {
        &self.network
    }

    /// Mutable network, for scripting faults.
    pub fn network_mut(&mut self) -> &mut SimNetwork {
        &mut self.network
    }

    /// Snapshot for invariant checks.
    pub fn snapshot(&self) -> RuntimeSnapshot {
        RuntimeSnapshot::capture(&self.controller, &self.network)
    }

    /// Process one queued event. Returns `false` when the network is idle.
    pub fn step(&mut self) -> bool {
        let Some(event) = self.network.pop_event() else {
            return false;
        };
        let now = self.network.now();

        let actions = match event {
            DriverEvent::Channel { tag, event } => {
                self.controller.handle_session_event(tag, event, now)
            },
            DriverEvent::PageLoaded { ticket, result } => match result {
                Ok(payload) => {
                    let (outcome, actions) = self.controller.page_loaded(ticket, payload, now);
                    self.page_results.insert(ticket.id, Ok(outcome));
                    actions
                },
                Err(e) => {
                    let actions = self.controller.page_failed(ticket, &e);
                    self.page_results.insert(ticket.id, Err(e));
                    actions
                },
            },
            DriverEvent::ActionCompleted { id, result } => {
                self.action_results.insert(id, result);
                Vec::new()
            },
            DriverEvent::Tick => self.controller.tick(now),
        };
        self.execute(actions);
        true
    }

    /// Process events until the network is idle.
    pub fn run_until_idle(&mut self) {
        let mut steps = 0;
        while steps < MAX_STEPS && self.step() {
            steps += 1;
        }
        if steps == MAX_STEPS {
            tracing::warn!(steps, "sim world did not go idle");
        }
    }

    /// Push a view event and run until idle.
    pub fn push_event(&mut self, name: &str, params: Params) {
        let actions = self.controller.push_event(name, params);
        self.execute(actions);
        self.run_until_idle();
    }

    /// Send an invalidate and run until idle.
    pub fn invalidate(&mut self, reason: Option<&str>) {
        let actions = self.controller.invalidate(reason);
        self.execute(actions);
        self.run_until_idle();
    }

    /// Invoke an action and run until it resolves.
    ///
    /// # Errors
    ///
    /// [`RuntimeError::Client`] if the submission failed.
    pub fn invoke_action(
        &mut self,
        name: &str,
        params: Params,
    ) -> Result<ActionEnvelope, RuntimeError> {
        let request = match self.controller.prepare_action(name, params) {
            ActionDispatch::Resolved(envelope) => return Ok(envelope),
            ActionDispatch::Submit(request) => request,
        };

        self.next_action += 1;
        let id = self.next_action;
        self.network.submit_action(id, &request);
        self.run_until_idle();

        let result = self.action_results.remove(&id).ok_or(RuntimeError::Stopped)?;
        Ok(result?)
    }

    /// Start a page fetch without processing its result.
    ///
    /// # Errors
    ///
    /// [`RuntimeError::NotMounted`] if no page is mounted.
    pub fn begin_refresh(
        &mut self,
        page_key: Option<&str>,
        params: BTreeMap<String, String>,
    ) -> Result<PageTicket, RuntimeError> {
        let (ticket, actions) = self.controller.refresh_page(page_key, params)?;
        self.execute(actions);
        Ok(ticket)
    }

    /// Outcome of a fetch started with [`SimWorld::begin_refresh`], once
    /// processed.
    pub fn take_refresh(&mut self, ticket: PageTicket) -> Option<Result<RefreshOutcome, ClientError>> {
        self.page_results.remove(&ticket.id)
    }

    /// Refresh or navigate and run until the payload is processed.
    ///
    /// # Errors
    ///
    /// - [`RuntimeError::NotMounted`] if no page is mounted
    /// - [`RuntimeError::Client`] if the fetch failed
    pub fn refresh_page(
        &mut self,
        page_key: Option<&str>,
        params: BTreeMap<String, String>,
    ) -> Result<RefreshOutcome, RuntimeError> {
        let ticket = self.begin_refresh(page_key, params)?;
        self.run_until_idle();
        let result = self.take_refresh(ticket).ok_or(RuntimeError::Stopped)?;
        Ok(result?)
    }

    /// Server pushes state on the current transport. Returns whether a push
    /// was sent.
    pub fn push_state(&mut self, assigns: Value) -> bool {
        let pushed = self.network.push_state(assigns);
        self.run_until_idle();
        pushed
    }

    /// Server invalidates the current page.
    pub fn push_invalidate(&mut self) -> bool {
        let pushed = self.network.push_invalidate();
        self.run_until_idle();
        pushed
    }

    /// Network drops every transport.
    pub fn drop_connections(&mut self) -> usize {
        let dropped = self.network.drop_connections();
        self.run_until_idle();
        dropped
    }

    /// Advance virtual time and run until idle.
    pub fn advance(&mut self, duration: Duration) {
        self.network.advance(duration);
        self.run_until_idle();
    }

    /// Unmount and run until idle.
    pub fn unmount(&mut self) {
        let actions = self.controller.unmount();
        self.execute(actions);
        self.run_until_idle();
    }

    fn execute(&mut self, actions: Vec<RuntimeAction>) {
        for action in actions {
            match action {
                RuntimeAction::Connect { tag, url } => self.network.connect(tag, &url),
                RuntimeAction::Send { tag, message } => self.network.send(tag, &message),
                RuntimeAction::Disconnect { tag } => self.network.disconnect(tag),
                RuntimeAction::FetchPage { ticket, query } => {
                    self.network.fetch_page(ticket, &query);
                },
                RuntimeAction::Render => {
                    if let Some(page) = self.controller.page() {
                        let view = Rendered::View(Value::Object(self.controller.state().clone()));
                        self.network.render(page, view);
                    }
                },
            }
        }
    }
}
