//! Generic runtime for page orchestration.
//!
//! The Runtime drives the event loop, coordinating between:
//! - [`Controller`]: page identity, view state and session lifecycle
//! - [`ViewRegistry`]: render functions supplied by the host
//! - [`Driver`]: platform-specific I/O
//!
//! Views talk to the loop through a cloneable [`RuntimeHandle`]. Every
//! mutation happens on the loop, so no locks guard the controller.

use std::collections::{BTreeMap, HashMap};

use phx_react_proto::{ActionEnvelope, Params};
use tokio::sync::{mpsc, oneshot};

use crate::{
    ActionDispatch, Bootstrap, Controller, Driver, DriverEvent, HostDocument, RefreshOutcome,
    RuntimeAction, RuntimeConfig, RuntimeError, ViewContext, ViewRegistry,
};

type ActionReply = oneshot::Sender<Result<ActionEnvelope, RuntimeError>>;
type RefreshReply = oneshot::Sender<Result<RefreshOutcome, RuntimeError>>;

/// Request from a [`RuntimeHandle`] to the runtime loop.
#[derive(Debug)]
pub(crate) enum Command {
    PushEvent { name: String, params: Params },
    Invalidate { reason: Option<String> },
    InvokeAction { name: String, params: Params, reply: ActionReply },
    RefreshPage { page_key: Option<String>, params: BTreeMap<String, String>, reply: RefreshReply },
    Unmount,
}

/// Cloneable handle to a running [`Runtime`].
///
/// This is the contract object views operate through. Fire-and-forget
/// operations never fail; after the runtime stops they are ignored.
#[derive(Debug, Clone)]
pub struct RuntimeHandle {
    commands: mpsc::UnboundedSender<Command>,
}

impl RuntimeHandle {
    pub(crate) fn channel() -> (Self, mpsc::UnboundedReceiver<Command>) {
        let (commands, receiver) = mpsc::unbounded_channel();
        (Self { commands }, receiver)
    }

    /// Push a view event on the current session. Dropped if not joined.
    pub fn push_event(&self, name: impl Into<String>, params: Params) {
        self.fire(Command::PushEvent { name: name.into(), params });
    }

    /// Ask the server to recompute the page. `reason` defaults to `"manual"`.
    pub fn invalidate(&self, reason: Option<&str>) {
        self.fire(Command::Invalidate { reason: reason.map(str::to_string) });
    }

    /// Invoke a named action with the current page identity.
    ///
    /// Resolves to the `not_connected` error envelope, without a network
    /// call, when no session is connected.
    ///
    /// # Errors
    ///
    /// - [`RuntimeError::Client`] if the request fails or the response is malformed
    /// - [`RuntimeError::Stopped`] if the runtime has exited
    pub async fn invoke_action(
        &self,
        name: impl Into<String>,
        params: Params,
    ) -> Result<ActionEnvelope, RuntimeError> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(Command::InvokeAction { name: name.into(), params, reply })
            .map_err(|_| RuntimeError::Stopped)?;
        response.await.map_err(|_| RuntimeError::Stopped)?
    }

    /// Load `page_key` (default: the current page) and make it current.
    ///
    /// # Errors
    ///
    /// - [`RuntimeError::NotMounted`] after unmount
    /// - [`RuntimeError::Client`] if the fetch fails
    /// - [`RuntimeError::Stopped`] if the runtime has exited
    pub async fn refresh_page(
        &self,
        page_key: Option<&str>,
        params: BTreeMap<String, String>,
    ) -> Result<RefreshOutcome, RuntimeError> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(Command::RefreshPage { page_key: page_key.map(str::to_string), params, reply })
            .map_err(|_| RuntimeError::Stopped)?;
        response.await.map_err(|_| RuntimeError::Stopped)?
    }

    /// Tear down the session and stop the runtime loop.
    pub fn unmount(&self) {
        self.fire(Command::Unmount);
    }

    fn fire(&self, command: Command) {
        if self.commands.send(command).is_err() {
            tracing::debug!("runtime stopped, command ignored");
        }
    }
}

/// Generic runtime that orchestrates Controller, views and Driver.
pub struct Runtime<D: Driver> {
    driver: D,
    controller: Controller<D::Instant>,
    views: ViewRegistry<D::View>,
    handle: RuntimeHandle,
    commands: mpsc::UnboundedReceiver<Command>,
    pending_actions: HashMap<u64, ActionReply>,
    pending_pages: HashMap<u64, RefreshReply>,
    next_action: u64,
}

impl<D: Driver> Runtime<D> {
    /// Read bootstrap data from `doc`, mount the page and start joining.
    ///
    /// # Errors
    ///
    /// - [`RuntimeError::Config`] if bootstrap data is missing or malformed;
    ///   logged once, nothing is rendered
    /// - [`RuntimeError::Driver`] if the driver rejects the initial connect
    pub fn mount(
        driver: D,
        config: RuntimeConfig,
        doc: &impl HostDocument,
        views: ViewRegistry<D::View>,
    ) -> Result<Self, RuntimeError> {
        let bootstrap = Bootstrap::read(doc).inspect_err(|e| {
            tracing::error!(error = %e, "missing or malformed bootstrap data, not mounting");
        })?;

        let (handle, commands) = RuntimeHandle::channel();
        let mut controller = Controller::new(config);
        let actions = controller.mount(bootstrap, driver.now())?;

        let mut runtime = Self {
            driver,
            controller,
            views,
            handle,
            commands,
            pending_actions: HashMap::new(),
            pending_pages: HashMap::new(),
            next_action: 0,
        };
        runtime.execute(actions).map_err(|e| RuntimeError::Driver(e.to_string()))?;
        Ok(runtime)
    }

    /// Handle for views and the host.
    pub fn handle(&self) -> RuntimeHandle {
        self.handle.clone()
    }

    /// Controller state.
    pub fn controller(&self) -> &Controller<D::Instant> {
        &self.controller
    }

    /// Driver.
    pub fn driver(&self) -> &D {
        &self.driver
    }

    /// Run the event loop until unmount or driver shutdown.
    ///
    /// On exit the session is torn down, outstanding callers resolve to
    /// [`RuntimeError::Stopped`] and the driver is stopped.
    ///
    /// # Errors
    ///
    /// Returns an error if the driver encounters an I/O error.
    pub async fn run(mut self) -> Result<(), D::Error> {
        loop {
            tokio::select! {
                command = self.commands.recv() => {
                    let Some(command) = command else {
                        break;
                    };
                    if !self.handle_command(command)? {
                        break;
                    }
                },
                event = self.driver.poll_event() => {
                    match event? {
                        Some(event) => self.handle_event(event)?,
                        None => {
                            tracing::info!("driver shut down");
                            break;
                        },
                    }
                },
            }
        }

        self.shutdown()
    }

    /// Process one handle command. Returns `false` on unmount.
    fn handle_command(&mut self, command: Command) -> Result<bool, D::Error> {
        match command {
            Command::PushEvent { name, params } => {
                let actions = self.controller.push_event(&name, params);
                self.execute(actions)?;
            },
            Command::Invalidate { reason } => {
                let actions = self.controller.invalidate(reason.as_deref());
                self.execute(actions)?;
            },
            Command::InvokeAction { name, params, reply } => {
                match self.controller.prepare_action(&name, params) {
                    ActionDispatch::Resolved(envelope) => {
                        let _ = reply.send(Ok(envelope));
                    },
                    ActionDispatch::Submit(request) => {
                        self.next_action += 1;
                        let id = self.next_action;
                        match self.driver.submit_action(id, request) {
                            Ok(()) => {
                                self.pending_actions.insert(id, reply);
                            },
                            Err(e) => {
                                tracing::warn!(action = %name, error = %e, "action submission failed");
                                let _ = reply.send(Err(RuntimeError::Driver(e.to_string())));
                            },
                        }
                    },
                }
            },
            Command::RefreshPage { page_key, params, reply } => {
                match self.controller.refresh_page(page_key.as_deref(), params) {
                    Ok((ticket, actions)) => {
                        self.pending_pages.insert(ticket.id, reply);
                        self.execute(actions)?;
                    },
                    Err(e) => {
                        let _ = reply.send(Err(e));
                    },
                }
            },
            Command::Unmount => return Ok(false),
        }
        Ok(true)
    }

    fn handle_event(&mut self, event: DriverEvent) -> Result<(), D::Error> {
        match event {
            DriverEvent::Channel { tag, event } => {
                let now = self.driver.now();
                let actions = self.controller.handle_session_event(tag, event, now);
                self.execute(actions)
            },
            DriverEvent::PageLoaded { ticket, result } => {
                let reply = self.pending_pages.remove(&ticket.id);
                let outcome = match result {
                    Ok(payload) => {
                        let now = self.driver.now();
                        let (outcome, actions) = self.controller.page_loaded(ticket, payload, now);
                        self.execute(actions)?;
                        Ok(outcome)
                    },
                    Err(e) => {
                        let actions = self.controller.page_failed(ticket, &e);
                        self.execute(actions)?;
                        Err(RuntimeError::Client(e))
                    },
                };
                if let Some(reply) = reply {
                    let _ = reply.send(outcome);
                }
                Ok(())
            },
            DriverEvent::ActionCompleted { id, result } => {
                if let Some(reply) = self.pending_actions.remove(&id) {
                    let _ = reply.send(result.map_err(RuntimeError::from));
                }
                Ok(())
            },
            DriverEvent::Tick => {
                let now = self.driver.now();
                let actions = self.controller.tick(now);
                self.execute(actions)
            },
        }
    }

    fn execute(&mut self, actions: Vec<RuntimeAction>) -> Result<(), D::Error> {
        for action in actions {
            match action {
                RuntimeAction::Connect { tag, url } => self.driver.connect(tag, &url)?,
                RuntimeAction::Send { tag, message } => self.driver.send(tag, message)?,
                RuntimeAction::Disconnect { tag } => self.driver.disconnect(tag),
                RuntimeAction::FetchPage { ticket, query } => {
                    self.driver.fetch_page(ticket, query)?;
                },
                RuntimeAction::Render => self.render()?,
            }
        }
        Ok(())
    }

    fn render(&mut self) -> Result<(), D::Error> {
        let Some(page) = self.controller.page() else {
            return Ok(());
        };
        let ctx = ViewContext::new(
            page,
            self.controller.state(),
            self.controller.changed_keys(),
            self.controller.status(),
            self.controller.last_error(),
            &self.handle,
        );
        let rendered = self.views.render(&ctx);
        self.driver.render(page, rendered)
    }

    fn shutdown(mut self) -> Result<(), D::Error> {
        let actions = self.controller.unmount();
        self.execute(actions)?;
        self.pending_actions.clear();
        self.pending_pages.clear();
        self.driver.stop();
        Ok(())
    }
}
