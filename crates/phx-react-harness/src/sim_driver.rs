//! Simulation driver implementing the Driver trait.
//!
//! `SimDriver` provides the same interface as the CLI's network driver but
//! for deterministic testing. It implements [`Driver`] so the same
//! [`phx_react_app::Runtime`] orchestration code runs in both production and
//! simulation.

use std::{
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::{Duration, Instant},
};

use phx_react_app::{DocumentAttributes, Driver, DriverEvent, PageTicket, Rendered};
use phx_react_client::{PageQuery, SessionTag};
use phx_react_proto::{ActionRequest, ChannelMessage, PageIdentity};
use serde_json::Value;
use tokio::sync::Notify;

use crate::{RenderRecord, SimNetwork, SimServer};

/// Error type for simulation driver.
#[derive(Debug, Clone)]
pub struct SimDriverError(pub String);

impl std::fmt::Display for SimDriverError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SimDriverError: {}", self.0)
    }
}

impl std::error::Error for SimDriverError {}

#[derive(Debug)]
struct Shared {
    network: Mutex<SimNetwork>,
    wake: Notify,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, SimNetwork> {
        self.network.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Simulation driver for deterministic testing.
///
/// Events are produced by the shared [`SimNetwork`]; [`SimHandle`] injects
/// server pushes, drops and time from the test body.
#[derive(Debug)]
pub struct SimDriver {
    shared: Arc<Shared>,
}

/// Test-side handle to a [`SimDriver`]'s network.
#[derive(Debug, Clone)]
pub struct SimHandle {
    shared: Arc<Shared>,
}

impl SimDriver {
    /// Create a driver around `server` and a handle to steer it.
    pub fn new(server: SimServer) -> (Self, SimHandle) {
        let shared =
            Arc::new(Shared { network: Mutex::new(SimNetwork::new(server)), wake: Notify::new() });
        (Self { shared: Arc::clone(&shared) }, SimHandle { shared })
    }
}

impl SimHandle {
    /// Run `f` against the network, then wake the driver.
    pub fn with_network<R>(&self, f: impl FnOnce(&mut SimNetwork) -> R) -> R {
        let result = {
            let mut network = self.shared.lock();
            f(&mut *network)
        };
        self.shared.wake.notify_one();
        result
    }

    /// Host document for a fresh session on `page_key`.
    pub fn bootstrap(&self, page_key: &str) -> Option<DocumentAttributes> {
        self.with_network(|net| net.server_mut().bootstrap(page_key))
    }

    /// Push state on the newest joined transport.
    pub fn push_state(&self, assigns: Value) -> bool {
        self.with_network(|net| net.push_state(assigns))
    }

    /// Push an invalidate on the newest joined transport.
    pub fn push_invalidate(&self) -> bool {
        self.with_network(SimNetwork::push_invalidate)
    }

    /// Close every transport from the network side.
    pub fn drop_connections(&self) -> usize {
        self.with_network(SimNetwork::drop_connections)
    }

    /// Advance virtual time.
    pub fn advance(&self, duration: Duration) {
        self.with_network(|net| net.advance(duration));
    }

    /// Shut the network down; the driver reports end of events.
    pub fn shut_down(&self) {
        self.with_network(SimNetwork::shut_down);
    }

    /// Render passes so far.
    pub fn renders(&self) -> Vec<RenderRecord> {
        self.with_network(|net| net.renders().to_vec())
    }

    /// Redirect targets followed so far.
    pub fn navigations(&self) -> Vec<String> {
        self.with_network(|net| net.navigations().to_vec())
    }

    /// Wait until the runtime has drained every queued event.
    ///
    /// Only meaningful when the runtime is polled on the same task, e.g.
    /// under `tokio::join!`.
    pub async fn settle(&self) {
        loop {
            for _ in 0..8 {
                tokio::task::yield_now().await;
            }
            if self.shared.lock().is_idle() {
                return;
            }
        }
    }
}

impl Driver for SimDriver {
    type Error = SimDriverError;
    type Instant = Instant;
    type View = Value;

    async fn poll_event(&mut self) -> Result<Option<DriverEvent>, Self::Error> {
        loop {
            {
                let mut network = self.shared.lock();
                if let Some(event) = network.pop_event() {
                    return Ok(Some(event));
                }
                if network.is_shut_down() {
                    return Ok(None);
                }
            }
            self.shared.wake.notified().await;
        }
    }

    fn connect(&mut self, tag: SessionTag, url: &str) -> Result<(), Self::Error> {
        self.shared.lock().connect(tag, url);
        Ok(())
    }

    fn send(&mut self, tag: SessionTag, message: ChannelMessage) -> Result<(), Self::Error> {
        self.shared.lock().send(tag, &message);
        Ok(())
    }

    fn disconnect(&mut self, tag: SessionTag) {
        self.shared.lock().disconnect(tag);
    }

    fn fetch_page(&mut self, ticket: PageTicket, query: PageQuery) -> Result<(), Self::Error> {
        self.shared.lock().fetch_page(ticket, &query);
        Ok(())
    }

    fn submit_action(&mut self, id: u64, request: ActionRequest) -> Result<(), Self::Error> {
        self.shared.lock().submit_action(id, &request);
        Ok(())
    }

    fn now(&self) -> Self::Instant {
        self.shared.lock().now()
    }

    fn render(&mut self, page: &PageIdentity, view: Rendered<Value>) -> Result<(), Self::Error> {
        self.shared.lock().render(page, view);
        Ok(())
    }

    fn stop(&mut self) {
        self.shared.lock().shut_down();
    }
}

#[cfg(test)]
mod tests {
    use phx_react_client::SessionEvent;
    use serde_json::json;

    use super::*;

    fn driver() -> (SimDriver, SimHandle) {
        SimDriver::new(SimServer::new().with_page("users", "App.UsersPage", "users", json!({})))
    }

    #[tokio::test]
    async fn connect_queues_open_event() {
        let (mut driver, _handle) = driver();
        driver.connect(SessionTag(1), "ws://sim/socket").unwrap();

        let event = driver.poll_event().await.unwrap();
        assert!(matches!(
            event,
            Some(DriverEvent::Channel { tag: SessionTag(1), event: SessionEvent::TransportOpened })
        ));
    }

    #[tokio::test]
    async fn stop_ends_polling() {
        let (mut driver, _handle) = driver();
        driver.stop();
        assert!(driver.poll_event().await.unwrap().is_none());
    }

    #[test]
    fn advance_moves_virtual_clock() {
        let (driver, handle) = driver();
        let before = driver.now();
        handle.advance(Duration::from_secs(30));
        assert_eq!(driver.now() - before, Duration::from_secs(30));
    }
}
