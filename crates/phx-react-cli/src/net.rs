//! Network driver for the CLI.
//!
//! Implements the [`Driver`] trait over real I/O: a websocket task per
//! channel session and spawned reqwest calls for page and action requests.
//! Every completion is funneled into one event channel that
//! [`Driver::poll_event`] drains, interleaved with a periodic tick.

use std::{collections::HashMap, sync::Arc, time::Duration};

use phx_react_app::{
    Bootstrap, Driver, DriverEvent, PageTicket, Rendered, RuntimeConfig, attributes,
};
use phx_react_client::{
    ActionClient, Navigator, PageLoader, PageQuery, SessionTag,
    transport::{self, ReqwestClient, SocketConnection},
};
use phx_react_proto::{ActionRequest, ChannelMessage, PageIdentity};
use tokio::{sync::mpsc, time::Instant};

use crate::CliError;

/// Interval of [`DriverEvent::Tick`]. Heartbeats and join timeouts are
/// checked at this granularity.
const TICK_INTERVAL: Duration = Duration::from_millis(500);

/// Navigator for a headless host: redirects are logged, not followed.
#[derive(Debug, Default)]
pub struct TracingNavigator;

impl Navigator for TracingNavigator {
    fn navigate(&self, location: &str) {
        tracing::info!(%location, "server requested navigation");
    }
}

/// Network driver implementing the [`Driver`] trait.
pub struct NetDriver {
    sockets: HashMap<SessionTag, SocketConnection>,
    events_tx: mpsc::UnboundedSender<DriverEvent>,
    events_rx: mpsc::UnboundedReceiver<DriverEvent>,
    http: ReqwestClient,
    actions: ActionClient,
    pages: PageLoader,
    navigator: Arc<dyn Navigator>,
    tick: tokio::time::Interval,
    stopped: bool,
}

impl NetDriver {
    /// Create a driver for the endpoints named in `bootstrap`.
    ///
    /// Must be called within a tokio runtime.
    ///
    /// # Errors
    ///
    /// - [`CliError::Config`] if an endpoint cannot be resolved
    /// - [`CliError::Client`] if the HTTP client cannot be built
    pub fn new(config: &RuntimeConfig, bootstrap: &Bootstrap) -> Result<Self, CliError> {
        let page_endpoint =
            config.resolve_endpoint(attributes::PAGE_ENDPOINT, &bootstrap.page_endpoint)?;
        let action_endpoint =
            config.resolve_endpoint(attributes::ACTION_ENDPOINT, &bootstrap.action_endpoint)?;
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        let mut tick = tokio::time::interval(TICK_INTERVAL);
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        tracing::debug!(%page_endpoint, %action_endpoint, "endpoints resolved");
        Ok(Self {
            sockets: HashMap::new(),
            events_tx,
            events_rx,
            http: ReqwestClient::new()?,
            actions: ActionClient::new(action_endpoint, bootstrap.csrf_token.clone()),
            pages: PageLoader::new(page_endpoint),
            navigator: Arc::new(TracingNavigator),
            tick,
            stopped: false,
        })
    }

    /// Replace the navigator redirects are handed to.
    #[must_use]
    pub fn with_navigator(mut self, navigator: Arc<dyn Navigator>) -> Self {
        self.navigator = navigator;
        self
    }
}

impl Driver for NetDriver {
    type Error = CliError;
    type Instant = Instant;
    type View = String;

    async fn poll_event(&mut self) -> Result<Option<DriverEvent>, Self::Error> {
        if self.stopped {
            return Ok(None);
        }

        // Tick first: a due tick is never starved by inbound traffic.
        tokio::select! {
            biased;

            _ = self.tick.tick() => Ok(Some(DriverEvent::Tick)),

            event = self.events_rx.recv() => Ok(event),
        }
    }

    fn connect(&mut self, tag: SessionTag, url: &str) -> Result<(), Self::Error> {
        let events = self.events_tx.clone();
        let connection = transport::open(url.to_string(), move |event| {
            let _ = events.send(DriverEvent::Channel { tag, event });
        });
        tracing::debug!(%tag, "socket task started");
        self.sockets.insert(tag, connection);
        Ok(())
    }

    fn send(&mut self, tag: SessionTag, message: ChannelMessage) -> Result<(), Self::Error> {
        match self.sockets.get(&tag) {
            Some(connection) => {
                if !connection.send(message) {
                    tracing::debug!(%tag, "socket task gone, frame dropped");
                }
            },
            None => tracing::debug!(%tag, event = %message.event, "no socket, frame dropped"),
        }
        Ok(())
    }

    fn disconnect(&mut self, tag: SessionTag) {
        if self.sockets.remove(&tag).is_some() {
            tracing::debug!(%tag, "socket closed");
        }
    }

    fn fetch_page(&mut self, ticket: PageTicket, query: PageQuery) -> Result<(), Self::Error> {
        let pages = self.pages.clone();
        let http = self.http.clone();
        let events = self.events_tx.clone();

        tokio::spawn(async move {
            let result = pages.load(&http, &query).await;
            let _ = events.send(DriverEvent::PageLoaded { ticket, result });
        });
        Ok(())
    }

    fn submit_action(&mut self, id: u64, request: ActionRequest) -> Result<(), Self::Error> {
        let actions = self.actions.clone();
        let http = self.http.clone();
        let navigator = Arc::clone(&self.navigator);
        let events = self.events_tx.clone();

        tokio::spawn(async move {
            let result = actions.invoke(&http, navigator.as_ref(), &request).await;
            let _ = events.send(DriverEvent::ActionCompleted { id, result });
        });
        Ok(())
    }

    fn now(&self) -> Self::Instant {
        Instant::now()
    }

    fn render(&mut self, page: &PageIdentity, view: Rendered<String>) -> Result<(), Self::Error> {
        match view {
            Rendered::View(text) => tracing::info!(page_key = %page.page_key, "{text}"),
            Rendered::NotFound { component_key, page_module } => {
                tracing::warn!(%component_key, %page_module, "no view registered for page");
            },
        }
        Ok(())
    }

    fn stop(&mut self) {
        self.sockets.clear();
        self.stopped = true;
    }
}

#[cfg(test)]
mod tests {
    use phx_react_app::DocumentAttributes;
    use phx_react_client::SessionEvent;

    use super::*;

    fn driver() -> NetDriver {
        let doc = DocumentAttributes::new()
            .with_data(attributes::PAGE_KEY, "users")
            .with_data(attributes::PAGE_MODULE, "App.UsersPage")
            .with_data(attributes::SESSION_ID, "s1")
            .with_data(attributes::TOKEN, "t1")
            .with_data(attributes::INITIAL_STATE, "{}")
            .with_data(attributes::PAGE_ENDPOINT, "http://localhost:4000/phx_react/page")
            .with_data(attributes::ACTION_ENDPOINT, "http://localhost:4000/phx_react/action")
            .with_data(attributes::CSRF_TOKEN, "csrf");
        let bootstrap = Bootstrap::read(&doc).unwrap();
        NetDriver::new(&RuntimeConfig::default(), &bootstrap).unwrap()
    }

    #[tokio::test]
    async fn due_tick_wins_over_queued_events() {
        let mut driver = driver();
        for _ in 0..64 {
            driver
                .events_tx
                .send(DriverEvent::Channel {
                    tag: SessionTag(1),
                    event: SessionEvent::TransportOpened,
                })
                .unwrap();
        }

        let first = driver.poll_event().await.unwrap();
        assert!(matches!(first, Some(DriverEvent::Tick)));

        let second = driver.poll_event().await.unwrap();
        assert!(matches!(second, Some(DriverEvent::Channel { tag: SessionTag(1), .. })));
    }

    #[tokio::test]
    async fn stopped_driver_yields_nothing() {
        let mut driver = driver();
        driver.stop();
        assert!(driver.poll_event().await.unwrap().is_none());
    }
}
