//! Simulated network between the runtime and a [`SimServer`].
//!
//! Effects requested by the runtime are applied to the server immediately and
//! their results are queued as [`DriverEvent`]s, delivered in FIFO order.
//! Time is virtual and only moves when a test advances it.

use std::{
    collections::{BTreeMap, VecDeque},
    time::{Duration, Instant},
};

use phx_react_app::{DriverEvent, PageTicket, Rendered};
use phx_react_client::{ClientError, PageQuery, SessionEvent, SessionTag};
use phx_react_proto::{ActionRequest, ChannelMessage, PageIdentity, channel::events};
use serde_json::Value;

use crate::SimServer;

/// One presented render pass.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderRecord {
    /// Page key at render time.
    pub page_key: String,
    /// Session id at render time.
    pub session_id: String,
    /// Rendered view, `None` if no view was registered for the page.
    pub view: Option<Value>,
}

/// Open transport.
#[derive(Debug, Default)]
struct Connection {
    /// Topic of the join sent over this transport.
    topic: Option<String>,
}

/// Connections, event queue and virtual clock around a [`SimServer`].
#[derive(Debug)]
pub struct SimNetwork {
    server: SimServer,
    queue: VecDeque<DriverEvent>,
    connections: BTreeMap<SessionTag, Connection>,
    connect_log: Vec<SessionTag>,
    renders: Vec<RenderRecord>,
    navigations: Vec<String>,
    epoch: Instant,
    elapsed: Duration,
    page_outage: bool,
    shut_down: bool,
}

impl SimNetwork {
    /// Network around `server`, with the clock at zero.
    pub fn new(server: SimServer) -> Self {
        Self {
            server,
            queue: VecDeque::new(),
            connections: BTreeMap::new(),
            connect_log: Vec::new(),
            renders: Vec::new(),
            navigations: Vec::new(),
            epoch: Instant::now(),
            elapsed: Duration::ZERO,
            page_outage: false,
            shut_down: false,
        }
    }

    /// Server.
    pub fn server(&self) -> &SimServer {
        &self.server
    }

    /// Mutable server.
    pub fn server_mut(&mut self) -> &mut SimServer {
        &mut self.server
    }

    /// Current virtual time.
    pub fn now(&self) -> Instant {
        self.epoch + self.elapsed
    }

    /// Advance virtual time and queue a tick.
    pub fn advance(&mut self, duration: Duration) {
        self.elapsed += duration;
        self.queue.push_back(DriverEvent::Tick);
    }

    /// Next queued event.
    pub fn pop_event(&mut self) -> Option<DriverEvent> {
        self.queue.pop_front()
    }

    /// Whether no events are queued.
    pub fn is_idle(&self) -> bool {
        self.queue.is_empty()
    }

    /// Queue an arbitrary event.
    pub fn inject(&mut self, event: DriverEvent) {
        self.queue.push_back(event);
    }

    /// Open a transport for `tag`. The open succeeds immediately.
    pub fn connect(&mut self, tag: SessionTag, url: &str) {
        tracing::debug!(%tag, url, "sim connect");
        self.connections.insert(tag, Connection::default());
        self.connect_log.push(tag);
        self.queue.push_back(DriverEvent::Channel { tag, event: SessionEvent::TransportOpened });
    }

    /// Deliver `message` to the server over `tag`'s transport.
    pub fn send(&mut self, tag: SessionTag, message: &ChannelMessage) {
        let Some(connection) = self.connections.get_mut(&tag) else {
            tracing::debug!(%tag, event = %message.event, "sim send on closed transport dropped");
            return;
        };
        if message.event == events::PHX_JOIN {
            connection.topic = Some(message.topic.clone());
        }
        for reply in self.server.handle_frame(message) {
            self.queue.push_back(DriverEvent::Channel {
                tag,
                event: SessionEvent::MessageReceived(reply),
            });
        }
    }

    /// Close `tag`'s transport from the client side.
    pub fn disconnect(&mut self, tag: SessionTag) {
        if let Some(connection) = self.connections.remove(&tag)
            && let Some(topic) = connection.topic
        {
            self.server.disconnected(&topic);
        }
    }

    /// Close every transport from the network side.
    ///
    /// Returns the number of transports closed.
    pub fn drop_connections(&mut self) -> usize {
        let dropped = std::mem::take(&mut self.connections);
        for (tag, connection) in &dropped {
            if let Some(topic) = &connection.topic {
                self.server.disconnected(topic);
            }
            self.queue.push_back(DriverEvent::Channel {
                tag: *tag,
                event: SessionEvent::TransportClosed,
            });
        }
        dropped.len()
    }

    /// Serve a page fetch.
    pub fn fetch_page(&mut self, ticket: PageTicket, query: &PageQuery) {
        let result = if self.page_outage {
            Err(ClientError::Http("simulated page outage".to_string()))
        } else {
            self.server.fetch_page(query)
        };
        self.queue.push_back(DriverEvent::PageLoaded { ticket, result });
    }

    /// Serve an action submission, following redirects.
    pub fn submit_action(&mut self, id: u64, request: &ActionRequest) {
        let envelope = self.server.handle_action(request);
        if let Some(to) = envelope.redirect_target() {
            self.navigations.push(to.to_string());
        }
        self.queue.push_back(DriverEvent::ActionCompleted { id, result: Ok(envelope) });
    }

    /// Push state on the newest joined transport.
    ///
    /// Returns whether a push was queued.
    pub fn push_state(&mut self, assigns: Value) -> bool {
        let Some((tag, topic)) = self.joined_transport() else {
            return false;
        };
        match self.server.push_state(&topic, assigns) {
            Some(message) => {
                self.queue.push_back(DriverEvent::Channel {
                    tag,
                    event: SessionEvent::MessageReceived(message),
                });
                true
            },
            None => false,
        }
    }

    /// Push an invalidate on the newest joined transport.
    pub fn push_invalidate(&mut self) -> bool {
        let Some((tag, topic)) = self.joined_transport() else {
            return false;
        };
        match self.server.push_invalidate(&topic) {
            Some(message) => {
                self.queue.push_back(DriverEvent::Channel {
                    tag,
                    event: SessionEvent::MessageReceived(message),
                });
                true
            },
            None => false,
        }
    }

    /// Make page fetches fail until cleared.
    pub fn set_page_outage(&mut self, outage: bool) {
        self.page_outage = outage;
    }

    /// Record a render pass.
    pub fn render(&mut self, page: &PageIdentity, view: Rendered<Value>) {
        let view = match view {
            Rendered::View(value) => Some(value),
            Rendered::NotFound { .. } => None,
        };
        self.renders.push(RenderRecord {
            page_key: page.page_key.clone(),
            session_id: page.session_id.clone(),
            view,
        });
    }

    /// Close everything and report shutdown to the poller.
    pub fn shut_down(&mut self) {
        for tag in self.connections.keys().copied().collect::<Vec<_>>() {
            self.disconnect(tag);
        }
        self.shut_down = true;
    }

    /// Whether the network was shut down.
    pub fn is_shut_down(&self) -> bool {
        self.shut_down
    }

    /// Tags with an open transport, in order.
    pub fn open_connections(&self) -> Vec<SessionTag> {
        self.connections.keys().copied().collect()
    }

    /// Every transport ever opened, in order.
    pub fn connect_log(&self) -> &[SessionTag] {
        &self.connect_log
    }

    /// Render passes, in order.
    pub fn renders(&self) -> &[RenderRecord] {
        &self.renders
    }

    /// Redirect targets followed, in order.
    pub fn navigations(&self) -> &[String] {
        &self.navigations
    }

    fn joined_transport(&self) -> Option<(SessionTag, String)> {
        self.connections.iter().rev().find_map(|(tag, connection)| {
            connection
                .topic
                .as_ref()
                .filter(|topic| self.server.is_joined(topic))
                .map(|topic| (*tag, topic.clone()))
        })
    }
}
