//! Driver trait for abstracting I/O operations.
//!
//! The [`Driver`] trait decouples the runtime from specific I/O
//! implementations. Each host implements the trait to provide transport,
//! HTTP and rendering, while the generic [`crate::Runtime`] handles all
//! orchestration.

use std::{future::Future, ops::Sub, time::Duration};

use phx_react_client::{ClientError, PageQuery, SessionEvent, SessionTag};
use phx_react_proto::{ActionEnvelope, ActionRequest, ChannelMessage, PageIdentity, PagePayload};

use crate::{PageTicket, Rendered};

/// Completion or input delivered to the runtime by the driver.
#[derive(Debug)]
pub enum DriverEvent {
    /// Transport event for the connection opened for session `tag`.
    Channel {
        /// Session the connection was opened for.
        tag: SessionTag,
        /// Event.
        event: SessionEvent,
    },
    /// A page fetch finished.
    PageLoaded {
        /// Ticket the fetch was requested under.
        ticket: PageTicket,
        /// Payload or failure.
        result: Result<PagePayload, ClientError>,
    },
    /// An action submission finished. Redirects have already been followed.
    ActionCompleted {
        /// Submission id.
        id: u64,
        /// Envelope or failure.
        result: Result<ActionEnvelope, ClientError>,
    },
    /// Time passed; process heartbeats and timeouts.
    Tick,
}

/// Abstracts I/O operations for the runtime.
///
/// Effect methods start work and return immediately; results come back
/// through [`Driver::poll_event`]. This keeps the runtime loop responsive
/// while requests are in flight.
///
/// # Implementations
///
/// - **CLI**: websocket per session, reqwest for HTTP, renders to the log
/// - **Simulation**: in-memory server with a scripted event queue
///
/// # Associated Types
///
/// - [`Error`](Driver::Error): Platform-specific error type
/// - [`Instant`](Driver::Instant): Time representation (real or virtual)
/// - [`View`](Driver::View): Output of registered render functions
pub trait Driver: Send {
    /// Platform-specific error type.
    type Error: std::error::Error + Send + 'static;

    /// Time instant type. Enables virtual time in simulation.
    type Instant: Copy + Ord + Send + Sync + Sub<Output = Duration>;

    /// View type produced by render functions.
    type View;

    /// Wait for the next event.
    ///
    /// Returns `None` when the driver has shut down. Must be cancel safe.
    fn poll_event(
        &mut self,
    ) -> impl Future<Output = Result<Option<DriverEvent>, Self::Error>> + Send;

    /// Open a transport for session `tag`. Its events must be reported as
    /// [`DriverEvent::Channel`] with the same tag.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be started.
    fn connect(&mut self, tag: SessionTag, url: &str) -> Result<(), Self::Error>;

    /// Send a frame on session `tag`'s transport. Frames for a closed
    /// transport are dropped.
    ///
    /// # Errors
    ///
    /// Returns an error if the transport rejects the frame.
    fn send(&mut self, tag: SessionTag, message: ChannelMessage) -> Result<(), Self::Error>;

    /// Close session `tag`'s transport. No further events for `tag` are
    /// required after this.
    fn disconnect(&mut self, tag: SessionTag);

    /// Start a page fetch, reported as [`DriverEvent::PageLoaded`].
    ///
    /// # Errors
    ///
    /// Returns an error if the fetch cannot be started.
    fn fetch_page(&mut self, ticket: PageTicket, query: PageQuery) -> Result<(), Self::Error>;

    /// Start an action submission, reported as [`DriverEvent::ActionCompleted`].
    ///
    /// # Errors
    ///
    /// Returns an error if the submission cannot be started.
    fn submit_action(&mut self, id: u64, request: ActionRequest) -> Result<(), Self::Error>;

    /// Current time instant.
    fn now(&self) -> Self::Instant;

    /// Present a render pass for `page`.
    ///
    /// # Errors
    ///
    /// Returns an error if rendering fails.
    fn render(&mut self, page: &PageIdentity, view: Rendered<Self::View>)
    -> Result<(), Self::Error>;

    /// Stop all connections and clean up resources.
    fn stop(&mut self);
}
