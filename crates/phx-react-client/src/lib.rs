//! Client
//!
//! Action-based building blocks of the phx-react runtime: the per-page
//! channel session and the two stateless HTTP helpers.
//!
//! # Architecture
//!
//! [`ChannelSession`] is a Sans-IO state machine. It receives
//! [`SessionEvent`]s (transport opened, frame received, transport closed) and
//! the current time, and returns [`SessionAction`]s (connect, send, status
//! change, state update) for the caller to execute. It never blocks and never
//! fails synchronously; every failure surfaces as a status action.
//!
//! [`ActionClient`] and [`PageLoader`] build requests and parse responses as
//! pure functions, and provide async convenience methods over the
//! [`HttpClient`] and [`Navigator`] seams.
//!
//! # Components
//!
//! - [`ChannelSession`]: one persistent connection bound to one page identity
//! - [`ActionClient`]: submits named actions, resolves the three-way envelope
//! - [`PageLoader`]: fetches page payloads by key
//!
//! # Transport (optional)
//!
//! With the `transport` feature enabled, this crate also provides:
//! - [`transport::socket`]: websocket connection task per session
//! - [`transport::http::ReqwestClient`]: [`HttpClient`] over reqwest

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod action;
mod error;
mod http;
mod page;
mod session;

#[cfg(feature = "transport")]
pub mod transport;

pub use action::ActionClient;
pub use error::ClientError;
pub use http::{HttpClient, HttpRequest, HttpResponse, Method, Navigator};
pub use page::{PageLoader, PageQuery};
pub use phx_react_proto::{ActionEnvelope, ConnectionStatus, PageIdentity, PagePayload};
pub use session::{
    ChannelSession, Credentials, DEFAULT_HEARTBEAT_INTERVAL, DEFAULT_JOIN_TIMEOUT, SessionAction,
    SessionConfig, SessionEvent, SessionTag,
};
