//! Websocket and HTTP transport for the client.
//!
//! Thin I/O layers under the Sans-IO pieces: [`socket`] carries channel
//! frames for one [`crate::ChannelSession`], [`http::ReqwestClient`] executes
//! requests built by [`crate::ActionClient`] and [`crate::PageLoader`].
//! Protocol logic stays in those types.

pub mod http;
pub mod socket;

pub use http::ReqwestClient;
pub use socket::{SocketConnection, open};
