//! Shared vocabulary for the phx-react runtime.
//!
//! Every other crate speaks these types: connection status, the three-way
//! action envelope, page identity and page payloads, and the channel frame
//! format used on the persistent connection.
//!
//! Nothing here performs I/O. Encoding and decoding are pure functions over
//! `serde_json` values so the same code runs in production and simulation.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod channel;
mod envelope;
pub mod errors;
mod page;
mod status;

pub use channel::{ChannelMessage, Topic};
pub use envelope::{ActionEnvelope, ActionError, ActionRequest, NOT_CONNECTED};
pub use errors::{ProtocolError, Result};
pub use page::{PageIdentity, PagePayload, PageResponse};
pub use status::ConnectionStatus;

/// Server-held assigns for the current page.
///
/// Always replaced wholesale, never merged.
pub type ViewState = serde_json::Map<String, serde_json::Value>;

/// Parameter mapping attached to events and actions.
pub type Params = serde_json::Map<String, serde_json::Value>;
