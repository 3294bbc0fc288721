//! Headless phx-react runtime.
//!
//! A thin shell over [`phx_react_app::Driver`] that connects to a real
//! server: one websocket per channel session, reqwest for page and action
//! calls, renders written to the log. All orchestration logic lives in the
//! generic [`phx_react_app::Runtime`].
//!
//! Commands read from stdin drive the mounted page the way a view would.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod command;
pub mod error;
pub mod net;
pub mod view;

pub use command::{Command, ParseError};
pub use error::CliError;
pub use net::{NetDriver, TracingNavigator};
