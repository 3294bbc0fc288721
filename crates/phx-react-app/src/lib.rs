//! Application layer for phx-react
//!
//! Pure controller and generic runtime that mount a server-driven page,
//! keep one channel session bound to the current page identity, and route
//! view operations to it, so the same orchestration code runs in production
//! and in deterministic simulation.
//!
//! # Components
//!
//! - [`Bootstrap`]: reads the initial page identity from the host document
//! - [`Controller`]: page identity, view state and session lifecycle
//! - [`ViewRegistry`]: explicit mapping from component keys to render functions
//! - [`Driver`]: trait for platform-specific I/O abstraction
//! - [`Runtime`]: generic orchestration loop using Driver
//! - [`RuntimeHandle`]: view operations (events, actions, refresh)

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod bootstrap;
mod config;
mod controller;
mod driver;
mod error;
mod runtime;
mod view;

pub use bootstrap::{Bootstrap, DocumentAttributes, HostDocument, attributes};
pub use config::RuntimeConfig;
pub use controller::{
    ActionDispatch, Controller, PageTicket, Phase, RefreshOutcome, RuntimeAction,
};
pub use driver::{Driver, DriverEvent};
pub use error::{ConfigError, RuntimeError};
pub use runtime::{Runtime, RuntimeHandle};
pub use view::{RenderFn, Rendered, ViewContext, ViewRegistry};
