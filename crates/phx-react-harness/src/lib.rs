//! Deterministic simulation harness for phx-react testing.
//!
//! In-memory implementations of the server and the [`phx_react_app::Driver`]
//! trait, so the same controller and runtime code that runs in production is
//! exercised with virtual time and scripted network behavior.
//!
//! # Components
//!
//! - [`SimServer`]: page endpoint, action endpoint and channel server in one
//! - [`SimNetwork`]: connections, event queue and virtual clock around a server
//! - [`SimDriver`]: async [`phx_react_app::Driver`] over a shared network
//! - [`SimWorld`]: synchronous executor driving a controller step by step
//!
//! # Invariant Testing
//!
//! The `invariants` module provides behavioral testing through invariant
//! checks. Use [`InvariantRegistry::standard()`] for the runtime invariants.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod invariants;
pub mod sim_driver;
pub mod sim_network;
pub mod sim_server;
pub mod sim_world;

pub use invariants::{
    ConnectedMeansJoined, Invariant, InvariantRegistry, InvariantResult, RuntimeSnapshot,
    SingleTransport, StateFromServer, Violation,
};
pub use sim_driver::{SimDriver, SimDriverError, SimHandle};
pub use sim_network::{RenderRecord, SimNetwork};
pub use sim_server::{ActionHandler, SimServer};
pub use sim_world::SimWorld;
