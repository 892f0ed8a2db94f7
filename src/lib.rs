//! brainview - live-state synchronization and simulation core for an
//! interactive 3D neural graph.
//!
//! A [`session::Session`] owns the connection manager, the renderable
//! builder and reconciler, the firing and relaxation simulators, and the
//! mode arbitrator that decides which of them drives the visible scene.
//! [`runtime`] wires it to a WebSocket transport, a REST graph source and an
//! HTTP display surface.

pub mod config;
pub mod connection;
pub mod error;
pub mod firing;
pub mod mode;
pub mod model;
pub mod palette;
pub mod protocol;
pub mod relax;
pub mod render;
pub mod runtime;
pub mod scheduler;
pub mod server;
pub mod session;
pub mod sink;
pub mod source;
pub mod stats;
pub mod synthetic;
pub mod transport;
