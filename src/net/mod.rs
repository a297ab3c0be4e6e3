//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming TCP connection
//!     → listener.rs (accept loop, connection limits)
//!     → connection.rs (permit, gauge and id held for the connection lifetime)
//!     → Hand off to the interception gateway
//! ```
//!
//! # Design Decisions
//! - Bounded accept queue prevents resource exhaustion
//! - No TLS: traffic arrives from a proxy on a trusted network

pub mod connection;
pub mod listener;

pub use connection::{ConnectionId, TrackedConnection};
pub use listener::{bind_tcp, ConnectionPermit, Listener, ListenerError};
