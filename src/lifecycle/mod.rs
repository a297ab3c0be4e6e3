//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (runtime.rs):
//!     ServerConfig → check mock root → load routes → seed chain → bind listeners
//!
//! Run (runtime.rs):
//!     interception accept loop ┐
//!     management API server    ├→ first terminal event wins
//!     termination signal       ┘
//!
//! Stop (shutdown.rs):
//!     broadcast to background tasks → return outcome
//! ```
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - No listener is restarted
//! - No drain: in-flight requests are not awaited

pub mod runtime;
pub mod shutdown;
pub mod signals;

pub use runtime::{BoundRuntime, RuntimeError, ServerRuntime};
pub use shutdown::Shutdown;
