//! HTTP side of local serving.
//!
//! # Data Flow
//! ```text
//! encapsulated request (from the interception gateway)
//!     → request.rs (request ID, host + path extraction)
//!     → server.rs (axum Router, mock handler)
//!     → MockResponder
//!     → HTTP response, re-encapsulated by the gateway
//! ```

pub mod request;
pub mod server;

pub use request::{request_host, UuidRequestId, X_REQUEST_ID};
pub use server::mock_router;
