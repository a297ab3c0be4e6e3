//! Interception protocol subsystem (request-modification profile).
//!
//! # Data Flow
//! ```text
//! proxy ──ICAP──→ net::Listener
//!     → codec.rs (frame request, de-chunk body, preview)
//!     → gateway.rs (decide: OPTIONS | 204 | serve locally | 405)
//!         serve locally → encapsulation.rs → mock router → encapsulation.rs
//!     → codec.rs (encode response)
//! ```

pub mod codec;
pub mod encapsulation;
pub mod gateway;

pub use codec::{IcapError, IcapRequest, IcapResponse};
pub use gateway::{Decision, InterceptionGateway};
