//! VCS mock proxy library.
//!
//! Intercepts outbound VCS client traffic over ICAP and either passes it
//! through or answers it from local fixtures and on-disk git repositories.

pub mod admin;
pub mod config;
pub mod error;
pub mod http;
pub mod icap;
pub mod lifecycle;
pub mod mock;
pub mod net;
pub mod observability;
pub mod routing;
pub mod substitution;

pub use config::ServerConfig;
pub use error::MockError;
pub use lifecycle::{BoundRuntime, RuntimeError, ServerRuntime};
pub use routing::{Route, RouteKind, RouteTable};
pub use substitution::{Substitution, SubstitutionChain};
