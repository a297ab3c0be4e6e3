//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! server config (TOML, optional) + CLI overrides
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → ServerConfig (validated, immutable)
//!
//! <mock_root>/routes.toml
//!     → loader.rs (parse, compile templates)
//!     → RouteTable (immutable, shared via Arc)
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; there is no reload
//! - All server fields have defaults to allow minimal configs
//! - Route blocks reject unknown fields and kinds

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{check_mock_root, load_config, load_routes, ConfigError};
pub use schema::{ApiConfig, FixtureConfig, GitConfig, IcapConfig, ObservabilityConfig, ServerConfig};
