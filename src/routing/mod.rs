//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request (host, path, query)
//!     → router.rs (host + kind filter, specificity tie-break)
//!     → matcher.rs (literal equality or templated capture)
//!     → Return: RouteMatch { route, bindings } | None | RouteError::Ambiguous
//!
//! Route Compilation (at startup):
//!     routes.toml [[route]] blocks
//!     → PathTemplate::compile per route
//!     → Freeze as immutable RouteTable
//! ```
//!
//! # Design Decisions
//! - Routes compiled at startup, immutable at runtime
//! - Deterministic: same input always matches same route
//! - Most specific match wins; a tie at the top is never guessed

pub mod matcher;
pub mod router;

pub use matcher::{match_path, Binding, PathTemplate, PatternError};
pub use router::{GitPhase, Route, RouteError, RouteKind, RouteMatch, RouteTable};
