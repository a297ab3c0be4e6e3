//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! gateway / mock / admin
//!     → logging.rs (structured log events, request spans)
//!     → metrics.rs (counters, optional Prometheus scrape endpoint)
//! ```
//!
//! # Design Decisions
//! - Log level comes from config and may be overridden by `RUST_LOG`
//! - Metric updates are atomic increments; without an installed exporter
//!   they are no-ops

pub mod logging;
pub mod metrics;
