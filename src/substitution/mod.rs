//! Fixture text substitution.
//!
//! # Data Flow
//! ```text
//! defaults (config) ─┐
//! API POST ──────────┴→ SubstitutionChain::register (exclusive lock)
//!
//! fixture text
//!     → template.rs (scan placeholders, reject malformed text)
//!     → chain.rs (chain snapshot + request bindings, applied in order)
//!     → rendered text
//! ```

pub mod chain;
pub mod template;

pub use chain::{apply_all, Registration, Substitution, SubstitutionChain, Transformer};
pub use template::TemplateError;
