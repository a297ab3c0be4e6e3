//! Local mock serving.
//!
//! # Data Flow
//! ```text
//! request (host, path, body)
//!     → responder.rs (route lookup by kind)
//!         http → fixtures.rs (read) → substitution chain → text
//!         git  → git.rs (advertise refs | upload-pack with timeout) → bytes
//! ```

pub mod fixtures;
pub mod git;
pub mod responder;

pub use fixtures::{ExistenceCache, FixtureStore};
pub use git::{GitCommand, GitError, GitServing};
pub use responder::{MockResponder, MockResponse};
