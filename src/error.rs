//! Per-request error taxonomy.
//!
//! Every failure that happens while answering one request is contained in
//! that request and rendered as a status code plus a plain-text message.

use std::path::PathBuf;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

use crate::mock::git::GitError;
use crate::routing::RouteError;
use crate::substitution::TemplateError;

#[derive(Debug, Error)]
pub enum MockError {
    #[error("found no matching route for {0}")]
    NoRoute(String),

    #[error("failed to find a matching route: {0}")]
    Ambiguous(#[from] RouteError),

    #[error("failed opening mock file {}: {source}", .path.display())]
    FixtureNotFound {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("error applying transformations: {0}")]
    Template(#[from] TemplateError),

    #[error("git collaborator failed: {0}")]
    Upstream(#[from] GitError),

    #[error("{0}")]
    Internal(String),
}

impl MockError {
    pub fn status(&self) -> StatusCode {
        match self {
            MockError::NoRoute(_) | MockError::FixtureNotFound { .. } => StatusCode::NOT_FOUND,
            MockError::Ambiguous(_)
            | MockError::Template(_)
            | MockError::Upstream(_)
            | MockError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for MockError {
    fn into_response(self) -> Response {
        (self.status(), self.to_string()).into_response()
    }
}
