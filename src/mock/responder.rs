//! Mock responder.
//!
//! # Responsibilities
//! - Resolve a request to its route and backing fixture or repository
//! - Render http fixtures through the substitution chain
//! - Delegate git routes to the Git Serving collaborator
//!
//! # Design Decisions
//! - Smart-protocol targets prefer git routes and fall back to http routes;
//!   an http route and a git route never compete in one tie-break
//! - Fixture text is fully rendered before anything is written; a template
//!   error never produces a partial body

use std::sync::Arc;
use std::time::Duration;

use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use bytes::Bytes;

use crate::error::MockError;
use crate::mock::fixtures::FixtureStore;
use crate::mock::git::{GitServing, ADVERTISEMENT_CONTENT_TYPE, RESULT_CONTENT_TYPE};
use crate::routing::{GitPhase, RouteError, RouteKind, RouteTable};
use crate::substitution::SubstitutionChain;

/// A successful mock reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockResponse {
    /// Rendered fixture text.
    Fixture(String),
    /// Smart-protocol payload from the Git Serving collaborator.
    Git { content_type: &'static str, body: Bytes },
}

impl MockResponse {
    pub fn kind(&self) -> RouteKind {
        match self {
            MockResponse::Fixture(_) => RouteKind::Http,
            MockResponse::Git { .. } => RouteKind::GitTransfer,
        }
    }
}

impl IntoResponse for MockResponse {
    fn into_response(self) -> Response {
        match self {
            MockResponse::Fixture(body) => (StatusCode::OK, body).into_response(),
            MockResponse::Git { content_type, body } => (
                StatusCode::OK,
                [(header::CONTENT_TYPE, content_type), (header::CACHE_CONTROL, "no-cache")],
                body,
            )
                .into_response(),
        }
    }
}

/// Answers requests from fixtures and on-disk repositories.
#[derive(Clone)]
pub struct MockResponder {
    routes: Arc<RouteTable>,
    fixtures: FixtureStore,
    chain: SubstitutionChain,
    git: Arc<dyn GitServing>,
    transfer_timeout: Duration,
}

impl MockResponder {
    pub fn new(
        routes: Arc<RouteTable>,
        fixtures: FixtureStore,
        chain: SubstitutionChain,
        git: Arc<dyn GitServing>,
        transfer_timeout: Duration,
    ) -> Self {
        Self {
            routes,
            fixtures,
            chain,
            git,
            transfer_timeout,
        }
    }

    pub fn routes(&self) -> &RouteTable {
        &self.routes
    }

    pub fn fixtures(&self) -> &FixtureStore {
        &self.fixtures
    }

    pub fn chain(&self) -> &SubstitutionChain {
        &self.chain
    }

    /// Whether a route matches and its fixture or repository exists.
    pub async fn has_target(&self, host: &str, path_and_query: &str) -> Result<bool, RouteError> {
        match self.routes.match_request(host, path_and_query)? {
            Some(found) => Ok(self.fixtures.target_exists(found.route).await),
            None => Ok(false),
        }
    }

    /// Produce the mock reply for one request.
    ///
    /// `body` is only consulted by the git transfer phase.
    pub async fn respond(&self, host: &str, path_and_query: &str, body: Bytes) -> Result<MockResponse, MockError> {
        let found = self
            .routes
            .match_request(host, path_and_query)?
            .ok_or_else(|| MockError::NoRoute(format!("{host}{path_and_query}")))?;

        match found.route.kind() {
            RouteKind::Http => {
                tracing::debug!(host, route = found.route.path(), "Serving http fixture");
                let text = self.fixtures.read_fixture(found.route).await?;
                let rendered = self.chain.render(&text, &found.bindings)?;
                Ok(MockResponse::Fixture(rendered))
            }
            RouteKind::GitTransfer => {
                let repository = self.fixtures.repository_path(found.route);
                tracing::debug!(host, repository = %repository.display(), "Serving git repository");

                // A git route only matches the two smart-protocol targets.
                match GitPhase::detect(path_and_query) {
                    Some(GitPhase::Advertisement) => {
                        let body = self.git.advertise_refs(&repository).await?;
                        Ok(MockResponse::Git {
                            content_type: ADVERTISEMENT_CONTENT_TYPE,
                            body,
                        })
                    }
                    Some(GitPhase::Transfer) | None => {
                        let body = self.git.upload_pack(&repository, body, self.transfer_timeout).await?;
                        Ok(MockResponse::Git {
                            content_type: RESULT_CONTENT_TYPE,
                            body,
                        })
                    }
                }
            }
        }
    }
}
