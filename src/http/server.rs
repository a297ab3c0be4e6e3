//! Mock router setup.
//!
//! # Responsibilities
//! - Create the axum Router that answers locally served requests
//! - Wire up middleware (tracing, timeout, request ID)
//! - Translate MockResponder outcomes into HTTP responses

use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    extract::State,
    http::{Request, StatusCode},
    response::{IntoResponse, Response},
    routing::any,
    Router,
};
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

use crate::error::MockError;
use crate::http::request::{path_and_query, propagate_request_id_layer, request_host, set_request_id_layer, X_REQUEST_ID};
use crate::mock::MockResponder;
use crate::observability::metrics;

/// Upper bound on a buffered request body.
pub const MAX_BODY_BYTES: usize = 64 * 1024 * 1024;

/// Build the mock router.
///
/// `request_timeout` should exceed the git transfer timeout so collaborator
/// timeouts surface as their own error.
#[allow(deprecated)]
pub fn mock_router(responder: Arc<MockResponder>, request_timeout: Duration) -> Router {
    Router::new()
        .route("/", any(mock_handler))
        .route("/{*path}", any(mock_handler))
        .with_state(responder)
        .layer(TimeoutLayer::new(request_timeout))
        .layer(propagate_request_id_layer())
        .layer(TraceLayer::new_for_http())
        .layer(set_request_id_layer())
}

async fn mock_handler(State(responder): State<Arc<MockResponder>>, request: Request<Body>) -> Response {
    let request_id = request
        .headers()
        .get(X_REQUEST_ID)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown")
        .to_string();
    let target = path_and_query(request.uri()).to_string();

    let Some(host) = request_host(&request) else {
        tracing::warn!(request_id = %request_id, path = %target, "Request without host");
        return (StatusCode::BAD_REQUEST, "request has no host").into_response();
    };

    let body = match axum::body::to_bytes(request.into_body(), MAX_BODY_BYTES).await {
        Ok(bytes) => bytes,
        Err(e) => {
            return MockError::Internal(format!("failed reading request body: {e}")).into_response();
        }
    };

    match responder.respond(&host, &target, body).await {
        Ok(mock) => {
            tracing::info!(request_id = %request_id, host = %host, path = %target, kind = %mock.kind(), "Mock served");
            metrics::record_mock_response(mock.kind().as_str(), StatusCode::OK.as_u16());
            mock.into_response()
        }
        Err(e) => {
            tracing::error!(request_id = %request_id, host = %host, path = %target, error = %e, "Mock request failed");
            metrics::record_mock_response("error", e.status().as_u16());
            e.into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use axum::http::header;
    use bytes::Bytes;
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    use super::*;
    use crate::mock::{ExistenceCache, FixtureStore, GitCommand};
    use crate::routing::{Route, RouteKind, RouteTable};
    use crate::substitution::{Substitution, SubstitutionChain};

    fn router(root: &Path) -> Router {
        let routes = RouteTable::new(vec![
            Route::new("api.example.com", "/users/:name", RouteKind::Http).unwrap(),
            Route::new("api.example.com", "/", RouteKind::Http).unwrap(),
        ]);
        let responder = MockResponder::new(
            Arc::new(routes),
            FixtureStore::new(root, "fixture", ExistenceCache::new()),
            SubstitutionChain::with_defaults([Substitution::new("site", "Example")]),
            Arc::new(GitCommand::default()),
            Duration::from_secs(30),
        );
        mock_router(Arc::new(responder), Duration::from_secs(35))
    }

    async fn body_text(response: Response) -> String {
        let bytes: Bytes = response.into_body().collect().await.unwrap().to_bytes();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn serves_rendered_fixture_with_request_id() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("api.example.com/users")).unwrap();
        std::fs::write(
            dir.path().join("api.example.com/users/:name.fixture"),
            "{\"login\": \"{{name}}\", \"site\": \"{{ .site }}\"}",
        )
        .unwrap();

        let response = router(dir.path())
            .oneshot(
                Request::builder()
                    .uri("http://api.example.com/users/russell")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key(X_REQUEST_ID));
        assert_eq!(body_text(response).await, "{\"login\": \"russell\", \"site\": \"Example\"}");
    }

    #[tokio::test]
    async fn host_header_is_used_for_origin_form() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("api.example.com")).unwrap();
        std::fs::write(dir.path().join("api.example.com/index.fixture"), "root").unwrap();

        let response = router(dir.path())
            .oneshot(
                Request::builder()
                    .uri("/")
                    .header(header::HOST, "api.example.com:80")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_text(response).await, "root");
    }

    #[tokio::test]
    async fn missing_fixture_and_route_are_404() {
        let dir = tempfile::tempdir().unwrap();
        let app = router(dir.path());

        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri("http://api.example.com/users/nobody")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response = app
            .oneshot(
                Request::builder()
                    .uri("http://unknown.example.com/")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert!(body_text(response).await.contains("found no matching route"));
    }

    #[tokio::test]
    async fn request_without_host_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let response = router(dir.path())
            .oneshot(Request::builder().uri("/users/x").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
