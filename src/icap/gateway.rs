//! Interception gateway.
//!
//! # Responsibilities
//! - Decide per request: capability advertisement, pass-through, local serve
//!   or rejection
//! - Run the persistent-connection loop for one client
//! - Run the bounded accept loop
//!
//! # Design Decisions
//! - Each request is decided independently; no state survives between requests
//!   on a connection
//! - A route ambiguity is served locally so the client sees the server error
//! - Local serving dispatches into the mock router in-process

use std::sync::Arc;

use axum::Router;
use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::broadcast;
use tower::ServiceExt;
use tracing::Instrument;

use crate::http::request::{path_and_query, strip_port};
use crate::icap::codec::{read_remaining, read_request, IcapError, IcapRequest, IcapResponse, CONTINUE};
use crate::icap::encapsulation::{encode_response, HttpRequestHead};
use crate::mock::MockResponder;
use crate::net::{Listener, ListenerError, TrackedConnection};
use crate::observability::metrics;

/// Outcome of the decision procedure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// Reply with the capability advertisement.
    Options,
    /// Reply 204; the client forwards its original request.
    PassThrough,
    /// Substitute a locally produced response.
    ServeLocally(HttpRequestHead),
    MethodNotAllowed,
}

impl Decision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Decision::Options => "options",
            Decision::PassThrough => "pass_through",
            Decision::ServeLocally(_) => "serve_locally",
            Decision::MethodNotAllowed => "method_not_allowed",
        }
    }
}

/// Host and path-and-query an encapsulated request is addressed to.
pub fn routing_target(head: &HttpRequestHead) -> Option<(String, String)> {
    let uri: axum::http::Uri = head.target.parse().ok()?;
    let host = match uri.host() {
        Some(host) => host.to_string(),
        None => head.header("host")?.to_string(),
    };
    let host = strip_port(host.trim()).to_ascii_lowercase();
    if host.is_empty() {
        return None;
    }
    Some((host, path_and_query(&uri).to_string()))
}

#[derive(Clone)]
pub struct InterceptionGateway {
    responder: Arc<MockResponder>,
    mock: Router,
    service_tag: String,
}

impl InterceptionGateway {
    pub fn new(responder: Arc<MockResponder>, mock: Router, service_tag: impl Into<String>) -> Self {
        Self {
            responder,
            mock,
            service_tag: service_tag.into(),
        }
    }

    pub async fn decide(&self, method: &str, http_head: Option<HttpRequestHead>) -> Decision {
        match method {
            "OPTIONS" => Decision::Options,
            "REQMOD" => {
                let Some(head) = http_head else {
                    return Decision::PassThrough;
                };
                let Some((host, target)) = routing_target(&head) else {
                    return Decision::PassThrough;
                };

                tracing::info!(host = %host, path = %target, "REQMOD request");
                match self.responder.has_target(&host, &target).await {
                    Ok(true) => Decision::ServeLocally(head),
                    Ok(false) => Decision::PassThrough,
                    Err(e) => {
                        tracing::warn!(host = %host, path = %target, error = %e, "Ambiguous route, serving error locally");
                        Decision::ServeLocally(head)
                    }
                }
            }
            other => {
                tracing::error!(method = %other, "Invalid request method");
                Decision::MethodNotAllowed
            }
        }
    }

    fn options_response(&self) -> IcapResponse {
        IcapResponse::new(200)
            .header("Methods", "REQMOD")
            .header("Allow", "204")
            .header("Preview", "0")
            .header("Transfer-Preview", "*")
            .header("Service", self.service_tag.clone())
    }

    async fn serve_locally(&self, head: HttpRequestHead, body: Bytes) -> Result<IcapResponse, IcapError> {
        let request = head.into_request(body)?;
        let response = match self.mock.clone().oneshot(request).await {
            Ok(response) => response,
            Err(never) => match never {},
        };
        let (head, body) = encode_response(response).await?;
        Ok(IcapResponse::new(200).with_http(head, body))
    }

    async fn handle<R, W>(&self, reader: &mut R, writer: &mut W, mut request: IcapRequest) -> Result<IcapResponse, IcapError>
    where
        R: tokio::io::AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let http_head = request.http_head.as_deref().map(HttpRequestHead::parse).transpose()?;
        let decision = self.decide(&request.head.method, http_head).await;
        metrics::record_icap_request(&request.head.method, decision.as_str());

        let response = match decision {
            Decision::Options => self.options_response(),
            Decision::PassThrough => IcapResponse::new(204),
            Decision::MethodNotAllowed => IcapResponse::new(405),
            Decision::ServeLocally(head) => {
                if !request.complete {
                    writer.write_all(CONTINUE).await?;
                    writer.flush().await?;
                    read_remaining(reader, &mut request).await?;
                }
                self.serve_locally(head, request.body.freeze()).await?
            }
        };

        Ok(response.header("ISTag", format!("\"{}\"", self.service_tag)))
    }

    /// Serve requests on one connection until the client closes it.
    pub async fn serve_connection<S>(&self, stream: S) -> Result<(), IcapError>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let (read, mut write) = tokio::io::split(stream);
        let mut reader = BufReader::new(read);

        loop {
            let outcome = match read_request(&mut reader).await {
                Ok(Some(request)) => {
                    let close = request.head.wants_close();
                    self.handle(&mut reader, &mut write, request).await.map(|r| (r, close))
                }
                Ok(None) => return Ok(()),
                Err(e) => Err(e),
            };

            match outcome {
                Ok((response, close)) => {
                    let response = if close { response.header("Connection", "close") } else { response };
                    write.write_all(&response.encode()).await?;
                    write.flush().await?;
                    if close {
                        return Ok(());
                    }
                }
                Err(e @ (IcapError::Io(_) | IcapError::UnexpectedEof)) => return Err(e),
                Err(e) => {
                    tracing::warn!(error = %e, "Malformed interception request");
                    metrics::record_icap_request("invalid", "bad_request");
                    let response = IcapResponse::new(400)
                        .header("ISTag", format!("\"{}\"", self.service_tag))
                        .header("Connection", "close");
                    write.write_all(&response.encode()).await?;
                    write.flush().await?;
                    return Err(e);
                }
            }
        }
    }

    /// Accept connections until `shutdown` fires or accepting fails.
    pub async fn run(self, listener: Listener, mut shutdown: broadcast::Receiver<()>) -> Result<(), ListenerError> {
        loop {
            let (stream, peer, permit) = tokio::select! {
                accepted = listener.accept() => match accepted {
                    Ok(accepted) => accepted,
                    Err(ListenerError::Accept(e)) if is_transient(&e) => {
                        tracing::warn!(error = %e, "Transient accept error");
                        continue;
                    }
                    Err(e) => return Err(e),
                },
                _ = shutdown.recv() => {
                    tracing::info!("Interception listener stopping");
                    return Ok(());
                }
            };

            let gateway = self.clone();
            let connection = TrackedConnection::open(peer, Some(permit));
            let span = tracing::info_span!("icap", conn = %connection.id(), peer = %peer);
            tokio::spawn(
                async move {
                    if let Err(e) = gateway.serve_connection(stream).await {
                        tracing::debug!(error = %e, "Connection ended with error");
                    }
                    drop(connection);
                }
                .instrument(span),
            );
        }
    }
}

fn is_transient(e: &std::io::Error) -> bool {
    matches!(
        e.kind(),
        std::io::ErrorKind::ConnectionAborted | std::io::ErrorKind::ConnectionReset | std::io::ErrorKind::Interrupted
    )
}

#[cfg(test)]
mod tests {
    use std::path::Path;
    use std::time::Duration;

    use tokio::io::{duplex, AsyncReadExt};

    use super::*;
    use crate::http::mock_router;
    use crate::mock::{ExistenceCache, FixtureStore, GitCommand};
    use crate::routing::{Route, RouteKind, RouteTable};
    use crate::substitution::SubstitutionChain;

    fn gateway(root: &Path) -> InterceptionGateway {
        let routes = RouteTable::new(vec![
            Route::new("api.github.com", "/users/:name", RouteKind::Http).unwrap(),
            Route::new("ambiguous.com", "/a/:x", RouteKind::Http).unwrap(),
            Route::new("ambiguous.com", "/:y/b", RouteKind::Http).unwrap(),
        ]);
        let responder = Arc::new(MockResponder::new(
            Arc::new(routes),
            FixtureStore::new(root, "fixture", ExistenceCache::new()),
            SubstitutionChain::new(),
            Arc::new(GitCommand::default()),
            Duration::from_secs(30),
        ));
        let mock = mock_router(responder.clone(), Duration::from_secs(35));
        InterceptionGateway::new(responder, mock, "test-tag")
    }

    fn head(target: &str) -> HttpRequestHead {
        HttpRequestHead {
            method: "GET".into(),
            target: target.into(),
            headers: Vec::new(),
        }
    }

    fn fixture_root() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("api.github.com/users")).unwrap();
        std::fs::write(dir.path().join("api.github.com/users/:name.fixture"), "hello {{name}}").unwrap();
        dir
    }

    #[tokio::test]
    async fn decision_procedure() {
        let dir = fixture_root();
        let gateway = gateway(dir.path());

        assert_eq!(gateway.decide("OPTIONS", None).await, Decision::Options);
        assert_eq!(gateway.decide("RESPMOD", None).await, Decision::MethodNotAllowed);
        assert_eq!(gateway.decide("REQMOD", None).await, Decision::PassThrough);
        assert_eq!(
            gateway.decide("REQMOD", Some(head("http://example.org/"))).await,
            Decision::PassThrough
        );

        let mocked = head("http://api.github.com/users/russell");
        assert_eq!(
            gateway.decide("REQMOD", Some(mocked.clone())).await,
            Decision::ServeLocally(mocked)
        );

        let ambiguous = head("http://ambiguous.com/a/b");
        assert_eq!(
            gateway.decide("REQMOD", Some(ambiguous.clone())).await,
            Decision::ServeLocally(ambiguous)
        );
    }

    #[test]
    fn routing_target_uses_host_header_for_origin_form() {
        let head = HttpRequestHead {
            method: "GET".into(),
            target: "/users/russell?page=2".into(),
            headers: vec![("Host".into(), "API.github.com:443".into())],
        };
        assert_eq!(
            routing_target(&head),
            Some(("api.github.com".to_string(), "/users/russell?page=2".to_string()))
        );
    }

    async fn exchange(gateway: InterceptionGateway, request: String) -> String {
        let (mut client, server) = duplex(64 * 1024);
        let task = tokio::spawn(async move { gateway.serve_connection(server).await });

        client.write_all(request.as_bytes()).await.unwrap();
        client.shutdown().await.unwrap();
        let mut out = String::new();
        client.read_to_string(&mut out).await.unwrap();
        let _ = task.await.unwrap();
        out
    }

    #[tokio::test]
    async fn options_and_pass_through_on_one_connection() {
        let dir = fixture_root();
        let http = "GET http://example.org/ HTTP/1.1\r\nHost: example.org\r\n\r\n";
        let request = format!(
            "OPTIONS icap://proxy/icap ICAP/1.0\r\n\r\n\
             REQMOD icap://proxy/icap ICAP/1.0\r\nEncapsulated: req-hdr=0, null-body={}\r\n\r\n{http}",
            http.len()
        );

        let out = exchange(gateway(dir.path()), request).await;
        assert!(out.starts_with("ICAP/1.0 200 OK\r\n"));
        assert!(out.contains("Methods: REQMOD\r\n"));
        assert!(out.contains("Allow: 204\r\n"));
        assert!(out.contains("Preview: 0\r\n"));
        assert!(out.contains("Transfer-Preview: *\r\n"));
        assert!(out.contains("ISTag: \"test-tag\"\r\n"));
        assert!(out.contains("ICAP/1.0 204 No Content\r\n"));
    }

    #[tokio::test]
    async fn local_serve_encapsulates_the_mock_response() {
        let dir = fixture_root();
        let http = "GET http://api.github.com/users/russell HTTP/1.1\r\nHost: api.github.com\r\n\r\n";
        let request = format!(
            "REQMOD icap://proxy/icap ICAP/1.0\r\nConnection: close\r\nEncapsulated: req-hdr=0, null-body={}\r\n\r\n{http}",
            http.len()
        );

        let out = exchange(gateway(dir.path()), request).await;
        assert!(out.starts_with("ICAP/1.0 200 OK\r\n"));
        assert!(out.contains("Connection: close\r\n"));
        assert!(out.contains("Encapsulated: res-hdr=0, res-body="));
        assert!(out.contains("HTTP/1.1 200 OK\r\n"));
        assert!(out.ends_with("d\r\nhello russell\r\n0\r\n\r\n"));
    }

    #[tokio::test]
    async fn preview_is_continued_before_local_serve() {
        let dir = fixture_root();
        let http = "POST http://api.github.com/users/russell HTTP/1.1\r\nHost: api.github.com\r\n\r\n";
        let request = format!(
            "REQMOD icap://proxy/icap ICAP/1.0\r\nPreview: 0\r\nConnection: close\r\nEncapsulated: req-hdr=0, req-body={}\r\n\r\n{http}0\r\n\r\n4\r\nbody\r\n0\r\n\r\n",
            http.len()
        );

        let out = exchange(gateway(dir.path()), request).await;
        assert!(out.starts_with("ICAP/1.0 100 Continue\r\n\r\nICAP/1.0 200 OK\r\n"));
    }

    #[tokio::test]
    async fn other_methods_are_rejected_and_garbage_closes() {
        let dir = fixture_root();
        let out = exchange(
            gateway(dir.path()),
            "RESPMOD icap://proxy/icap ICAP/1.0\r\n\r\nnot an icap request\r\n\r\n".to_string(),
        )
        .await;
        assert!(out.starts_with("ICAP/1.0 405 Method Not Allowed\r\n"));
        assert!(out.contains("ICAP/1.0 400 Bad Request\r\n"));
    }
}
