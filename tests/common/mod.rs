//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use vcs_mock_proxy::config::load_routes;
use vcs_mock_proxy::mock::{GitError, GitServing};
use vcs_mock_proxy::{RuntimeError, ServerConfig, ServerRuntime, Substitution};

/// A mock root on disk.
pub struct MockTree {
    dir: tempfile::TempDir,
}

impl MockTree {
    pub fn new(routes: &str) -> Self {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("routes.toml"), routes).unwrap();
        Self { dir }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn fixture(&self, key: &str, text: &str) -> PathBuf {
        let path = self.dir.path().join(key);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, text).unwrap();
        path
    }
}

/// Git collaborator that answers with canned pkt-lines.
#[derive(Default)]
pub struct CannedGit;

#[async_trait]
impl GitServing for CannedGit {
    async fn advertise_refs(&self, repository: &Path) -> Result<Bytes, GitError> {
        if !repository.exists() {
            return Err(GitError::MissingRepository(repository.to_path_buf()));
        }
        Ok(Bytes::from_static(b"001e# service=git-upload-pack\n0000"))
    }

    async fn upload_pack(&self, _repository: &Path, request: Bytes, _timeout: Duration) -> Result<Bytes, GitError> {
        Ok(request)
    }
}

pub struct RunningServer {
    pub icap_addr: SocketAddr,
    pub api_addr: SocketAddr,
    stop: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<Result<(), RuntimeError>>>,
}

impl RunningServer {
    pub fn api_url(&self, path: &str) -> String {
        format!("http://{}{}", self.api_addr, path)
    }

    pub async fn stop(mut self) -> Result<(), RuntimeError> {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        self.handle.take().unwrap().await.unwrap()
    }
}

/// Start both listeners on ephemeral ports.
pub async fn start_server(tree: &MockTree, defaults: Vec<Substitution>) -> RunningServer {
    let mut config = ServerConfig {
        mock_root: tree.path().to_path_buf(),
        default_variables: defaults,
        ..ServerConfig::default()
    };
    config.icap.bind_address = "127.0.0.1:0".into();
    config.api.bind_address = "127.0.0.1:0".into();

    let routes = load_routes(&config.routes_path()).unwrap();
    let runtime = ServerRuntime::with_parts(config, routes, Arc::new(CannedGit));
    let bound = runtime.bind().await.unwrap();
    let icap_addr = bound.icap_addr().unwrap();
    let api_addr = bound.api_addr().unwrap();

    let (tx, rx) = oneshot::channel();
    let handle = tokio::spawn(bound.run_until(async {
        let _ = rx.await;
    }));

    RunningServer {
        icap_addr,
        api_addr,
        stop: Some(tx),
        handle: Some(handle),
    }
}

/// Frame a REQMOD carrying an HTTP request head and optional body.
pub fn reqmod(http_head: &str, body: Option<&str>) -> String {
    match body {
        None => format!(
            "REQMOD icap://127.0.0.1/icap ICAP/1.0\r\nConnection: close\r\nEncapsulated: req-hdr=0, null-body={}\r\n\r\n{http_head}",
            http_head.len()
        ),
        Some(body) => format!(
            "REQMOD icap://127.0.0.1/icap ICAP/1.0\r\nConnection: close\r\nEncapsulated: req-hdr=0, req-body={}\r\n\r\n{http_head}{:x}\r\n{body}\r\n0\r\n\r\n",
            http_head.len(),
            body.len()
        ),
    }
}

/// Send raw bytes and read until the server closes the connection.
pub async fn icap_exchange(addr: SocketAddr, request: &str) -> String {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream.write_all(request.as_bytes()).await.unwrap();

    let mut out = Vec::new();
    tokio::time::timeout(Duration::from_secs(10), stream.read_to_end(&mut out))
        .await
        .expect("interception listener did not close the connection")
        .unwrap();
    String::from_utf8(out).unwrap()
}
