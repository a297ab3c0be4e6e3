//! Git Serving collaborator.
//!
//! # Responsibilities
//! - Produce the smart-protocol reference advertisement for a repository
//! - Run the upload-pack exchange for a client request body
//!
//! # Design Decisions
//! - The wire protocol is spoken by `git upload-pack --stateless-rpc`
//! - The transfer phase is bounded by a caller-supplied timeout; the child is
//!   killed when the timeout fires
//! - Failures are reported once and never retried

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

pub const UPLOAD_PACK_SERVICE: &str = "git-upload-pack";
pub const ADVERTISEMENT_CONTENT_TYPE: &str = "application/x-git-upload-pack-advertisement";
pub const RESULT_CONTENT_TYPE: &str = "application/x-git-upload-pack-result";

/// Errors surfaced by the Git Serving collaborator.
#[derive(Debug, Error)]
pub enum GitError {
    #[error("repository not found: {}", .0.display())]
    MissingRepository(PathBuf),

    #[error("failed to spawn git: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("git-upload-pack i/o failed: {0}")]
    Io(#[source] std::io::Error),

    #[error("git-upload-pack exited with {status}: {stderr}")]
    Failed { status: String, stderr: String },

    #[error("git-upload-pack timed out after {0:?}")]
    Timeout(Duration),
}

/// Speaks the smart transfer protocol over a filesystem-backed repository.
#[async_trait]
pub trait GitServing: Send + Sync {
    /// Reference advertisement, including the service announcement pkt-line.
    async fn advertise_refs(&self, repository: &Path) -> Result<Bytes, GitError>;

    /// Answer an upload-pack request body within `timeout`.
    async fn upload_pack(&self, repository: &Path, request: Bytes, timeout: Duration) -> Result<Bytes, GitError>;
}

/// [`GitServing`] backed by the `git` executable.
#[derive(Debug, Clone)]
pub struct GitCommand {
    program: PathBuf,
}

impl GitCommand {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    async fn run(&self, args: &[&str], repository: &Path, input: Option<Bytes>) -> Result<Vec<u8>, GitError> {
        if !tokio::fs::try_exists(repository).await.unwrap_or(false) {
            return Err(GitError::MissingRepository(repository.to_path_buf()));
        }

        let mut child = Command::new(&self.program)
            .args(args)
            .arg(repository)
            .stdin(if input.is_some() { Stdio::piped() } else { Stdio::null() })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(GitError::Spawn)?;

        let writer = match (input, child.stdin.take()) {
            (Some(request), Some(mut stdin)) => Some(tokio::spawn(async move {
                stdin.write_all(&request).await?;
                stdin.shutdown().await
            })),
            _ => None,
        };

        let output = child.wait_with_output().await.map_err(GitError::Io)?;

        if !output.status.success() {
            return Err(GitError::Failed {
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        if let Some(writer) = writer {
            match writer.await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => return Err(GitError::Io(e)),
                Err(e) => return Err(GitError::Io(std::io::Error::other(e))),
            }
        }

        Ok(output.stdout)
    }
}

impl Default for GitCommand {
    fn default() -> Self {
        Self::new("git")
    }
}

#[async_trait]
impl GitServing for GitCommand {
    async fn advertise_refs(&self, repository: &Path) -> Result<Bytes, GitError> {
        let refs = self
            .run(&["upload-pack", "--stateless-rpc", "--advertise-refs"], repository, None)
            .await?;

        let mut body = BytesMut::new();
        body.extend_from_slice(&pkt_line(&format!("# service={UPLOAD_PACK_SERVICE}\n")));
        body.extend_from_slice(FLUSH_PKT);
        body.extend_from_slice(&refs);
        Ok(body.freeze())
    }

    async fn upload_pack(&self, repository: &Path, request: Bytes, timeout: Duration) -> Result<Bytes, GitError> {
        let run = self.run(&["upload-pack", "--stateless-rpc"], repository, Some(request));
        let output = tokio::time::timeout(timeout, run)
            .await
            .map_err(|_| GitError::Timeout(timeout))??;
        Ok(Bytes::from(output))
    }
}

const FLUSH_PKT: &[u8] = b"0000";

/// Frame `payload` as a single pkt-line.
pub fn pkt_line(payload: &str) -> Vec<u8> {
    format!("{:04x}{}", payload.len() + 4, payload).into_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn service_announcement_framing() {
        assert_eq!(pkt_line("# service=git-upload-pack\n"), b"001e# service=git-upload-pack\n");
    }

    #[tokio::test]
    async fn missing_repository_is_reported_without_spawning() {
        let git = GitCommand::new("/nonexistent/git");
        let err = git
            .advertise_refs(Path::new("/definitely/not/a/repo/.git"))
            .await
            .unwrap_err();
        assert!(matches!(err, GitError::MissingRepository(_)));
    }

    #[tokio::test]
    async fn spawn_failure_is_an_upstream_error() {
        let dir = tempfile::tempdir().unwrap();
        let git = GitCommand::new("/nonexistent/git");
        let err = git.advertise_refs(dir.path()).await.unwrap_err();
        assert!(matches!(err, GitError::Spawn(_)));
    }

    fn git_available() -> bool {
        std::process::Command::new("git")
            .arg("--version")
            .output()
            .is_ok_and(|out| out.status.success())
    }

    #[tokio::test]
    async fn advertisement_from_a_bare_repository() {
        if !git_available() {
            eprintln!("git not installed, skipping");
            return;
        }
        let dir = tempfile::tempdir().unwrap();
        let repo = dir.path().join("widgets.git");
        let status = std::process::Command::new("git")
            .args(["init", "--quiet", "--bare"])
            .arg(&repo)
            .status()
            .unwrap();
        assert!(status.success());

        let body = GitCommand::default().advertise_refs(&repo).await.unwrap();
        assert!(body.starts_with(b"001e# service=git-upload-pack\n0000"));
        assert!(body.ends_with(FLUSH_PKT));
    }

    /// Process state from `/proc`, `None` once the pid is gone.
    #[cfg(target_os = "linux")]
    fn process_state(pid: u32) -> Option<char> {
        let stat = std::fs::read_to_string(format!("/proc/{pid}/stat")).ok()?;
        stat.rsplit_once(')')?.1.trim_start().chars().next()
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn slow_transfer_times_out_and_kills_the_child() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let pid_file = dir.path().join("pid");
        let script = dir.path().join("slow-git");
        std::fs::write(
            &script,
            format!("#!/bin/sh\necho $$ > {}\nexec sleep 30\n", pid_file.display()),
        )
        .unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let repo = dir.path().join("repo");
        std::fs::create_dir(&repo).unwrap();

        let started = std::time::Instant::now();
        let err = GitCommand::new(&script)
            .upload_pack(&repo, Bytes::from_static(b"0000"), Duration::from_millis(200))
            .await
            .unwrap_err();
        assert!(matches!(err, GitError::Timeout(t) if t == Duration::from_millis(200)));
        assert!(started.elapsed() < Duration::from_secs(5));

        let pid: u32 = std::fs::read_to_string(&pid_file).unwrap().trim().parse().unwrap();
        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        loop {
            match process_state(pid) {
                None | Some('Z') | Some('X') => break,
                Some(_) if std::time::Instant::now() < deadline => {
                    tokio::time::sleep(Duration::from_millis(20)).await
                }
                Some(state) => panic!("child {pid} still running in state {state}"),
            }
        }
    }
}
