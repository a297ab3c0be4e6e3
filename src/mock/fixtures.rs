//! Fixture resolution and the existence cache.
//!
//! # Responsibilities
//! - Map a route to its fixture file or on-disk repository
//! - Answer "does a mock target exist?" without re-probing the filesystem
//! - Read fixture text for rendering
//!
//! # Layout
//! ```text
//! <root>/<host>/<route path>.<ext>      http routes
//! <root>/<host>/index.<ext>             http routes at the site root
//! <root>/git/<host>/<route path>/.git   git routes
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::error::MockError;
use crate::routing::{Route, RouteKind};

/// Concurrent cache of path → exists.
///
/// Entries are never refreshed individually; the whole map is cleared on a
/// fixed interval by [`ExistenceCache::spawn_expiry`].
#[derive(Debug, Clone, Default)]
pub struct ExistenceCache {
    hits: Arc<DashMap<PathBuf, bool>>,
}

impl ExistenceCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Check whether `path` exists, probing the filesystem on a miss.
    pub async fn exists(&self, path: &Path) -> bool {
        if let Some(hit) = self.hits.get(path).map(|entry| *entry) {
            return hit;
        }

        let exists = tokio::fs::try_exists(path).await.unwrap_or(false);
        self.hits.insert(path.to_path_buf(), exists);
        exists
    }

    /// Cached answer for `path`, if any.
    pub fn cached(&self, path: &Path) -> Option<bool> {
        self.hits.get(path).map(|entry| *entry)
    }

    pub fn clear(&self) {
        self.hits.clear();
    }

    pub fn len(&self) -> usize {
        self.hits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }

    /// Clear the cache every `ttl` until `shutdown` fires.
    pub fn spawn_expiry(&self, ttl: Duration, mut shutdown: broadcast::Receiver<()>) -> JoinHandle<()> {
        let cache = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(ttl);
            // The first tick completes immediately.
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        tracing::trace!(entries = cache.len(), "Clearing fixture existence cache");
                        cache.clear();
                    }
                    _ = shutdown.recv() => break,
                }
            }
        })
    }
}

/// Resolves routes to files under the mock root.
#[derive(Debug, Clone)]
pub struct FixtureStore {
    root: PathBuf,
    extension: String,
    cache: ExistenceCache,
}

impl FixtureStore {
    pub fn new(root: impl Into<PathBuf>, extension: impl Into<String>, cache: ExistenceCache) -> Self {
        Self {
            root: root.into(),
            extension: extension.into(),
            cache,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn cache(&self) -> &ExistenceCache {
        &self.cache
    }

    /// Fixture key relative to the root, e.g. `example.com/users/:name.fixture`.
    pub fn fixture_key(&self, route: &Route) -> String {
        if route.template().is_root() {
            return format!("{}/index.{}", route.host(), self.extension);
        }
        let path = route.path().trim_start_matches('/');
        format!("{}/{}.{}", route.host(), path, self.extension)
    }

    pub fn fixture_path(&self, route: &Route) -> PathBuf {
        self.root.join(self.fixture_key(route))
    }

    pub fn repository_path(&self, route: &Route) -> PathBuf {
        self.root
            .join("git")
            .join(route.host())
            .join(route.path().trim_start_matches('/'))
            .join(".git")
    }

    /// The file or directory that backs `route`.
    pub fn target_path(&self, route: &Route) -> PathBuf {
        match route.kind() {
            RouteKind::Http => self.fixture_path(route),
            RouteKind::GitTransfer => self.repository_path(route),
        }
    }

    pub async fn target_exists(&self, route: &Route) -> bool {
        self.cache.exists(&self.target_path(route)).await
    }

    /// Read the fixture text for an http route.
    pub async fn read_fixture(&self, route: &Route) -> Result<String, MockError> {
        let path = self.fixture_path(route);
        let bytes = tokio::fs::read(&path)
            .await
            .map_err(|source| MockError::FixtureNotFound { path: path.clone(), source })?;

        String::from_utf8(bytes)
            .map_err(|_| MockError::Internal(format!("mock file {} is not valid UTF-8", path.display())))
    }
}
