//! Route lookup and dispatch.
//!
//! # Responsibilities
//! - Store compiled routes in configuration order
//! - Select the single most specific route for a host + path
//! - Report ties at the maximal specificity as an explicit error
//!
//! # Design Decisions
//! - Immutable after construction (thread-safe without locks)
//! - Host comparison is ASCII case-insensitive; ports are stripped by callers
//! - Candidates are filtered by host and kind before specificity is compared
//! - Git routes never bind variables: only the two smart-protocol suffixes match

use percent_encoding::percent_decode_str;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::routing::matcher::{Binding, PathTemplate, PatternError};

/// Suffix of the smart-protocol reference advertisement request.
pub const ADVERTISEMENT_SUFFIX: &str = "/info/refs?service=git-upload-pack";

/// Suffix of the smart-protocol pack transfer request.
pub const TRANSFER_SUFFIX: &str = "/git-upload-pack";

/// What a route serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub enum RouteKind {
    /// Templated fixture file.
    #[serde(rename = "http")]
    Http,
    /// On-disk repository served over the smart transfer protocol.
    #[serde(rename = "git")]
    GitTransfer,
}

impl RouteKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RouteKind::Http => "http",
            RouteKind::GitTransfer => "git",
        }
    }
}

impl RouteKind {
    /// Kind of route a request target addresses: smart-protocol requests are
    /// git, everything else is http.
    pub fn for_request(path_and_query: &str) -> Self {
        match GitPhase::detect(path_and_query) {
            Some(_) => RouteKind::GitTransfer,
            None => RouteKind::Http,
        }
    }
}

impl std::fmt::Display for RouteKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The two request phases of the smart transfer protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GitPhase {
    /// `GET <repo>/info/refs?service=git-upload-pack`
    Advertisement,
    /// `POST <repo>/git-upload-pack`
    Transfer,
}

impl GitPhase {
    pub fn detect(path_and_query: &str) -> Option<Self> {
        let (path, query) = match path_and_query.split_once('?') {
            Some((path, query)) => (path, query),
            None => (path_and_query, ""),
        };

        if path.ends_with("/info/refs") && query == "service=git-upload-pack" {
            Some(GitPhase::Advertisement)
        } else if path.ends_with(TRANSFER_SUFFIX) && query.is_empty() {
            Some(GitPhase::Transfer)
        } else {
            None
        }
    }
}

/// A single mocked route.
#[derive(Debug, Clone)]
pub struct Route {
    host: String,
    template: PathTemplate,
    kind: RouteKind,
}

impl Route {
    pub fn new(host: impl Into<String>, path: &str, kind: RouteKind) -> Result<Self, PatternError> {
        Ok(Self {
            host: host.into(),
            template: PathTemplate::compile(path)?,
            kind,
        })
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn path(&self) -> &str {
        self.template.as_str()
    }

    pub fn template(&self) -> &PathTemplate {
        &self.template
    }

    pub fn kind(&self) -> RouteKind {
        self.kind
    }

    pub fn specificity(&self) -> usize {
        self.template.specificity()
    }

    /// Match a raw path-and-query against this route, ignoring the host.
    fn match_target(&self, path_and_query: &str) -> Option<Vec<Binding>> {
        match self.kind {
            RouteKind::Http => {
                let path = path_and_query.split('?').next().unwrap_or_default();
                self.template.match_path(path)
            }
            RouteKind::GitTransfer => {
                let (path, query) = match path_and_query.split_once('?') {
                    Some((path, query)) => (path, Some(query)),
                    None => (path_and_query, None),
                };
                let mut request = percent_decode_str(path).decode_utf8_lossy().into_owned();
                if let Some(query) = query.filter(|q| !q.is_empty()) {
                    request.push('?');
                    request.push_str(query);
                }

                let base = self.template.as_str();
                let advertisement = format!("{base}{ADVERTISEMENT_SUFFIX}");
                let transfer = format!("{base}{TRANSFER_SUFFIX}");
                (request == advertisement || request == transfer).then(Vec::new)
            }
        }
    }
}

impl PartialEq for Route {
    fn eq(&self, other: &Self) -> bool {
        self.host == other.host && self.path() == other.path() && self.kind == other.kind
    }
}

impl Eq for Route {}

/// Errors raised while selecting a route.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RouteError {
    #[error("multiple routes matched input: {host}{path} ({count} routes at specificity {specificity})")]
    Ambiguous {
        host: String,
        path: String,
        specificity: usize,
        count: usize,
    },
}

/// A selected route together with the bindings extracted from the URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteMatch<'a> {
    pub route: &'a Route,
    pub bindings: Vec<Binding>,
}

/// Ordered, immutable collection of routes.
#[derive(Debug, Clone, Default)]
pub struct RouteTable {
    routes: Vec<Route>,
}

impl RouteTable {
    pub fn new(routes: Vec<Route>) -> Self {
        Self { routes }
    }

    pub fn routes(&self) -> &[Route] {
        &self.routes
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Select the route for a request, considering every kind.
    ///
    /// `path_and_query` is the raw request target (path plus optional query).
    pub fn match_route(&self, host: &str, path_and_query: &str) -> Result<Option<RouteMatch<'_>>, RouteError> {
        self.select(host, path_and_query, |_| true)
    }

    /// Select the route for a request among routes of one kind.
    pub fn match_route_kind(
        &self,
        host: &str,
        path_and_query: &str,
        kind: RouteKind,
    ) -> Result<Option<RouteMatch<'_>>, RouteError> {
        self.select(host, path_and_query, |route| route.kind == kind)
    }

    /// Select the route serving a request.
    ///
    /// Smart-protocol targets are matched against git routes first and fall
    /// back to http routes when no git route claims them. Other targets only
    /// consider http routes.
    pub fn match_request(&self, host: &str, path_and_query: &str) -> Result<Option<RouteMatch<'_>>, RouteError> {
        match RouteKind::for_request(path_and_query) {
            RouteKind::GitTransfer => match self.match_route_kind(host, path_and_query, RouteKind::GitTransfer)? {
                Some(found) => Ok(Some(found)),
                None => self.match_route_kind(host, path_and_query, RouteKind::Http),
            },
            RouteKind::Http => self.match_route_kind(host, path_and_query, RouteKind::Http),
        }
    }

    fn select(
        &self,
        host: &str,
        path_and_query: &str,
        filter: impl Fn(&Route) -> bool,
    ) -> Result<Option<RouteMatch<'_>>, RouteError> {
        let mut best: Option<RouteMatch<'_>> = None;
        let mut tied = 0usize;

        let candidates = self
            .routes
            .iter()
            .filter(|route| route.host.eq_ignore_ascii_case(host))
            .filter(|route| filter(route));

        for route in candidates {
            let Some(bindings) = route.match_target(path_and_query) else {
                continue;
            };

            let specificity = route.specificity();
            let current = best.as_ref().map(|m| m.route.specificity());
            match current {
                Some(current) if specificity < current => {}
                Some(current) if specificity == current => tied += 1,
                _ => {
                    best = Some(RouteMatch { route, bindings });
                    tied = 1;
                }
            }
        }

        match best {
            Some(found) if tied > 1 => Err(RouteError::Ambiguous {
                host: host.to_string(),
                path: path_and_query.to_string(),
                specificity: found.route.specificity(),
                count: tied,
            }),
            best => Ok(best),
        }
    }
}
