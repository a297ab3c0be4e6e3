//! Configuration schema definitions.
//!
//! This module defines the server configuration and the route file format.
//! All types derive Serde traits for deserialization from TOML.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::routing::RouteKind;
use crate::substitution::Substitution;

/// Root configuration for the mock proxy.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Directory holding `routes.toml`, fixtures and git repositories.
    pub mock_root: PathBuf,

    /// Interception listener settings.
    pub icap: IcapConfig,

    /// Management API listener settings.
    pub api: ApiConfig,

    /// Fixture naming and existence cache.
    pub fixtures: FixtureConfig,

    /// Git Serving collaborator settings.
    pub git: GitConfig,

    /// Substitutions registered at startup, in order.
    pub default_variables: Vec<Substitution>,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            mock_root: PathBuf::from("/mocks"),
            icap: IcapConfig::default(),
            api: ApiConfig::default(),
            fixtures: FixtureConfig::default(),
            git: GitConfig::default(),
            default_variables: Vec::new(),
            observability: ObservabilityConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Location of the route file under the mock root.
    pub fn routes_path(&self) -> PathBuf {
        self.mock_root.join(ROUTES_FILE)
    }
}

/// File name of the route configuration inside the mock root.
pub const ROUTES_FILE: &str = "routes.toml";

/// Interception listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct IcapConfig {
    /// Bind address (e.g., "0.0.0.0:11344").
    pub bind_address: String,

    /// Maximum concurrent connections (backpressure).
    pub max_connections: usize,

    /// Value of the `ISTag` header on every response.
    pub service_tag: String,
}

impl Default for IcapConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:11344".to_string(),
            max_connections: 1024,
            service_tag: "vcs-mock-proxy".to_string(),
        }
    }
}

/// Management API configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ApiConfig {
    pub bind_address: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:80".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct FixtureConfig {
    /// Extension appended to fixture paths, without the dot.
    pub extension: String,

    /// Interval at which the existence cache is cleared. 0 disables expiry.
    pub cache_ttl_secs: u64,
}

impl Default for FixtureConfig {
    fn default() -> Self {
        Self {
            extension: "fixture".to_string(),
            cache_ttl_secs: 60,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct GitConfig {
    /// Executable used for `upload-pack`.
    pub program: PathBuf,

    /// Upper bound on one transfer-phase exchange.
    pub transfer_timeout_secs: u64,
}

impl Default for GitConfig {
    fn default() -> Self {
        Self {
            program: PathBuf::from("git"),
            transfer_timeout_secs: 30,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level used when `RUST_LOG` is unset.
    pub log_level: String,

    /// Prometheus scrape address; no exporter when unset.
    pub metrics_address: Option<String>,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_address: None,
        }
    }
}

/// Contents of `routes.toml`.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RouteFile {
    #[serde(default, rename = "route")]
    pub routes: Vec<RouteDefinition>,
}

/// One `[[route]]` block.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RouteDefinition {
    pub host: String,

    /// Path template; may embed `:name` placeholder segments.
    #[serde(default)]
    pub path: String,

    #[serde(rename = "type")]
    pub kind: RouteKind,
}
