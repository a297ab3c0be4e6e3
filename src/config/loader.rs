//! Configuration loading from disk.

use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::config::schema::{RouteFile, ServerConfig};
use crate::config::validation::{validate_config, ValidationError};
use crate::routing::{PatternError, Route, RouteTable};

/// Error type for configuration loading. Always fatal at startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("validation failed: {}", join(.0))]
    Validation(Vec<ValidationError>),

    #[error("mock root {} is not a readable directory", .0.display())]
    MockRoot(PathBuf),

    #[error("route {index} ({host}{path}): {source}")]
    Route {
        index: usize,
        host: String,
        path: String,
        source: PatternError,
    },
}

fn join(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Load and validate server configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<ServerConfig, ConfigError> {
    let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let config: ServerConfig = toml::from_str(&content).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })?;

    validate_config(&config).map_err(ConfigError::Validation)?;

    Ok(config)
}

/// Check that the mock root is an existing directory.
pub fn check_mock_root(root: &Path) -> Result<(), ConfigError> {
    match fs::metadata(root) {
        Ok(meta) if meta.is_dir() => Ok(()),
        _ => Err(ConfigError::MockRoot(root.to_path_buf())),
    }
}

/// Parse a route file body into a route table, keeping declaration order.
pub fn parse_routes(content: &str, path: &Path) -> Result<RouteTable, ConfigError> {
    let file: RouteFile = toml::from_str(content).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })?;

    let routes = file
        .routes
        .into_iter()
        .enumerate()
        .map(|(index, def)| {
            Route::new(def.host.clone(), &def.path, def.kind).map_err(|source| ConfigError::Route {
                index,
                host: def.host,
                path: def.path,
                source,
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(RouteTable::new(routes))
}

/// Load the route table from `path`.
pub fn load_routes(path: &Path) -> Result<RouteTable, ConfigError> {
    let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let table = parse_routes(&content, path)?;

    tracing::info!(path = %path.display(), routes = table.len(), "Routes loaded");
    Ok(table)
}
