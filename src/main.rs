//! VCS mock proxy.
//!
//! # Architecture Overview
//!
//! ```text
//!                       ┌──────────────────────────────────────────────────┐
//!                       │                 VCS MOCK PROXY                   │
//!   Proxy (ICAP)        │  ┌─────────┐    ┌──────────────┐                 │
//!   ────────────────────┼─▶│   net   │───▶│     icap     │── 204 ──────────┼──▶ pass through
//!                       │  │listener │    │   gateway    │                 │
//!                       │  └─────────┘    └──────┬───────┘                 │
//!                       │                        │ serve locally           │
//!                       │                        ▼                         │
//!                       │  ┌──────────┐   ┌──────────────┐   ┌──────────┐  │
//!                       │  │ routing  │◀──│     http     │──▶│   mock   │  │
//!                       │  │  table   │   │ mock router  │   │responder │  │
//!                       │  └──────────┘   └──────────────┘   └────┬─────┘  │
//!                       │                                         │        │
//!                       │           fixtures + substitution ◀─────┤        │
//!                       │           git upload-pack        ◀──────┘        │
//!                       │                                                  │
//!   Management API      │  ┌──────────┐    ┌──────────────┐                │
//!   ────────────────────┼─▶│  admin   │───▶│ substitution │                │
//!                       │  └──────────┘    │    chain     │                │
//!                       │                  └──────────────┘                │
//!                       └──────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;

use clap::Parser;

use vcs_mock_proxy::config::{load_config, validation::validate_config, ConfigError, ServerConfig};
use vcs_mock_proxy::observability::{logging, metrics};
use vcs_mock_proxy::{ServerRuntime, Substitution};

#[derive(Parser, Debug)]
#[command(name = "vcs-mock-proxy", version, about = "ICAP mock proxy for VCS client testing")]
struct Args {
    /// Optional TOML server configuration.
    #[arg(long, env = "MOCK_PROXY_CONFIG")]
    config: Option<PathBuf>,

    /// Directory holding routes.toml, fixtures and git repositories.
    #[arg(long, env = "MOCK_ROOT")]
    mock_root: Option<PathBuf>,

    #[arg(long, env = "API_PORT")]
    api_port: Option<u16>,

    #[arg(long, env = "ICAP_PORT")]
    icap_port: Option<u16>,

    #[arg(long, env = "LOG_LEVEL")]
    log_level: Option<String>,

    /// Default substitution variable as key=value; repeatable.
    #[arg(long = "var", value_parser = parse_variable)]
    vars: Vec<Substitution>,
}

impl Args {
    /// Layer command-line values over `config`.
    fn apply(self, config: &mut ServerConfig) {
        if let Some(root) = self.mock_root {
            config.mock_root = root;
        }
        if let Some(port) = self.api_port {
            config.api.bind_address = with_port(&config.api.bind_address, port);
        }
        if let Some(port) = self.icap_port {
            config.icap.bind_address = with_port(&config.icap.bind_address, port);
        }
        if let Some(level) = self.log_level {
            config.observability.log_level = level;
        }
        config.default_variables.extend(self.vars);
    }
}

fn with_port(address: &str, port: u16) -> String {
    match address.parse::<std::net::SocketAddr>() {
        Ok(mut addr) => {
            addr.set_port(port);
            addr.to_string()
        }
        Err(_) => format!("0.0.0.0:{port}"),
    }
}

fn parse_variable(raw: &str) -> Result<Substitution, String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok(Substitution::new(key, value)),
        _ => Err(format!("expected key=value, got {raw:?}")),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => load_config(path)?,
        None => ServerConfig::default(),
    };
    args.apply(&mut config);
    validate_config(&config).map_err(ConfigError::Validation)?;

    logging::init(&config.observability.log_level);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "vcs-mock-proxy starting");

    tracing::info!(
        mock_root = %config.mock_root.display(),
        icap_address = %config.icap.bind_address,
        api_address = %config.api.bind_address,
        "Configuration loaded"
    );

    if let Some(address) = &config.observability.metrics_address {
        match address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(e) => tracing::error!(metrics_address = %address, error = %e, "Failed to parse metrics address"),
        }
    }

    let runtime = ServerRuntime::new(config)?;
    runtime.bind().await?.run().await?;

    tracing::info!("Shutdown complete");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_values_override_the_file() {
        let args = Args::parse_from([
            "vcs-mock-proxy",
            "--mock-root",
            "/tmp/mocks",
            "--api-port",
            "8080",
            "--var",
            "name=Davenport",
        ]);
        let mut config = ServerConfig::default();
        args.apply(&mut config);

        assert_eq!(config.mock_root, PathBuf::from("/tmp/mocks"));
        assert_eq!(config.api.bind_address, "0.0.0.0:8080");
        assert_eq!(config.icap.bind_address, "0.0.0.0:11344");
        assert_eq!(config.default_variables, vec![Substitution::new("name", "Davenport")]);
    }

    #[test]
    fn variables_need_a_key() {
        assert_eq!(parse_variable("a=b=c").unwrap(), Substitution::new("a", "b=c"));
        assert!(parse_variable("=x").is_err());
        assert!(parse_variable("novalue").is_err());
    }
}
