//! Server runtime.
//!
//! # Responsibilities
//! - Own the substitution chain for the process lifetime
//! - Assemble responder, gateway and management API from configuration
//! - Run both listeners side by side until the first terminal event

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use thiserror::Error;
use tokio::net::TcpListener;

use crate::admin::admin_router;
use crate::config::{check_mock_root, load_routes, ConfigError, ServerConfig};
use crate::http::mock_router;
use crate::icap::InterceptionGateway;
use crate::lifecycle::{signals, Shutdown};
use crate::mock::{ExistenceCache, FixtureStore, GitCommand, GitServing, MockResponder};
use crate::net::{bind_tcp, Listener, ListenerError};
use crate::routing::RouteTable;
use crate::substitution::SubstitutionChain;

/// Slack between the git transfer timeout and the mock router's own timeout.
const REQUEST_TIMEOUT_SLACK: Duration = Duration::from_secs(5);

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("interception listener failed: {0}")]
    Icap(#[source] ListenerError),

    #[error("management API listener failed: {0}")]
    Api(#[source] ListenerError),

    #[error("management API server failed: {0}")]
    ApiServe(#[source] std::io::Error),

    #[error("{listener} listener task failed: {message}")]
    Task { listener: &'static str, message: String },
}

/// Fully assembled, not yet listening.
pub struct ServerRuntime {
    config: ServerConfig,
    chain: SubstitutionChain,
    cache: ExistenceCache,
    gateway: InterceptionGateway,
    admin: Router,
}

impl ServerRuntime {
    /// Load routes from the mock root and assemble every component.
    pub fn new(config: ServerConfig) -> Result<Self, RuntimeError> {
        check_mock_root(&config.mock_root)?;
        let routes = load_routes(&config.routes_path())?;
        let git = Arc::new(GitCommand::new(config.git.program.clone()));
        Ok(Self::with_parts(config, routes, git))
    }

    /// Assemble from an already loaded route table and Git Serving collaborator.
    pub fn with_parts(config: ServerConfig, routes: RouteTable, git: Arc<dyn GitServing>) -> Self {
        let chain = SubstitutionChain::with_defaults(config.default_variables.iter().cloned());
        let cache = ExistenceCache::new();
        let fixtures = FixtureStore::new(
            config.mock_root.clone(),
            config.fixtures.extension.clone(),
            cache.clone(),
        );

        let transfer_timeout = Duration::from_secs(config.git.transfer_timeout_secs);
        let responder = Arc::new(MockResponder::new(
            Arc::new(routes),
            fixtures,
            chain.clone(),
            git,
            transfer_timeout,
        ));

        let mock = mock_router(responder.clone(), transfer_timeout + REQUEST_TIMEOUT_SLACK);
        let gateway = InterceptionGateway::new(responder, mock, config.icap.service_tag.clone());
        let admin = admin_router(chain.clone());

        tracing::info!(
            mock_root = %config.mock_root.display(),
            variables = chain.len(),
            "Server runtime assembled"
        );

        Self {
            config,
            chain,
            cache,
            gateway,
            admin,
        }
    }

    pub fn chain(&self) -> &SubstitutionChain {
        &self.chain
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Bind both listeners.
    pub async fn bind(self) -> Result<BoundRuntime, RuntimeError> {
        let icap = Listener::bind(&self.config.icap).await.map_err(RuntimeError::Icap)?;
        let api = bind_tcp(&self.config.api.bind_address)
            .await
            .map_err(RuntimeError::Api)?;

        if let Ok(addr) = api.local_addr() {
            tracing::info!(address = %addr, "Management API listener bound");
        }

        Ok(BoundRuntime {
            icap,
            api,
            gateway: self.gateway,
            admin: self.admin,
            cache: self.cache,
            cache_ttl: Duration::from_secs(self.config.fixtures.cache_ttl_secs),
        })
    }
}

/// Both listeners bound; ready to run.
pub struct BoundRuntime {
    icap: Listener,
    api: TcpListener,
    gateway: InterceptionGateway,
    admin: Router,
    cache: ExistenceCache,
    cache_ttl: Duration,
}

impl BoundRuntime {
    pub fn icap_addr(&self) -> std::io::Result<SocketAddr> {
        self.icap.local_addr()
    }

    pub fn api_addr(&self) -> std::io::Result<SocketAddr> {
        self.api.local_addr()
    }

    /// Run until a listener fails or SIGINT/SIGTERM arrives.
    pub async fn run(self) -> Result<(), RuntimeError> {
        self.run_until(async {
            let signal = signals::termination().await;
            tracing::info!(signal, "Exiting due to OS signal");
        })
        .await
    }

    /// Run until a listener fails or `stop` completes.
    pub async fn run_until<F>(self, stop: F) -> Result<(), RuntimeError>
    where
        F: Future<Output = ()>,
    {
        let shutdown = Shutdown::new();

        if !self.cache_ttl.is_zero() {
            let _expiry = self.cache.spawn_expiry(self.cache_ttl, shutdown.subscribe());
        }

        let mut icap_task = tokio::spawn(self.gateway.run(self.icap, shutdown.subscribe()));
        let api = self.api;
        let admin = self.admin;
        let mut api_task = tokio::spawn(async move { axum::serve(api, admin).await });

        let outcome = tokio::select! {
            joined = &mut icap_task => match joined {
                Ok(Ok(())) => Ok(()),
                Ok(Err(e)) => Err(RuntimeError::Icap(e)),
                Err(e) => Err(RuntimeError::Task { listener: "interception", message: e.to_string() }),
            },
            joined = &mut api_task => match joined {
                Ok(Ok(())) => Ok(()),
                Ok(Err(e)) => Err(RuntimeError::ApiServe(e)),
                Err(e) => Err(RuntimeError::Task { listener: "management API", message: e.to_string() }),
            },
            _ = stop => Ok(()),
        };

        if let Err(e) = &outcome {
            tracing::error!(error = %e, "Exiting due to listener error");
        }

        shutdown.trigger();
        api_task.abort();
        icap_task.abort();
        outcome
    }
}
