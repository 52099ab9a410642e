//! Startup orchestration.
//!
//! # Responsibilities
//! - Build every request-path component from a validated configuration
//! - Refuse to start on any fault (bad routes, bad backends, unusable key)
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal, never deferred to request time
//! - Components are built once and passed explicitly, not looked up globally

use std::str::FromStr;
use std::sync::Arc;

use axum::http::HeaderName;

use crate::auth::{AuthenticationFilter, KeyError, TokenValidator};
use crate::config::{ConfigError, GatewayConfig};
use crate::load_balancer::{AddressError, BackendManager};
use crate::proxy::Dispatcher;
use crate::routing::{RouteTable, RouteTableError};

/// Anything that prevents the gateway from starting.
#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error("configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("key material: {0}")]
    Key(#[from] KeyError),
    #[error("routes: {0}")]
    Routes(#[from] RouteTableError),
    #[error("backends: {0}")]
    Backends(#[from] AddressError),
    #[error("identity header '{0}' is not a valid header name")]
    IdentityHeader(String),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

/// The request-path components of a running gateway.
#[derive(Debug, Clone)]
pub struct Components {
    pub filter: Arc<AuthenticationFilter>,
    pub dispatcher: Arc<Dispatcher>,
}

impl Components {
    /// Wire the filter and dispatcher from `config` around an already-built validator.
    pub fn build(config: &GatewayConfig, validator: TokenValidator) -> Result<Self, StartupError> {
        let routes = RouteTable::from_config(&config.routes)?;
        let identity_header = HeaderName::from_str(&config.auth.identity_header)
            .map_err(|_| StartupError::IdentityHeader(config.auth.identity_header.clone()))?;
        let backends = Arc::new(BackendManager::new(
            &config.backends,
            config.load_balancing.strategy,
        )?);

        for rule in routes.rules() {
            if !backends.contains(&rule.backend) {
                tracing::warn!(pattern = %rule.pattern, backend = %rule.backend, "Route targets a backend with no instances");
            }
        }

        let filter = AuthenticationFilter::new(routes, Arc::new(validator), identity_header);
        let dispatcher = Dispatcher::new(backends, &config.timeouts, &config.health_check);

        Ok(Self {
            filter: Arc::new(filter),
            dispatcher: Arc::new(dispatcher),
        })
    }
}
