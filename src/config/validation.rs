//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Check referential integrity (routes reference declared backends)
//! - Validate value ranges (timeouts > 0, thresholds > 0)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: GatewayConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::collections::HashSet;
use std::net::SocketAddr;
use std::str::FromStr;

use axum::http::HeaderName;
use jsonwebtoken::Algorithm;

use crate::config::schema::GatewayConfig;
use crate::load_balancer::backend::parse_authority;
use crate::routing::PathPattern;

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("listener.bind_address '{0}' is not a socket address")]
    BindAddress(String),
    #[error("observability.metrics_address '{0}' is not a socket address")]
    MetricsAddress(String),
    #[error("routes[{index}]: {reason}")]
    Route { index: usize, reason: String },
    #[error("routes[{index}]: backend '{backend}' has no declared instance")]
    UnknownBackend { index: usize, backend: String },
    #[error("backends[{index}]: {reason}")]
    Backend { index: usize, reason: String },
    #[error("auth.algorithm '{0}' is not supported")]
    Algorithm(String),
    #[error("auth.identity_header '{0}' is not a valid header name")]
    IdentityHeader(String),
    #[error("{0} must be greater than zero")]
    Zero(&'static str),
}

/// Validate a configuration, collecting every problem found.
pub fn validate_config(config: &GatewayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if SocketAddr::from_str(&config.listener.bind_address).is_err() {
        errors.push(ValidationError::BindAddress(config.listener.bind_address.clone()));
    }
    if config.observability.metrics_enabled
        && SocketAddr::from_str(&config.observability.metrics_address).is_err()
    {
        errors.push(ValidationError::MetricsAddress(
            config.observability.metrics_address.clone(),
        ));
    }

    let mut declared = HashSet::new();
    for (index, backend) in config.backends.iter().enumerate() {
        if backend.name.trim().is_empty() {
            errors.push(ValidationError::Backend {
                index,
                reason: "name is empty".into(),
            });
        }
        if let Err(e) = parse_authority(&backend.address) {
            errors.push(ValidationError::Backend {
                index,
                reason: e.to_string(),
            });
        }
        if backend.max_connections == 0 {
            errors.push(ValidationError::Backend {
                index,
                reason: "max_connections must be greater than zero".into(),
            });
        }
        declared.insert(backend.name.as_str());
    }

    for (index, route) in config.routes.iter().enumerate() {
        if let Err(e) = PathPattern::parse(&route.path) {
            errors.push(ValidationError::Route {
                index,
                reason: e.to_string(),
            });
        }
        if route.backend.trim().is_empty() {
            errors.push(ValidationError::Route {
                index,
                reason: "backend is empty".into(),
            });
        } else if !declared.contains(route.backend.as_str()) {
            errors.push(ValidationError::UnknownBackend {
                index,
                backend: route.backend.clone(),
            });
        }
    }

    if Algorithm::from_str(&config.auth.algorithm).is_err() {
        errors.push(ValidationError::Algorithm(config.auth.algorithm.clone()));
    }
    if HeaderName::from_str(&config.auth.identity_header).is_err() {
        errors.push(ValidationError::IdentityHeader(config.auth.identity_header.clone()));
    }

    if config.timeouts.connect_secs == 0 {
        errors.push(ValidationError::Zero("timeouts.connect_secs"));
    }
    if config.timeouts.request_secs == 0 {
        errors.push(ValidationError::Zero("timeouts.request_secs"));
    }
    if config.health_check.enabled {
        if config.health_check.interval_secs == 0 {
            errors.push(ValidationError::Zero("health_check.interval_secs"));
        }
        if config.health_check.timeout_secs == 0 {
            errors.push(ValidationError::Zero("health_check.timeout_secs"));
        }
        if config.health_check.unhealthy_threshold == 0 {
            errors.push(ValidationError::Zero("health_check.unhealthy_threshold"));
        }
        if config.health_check.healthy_threshold == 0 {
            errors.push(ValidationError::Zero("health_check.healthy_threshold"));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
