//! Backend instance abstraction.
//!
//! # Responsibilities
//! - Represent a single instance of a logical backend
//! - Track in-flight requests (for least connections and capacity limits)
//! - Track health state (Healthy/Unhealthy) with thresholds

use std::ops::Deref;
use std::str::FromStr;
use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};
use std::sync::Arc;

use axum::http::uri::Authority;
use url::Url;

/// Health State enum.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthState {
    Unknown = 0,
    Healthy = 1,
    Unhealthy = 2,
}

impl From<u8> for HealthState {
    fn from(val: u8) -> Self {
        match val {
            1 => HealthState::Healthy,
            2 => HealthState::Unhealthy,
            _ => HealthState::Unknown,
        }
    }
}

/// A backend address that cannot be used.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AddressError {
    #[error("address '{0}' is not a valid host:port")]
    Invalid(String),
    #[error("address '{0}' must not carry a path or query")]
    HasPath(String),
    #[error("address '{0}' must use http")]
    Scheme(String),
}

/// Parse `host:port` (or `http://host:port`) into a URI authority. Port defaults to 80.
pub fn parse_authority(address: &str) -> Result<Authority, AddressError> {
    let address = address.trim();
    let url = if address.contains("://") {
        Url::parse(address)
    } else {
        Url::parse(&format!("http://{address}"))
    }
    .map_err(|_| AddressError::Invalid(address.to_string()))?;

    if url.scheme() != "http" {
        return Err(AddressError::Scheme(address.to_string()));
    }
    if url.path() != "/" || url.query().is_some() {
        return Err(AddressError::HasPath(address.to_string()));
    }
    let host = url
        .host_str()
        .ok_or_else(|| AddressError::Invalid(address.to_string()))?;
    let port = url
        .port_or_known_default()
        .ok_or_else(|| AddressError::Invalid(address.to_string()))?;

    Authority::from_str(&format!("{host}:{port}"))
        .map_err(|_| AddressError::Invalid(address.to_string()))
}

/// A single backend instance.
#[derive(Debug)]
pub struct Backend {
    /// Logical backend name this instance serves.
    pub name: String,
    /// Network authority (`host:port`).
    pub authority: Authority,
    /// Maximum concurrent requests allowed.
    pub max_connections: usize,
    /// Number of currently in-flight requests.
    pub active_connections: AtomicUsize,

    /// Current health state (0=Unknown, 1=Healthy, 2=Unhealthy).
    pub state: AtomicU8,
    pub consecutive_failures: AtomicUsize,
    pub consecutive_successes: AtomicUsize,
}

impl Backend {
    pub fn new(
        name: impl Into<String>,
        address: &str,
        max_connections: usize,
    ) -> Result<Self, AddressError> {
        Ok(Self {
            name: name.into(),
            authority: parse_authority(address)?,
            max_connections,
            active_connections: AtomicUsize::new(0),
            state: AtomicU8::new(HealthState::Unknown as u8),
            consecutive_failures: AtomicUsize::new(0),
            consecutive_successes: AtomicUsize::new(0),
        })
    }

    pub fn active(&self) -> usize {
        self.active_connections.load(Ordering::Relaxed)
    }

    pub fn has_capacity(&self) -> bool {
        self.active() < self.max_connections
    }

    pub fn health(&self) -> HealthState {
        HealthState::from(self.state.load(Ordering::Relaxed))
    }

    /// Healthy or not yet probed.
    pub fn is_healthy(&self) -> bool {
        self.health() != HealthState::Unhealthy
    }

    /// Take a slot if below `max_connections`. The slot is returned when the lease drops.
    pub fn try_lease(self: &Arc<Self>) -> Option<BackendLease> {
        let mut prev = self.active_connections.load(Ordering::Relaxed);
        loop {
            if prev >= self.max_connections {
                return None;
            }
            match self.active_connections.compare_exchange_weak(
                prev,
                prev + 1,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => break,
                Err(x) => prev = x,
            }
        }
        Some(BackendLease {
            backend: self.clone(),
        })
    }

    /// Report a successful request/check.
    pub fn mark_success(&self, healthy_threshold: usize) {
        self.consecutive_failures.store(0, Ordering::Relaxed);
        if self.health() == HealthState::Healthy {
            return;
        }

        let successes = self.consecutive_successes.fetch_add(1, Ordering::Relaxed) + 1;
        if successes >= healthy_threshold {
            let previous = self.state.swap(HealthState::Healthy as u8, Ordering::Relaxed);
            if HealthState::from(previous) == HealthState::Unhealthy {
                tracing::info!(backend = %self.name, address = %self.authority, "Backend recovered");
            }
        }
    }

    /// Report a failed request/check.
    pub fn mark_failure(&self, unhealthy_threshold: usize) {
        self.consecutive_successes.store(0, Ordering::Relaxed);
        if self.health() == HealthState::Unhealthy {
            return;
        }

        let failures = self.consecutive_failures.fetch_add(1, Ordering::Relaxed) + 1;
        if failures >= unhealthy_threshold {
            self.state.store(HealthState::Unhealthy as u8, Ordering::Relaxed);
            tracing::warn!(backend = %self.name, address = %self.authority, failures, "Backend marked unhealthy");
        }
    }
}

/// Holds one in-flight slot on a backend instance.
#[derive(Debug)]
pub struct BackendLease {
    backend: Arc<Backend>,
}

impl Deref for BackendLease {
    type Target = Backend;
    fn deref(&self) -> &Self::Target {
        &self.backend
    }
}

impl Drop for BackendLease {
    fn drop(&mut self) {
        self.backend.active_connections.fetch_sub(1, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_authority() {
        assert_eq!(parse_authority("127.0.0.1:9001").unwrap().as_str(), "127.0.0.1:9001");
        assert_eq!(parse_authority("user-service:8080").unwrap().as_str(), "user-service:8080");
        assert_eq!(parse_authority("http://localhost:3000").unwrap().as_str(), "localhost:3000");
        assert_eq!(parse_authority("localhost").unwrap().as_str(), "localhost:80");
        assert!(matches!(parse_authority("https://x:443"), Err(AddressError::Scheme(_))));
        assert!(matches!(parse_authority("x:80/path"), Err(AddressError::HasPath(_))));
        assert!(parse_authority("not an address").is_err());
    }

    #[test]
    fn test_lease_respects_capacity() {
        let backend = Arc::new(Backend::new("svc", "127.0.0.1:9000", 2).unwrap());
        let a = backend.try_lease().unwrap();
        let _b = backend.try_lease().unwrap();
        assert!(backend.try_lease().is_none());
        drop(a);
        assert_eq!(backend.active(), 1);
        assert!(backend.try_lease().is_some());
    }

    #[test]
    fn test_health_thresholds() {
        let backend = Backend::new("svc", "127.0.0.1:9000", 10).unwrap();
        assert!(backend.is_healthy());

        backend.mark_failure(2);
        assert!(backend.is_healthy());
        backend.mark_failure(2);
        assert_eq!(backend.health(), HealthState::Unhealthy);

        backend.mark_success(2);
        assert!(!backend.is_healthy());
        backend.mark_success(2);
        assert_eq!(backend.health(), HealthState::Healthy);
    }
}
