//! Request dispatch to backends.
//!
//! # Responsibilities
//! - Resolve a backend name to a live instance via the backend pool
//! - Rewrite the request for the instance and forward it
//! - Relay the backend response (status, headers, body) to the caller
//! - Feed passive health state when health checking is enabled
//!
//! # Design Decisions
//! - Bodies stream in both directions; nothing is buffered here
//! - No retries: one attempt per request
//! - Dropping the returned future aborts the upstream exchange and releases the lease
//! - No instance available → 503; transport failure after selection → 502
//! - Passive marking only runs alongside the active monitor, the only path back to healthy

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    extract::ConnectInfo,
    http::{
        header::HOST,
        uri::{Authority, PathAndQuery, Scheme},
        Request, Response, StatusCode, Uri, Version,
    },
};
use hyper::body::Incoming;
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};

use crate::config::{HealthCheckConfig, TimeoutConfig};
use crate::error::GatewayError;
use crate::load_balancer::{Backend, BackendManager};
use crate::proxy::headers;

/// Forwards admitted requests to backend instances.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    backends: Arc<BackendManager>,
    client: Client<HttpConnector, Body>,
    passive_health: bool,
    healthy_threshold: usize,
    unhealthy_threshold: usize,
}

impl Dispatcher {
    pub fn new(backends: Arc<BackendManager>, timeouts: &TimeoutConfig, health: &HealthCheckConfig) -> Self {
        let mut connector = HttpConnector::new();
        connector.set_connect_timeout(Some(Duration::from_secs(timeouts.connect_secs)));
        let client = Client::builder(TokioExecutor::new()).build(connector);

        Self {
            backends,
            client,
            passive_health: health.enabled,
            healthy_threshold: health.healthy_threshold as usize,
            unhealthy_threshold: health.unhealthy_threshold as usize,
        }
    }

    pub fn backends(&self) -> &Arc<BackendManager> {
        &self.backends
    }

    /// Forward `request` to an instance of `backend` and return its response.
    pub async fn dispatch(&self, backend: &str, request: Request<Body>) -> Result<Response<Body>, GatewayError> {
        let lease = self
            .backends
            .get(backend)
            .ok_or(GatewayError::BackendUnavailable)?;

        let upstream = upstream_request(request, &lease.authority)?;

        tracing::debug!(
            backend = %backend,
            address = %lease.authority,
            uri = %upstream.uri(),
            "Forwarding request"
        );

        match self.client.request(upstream).await {
            Ok(response) => {
                match response.status() {
                    StatusCode::BAD_GATEWAY
                    | StatusCode::SERVICE_UNAVAILABLE
                    | StatusCode::GATEWAY_TIMEOUT => self.record_failure(&lease),
                    _ => self.record_success(&lease),
                }
                Ok(relay(response))
            }
            Err(e) => {
                tracing::warn!(backend = %backend, address = %lease.authority, error = %e, "Upstream error");
                self.record_failure(&lease);
                Err(GatewayError::UpstreamFailed)
            }
        }
    }

    fn record_success(&self, backend: &Backend) {
        if self.passive_health {
            backend.mark_success(self.healthy_threshold);
        }
    }

    fn record_failure(&self, backend: &Backend) {
        if self.passive_health {
            backend.mark_failure(self.unhealthy_threshold);
        }
    }
}

/// Hand the backend's status, headers and body stream to the caller.
fn relay(response: Response<Incoming>) -> Response<Body> {
    let (parts, body) = response.into_parts();
    Response::from_parts(parts, Body::new(body))
}

/// Rewrite an inbound request for `authority`.
fn upstream_request(request: Request<Body>, authority: &Authority) -> Result<Request<Body>, GatewayError> {
    let (mut parts, body) = request.into_parts();

    let client_ip = parts
        .extensions
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip());
    let original_host = parts.headers.remove(HOST);
    headers::strip_hop_by_hop(&mut parts.headers);
    headers::append_forwarded(&mut parts.headers, client_ip, original_host);

    let path_and_query = parts
        .uri
        .path_and_query()
        .cloned()
        .unwrap_or_else(|| PathAndQuery::from_static("/"));
    parts.uri = Uri::builder()
        .scheme(Scheme::HTTP)
        .authority(authority.clone())
        .path_and_query(path_and_query)
        .build()
        .map_err(|e| {
            tracing::error!(error = %e, "Failed to build upstream URI");
            GatewayError::UpstreamFailed
        })?;
    // Upstream connections are HTTP/1.1 regardless of the inbound protocol.
    parts.version = Version::HTTP_11;

    Ok(Request::from_parts(parts, body))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BackendConfig, Strategy};
    use std::str::FromStr;

    #[test]
    fn test_upstream_request_rewrite() {
        let mut request = Request::builder()
            .uri("/api/v1/users/42?expand=true")
            .version(Version::HTTP_2)
            .header(HOST, "gateway.local")
            .header("x-user-id", "alice")
            .body(Body::empty())
            .unwrap();
        request
            .extensions_mut()
            .insert(ConnectInfo(SocketAddr::from(([10, 1, 2, 3], 5555))));

        let authority = Authority::from_str("127.0.0.1:9001").unwrap();
        let upstream = upstream_request(request, &authority).unwrap();

        assert_eq!(upstream.uri().to_string(), "http://127.0.0.1:9001/api/v1/users/42?expand=true");
        assert_eq!(upstream.version(), Version::HTTP_11);
        assert!(upstream.headers().get(HOST).is_none());
        assert_eq!(upstream.headers().get("x-forwarded-host").unwrap(), "gateway.local");
        assert_eq!(upstream.headers().get("x-forwarded-for").unwrap(), "10.1.2.3");
        assert_eq!(upstream.headers().get("x-user-id").unwrap(), "alice");
    }

    #[tokio::test]
    async fn test_unknown_backend_is_unavailable() {
        let backends = Arc::new(BackendManager::new(&[], Strategy::RoundRobin).unwrap());
        let dispatcher = Dispatcher::new(backends, &TimeoutConfig::default(), &HealthCheckConfig::default());
        let request = Request::builder().uri("/x").body(Body::empty()).unwrap();

        let Err(err) = dispatcher.dispatch("user-service", request).await else {
            panic!("dispatch should fail");
        };
        assert_eq!(err, GatewayError::BackendUnavailable);
    }

    #[tokio::test]
    async fn test_refused_connection_is_upstream_failure() {
        // Bind then drop to obtain a port with nothing listening.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let backends = Arc::new(
            BackendManager::new(
                &[BackendConfig {
                    name: "user-service".into(),
                    address: addr.to_string(),
                    max_connections: 4,
                }],
                Strategy::RoundRobin,
            )
            .unwrap(),
        );
        let dispatcher = Dispatcher::new(backends.clone(), &TimeoutConfig::default(), &HealthCheckConfig::default());
        let request = Request::builder().uri("/x").body(Body::empty()).unwrap();

        let Err(err) = dispatcher.dispatch("user-service", request).await else {
            panic!("dispatch should fail");
        };
        assert_eq!(err, GatewayError::UpstreamFailed);
        // Lease released after the failed attempt.
        assert_eq!(backends.all_backends()[0].active(), 0);
    }

    async fn refused_backend() -> Arc<BackendManager> {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        Arc::new(
            BackendManager::new(
                &[BackendConfig {
                    name: "user-service".into(),
                    address: addr.to_string(),
                    max_connections: 4,
                }],
                Strategy::RoundRobin,
            )
            .unwrap(),
        )
    }

    #[tokio::test]
    async fn test_failures_do_not_evict_without_health_checks() {
        let backends = refused_backend().await;
        let health = HealthCheckConfig {
            enabled: false,
            unhealthy_threshold: 1,
            ..Default::default()
        };
        let dispatcher = Dispatcher::new(backends.clone(), &TimeoutConfig::default(), &health);

        for _ in 0..3 {
            let request = Request::builder().uri("/x").body(Body::empty()).unwrap();
            let Err(err) = dispatcher.dispatch("user-service", request).await else {
                panic!("dispatch should fail");
            };
            assert_eq!(err, GatewayError::UpstreamFailed);
        }
        assert!(backends.all_backends()[0].is_healthy());
    }

    #[tokio::test]
    async fn test_failures_evict_with_health_checks() {
        let backends = refused_backend().await;
        let health = HealthCheckConfig {
            enabled: true,
            unhealthy_threshold: 1,
            ..Default::default()
        };
        let dispatcher = Dispatcher::new(backends.clone(), &TimeoutConfig::default(), &health);

        let request = Request::builder().uri("/x").body(Body::empty()).unwrap();
        let _ = dispatcher.dispatch("user-service", request).await;
        assert!(!backends.all_backends()[0].is_healthy());

        let request = Request::builder().uri("/x").body(Body::empty()).unwrap();
        let Err(err) = dispatcher.dispatch("user-service", request).await else {
            panic!("dispatch should fail");
        };
        assert_eq!(err, GatewayError::BackendUnavailable);
    }
}
