//! Shared utilities for integration testing.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use api_gateway::auth::{KeyMaterial, ValidatorOptions};
use api_gateway::config::{BackendConfig, GatewayConfig, RouteConfig};
use api_gateway::{AuthPolicy, HttpServer, Shutdown, TokenValidator};
use axum::{
    http::{HeaderMap, Method, StatusCode, Uri},
    Json, Router,
};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::sync::mpsc;

pub const SECRET: &[u8] = b"integration-test-secret";

/// Start a backend that echoes what it received as JSON.
pub async fn start_echo_backend(name: &'static str) -> SocketAddr {
    let app = Router::new().fallback(move |method: Method, uri: Uri, headers: HeaderMap, body: String| async move {
        let header = |key: &str| {
            headers
                .get(key)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        };
        Json(json!({
            "backend": name,
            "method": method.as_str(),
            "path": uri.path(),
            "query": uri.query(),
            "user_id": header("x-user-id"),
            "authorization": header("authorization"),
            "request_id": header("x-request-id"),
            "forwarded_for": header("x-forwarded-for"),
            "forwarded_host": header("x-forwarded-host"),
            "body_len": body.len(),
        }))
    });
    serve(app).await
}

/// Start a backend that answers every request with `status`.
pub async fn start_status_backend(status: StatusCode) -> SocketAddr {
    let app = Router::new().fallback(move || async move { (status, "backend says no") });
    serve(app).await
}

/// Start a backend that answers 503 for the first `failures` requests and 200 after.
/// Returns the address and a counter of requests received.
pub async fn start_flaky_backend(failures: usize) -> (SocketAddr, Arc<AtomicUsize>) {
    let hits = Arc::new(AtomicUsize::new(0));
    let counter = hits.clone();
    let app = Router::new().fallback(move || {
        let counter = counter.clone();
        async move {
            if counter.fetch_add(1, Ordering::SeqCst) < failures {
                (StatusCode::SERVICE_UNAVAILABLE, "warming up")
            } else {
                (StatusCode::OK, "ready")
            }
        }
    });
    (serve(app).await, hits)
}

async fn serve(app: Router) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    addr
}

/// An address with nothing listening on it.
pub fn closed_addr() -> SocketAddr {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap()
}

pub fn route(path: &str, backend: &str, auth: AuthPolicy) -> RouteConfig {
    RouteConfig {
        path: path.to_string(),
        backend: backend.to_string(),
        auth,
    }
}

pub fn backend(name: &str, addr: SocketAddr) -> BackendConfig {
    BackendConfig {
        name: name.to_string(),
        address: addr.to_string(),
        max_connections: 100,
    }
}

/// Config with the auth (public) and users (protected) routes.
pub fn gateway_config(auth_addr: SocketAddr, user_addrs: &[SocketAddr]) -> GatewayConfig {
    let mut config = GatewayConfig::default();
    config.listener.bind_address = "127.0.0.1:0".to_string();
    config.routes = vec![
        route("/api/v1/auth/**", "auth-service", AuthPolicy::Public),
        route("/api/v1/users/**", "user-service", AuthPolicy::Protected),
    ];
    config.backends.push(backend("auth-service", auth_addr));
    for addr in user_addrs {
        config.backends.push(backend("user-service", *addr));
    }
    config.health_check.enabled = false;
    config.timeouts.request_secs = 5;
    config
}

/// A running gateway. Shuts down when dropped.
pub struct TestGateway {
    pub addr: SocketAddr,
    pub config_updates: mpsc::UnboundedSender<GatewayConfig>,
    shutdown: Shutdown,
}

impl TestGateway {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }
}

impl Drop for TestGateway {
    fn drop(&mut self) {
        self.shutdown.trigger();
    }
}

pub async fn start_gateway(config: GatewayConfig) -> TestGateway {
    let validator = TokenValidator::new(
        Algorithm::HS256,
        &KeyMaterial::from_secret(SECRET),
        ValidatorOptions::from(&config.auth),
    )
    .unwrap();

    let server = HttpServer::new(config, validator).unwrap();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let shutdown = Shutdown::new();
    let (config_updates, updates_rx) = mpsc::unbounded_channel();
    let server_shutdown = shutdown.subscribe();
    tokio::spawn(async move {
        let _ = server.run(listener, updates_rx, server_shutdown).await;
    });

    TestGateway {
        addr,
        config_updates,
        shutdown,
    }
}

pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .no_proxy()
        .timeout(Duration::from_secs(10))
        .build()
        .unwrap()
}

/// Mint an HS256 token for `sub` that expires `ttl_secs` from now (negative for the past).
pub fn mint_token(sub: &str, ttl_secs: i64) -> String {
    mint_token_with(sub, ttl_secs, SECRET)
}

pub fn mint_token_with(sub: &str, ttl_secs: i64, secret: &[u8]) -> String {
    let now = jsonwebtoken::get_current_timestamp() as i64;
    let claims = json!({ "sub": sub, "iat": now, "exp": now + ttl_secs });
    jsonwebtoken::encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(secret),
    )
    .unwrap()
}

pub async fn json_body(response: reqwest::Response) -> Value {
    response.json().await.unwrap()
}
