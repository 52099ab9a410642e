//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create the axum Router with the gateway handler and local endpoints
//! - Wire up middleware (request ID, tracing, timeout)
//! - Bind server to listener
//! - Run the request pipeline: authentication filter, then dispatcher
//! - Swap route tables on configuration reload
//! - Spawn active health monitoring

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    body::Body,
    extract::State,
    http::Request,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde_json::json;
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};
use tower::ServiceBuilder;
use tower_http::{
    request_id::{PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::auth::{AuthenticationFilter, TokenValidator};
use crate::config::GatewayConfig;
use crate::error::GatewayError;
use crate::health::HealthMonitor;
use crate::http::request::{request_id, MakeRequestUuidV4, X_REQUEST_ID};
use crate::lifecycle::{Components, StartupError};
use crate::observability::metrics;
use crate::proxy::Dispatcher;
use crate::routing::RouteTable;

/// Path answered by the gateway itself.
pub const HEALTH_PATH: &str = "/actuator/health";

/// Application state injected into handlers.
#[derive(Debug, Clone)]
pub struct AppState {
    pub filter: Arc<AuthenticationFilter>,
    pub dispatcher: Arc<Dispatcher>,
}

/// HTTP server for the gateway.
pub struct HttpServer {
    router: Router,
    config: GatewayConfig,
    state: AppState,
}

impl HttpServer {
    /// Build the server. Fails on any route, backend or header fault.
    pub fn new(config: GatewayConfig, validator: TokenValidator) -> Result<Self, StartupError> {
        let components = Components::build(&config, validator)?;
        let state = AppState {
            filter: components.filter,
            dispatcher: components.dispatcher,
        };

        let router = Self::build_router(&config, state.clone());
        Ok(Self {
            router,
            config,
            state,
        })
    }

    /// Build the axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(config: &GatewayConfig, state: AppState) -> Router {
        let middleware = ServiceBuilder::new()
            .layer(SetRequestIdLayer::new(X_REQUEST_ID, MakeRequestUuidV4))
            .layer(
                TraceLayer::new_for_http()
                    .make_span_with(|request: &Request<Body>| {
                        tracing::info_span!(
                            "request",
                            method = %request.method(),
                            uri = %request.uri(),
                            request_id = %request_id(request),
                        )
                    })
                    // Rejections are logged once, by `reject`.
                    .on_failure(()),
            )
            .layer(PropagateRequestIdLayer::new(X_REQUEST_ID))
            .layer(TimeoutLayer::new(Duration::from_secs(config.timeouts.request_secs)));

        Router::new()
            .route(HEALTH_PATH, get(health_handler))
            .fallback(gateway_handler)
            .with_state(state)
            .layer(middleware)
    }

    /// Run the server until `shutdown` fires.
    ///
    /// Configurations received on `config_updates` replace the route table.
    pub async fn run(
        self,
        listener: TcpListener,
        mut config_updates: mpsc::UnboundedReceiver<GatewayConfig>,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            routes = self.state.filter.routes().len(),
            "HTTP server starting"
        );

        if self.config.health_check.enabled {
            let monitor = HealthMonitor::new(
                self.state.dispatcher.backends().clone(),
                self.config.health_check.clone(),
            );
            let health_shutdown = shutdown.resubscribe();
            tokio::spawn(async move {
                monitor.run(health_shutdown).await;
            });
        }

        let reload_state = self.state.clone();
        let mut reload_shutdown = shutdown.resubscribe();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    update = config_updates.recv() => match update {
                        Some(config) => apply_routes(&reload_state, &config),
                        None => break,
                    },
                    _ = reload_shutdown.recv() => break,
                }
            }
        });

        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }

    /// Get a reference to the config.
    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }
}

/// Rebuild the route table from `config` and publish it. A faulty table is discarded.
fn apply_routes(state: &AppState, config: &GatewayConfig) {
    let routes = match RouteTable::from_config(&config.routes) {
        Ok(routes) => routes,
        Err(e) => {
            tracing::error!(error = %e, "Rejected reloaded routes, keeping current table");
            return;
        }
    };

    let backends = state.dispatcher.backends();
    for rule in routes.rules() {
        if !backends.contains(&rule.backend) {
            tracing::warn!(pattern = %rule.pattern, backend = %rule.backend, "Reloaded route targets a backend with no instances");
        }
    }

    let count = routes.len();
    state.filter.replace_routes(routes);
    tracing::info!(routes = count, "Route table reloaded");
}

async fn health_handler() -> impl IntoResponse {
    Json(json!({ "status": "UP" }))
}

/// Gateway handler.
/// Resolves the route, authenticates, and forwards to the backend.
async fn gateway_handler(State(state): State<AppState>, request: Request<Body>) -> Response {
    let start = Instant::now();
    let method = request.method().to_string();
    let path = request.uri().path().to_string();
    let request_id = request_id(&request).to_string();

    let admission = match state.filter.apply(request) {
        Ok(admission) => admission,
        Err(e) => return reject(e, &method, &path, &request_id, "none", start),
    };

    tracing::debug!(
        request_id = %request_id,
        backend = %admission.backend,
        policy = admission.policy.as_str(),
        "Request admitted"
    );

    let backend = admission.backend;
    match state.dispatcher.dispatch(&backend, admission.request).await {
        Ok(response) => {
            metrics::record_request(&method, response.status().as_u16(), &backend, start);
            response
        }
        Err(e) => reject(e, &method, &path, &request_id, &backend, start),
    }
}

/// Log, count and render a terminal rejection.
fn reject(
    error: GatewayError,
    method: &str,
    path: &str,
    request_id: &str,
    backend: &str,
    start: Instant,
) -> Response {
    let status = error.status_code();
    let kind = error.kind();
    tracing::error!(
        kind = %kind,
        status = status.as_u16(),
        path = %path,
        request_id = %request_id,
        "{error}"
    );
    metrics::record_rejection(kind);
    metrics::record_request(method, status.as_u16(), backend, start);
    error.into_response()
}
