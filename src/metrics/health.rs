//! Health check, metrics and estimate endpoints
//!
//! This module provides the HTTP surface of the spades-room service using
//! Axum: liveness and readiness checks, Prometheus metrics, and a
//! wait time estimate lookup.

use crate::metrics::collector::MetricsCollector;
use crate::types::GameType;
use crate::wait_time::WaitTimeProvider;
use anyhow::{Context, Result};
use axum::{
    extract::{Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use prometheus::{Encoder, TextEncoder};
use serde::Deserialize;
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

/// Health server configuration
#[derive(Debug, Clone)]
pub struct HealthServerConfig {
    /// Port to bind the server to
    pub port: u16,
    /// Host to bind to (typically "0.0.0.0" for all interfaces)
    pub host: String,
}

impl Default for HealthServerConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            host: "0.0.0.0".to_string(),
        }
    }
}

/// Shared state for the health server
#[derive(Clone)]
pub struct HealthServerState {
    pub metrics_collector: Arc<MetricsCollector>,
    pub estimator: Option<Arc<WaitTimeProvider>>,
}

/// HTTP server for monitoring and estimates
pub struct HealthServer {
    config: HealthServerConfig,
    state: HealthServerState,
    shutdown_tx: broadcast::Sender<()>,
}

impl HealthServer {
    /// Create a new health server
    pub fn new(config: HealthServerConfig, metrics_collector: Arc<MetricsCollector>) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);

        Self {
            config,
            state: HealthServerState {
                metrics_collector,
                estimator: None,
            },
            shutdown_tx,
        }
    }

    /// Serve estimates from `estimator`
    pub fn with_estimator(mut self, estimator: Arc<WaitTimeProvider>) -> Self {
        self.state.estimator = Some(estimator);
        self
    }

    /// Start the server; returns once it has shut down
    pub async fn start(&self) -> Result<()> {
        let addr: SocketAddr = format!("{}:{}", self.config.host, self.config.port)
            .parse()
            .context("Invalid health server address")?;

        let app = self.router();
        let listener = TcpListener::bind(addr).await?;

        info!("Health server listening on http://{}", addr);

        let mut shutdown_rx = self.shutdown_tx.subscribe();

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.recv().await;
                info!("Health server shutdown signal received");
            })
            .await?;

        info!("Health server stopped");
        Ok(())
    }

    /// The Axum router with every endpoint
    pub fn router(&self) -> Router {
        Router::new()
            .route("/", get(root_handler))
            .route("/health", get(health_handler))
            .route("/ready", get(ready_handler))
            .route("/metrics", get(metrics_handler))
            .route("/estimate", get(estimate_handler))
            .with_state(self.state.clone())
    }

    /// Stop the server
    pub fn stop(&self) {
        info!("Stopping health server...");

        if let Err(e) = self.shutdown_tx.send(()) {
            warn!("Failed to send shutdown signal to health server: {}", e);
        }
    }
}

async fn root_handler() -> impl IntoResponse {
    Json(json!({
        "service": "spades-room",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": ["/health", "/ready", "/metrics", "/estimate"]
    }))
}

async fn health_handler() -> impl IntoResponse {
    debug!("Health check requested");

    Json(json!({
        "status": "healthy",
        "service": "spades-room",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// Ready once an estimator is attached
async fn ready_handler(State(state): State<HealthServerState>) -> impl IntoResponse {
    debug!("Readiness check requested");

    match state.estimator {
        Some(_) => (StatusCode::OK, "Ready"),
        None => (StatusCode::SERVICE_UNAVAILABLE, "Estimator not initialized"),
    }
}

async fn metrics_handler(State(state): State<HealthServerState>) -> Response {
    debug!("Metrics endpoint requested");

    let encoder = TextEncoder::new();
    match state.metrics_collector.encode() {
        Ok(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, encoder.format_type().to_string())],
            body,
        )
            .into_response(),
        Err(e) => {
            error!("Failed to encode metrics: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to encode metrics".to_string(),
            )
                .into_response()
        }
    }
}

#[derive(Debug, Deserialize)]
struct EstimateParams {
    game_type: GameType,
    #[serde(default)]
    wager: f64,
}

async fn estimate_handler(
    State(state): State<HealthServerState>,
    Query(params): Query<EstimateParams>,
) -> Response {
    let Some(estimator) = state.estimator else {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "error": "Estimator not initialized" })),
        )
            .into_response();
    };

    if !params.wager.is_finite() || params.wager < 0.0 {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "wager must be a non-negative number" })),
        )
            .into_response();
    }

    let estimate = estimator.estimate(params.game_type, params.wager).await;
    (StatusCode::OK, Json(estimate)).into_response()
}
