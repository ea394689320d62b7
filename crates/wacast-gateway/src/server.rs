// SPDX-FileCopyrightText: 2026 Wacast Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Gateway HTTP server built on axum.
//!
//! Sets up routes, middleware, and shared state for the gateway.

use std::sync::Arc;

use axum::{
    Router, middleware as axum_middleware,
    routing::{delete, get, post},
};
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;

use wacast_core::{AlertStore, WacastError};
use wacast_dispatch::{DispatchOrchestrator, RateController};
use wacast_status::WebhookIngestor;
use wacast_suppression::SuppressionRegistry;

use crate::auth::{AuthConfig, auth_middleware};
use crate::handlers;

/// Health state for unauthenticated health/metrics endpoints.
#[derive(Clone)]
pub struct HealthState {
    /// Process start time for uptime calculation.
    pub start_time: std::time::Instant,
    /// Optional Prometheus metrics render function.
    pub prometheus_render: Option<Arc<dyn Fn() -> String + Send + Sync>>,
}

/// Shared state for axum request handlers.
#[derive(Clone)]
pub struct GatewayState {
    pub orchestrator: Arc<DispatchOrchestrator>,
    pub ingestor: Arc<WebhookIngestor>,
    pub registry: Arc<SuppressionRegistry>,
    pub rate: Arc<RateController>,
    pub alerts: Arc<dyn AlertStore>,
    /// Token the vendor echoes during the subscription handshake.
    pub verify_token: Option<String>,
    pub auth: AuthConfig,
    pub health: HealthState,
}

/// Gateway server configuration (mirrors GatewayConfig from wacast-config).
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// Build the gateway router.
///
/// - `GET /health`, `GET /metrics`, `GET|POST /webhook` (public)
/// - `POST /dispatch` and `/v1/...` (bearer auth)
pub fn router(state: GatewayState) -> Router {
    let auth_state = state.auth.clone();

    // Unauthenticated routes: health for systemd, metrics for Prometheus,
    // webhook for the vendor (authenticated by its HMAC signature instead).
    let public_routes = Router::new()
        .route("/health", get(handlers::get_public_health))
        .route("/metrics", get(handlers::get_public_metrics))
        .route(
            "/webhook",
            get(handlers::get_webhook).post(handlers::post_webhook),
        )
        .with_state(state.clone());

    let api_routes = Router::new()
        .route("/dispatch", post(handlers::post_dispatch))
        .route("/v1/campaigns/{id}", get(handlers::get_campaign))
        .route("/v1/campaigns/{id}/pause", post(handlers::post_pause))
        .route("/v1/campaigns/{id}/resume", post(handlers::post_resume))
        .route("/v1/campaigns/{id}/cancel", post(handlers::post_cancel))
        .route(
            "/v1/campaigns/{id}/resend-skipped",
            post(handlers::post_resend_skipped),
        )
        .route("/v1/campaigns/{id}/precheck", post(handlers::post_precheck))
        .route("/v1/alerts", get(handlers::get_alerts))
        .route("/v1/suppressions", get(handlers::get_suppressions))
        .route("/v1/suppressions/{phone}", delete(handlers::delete_suppression))
        .route(
            "/v1/throttle/{sender}/reset",
            post(handlers::post_throttle_reset),
        )
        .route_layer(axum_middleware::from_fn_with_state(
            auth_state,
            auth_middleware,
        ))
        .with_state(state);

    Router::new()
        .merge(public_routes)
        .merge(api_routes)
        .layer(TraceLayer::new_for_http())
}

/// Serve the gateway until `cancel` fires.
pub async fn start_server(
    config: &ServerConfig,
    state: GatewayState,
    cancel: CancellationToken,
) -> Result<(), WacastError> {
    let app = router(state);

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| WacastError::Internal(format!("failed to bind gateway to {addr}: {e}")))?;

    tracing::info!("Gateway server listening on {addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(cancel.cancelled_owned())
        .await
        .map_err(|e| WacastError::Internal(format!("gateway server error: {e}")))?;

    tracing::info!("Gateway server stopped");
    Ok(())
}
