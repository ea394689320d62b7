// SPDX-FileCopyrightText: 2026 Wacast Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP request handlers for the gateway.
//!
//! Public: `GET /health`, `GET /metrics`, `GET|POST /webhook`.
//! Operator (bearer auth): `POST /dispatch` and everything under `/v1`.

use std::collections::HashMap;

use axum::{
    Json,
    body::Bytes,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use serde::de::DeserializeOwned;

use wacast_core::{Campaign, CampaignStats, TemplateVariables, WacastError};
use wacast_dispatch::DispatchRequest;
use wacast_whatsapp::{SIGNATURE_HEADERS, verify_subscription};

use crate::server::GatewayState;

/// Response body for GET /health.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_secs: u64,
}

/// Error response body.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// Response body for GET /v1/campaigns/{id}.
#[derive(Debug, Serialize)]
pub struct CampaignResponse {
    pub campaign: Campaign,
    pub stats: CampaignStats,
}

/// Optional body for POST /v1/campaigns/{id}/resend-skipped.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResendRequest {
    /// Only reopen these recipient ids; all skipped recipients when absent.
    #[serde(default)]
    pub recipient_ids: Option<Vec<String>>,
}

/// Optional body for POST /v1/campaigns/{id}/precheck.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrecheckRequest {
    #[serde(default)]
    pub template_name: Option<String>,
    #[serde(default)]
    pub template_variables: Option<TemplateVariables>,
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    #[serde(default = "default_limit")]
    pub limit: usize,
    #[serde(default = "default_active_only")]
    pub active_only: bool,
}

fn default_limit() -> usize {
    100
}

fn default_active_only() -> bool {
    true
}

/// A `WacastError` rendered as an HTTP response.
#[derive(Debug)]
pub struct ApiError(pub WacastError);

impl From<WacastError> for ApiError {
    fn from(err: WacastError) -> Self {
        Self(err)
    }
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match &self.0 {
            WacastError::NotFound { .. } => StatusCode::NOT_FOUND,
            WacastError::InvalidState { .. } => StatusCode::CONFLICT,
            WacastError::Payload(_) | WacastError::MissingIdentity { .. } => {
                StatusCode::BAD_REQUEST
            }
            WacastError::Signature => StatusCode::UNAUTHORIZED,
            WacastError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self.0, "request failed");
        } else {
            tracing::debug!(error = %self.0, %status, "request rejected");
        }
        (
            status,
            Json(ErrorResponse {
                error: self.0.to_string(),
            }),
        )
            .into_response()
    }
}

/// Parse an optional JSON body; an empty body yields the default.
fn optional_body<T: DeserializeOwned + Default>(body: &Bytes) -> Result<T, ApiError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    serde_json::from_slice(body)
        .map_err(|e| ApiError(WacastError::Payload(format!("invalid request body: {e}"))))
}

/// GET /health
pub async fn get_public_health(State(state): State<GatewayState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_secs: state.health.start_time.elapsed().as_secs(),
    })
}

/// GET /metrics
///
/// Prometheus text format, or 404 when metrics are disabled.
pub async fn get_public_metrics(State(state): State<GatewayState>) -> Response {
    match &state.health.prometheus_render {
        Some(render) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4")],
            render(),
        )
            .into_response(),
        None => (StatusCode::NOT_FOUND, "metrics disabled").into_response(),
    }
}

/// GET /webhook
///
/// Subscription handshake: echo `hub.challenge` iff the verify token matches.
pub async fn get_webhook(
    State(state): State<GatewayState>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let challenge = verify_subscription(
        params.get("hub.mode").map(String::as_str),
        params.get("hub.verify_token").map(String::as_str),
        params.get("hub.challenge").map(String::as_str),
        state.verify_token.as_deref(),
    );
    match challenge {
        Some(challenge) => {
            tracing::info!("webhook subscription verified");
            (StatusCode::OK, challenge).into_response()
        }
        None => {
            tracing::warn!("webhook subscription rejected");
            StatusCode::FORBIDDEN.into_response()
        }
    }
}

/// POST /webhook
///
/// 200 once every event is durably recorded, 500 when persistence fails so
/// the vendor redelivers.
pub async fn post_webhook(
    State(state): State<GatewayState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ApiError> {
    let signature = SIGNATURE_HEADERS
        .iter()
        .find_map(|name| headers.get(*name).and_then(|v| v.to_str().ok()));
    let summary = state.ingestor.ingest(&body, signature).await?;
    Ok((StatusCode::OK, Json(summary)).into_response())
}

/// POST /dispatch
pub async fn post_dispatch(
    State(state): State<GatewayState>,
    body: Bytes,
) -> Result<Response, ApiError> {
    let request: DispatchRequest = serde_json::from_slice(&body)
        .map_err(|e| ApiError(WacastError::Payload(format!("invalid dispatch request: {e}"))))?;
    let accepted = state.orchestrator.start(request).await?;
    Ok((StatusCode::ACCEPTED, Json(accepted)).into_response())
}

/// GET /v1/campaigns/{id}
pub async fn get_campaign(
    State(state): State<GatewayState>,
    Path(id): Path<String>,
) -> Result<Json<CampaignResponse>, ApiError> {
    let campaign = state.orchestrator.get_campaign(&id).await?;
    let stats = state.orchestrator.stats(&id).await?;
    Ok(Json(CampaignResponse { campaign, stats }))
}

/// POST /v1/campaigns/{id}/pause
pub async fn post_pause(
    State(state): State<GatewayState>,
    Path(id): Path<String>,
) -> Result<Json<Campaign>, ApiError> {
    state.orchestrator.pause(&id).await?;
    Ok(Json(state.orchestrator.get_campaign(&id).await?))
}

/// POST /v1/campaigns/{id}/resume
pub async fn post_resume(
    State(state): State<GatewayState>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let accepted = state.orchestrator.resume(&id).await?;
    Ok((StatusCode::ACCEPTED, Json(accepted)).into_response())
}

/// POST /v1/campaigns/{id}/cancel
pub async fn post_cancel(
    State(state): State<GatewayState>,
    Path(id): Path<String>,
) -> Result<Json<Campaign>, ApiError> {
    state.orchestrator.cancel(&id).await?;
    Ok(Json(state.orchestrator.get_campaign(&id).await?))
}

/// POST /v1/campaigns/{id}/resend-skipped
pub async fn post_resend_skipped(
    State(state): State<GatewayState>,
    Path(id): Path<String>,
    body: Bytes,
) -> Result<Response, ApiError> {
    let request: ResendRequest = optional_body(&body)?;
    let outcome = state
        .orchestrator
        .resend_skipped(&id, request.recipient_ids.as_deref())
        .await?;
    Ok((StatusCode::OK, Json(outcome)).into_response())
}

/// POST /v1/campaigns/{id}/precheck
pub async fn post_precheck(
    State(state): State<GatewayState>,
    Path(id): Path<String>,
    body: Bytes,
) -> Result<Response, ApiError> {
    let request: PrecheckRequest = optional_body(&body)?;
    let report = state
        .orchestrator
        .precheck(
            &id,
            request.template_name.as_deref(),
            request.template_variables,
        )
        .await?;
    Ok((StatusCode::OK, Json(report)).into_response())
}

/// GET /v1/alerts
pub async fn get_alerts(
    State(state): State<GatewayState>,
    Query(query): Query<ListQuery>,
) -> Result<Response, ApiError> {
    let alerts = state.alerts.list_alerts(query.limit).await?;
    Ok(Json(alerts).into_response())
}

/// GET /v1/suppressions
pub async fn get_suppressions(
    State(state): State<GatewayState>,
    Query(query): Query<ListQuery>,
) -> Result<Response, ApiError> {
    let entries = state.registry.list(query.active_only, query.limit).await?;
    Ok(Json(entries).into_response())
}

/// DELETE /v1/suppressions/{phone}
pub async fn delete_suppression(
    State(state): State<GatewayState>,
    Path(phone): Path<String>,
) -> Result<Response, ApiError> {
    if state.registry.lift(&phone).await? {
        Ok(Json(serde_json::json!({ "phone": phone, "lifted": true })).into_response())
    } else {
        Err(ApiError(WacastError::not_found("suppression", &phone)))
    }
}

/// POST /v1/throttle/{sender}/reset
pub async fn post_throttle_reset(
    State(state): State<GatewayState>,
    Path(sender_id): Path<String>,
) -> Result<Response, ApiError> {
    let change = state.rate.reset(&sender_id).await?;
    Ok(Json(serde_json::json!({
        "senderId": sender_id,
        "previous": change.previous,
        "rate": change.next,
    }))
    .into_response())
}
