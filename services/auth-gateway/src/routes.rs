//! HTTP surface of the gateway
//!
//! `/login` starts a flow and redirects to the provider, `/callback` finishes
//! it and returns the issued credential. `/logout`, `/revoke` and `/verify`
//! operate on issued credentials.

use std::sync::Arc;
use std::time::Instant;

use axum::extract::{Query, State};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use metrics_exporter_prometheus::PrometheusHandle;
use pkce_flow::{AuthorizeEndpoint, Claims, FlowCoordinator};
use serde::{Deserialize, Serialize};
use tracing::{Instrument, info, info_span, warn};

use crate::error::ApiError;
use crate::metrics;

/// Shared application state accessible from all handlers
#[derive(Clone)]
pub struct AppState {
    pub coordinator: Arc<FlowCoordinator>,
    pub authorize: Arc<AuthorizeEndpoint>,
    pub prometheus: PrometheusHandle,
    pub started_at: Instant,
}

/// Build the axum router with all routes and shared state.
///
/// `max_connections` bounds concurrently handled requests.
pub fn build_router(state: AppState, max_connections: usize) -> Router {
    Router::new()
        .route("/login", get(login_handler))
        .route("/callback", get(callback_handler))
        .route("/logout", post(logout_handler))
        .route("/revoke", post(revoke_handler))
        .route("/verify", post(verify_handler))
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .layer(tower::limit::ConcurrencyLimitLayer::new(max_connections))
        .with_state(state)
}

/// Start a login attempt and redirect the user agent to the provider.
async fn login_handler(State(state): State<AppState>) -> Result<Response, ApiError> {
    let start = state.coordinator.start_flow().await.into_result()?;
    let url = start.redirect.authorization_url(&state.authorize)?;
    metrics::record_flow_started();

    // 302 rather than axum's Redirect (303/307/308); providers expect a plain GET follow
    Ok((StatusCode::FOUND, [(header::LOCATION, url.to_string())]).into_response())
}

/// Query parameters the provider appends to the redirect URI.
#[derive(Debug, Deserialize)]
struct CallbackParams {
    state: Option<String>,
    code: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

#[derive(Debug, Serialize)]
struct IssuedResponse {
    token: String,
    credential_id: String,
    expires_at: u64,
    claims: Claims,
}

async fn callback_handler(
    State(state): State<AppState>,
    Query(params): Query<CallbackParams>,
) -> Result<Json<IssuedResponse>, ApiError> {
    let request_id = format!("req_{}", uuid::Uuid::new_v4().as_simple());
    let span = info_span!("callback", %request_id);

    async move {
        if let Some(error) = params.error {
            // The attempt is over either way; drop its binding now
            if let Some(s) = params.state.as_deref() {
                state.coordinator.cancel(s).await;
            }
            warn!(
                error = %error,
                description = params.error_description.as_deref().unwrap_or(""),
                "provider denied authorization"
            );
            metrics::record_flow_completed("provider_denied");
            return Err(ApiError::ProviderDenied(error));
        }

        let (Some(flow_state), Some(code)) = (params.state, params.code) else {
            metrics::record_flow_completed("bad_request");
            return Err(ApiError::BadRequest(
                "callback requires state and code".into(),
            ));
        };

        let started = Instant::now();
        let outcome = state.coordinator.complete_flow(&flow_state, &code).await;
        let label = match &outcome.result {
            Ok(_) => "issued",
            Err(e) => e.kind().label(),
        };
        metrics::record_exchange_duration(label, started.elapsed().as_secs_f64());
        metrics::record_flow_completed(label);

        let credential = outcome.into_result()?;
        Ok(Json(IssuedResponse {
            token: credential.token,
            credential_id: credential.id,
            expires_at: credential.expires_at,
            claims: credential.subject_claims,
        }))
    }
    .instrument(span)
    .await
}

#[derive(Debug, Deserialize)]
struct TokenBody {
    token: String,
}

#[derive(Debug, Deserialize)]
struct RevokeBody {
    credential_id: String,
}

/// Revoke the presented credential.
async fn logout_handler(
    State(state): State<AppState>,
    Json(body): Json<TokenBody>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let credential_id = state.coordinator.logout(&body.token).await?;
    metrics::record_revocation("logout");
    info!(%credential_id, "credential revoked at logout");
    Ok(Json(serde_json::json!({ "revoked": credential_id })))
}

/// Revoke a credential by id.
async fn revoke_handler(
    State(state): State<AppState>,
    Json(body): Json<RevokeBody>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let credential_id = body.credential_id.trim();
    if credential_id.is_empty() {
        return Err(ApiError::BadRequest("credential_id must not be empty".into()));
    }
    state.coordinator.revoke(credential_id).await;
    metrics::record_revocation("revoke");
    info!(%credential_id, "credential revoked");
    Ok(Json(serde_json::json!({ "revoked": credential_id })))
}

/// Check a credential the way a resource server would.
async fn verify_handler(
    State(state): State<AppState>,
    Json(body): Json<TokenBody>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let verified = state.coordinator.verify(&body.token).await?;
    Ok(Json(serde_json::json!({
        "valid": true,
        "credential_id": verified.id,
        "issued_at": verified.issued_at,
        "expires_at": verified.expires_at,
        "claims": verified.subject_claims,
    })))
}

async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    let body = serde_json::json!({
        "status": "healthy",
        "uptime_seconds": state.started_at.elapsed().as_secs(),
        "pending_flows": state.coordinator.store().len().await,
        "revoked_credentials": state.coordinator.registry().len().await,
    });
    (StatusCode::OK, Json(body))
}

/// Prometheus metrics endpoint in text exposition format.
async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(
            header::CONTENT_TYPE,
            "text/plain; version=0.0.4; charset=utf-8",
        )],
        state.prometheus.render(),
    )
}
