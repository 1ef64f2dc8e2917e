//! YouTube account linking.
//!
//! `POST /auth/start` stores the tenant's OAuth client and returns the
//! consent URL. The tenant id travels through Google in `state`, so the
//! callback works even when the browser drops the session cookie on the
//! cross-site redirect.

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Redirect, Response},
    Json,
};
use reelqueue_core::TenantId;
use reelqueue_youtube::{consent_url, YoutubeError};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{error, info};

use crate::app::AppState;
use crate::error::{ApiError, ApiResult};
use crate::http::session::{tenant_from_headers, Tenant};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartAuthRequest {
    #[serde(default)]
    pub client_id: String,
    #[serde(default)]
    pub client_secret: String,
    pub redirect_uri: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CallbackQuery {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
}

/// POST /auth/start
pub async fn start_auth(
    State(state): State<Arc<AppState>>,
    Tenant(tenant): Tenant,
    Json(req): Json<StartAuthRequest>,
) -> ApiResult<Json<Value>> {
    let client_id = req.client_id.trim().to_string();
    let client_secret = req.client_secret.trim().to_string();
    if client_id.is_empty() || client_secret.is_empty() {
        return Err(ApiError::bad_request("Client ID and Secret are required"));
    }
    let redirect_uri = req
        .redirect_uri
        .map(|r| r.trim().to_string())
        .filter(|r| !r.is_empty())
        .unwrap_or_else(|| {
            format!("http://localhost:{}/auth/callback", state.config.gateway.port)
        });

    let settings = state.store.update_settings(&tenant, &mut |s| {
        s.client_id = Some(client_id.clone());
        s.client_secret = Some(client_secret.clone());
        s.redirect_uri = Some(redirect_uri.clone());
    })?;

    let auth_url = consent_url(&state.config.youtube, &settings, Some(tenant.as_str()))
        .map_err(|e| ApiError::bad_request(e.to_string()))?;
    info!(tenant = %tenant, "authorization started");
    Ok(Json(json!({ "authUrl": auth_url })))
}

/// GET /auth/callback: finish the consent handshake, then back to `/`.
pub async fn auth_callback(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<CallbackQuery>,
) -> Response {
    let Some(code) = query.code.filter(|c| !c.is_empty()) else {
        let message = match query.error {
            Some(e) => format!("Authorization denied: {e}"),
            None => "No authorization code received".to_string(),
        };
        return (StatusCode::BAD_REQUEST, message).into_response();
    };

    let tenant = query
        .state
        .or_else(|| tenant_from_headers(&headers))
        .and_then(|raw| TenantId::parse(&raw).ok());
    let Some(tenant) = tenant else {
        return (StatusCode::BAD_REQUEST, "Unknown session").into_response();
    };

    match state.authorizer.complete_authorization(&tenant, &code).await {
        Ok(_) => Redirect::to("/").into_response(),
        Err(e @ (YoutubeError::NoRefreshToken | YoutubeError::MissingClient)) => {
            (StatusCode::BAD_REQUEST, e.to_string()).into_response()
        }
        Err(e) => {
            error!(tenant = %tenant, error = %e, "authorization callback failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Authentication failed: {e}"),
            )
                .into_response()
        }
    }
}

/// GET /auth/check
pub async fn check_setup(
    State(state): State<Arc<AppState>>,
    Tenant(tenant): Tenant,
) -> ApiResult<Json<Value>> {
    let settings = state.store.settings(&tenant)?;
    Ok(Json(json!({ "isSetupComplete": settings.setup_complete() })))
}

/// POST /auth/reset: forget credentials and preferences.
pub async fn reset_setup(
    State(state): State<Arc<AppState>>,
    Tenant(tenant): Tenant,
) -> ApiResult<Json<Value>> {
    state.store.reset_settings(&tenant)?;
    info!(tenant = %tenant, "configuration reset");
    Ok(Json(json!({ "message": "Configuration reset" })))
}
