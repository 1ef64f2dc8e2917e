//! Tenant sessions.
//!
//! A browser gets its tenant id from `POST /api/session` as the
//! `reelqueue_tenant` cookie; API clients may send `X-Tenant-Id` instead.

use std::sync::Arc;

use axum::{
    extract::{FromRequestParts, State},
    http::{header, request::Parts, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use reelqueue_core::TenantId;
use serde_json::json;
use tracing::info;

use crate::app::AppState;
use crate::error::{ApiError, ApiResult};

pub const TENANT_COOKIE: &str = "reelqueue_tenant";
pub const TENANT_HEADER: &str = "x-tenant-id";

/// One year, in seconds.
const COOKIE_MAX_AGE: u64 = 365 * 24 * 60 * 60;

/// Tenant id from the session cookie or the `X-Tenant-Id` header, if any.
pub fn tenant_from_headers(headers: &HeaderMap) -> Option<String> {
    if let Some(v) = headers.get(TENANT_HEADER).and_then(|v| v.to_str().ok()) {
        return Some(v.trim().to_string());
    }
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .find_map(|pair| {
            let (name, value) = pair.trim().split_once('=')?;
            (name == TENANT_COOKIE).then(|| value.trim().to_string())
        })
}

/// Extractor for handlers scoped to a tenant; 401 without a session.
pub struct Tenant(pub TenantId);

impl<S: Send + Sync> FromRequestParts<S> for Tenant {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let raw = tenant_from_headers(&parts.headers).ok_or_else(|| {
            ApiError::new(
                StatusCode::UNAUTHORIZED,
                "No session. POST /api/session first.",
            )
        })?;
        TenantId::parse(&raw)
            .map(Tenant)
            .map_err(|e| ApiError::bad_request(e.to_string()))
    }
}

/// POST /api/session: reuse the caller's tenant or issue a new one.
pub async fn create_session(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> ApiResult<Response> {
    let existing = tenant_from_headers(&headers).and_then(|raw| TenantId::parse(&raw).ok());
    let (tenant, created) = match existing {
        Some(t) => (t, false),
        None => (TenantId::new(), true),
    };
    state.store.ensure_tenant(&tenant)?;
    if created {
        info!(tenant = %tenant, "session issued");
    }

    let cookie = format!(
        "{TENANT_COOKIE}={tenant}; Path=/; HttpOnly; SameSite=Lax; Max-Age={COOKIE_MAX_AGE}"
    );
    let cookie = HeaderValue::from_str(&cookie).map_err(|e| ApiError::internal(e.to_string()))?;
    let status = if created { StatusCode::CREATED } else { StatusCode::OK };

    Ok((
        status,
        [(header::SET_COOKIE, cookie)],
        Json(json!({ "tenantId": tenant.as_str(), "created": created })),
    )
        .into_response())
}
