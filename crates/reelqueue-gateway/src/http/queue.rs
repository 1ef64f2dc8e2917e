use std::sync::Arc;

use axum::{
    extract::{Path, State},
    Json,
};
use chrono::NaiveTime;
use reelqueue_core::parse_timezone;
use reelqueue_store::{Item, ItemStatus, Settings};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::info;

use crate::app::AppState;
use crate::error::{ApiError, ApiResult};
use crate::http::session::Tenant;

/// Settings as exposed to the dashboard. Credentials never leave the server.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingsView {
    pub schedule_time: Option<String>,
    pub default_timezone: String,
    pub is_setup_complete: bool,
    pub has_client: bool,
}

impl SettingsView {
    fn new(settings: &Settings, fallback_zone: &str) -> Self {
        Self {
            schedule_time: settings.schedule_time.clone(),
            default_timezone: settings
                .default_timezone
                .clone()
                .unwrap_or_else(|| fallback_zone.to_string()),
            is_setup_complete: settings.setup_complete(),
            has_client: settings.has_client(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingsUpdate {
    pub schedule_time: Option<String>,
    pub default_timezone: Option<String>,
}

/// GET /api/status: every item of the tenant, oldest first.
pub async fn status_handler(
    State(state): State<Arc<AppState>>,
    Tenant(tenant): Tenant,
) -> ApiResult<Json<Vec<Item>>> {
    Ok(Json(state.store.list(&tenant)?))
}

/// GET /api/settings
pub async fn get_settings(
    State(state): State<Arc<AppState>>,
    Tenant(tenant): Tenant,
) -> ApiResult<Json<SettingsView>> {
    let settings = state.store.settings(&tenant)?;
    Ok(Json(SettingsView::new(
        &settings,
        &state.config.scheduler.default_timezone,
    )))
}

/// POST /api/settings: partial update of the dashboard preferences.
pub async fn update_settings(
    State(state): State<Arc<AppState>>,
    Tenant(tenant): Tenant,
    Json(update): Json<SettingsUpdate>,
) -> ApiResult<Json<SettingsView>> {
    let schedule_time = update
        .schedule_time
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty());
    if let Some(t) = &schedule_time {
        NaiveTime::parse_from_str(t, "%H:%M")
            .map_err(|_| ApiError::bad_request(format!("Invalid schedule time: {t} (expected HH:MM)")))?;
    }
    let default_timezone = update
        .default_timezone
        .map(|z| z.trim().to_string())
        .filter(|z| !z.is_empty());
    if let Some(z) = &default_timezone {
        parse_timezone(z).map_err(|e| ApiError::bad_request(e.to_string()))?;
    }

    let saved = state.store.update_settings(&tenant, &mut |s| {
        if let Some(t) = &schedule_time {
            s.schedule_time = Some(t.clone());
        }
        if let Some(z) = &default_timezone {
            s.default_timezone = Some(z.clone());
        }
    })?;
    Ok(Json(SettingsView::new(
        &saved,
        &state.config.scheduler.default_timezone,
    )))
}

/// DELETE /api/clear/{status}
pub async fn clear_handler(
    State(state): State<Arc<AppState>>,
    Tenant(tenant): Tenant,
    Path(status): Path<String>,
) -> ApiResult<Json<Value>> {
    let parsed = match status.as_str() {
        "pending" => ItemStatus::Pending,
        "failed" => ItemStatus::Failed,
        "uploaded" => ItemStatus::Uploaded,
        _ => {
            return Err(ApiError::bad_request(
                r#"Invalid status. Use "pending", "failed" or "uploaded"."#,
            ))
        }
    };
    let count = state.store.clear_by_status(&tenant, parsed)?;
    info!(tenant = %tenant, %status, count, "queue cleared");
    Ok(Json(json!({
        "message": format!("Cleared {count} {status} videos."),
        "count": count,
    })))
}

/// DELETE /api/video/{id}
pub async fn delete_handler(
    State(state): State<Arc<AppState>>,
    Tenant(tenant): Tenant,
    Path(id): Path<String>,
) -> ApiResult<Json<Value>> {
    if !state.store.remove(&tenant, &id)? {
        return Err(ApiError::not_found("Video not found."));
    }
    info!(tenant = %tenant, item_id = %id, "item deleted");
    Ok(Json(json!({ "message": "Video deleted successfully." })))
}
