//! Ingestion: `POST /api/upload` (multipart).
//!
//! Fields: `video` (file), `title`, `description`, `tags` (comma separated),
//! `videoType` (`short`|`long`), `scheduleDate`, `scheduleTime`, `timezone`.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use axum::{
    extract::{multipart::Field, Multipart, State},
    http::StatusCode,
    Json,
};
use reelqueue_core::parse_timezone;
use reelqueue_store::{Item, MediaKind, NewItem};
use serde_json::{json, Value};
use tokio::io::AsyncWriteExt;
use tracing::{info, warn};
use uuid::Uuid;

use crate::app::AppState;
use crate::error::{ApiError, ApiResult};
use crate::http::session::Tenant;
use crate::schedule::resolve_local;

#[derive(Default)]
struct UploadForm {
    stored: Option<StoredFile>,
    title: Option<String>,
    description: Option<String>,
    tags: Option<String>,
    video_type: Option<String>,
    schedule_date: Option<String>,
    schedule_time: Option<String>,
    timezone: Option<String>,
}

struct StoredFile {
    path: PathBuf,
    original_name: String,
}

/// POST /api/upload: store the file and queue it (201).
pub async fn upload_handler(
    State(state): State<Arc<AppState>>,
    Tenant(tenant): Tenant,
    multipart: Multipart,
) -> ApiResult<(StatusCode, Json<Value>)> {
    let dir = state.uploads_dir.join(tenant.as_str());
    tokio::fs::create_dir_all(&dir)
        .await
        .map_err(|e| ApiError::internal(format!("cannot create uploads dir: {e}")))?;

    let form = read_form(multipart, &dir).await?;
    let Some(stored) = form.stored.as_ref() else {
        return Err(ApiError::bad_request("No video file provided"));
    };

    match build_item(&state, &tenant, &form, stored).await {
        Ok(item) => {
            info!(tenant = %tenant, item_id = %item.id, file = %stored.original_name, "video queued");
            Ok((
                StatusCode::CREATED,
                Json(json!({ "message": "Video added to queue", "video": item })),
            ))
        }
        Err(e) => {
            discard(&stored.path).await;
            Err(e)
        }
    }
}

async fn build_item(
    state: &AppState,
    tenant: &reelqueue_core::TenantId,
    form: &UploadForm,
    stored: &StoredFile,
) -> ApiResult<Item> {
    let settings = state.store.settings(tenant)?;
    let timezone = non_empty(&form.timezone)
        .or(settings.default_timezone.as_deref())
        .unwrap_or(&state.config.scheduler.default_timezone)
        .to_string();
    let zone = parse_timezone(&timezone).map_err(|e| ApiError::bad_request(e.to_string()))?;

    let scheduled_at = match (non_empty(&form.schedule_date), non_empty(&form.schedule_time)) {
        (Some(date), Some(time)) => Some(resolve_local(date, time, zone).map_err(ApiError::bad_request)?),
        _ => None,
    };

    let kind = match non_empty(&form.video_type) {
        Some(raw) => raw.parse::<MediaKind>().map_err(ApiError::bad_request)?,
        None => MediaKind::Short,
    };

    let item = NewItem {
        payload_path: Some(stored.path.clone()),
        filename: stored.original_name.clone(),
        title: non_empty(&form.title)
            .unwrap_or(&stored.original_name)
            .to_string(),
        description: form.description.clone().unwrap_or_default(),
        tags: form
            .tags
            .as_deref()
            .map(|t| t.split(',').map(|s| s.trim().to_string()).collect())
            .unwrap_or_default(),
        kind: Some(kind),
        scheduled_at,
        timezone,
    };
    Ok(state.store.add(tenant, item)?)
}

async fn read_form(mut multipart: Multipart, dir: &Path) -> ApiResult<UploadForm> {
    let mut form = UploadForm::default();
    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(e) => {
                if let Some(stored) = &form.stored {
                    discard(&stored.path).await;
                }
                return Err(ApiError::bad_request(format!("Failed to read multipart: {e}")));
            }
        };
        let name = field.name().unwrap_or_default().to_string();

        let result = match name.as_str() {
            "video" if form.stored.is_none() => match save_file(field, dir).await {
                Ok(stored) => {
                    form.stored = Some(stored);
                    Ok(())
                }
                Err(e) => Err(e),
            },
            "title" => text(field).await.map(|v| form.title = Some(v)),
            "description" => text(field).await.map(|v| form.description = Some(v)),
            "tags" => text(field).await.map(|v| form.tags = Some(v)),
            "videoType" => text(field).await.map(|v| form.video_type = Some(v)),
            "scheduleDate" => text(field).await.map(|v| form.schedule_date = Some(v)),
            "scheduleTime" => text(field).await.map(|v| form.schedule_time = Some(v)),
            "timezone" => text(field).await.map(|v| form.timezone = Some(v)),
            _ => Ok(()),
        };
        if let Err(e) = result {
            if let Some(stored) = &form.stored {
                discard(&stored.path).await;
            }
            return Err(e);
        }
    }
    Ok(form)
}

async fn text(field: Field<'_>) -> ApiResult<String> {
    field
        .text()
        .await
        .map_err(|e| ApiError::bad_request(format!("Failed to read form field: {e}")))
}

/// Stream the file part to `dir` under a fresh unique name.
async fn save_file(mut field: Field<'_>, dir: &Path) -> ApiResult<StoredFile> {
    let original_name = field
        .file_name()
        .map(sanitize_file_name)
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| "video.mp4".to_string());
    let ext = Path::new(&original_name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| format!(".{e}"))
        .unwrap_or_default();
    let path = dir.join(format!("{}{ext}", Uuid::now_v7()));

    let mut file = tokio::fs::File::create(&path)
        .await
        .map_err(|e| ApiError::internal(format!("cannot store upload: {e}")))?;

    let copied: ApiResult<u64> = async {
        let mut written = 0u64;
        while let Some(chunk) = field
            .chunk()
            .await
            .map_err(|e| ApiError::bad_request(format!("Failed to read file data: {e}")))?
        {
            file.write_all(&chunk)
                .await
                .map_err(|e| ApiError::internal(format!("cannot store upload: {e}")))?;
            written += chunk.len() as u64;
        }
        file.flush()
            .await
            .map_err(|e| ApiError::internal(format!("cannot store upload: {e}")))?;
        Ok(written)
    }
    .await;

    match copied {
        Ok(0) => {
            discard(&path).await;
            Err(ApiError::bad_request("No video file provided"))
        }
        Ok(bytes) => {
            info!(path = %path.display(), bytes, "upload stored");
            Ok(StoredFile {
                path,
                original_name,
            })
        }
        Err(e) => {
            discard(&path).await;
            Err(e)
        }
    }
}

/// Base name only, without path separators or control characters.
fn sanitize_file_name(raw: &str) -> String {
    raw.rsplit(['/', '\\'])
        .next()
        .unwrap_or_default()
        .chars()
        .filter(|c| !c.is_control())
        .collect::<String>()
        .trim()
        .to_string()
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

async fn discard(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        warn!(path = %path.display(), error = %e, "failed to discard rejected upload");
    }
}
