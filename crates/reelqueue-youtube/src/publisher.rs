use std::time::Duration;

use async_trait::async_trait;
use reelqueue_core::config::YoutubeConfig;
use reelqueue_scheduler::{PublishError, Published, Publisher, UploadRequest};
use reelqueue_store::MediaKind;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info, warn};

const QUOTA_MESSAGE: &str = "API quota exceeded or permission denied";

/// Public URL of a published video.
pub fn watch_url(video_id: &str, kind: MediaKind) -> String {
    match kind {
        MediaKind::Short => format!("https://youtube.com/shorts/{video_id}"),
        MediaKind::Long => format!("https://youtube.com/watch?v={video_id}"),
    }
}

/// Map a non-success API status to the scheduler's retry classes.
pub fn classify_status(status: u16, body: &str) -> PublishError {
    let message = api_error_message(body);
    match status {
        401 => PublishError::Auth(message),
        403 => PublishError::Permanent(QUOTA_MESSAGE.to_string()),
        429 | 500..=599 => PublishError::Transient(format!("YouTube API error ({status}): {message}")),
        _ => PublishError::Permanent(format!("YouTube API error ({status}): {message}")),
    }
}

fn network_error(e: reqwest::Error) -> PublishError {
    PublishError::Transient(format!("network error: {e}"))
}

/// `error.message` from a Google API error body, else the raw text.
fn api_error_message(body: &str) -> String {
    #[derive(Deserialize)]
    struct Envelope {
        error: ErrorBody,
    }
    #[derive(Deserialize)]
    struct ErrorBody {
        message: String,
    }
    serde_json::from_str::<Envelope>(body)
        .map(|e| e.error.message)
        .unwrap_or_else(|_| body.trim().to_string())
}

#[derive(Deserialize)]
struct VideoResource {
    id: String,
}

/// [`Publisher`] over the YouTube Data API resumable upload protocol.
pub struct YouTubePublisher {
    client: reqwest::Client,
    cfg: YoutubeConfig,
}

impl YouTubePublisher {
    pub fn new(cfg: YoutubeConfig) -> Self {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_default();
        Self { client, cfg }
    }

    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
        self
    }

    fn resource(&self, req: &UploadRequest) -> serde_json::Value {
        json!({
            "snippet": {
                "title": req.metadata.title,
                "description": req.metadata.description,
                "tags": req.metadata.tags,
                "categoryId": self.cfg.category_id,
            },
            "status": {
                "privacyStatus": self.cfg.privacy_status,
                "selfDeclaredMadeForKids": false,
            }
        })
    }

    /// Open a resumable session; returns the session URI.
    async fn initiate(&self, token: &str, req: &UploadRequest, size: u64) -> Result<String, PublishError> {
        let url = format!(
            "{}/videos?uploadType=resumable&part=snippet,status",
            self.cfg.upload_base
        );
        let resp = self
            .client
            .post(&url)
            .bearer_auth(token)
            .header("X-Upload-Content-Type", "video/*")
            .header("X-Upload-Content-Length", size)
            .json(&self.resource(req))
            .send()
            .await
            .map_err(network_error)?;

        let status = resp.status().as_u16();
        if !resp.status().is_success() {
            let text = resp.text().await.unwrap_or_default();
            warn!(status, body = %text, "resumable session rejected");
            return Err(classify_status(status, &text));
        }

        resp.headers()
            .get(reqwest::header::LOCATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .ok_or_else(|| PublishError::Transient("upload session has no Location header".into()))
    }

    async fn send_media(&self, token: &str, session: &str, req: &UploadRequest, size: u64) -> Result<String, PublishError> {
        let file = tokio::fs::File::open(&req.payload_path).await.map_err(|_| {
            PublishError::Permanent(format!(
                "Video file not found: {}",
                req.payload_path.display()
            ))
        })?;

        let resp = self
            .client
            .put(session)
            .bearer_auth(token)
            .header(reqwest::header::CONTENT_TYPE, "video/*")
            .header(reqwest::header::CONTENT_LENGTH, size)
            .body(reqwest::Body::from(file))
            .send()
            .await
            .map_err(network_error)?;

        let status = resp.status().as_u16();
        if !resp.status().is_success() {
            let text = resp.text().await.unwrap_or_default();
            warn!(status, body = %text, "media upload rejected");
            return Err(classify_status(status, &text));
        }

        let video: VideoResource = resp
            .json()
            .await
            .map_err(|e| PublishError::Permanent(format!("unexpected upload response: {e}")))?;
        Ok(video.id)
    }
}

#[async_trait]
impl Publisher for YouTubePublisher {
    fn name(&self) -> &str {
        "youtube"
    }

    async fn publish(&self, token: &str, req: &UploadRequest) -> Result<Published, PublishError> {
        let size = tokio::fs::metadata(&req.payload_path)
            .await
            .map_err(|_| {
                PublishError::Permanent(format!(
                    "Video file not found: {}",
                    req.payload_path.display()
                ))
            })?
            .len();

        debug!(
            title = %req.metadata.title,
            kind = %req.kind,
            size_bytes = size,
            "starting resumable upload"
        );
        let session = self.initiate(token, req, size).await?;
        let video_id = self.send_media(token, &session, req, size).await?;
        let url = watch_url(&video_id, req.kind);
        info!(%video_id, %url, "video published");

        Ok(Published { video_id, url })
    }
}
