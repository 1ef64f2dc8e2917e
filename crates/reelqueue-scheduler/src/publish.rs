use std::path::PathBuf;

use async_trait::async_trait;
use reelqueue_core::TenantId;
use reelqueue_store::MediaKind;
use serde::Serialize;

use crate::error::{AuthError, PublishError};

/// Title, description and tags as sent to the content API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UploadMetadata {
    pub title: String,
    pub description: String,
    pub tags: Vec<String>,
}

/// One publication request built from a claimed item.
#[derive(Debug, Clone)]
pub struct UploadRequest {
    pub payload_path: PathBuf,
    pub kind: MediaKind,
    pub metadata: UploadMetadata,
}

/// A successfully published video.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Published {
    pub video_id: String,
    pub url: String,
}

/// Supplies a currently valid access token for a tenant.
///
/// Implementations refresh and persist the token when it is absent or about
/// to expire.
#[async_trait]
pub trait Authorizer: Send + Sync {
    async fn access_token(&self, tenant: &TenantId) -> Result<String, AuthError>;
}

/// Performs the single external publication call.
#[async_trait]
pub trait Publisher: Send + Sync {
    /// Name for logging.
    fn name(&self) -> &str;

    /// Classifies every failure as transient, auth or permanent.
    async fn publish(&self, token: &str, req: &UploadRequest) -> Result<Published, PublishError>;
}
