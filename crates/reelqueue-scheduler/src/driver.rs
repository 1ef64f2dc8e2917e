use std::path::Path;
use std::sync::Arc;

use reelqueue_core::TenantId;
use reelqueue_store::Item;
use tracing::{info, warn};

use crate::error::{AuthError, PublishError, UploadFailure};
use crate::metadata;
use crate::publish::{Authorizer, Published, Publisher, UploadRequest};
use crate::retry::RetryPolicy;

/// Publishes one claimed item, retrying transient failures.
pub struct UploadDriver {
    authorizer: Arc<dyn Authorizer>,
    publisher: Arc<dyn Publisher>,
    policy: RetryPolicy,
}

impl UploadDriver {
    pub fn new(
        authorizer: Arc<dyn Authorizer>,
        publisher: Arc<dyn Publisher>,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            authorizer,
            publisher,
            policy,
        }
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Run up to `policy.max_attempts()` publication attempts.
    ///
    /// A missing payload, an auth failure or a permanent API error end the
    /// upload immediately. The caller owns the resulting status transition.
    pub async fn upload(&self, tenant: &TenantId, item: &Item) -> Result<Published, UploadFailure> {
        check_payload(&item.payload_path).await?;

        let request = UploadRequest {
            payload_path: item.payload_path.clone(),
            kind: item.kind,
            metadata: metadata::shape(item),
        };
        let publisher = self.publisher.name();
        let max_attempts = self.policy.max_attempts();
        let mut last_message = String::new();

        for attempt in 1..=max_attempts {
            let token = self.authorizer.access_token(tenant).await?;

            match self.publisher.publish(&token, &request).await {
                Ok(published) => {
                    if attempt > 1 {
                        info!(tenant = %tenant, item_id = %item.id, attempt, "upload succeeded after retry");
                    }
                    return Ok(published);
                }
                Err(err) if !err.is_retryable() => {
                    warn!(tenant = %tenant, item_id = %item.id, %publisher, %err, "upload rejected");
                    return Err(match err {
                        PublishError::Auth(msg) => AuthError::Rejected(msg).into(),
                        other => UploadFailure::Permanent(other.to_string()),
                    });
                }
                Err(err) => {
                    let msg = err.to_string();
                    warn!(
                        tenant = %tenant,
                        item_id = %item.id,
                        %publisher,
                        attempt,
                        max_attempts,
                        err = %msg,
                        "upload attempt failed"
                    );
                    last_message = msg;
                    if attempt < max_attempts {
                        tokio::time::sleep(self.policy.delay(attempt)).await;
                    }
                }
            }
        }

        Err(UploadFailure::Exhausted {
            message: last_message,
            attempts: max_attempts,
        })
    }
}

async fn check_payload(path: &Path) -> Result<(), UploadFailure> {
    let missing = || UploadFailure::Permanent(format!("Video file not found: {}", path.display()));

    let meta = tokio::fs::metadata(path).await.map_err(|_| missing())?;
    if !meta.is_file() {
        return Err(missing());
    }
    tokio::fs::File::open(path).await.map_err(|_| missing())?;
    Ok(())
}
