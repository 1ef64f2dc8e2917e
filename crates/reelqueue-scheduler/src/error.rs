use reelqueue_store::StoreError;
use thiserror::Error;

/// The authorization collaborator could not produce a usable credential.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    #[error("Credentials not configured. Please run setup first.")]
    NotConfigured,

    #[error("Token refresh failed ({0}). Please re-authenticate.")]
    RefreshFailed(String),

    #[error("Authentication failed ({0}). Please re-authenticate.")]
    Rejected(String),

    #[error("Credential store unavailable: {0}")]
    Store(String),
}

impl From<StoreError> for AuthError {
    fn from(e: StoreError) -> Self {
        AuthError::Store(e.to_string())
    }
}

/// Outcome classification of a single call to the content API.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PublishError {
    /// Network, rate-limit or 5xx-class failure; worth another attempt.
    #[error("{0}")]
    Transient(String),

    /// The request can never succeed as-is (quota, permission, bad input).
    #[error("{0}")]
    Permanent(String),

    /// The API rejected the credential.
    #[error("{0}")]
    Auth(String),
}

impl PublishError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, PublishError::Transient(_))
    }
}

/// Why a claimed item could not be published. The `Display` text is what the
/// tenant sees as the item's error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UploadFailure {
    #[error("{0}")]
    Auth(#[from] AuthError),

    /// Every attempt allowed by the retry policy failed transiently.
    #[error("{message}")]
    Exhausted { message: String, attempts: u32 },

    /// Not retried: missing payload, permission denied, quota exhausted.
    #[error("{0}")]
    Permanent(String),
}
