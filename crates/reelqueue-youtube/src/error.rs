use reelqueue_store::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum YoutubeError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Client ID and Secret are required")]
    MissingClient,

    #[error("No refresh token. Revoke access and try again.")]
    NoRefreshToken,

    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

pub type Result<T> = std::result::Result<T, YoutubeError>;
