//! Google OAuth and YouTube Data API collaborators for the scheduler.

pub mod error;
pub mod oauth;
pub mod publisher;

pub use error::{Result, YoutubeError};
pub use oauth::{consent_url, GoogleAuthorizer, TokenGrant, UPLOAD_SCOPE};
pub use publisher::{classify_status, watch_url, YouTubePublisher};
