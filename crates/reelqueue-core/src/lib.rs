//! `reelqueue-core`: configuration, shared identifiers and error types used
//! by every other crate in the workspace.

pub mod config;
pub mod error;
pub mod types;

pub use config::ReelqueueConfig;
pub use error::{CoreError, Result};
pub use types::{parse_timezone, TenantId};
