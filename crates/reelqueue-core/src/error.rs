use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Unknown time zone: {0}")]
    InvalidTimezone(String),

    #[error("Invalid tenant id: {0}")]
    InvalidTenant(String),
}

pub type Result<T> = std::result::Result<T, CoreError>;
