use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

pub const DEFAULT_PORT: u16 = 3000;
pub const DEFAULT_BIND: &str = "0.0.0.0";
pub const DEFAULT_TIMEZONE: &str = "Asia/Karachi";
pub const DEFAULT_MAX_UPLOAD_MB: u64 = 1024;
pub const TICK_INTERVAL_SECS: u64 = 60; // one scheduler pass per minute
pub const UPLOAD_WINDOW_MINS: i64 = 5; // grace period after scheduled_at
pub const MAX_RETRIES: u32 = 1; // attempts = MAX_RETRIES + 1
pub const RETRY_BACKOFF_SECS: u64 = 3;
pub const CLOCK_REFRESH_SECS: u64 = 300; // reference clock consulted at most every 5 min
pub const CLOCK_DRIFT_WARNING_SECS: i64 = 60;

/// Top-level config (reelqueue.toml + REELQUEUE_* env overrides).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReelqueueConfig {
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub clock: ClockConfig,
    #[serde(default)]
    pub youtube: YoutubeConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Largest accepted media upload, in MiB.
    #[serde(default = "default_max_upload_mb")]
    pub max_upload_mb: u64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            bind: DEFAULT_BIND.to_string(),
            max_upload_mb: DEFAULT_MAX_UPLOAD_MB,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

/// Where ingested media files are written before publication.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_uploads_dir")]
    pub uploads_dir: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            uploads_dir: default_uploads_dir(),
        }
    }
}

/// Polling cadence, readiness window and retry policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    #[serde(default = "default_tick_interval")]
    pub tick_interval_secs: u64,
    /// Minutes after `scheduled_at` during which an item is still uploaded.
    /// Later than that it is failed as missed.
    #[serde(default = "default_upload_window")]
    pub upload_window_mins: i64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_backoff")]
    pub retry_backoff_secs: u64,
    /// Zone applied to uploads that don't name one.
    #[serde(default = "default_timezone")]
    pub default_timezone: String,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_interval_secs: TICK_INTERVAL_SECS,
            upload_window_mins: UPLOAD_WINDOW_MINS,
            max_retries: MAX_RETRIES,
            retry_backoff_secs: RETRY_BACKOFF_SECS,
            default_timezone: default_timezone(),
        }
    }
}

/// External reference clock used for drift warnings only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClockConfig {
    /// Disable to never contact the reference clock (offline deployments).
    #[serde(default = "bool_true")]
    pub enabled: bool,
    #[serde(default = "default_reference_url")]
    pub reference_url: String,
    #[serde(default = "default_clock_refresh")]
    pub refresh_interval_secs: u64,
    #[serde(default = "default_drift_warning")]
    pub drift_warning_secs: i64,
    #[serde(default = "default_clock_timeout")]
    pub timeout_secs: u64,
}

impl Default for ClockConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            reference_url: default_reference_url(),
            refresh_interval_secs: CLOCK_REFRESH_SECS,
            drift_warning_secs: CLOCK_DRIFT_WARNING_SECS,
            timeout_secs: default_clock_timeout(),
        }
    }
}

/// Google OAuth + YouTube Data API endpoints and upload defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct YoutubeConfig {
    #[serde(default = "default_api_base")]
    pub api_base: String,
    #[serde(default = "default_upload_base")]
    pub upload_base: String,
    #[serde(default = "default_auth_url")]
    pub auth_url: String,
    #[serde(default = "default_token_url")]
    pub token_url: String,
    #[serde(default = "default_category_id")]
    pub category_id: String,
    #[serde(default = "default_privacy_status")]
    pub privacy_status: String,
}

impl Default for YoutubeConfig {
    fn default() -> Self {
        Self {
            api_base: default_api_base(),
            upload_base: default_upload_base(),
            auth_url: default_auth_url(),
            token_url: default_token_url(),
            category_id: default_category_id(),
            privacy_status: default_privacy_status(),
        }
    }
}

fn bool_true() -> bool {
    true
}
fn default_port() -> u16 {
    DEFAULT_PORT
}
fn default_bind() -> String {
    DEFAULT_BIND.to_string()
}
fn default_max_upload_mb() -> u64 {
    DEFAULT_MAX_UPLOAD_MB
}
fn default_tick_interval() -> u64 {
    TICK_INTERVAL_SECS
}
fn default_upload_window() -> i64 {
    UPLOAD_WINDOW_MINS
}
fn default_max_retries() -> u32 {
    MAX_RETRIES
}
fn default_retry_backoff() -> u64 {
    RETRY_BACKOFF_SECS
}
fn default_timezone() -> String {
    DEFAULT_TIMEZONE.to_string()
}
fn default_reference_url() -> String {
    "https://timeapi.io/api/Time/current/zone".to_string()
}
fn default_clock_refresh() -> u64 {
    CLOCK_REFRESH_SECS
}
fn default_drift_warning() -> i64 {
    CLOCK_DRIFT_WARNING_SECS
}
fn default_clock_timeout() -> u64 {
    10
}
fn default_api_base() -> String {
    "https://www.googleapis.com/youtube/v3".to_string()
}
fn default_upload_base() -> String {
    "https://www.googleapis.com/upload/youtube/v3".to_string()
}
fn default_auth_url() -> String {
    "https://accounts.google.com/o/oauth2/v2/auth".to_string()
}
fn default_token_url() -> String {
    "https://oauth2.googleapis.com/token".to_string()
}
fn default_category_id() -> String {
    "22".to_string()
}
fn default_privacy_status() -> String {
    "public".to_string()
}
fn home_dir() -> String {
    std::env::var("HOME").unwrap_or_else(|_| ".".to_string())
}
fn default_db_path() -> String {
    format!("{}/.reelqueue/reelqueue.db", home_dir())
}
fn default_uploads_dir() -> String {
    format!("{}/.reelqueue/uploads", home_dir())
}

impl ReelqueueConfig {
    /// Load config from a TOML file with REELQUEUE_* env var overrides.
    ///
    /// Path resolution: explicit argument, else `~/.reelqueue/reelqueue.toml`.
    /// A missing file is not an error; every field has a default.
    pub fn load(config_path: Option<&str>) -> crate::error::Result<Self> {
        let path = config_path
            .map(String::from)
            .unwrap_or_else(default_config_path);

        Self::figment(&path)
            .extract()
            .map_err(|e| crate::error::CoreError::Config(e.to_string()))
    }

    fn figment(path: &str) -> Figment {
        Figment::new()
            .merge(Toml::file(path))
            .merge(Env::prefixed("REELQUEUE_").split("__"))
    }
}

fn default_config_path() -> String {
    format!("{}/.reelqueue/reelqueue.toml", home_dir())
}
