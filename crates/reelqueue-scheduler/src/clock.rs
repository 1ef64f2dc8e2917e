//! Time source with advisory drift detection.
//!
//! Scheduling decisions always use the local clock. A reference clock is
//! consulted in the background, at most once per refresh interval, purely so
//! that drift gets logged; its answer never feeds back into decisions.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use chrono_tz::Tz;
use reelqueue_core::config::ClockConfig;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Wall clock of this host.
pub trait LocalClock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

pub struct SystemClock;

impl LocalClock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

#[derive(Debug, Error)]
pub enum ClockError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Parse error: {0}")]
    Parse(String),
}

/// External authority on the current time.
#[async_trait]
pub trait ReferenceClock: Send + Sync {
    async fn fetch(&self, zone: Tz) -> Result<DateTime<Utc>, ClockError>;
}

/// `timeapi.io`-style reference: `GET {url}?timeZone=<zone>` returning the
/// zone's local date and time as separate fields.
pub struct TimeApiClock {
    client: reqwest::Client,
    url: String,
}

#[derive(Deserialize)]
struct TimeApiResponse {
    year: i32,
    month: u32,
    day: u32,
    hour: u32,
    minute: u32,
    seconds: u32,
}

impl TimeApiClock {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("reelqueue/", env!("CARGO_PKG_VERSION")))
            .build()
            .unwrap_or_default();
        Self {
            client,
            url: url.into(),
        }
    }
}

#[async_trait]
impl ReferenceClock for TimeApiClock {
    async fn fetch(&self, zone: Tz) -> Result<DateTime<Utc>, ClockError> {
        let resp: TimeApiResponse = self
            .client
            .get(&self.url)
            .query(&[("timeZone", zone.name())])
            .header("Accept", "application/json")
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let local = NaiveDate::from_ymd_opt(resp.year, resp.month, resp.day)
            .and_then(|d| d.and_hms_opt(resp.hour, resp.minute, resp.seconds))
            .ok_or_else(|| ClockError::Parse("reference time out of range".into()))?;
        let instant = zone
            .from_local_datetime(&local)
            .earliest()
            .ok_or_else(|| ClockError::Parse(format!("{local} does not exist in {zone}")))?;
        Ok(instant.with_timezone(&Utc))
    }
}

/// Result of the most recent successful reference check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClockReading {
    pub zone: String,
    pub reference: DateTime<Utc>,
    pub local: DateTime<Utc>,
    /// `local - reference`, in whole seconds.
    pub drift_secs: i64,
}

#[derive(Default)]
struct CheckState {
    last_attempt: Option<Instant>,
    in_flight: bool,
    last_reading: Option<ClockReading>,
}

/// Zone-aware "now" that never blocks on the network.
pub struct TimeSource {
    local: Arc<dyn LocalClock>,
    reference: Option<Arc<dyn ReferenceClock>>,
    refresh_interval: Duration,
    drift_warning_secs: i64,
    state: Arc<Mutex<CheckState>>,
}

impl TimeSource {
    pub fn new(
        local: Arc<dyn LocalClock>,
        reference: Option<Arc<dyn ReferenceClock>>,
        refresh_interval: Duration,
        drift_warning_secs: i64,
    ) -> Self {
        Self {
            local,
            reference,
            refresh_interval,
            drift_warning_secs,
            state: Arc::new(Mutex::new(CheckState::default())),
        }
    }

    /// System clock, plus the configured reference clock when enabled.
    pub fn from_config(cfg: &ClockConfig) -> Self {
        let reference: Option<Arc<dyn ReferenceClock>> = cfg.enabled.then(|| {
            Arc::new(TimeApiClock::new(
                cfg.reference_url.clone(),
                Duration::from_secs(cfg.timeout_secs),
            )) as Arc<dyn ReferenceClock>
        });
        Self::new(
            Arc::new(SystemClock),
            reference,
            Duration::from_secs(cfg.refresh_interval_secs),
            cfg.drift_warning_secs,
        )
    }

    /// Local-clock only; used when no reference check is wanted.
    pub fn local_only(local: Arc<dyn LocalClock>) -> Self {
        Self::new(local, None, Duration::MAX, i64::MAX)
    }

    /// Current instant expressed in `zone`.
    ///
    /// Returns immediately. May spawn a background reference check on the
    /// ambient tokio runtime; outside a runtime the check is skipped.
    pub fn now(&self, zone: Tz) -> DateTime<Tz> {
        let now = self.local.now();
        self.maybe_verify(zone);
        now.with_timezone(&zone)
    }

    /// Last successful reference reading, if any. Advisory only.
    pub fn last_reading(&self) -> Option<ClockReading> {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .last_reading
            .clone()
    }

    fn maybe_verify(&self, zone: Tz) {
        let Some(reference) = self.reference.clone() else {
            return;
        };
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            return;
        };

        {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            let due = state
                .last_attempt
                .map_or(true, |at| at.elapsed() >= self.refresh_interval);
            if !due || state.in_flight {
                return;
            }
            state.last_attempt = Some(Instant::now());
            state.in_flight = true;
        }

        let state = Arc::clone(&self.state);
        let local = Arc::clone(&self.local);
        let threshold = self.drift_warning_secs;
        runtime.spawn(async move {
            let result = reference.fetch(zone).await;
            let mut state = state.lock().unwrap_or_else(PoisonError::into_inner);
            state.in_flight = false;
            match result {
                Ok(reference_now) => {
                    let local_now = local.now();
                    let drift_secs = (local_now - reference_now).num_seconds();
                    if drift_secs.abs() > threshold {
                        warn!(
                            drift_secs,
                            %zone,
                            "local clock drifted from reference time; continuing with local clock"
                        );
                    } else {
                        debug!(drift_secs, %zone, "reference clock check ok");
                    }
                    state.last_reading = Some(ClockReading {
                        zone: zone.name().to_string(),
                        reference: reference_now,
                        local: local_now,
                        drift_secs,
                    });
                }
                Err(e) => debug!(error = %e, "reference clock check failed; using local clock"),
            }
        });
    }
}

/// Settable clock for tests.
pub struct FixedClock(Mutex<DateTime<Utc>>);

impl FixedClock {
    pub fn new(at: DateTime<Utc>) -> Self {
        Self(Mutex::new(at))
    }

    pub fn set(&self, at: DateTime<Utc>) {
        *self.0.lock().unwrap_or_else(PoisonError::into_inner) = at;
    }

    pub fn advance(&self, by: chrono::Duration) {
        let mut at = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        *at += by;
    }
}

impl LocalClock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        *self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
