use chrono::{DateTime, Duration};
use chrono_tz::Tz;
use reelqueue_core::TenantId;
use reelqueue_store::{Item, ItemStatus, QueueStore, StoreError};
use tracing::{debug, info};

/// Where a pending item stands relative to its publication window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    NotDue,
    Due,
    /// Past the window; `late_minutes` counts from the window's end.
    Missed { late_minutes: i64 },
}

/// Error text recorded on an item that missed its window.
pub fn missed_message(late_minutes: i64) -> String {
    format!("Missed ({late_minutes}m late)")
}

/// Decides whether a pending item should be published now.
#[derive(Debug, Clone, Copy)]
pub struct ReadinessEvaluator {
    window: Duration,
}

impl ReadinessEvaluator {
    pub fn new(window: Duration) -> Self {
        Self { window }
    }

    pub fn from_minutes(minutes: i64) -> Self {
        Self::new(Duration::minutes(minutes))
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Pure classification. `now` may be in any zone; it is re-expressed in
    /// the item's zone and compared as an absolute instant.
    pub fn classify(&self, item: &Item, now: &DateTime<Tz>) -> Readiness {
        if item.status != ItemStatus::Pending {
            return Readiness::NotDue;
        }
        let Some(scheduled_at) = item.scheduled_at else {
            return Readiness::NotDue;
        };

        let now = now.with_timezone(&item.timezone);
        let scheduled = scheduled_at.with_timezone(&item.timezone);
        let diff = now.signed_duration_since(scheduled);

        if diff < Duration::zero() {
            Readiness::NotDue
        } else if diff <= self.window {
            Readiness::Due
        } else {
            let late_secs = (diff - self.window).num_seconds();
            Readiness::Missed {
                late_minutes: (late_secs + 30) / 60,
            }
        }
    }

    /// Classify and, for a missed item, fail it in the store.
    ///
    /// A concurrent claim or removal wins over the missed write.
    pub fn evaluate(
        &self,
        store: &dyn QueueStore,
        tenant: &TenantId,
        item: &Item,
        now: &DateTime<Tz>,
    ) -> Result<Readiness, StoreError> {
        let readiness = self.classify(item, now);
        let Readiness::Missed { late_minutes } = readiness else {
            return Ok(readiness);
        };

        let message = missed_message(late_minutes);
        match store.expire_pending(tenant, &item.id, &message)? {
            Some(_) => {
                info!(tenant = %tenant, item_id = %item.id, late_minutes, "item missed its window");
            }
            None => {
                debug!(
                    tenant = %tenant,
                    item_id = %item.id,
                    "missed item was claimed or removed concurrently; skipping"
                );
            }
        }
        Ok(readiness)
    }
}

impl Default for ReadinessEvaluator {
    fn default() -> Self {
        Self::from_minutes(reelqueue_core::config::UPLOAD_WINDOW_MINS)
    }
}
