use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use reelqueue_core::config::TICK_INTERVAL_SECS;
use reelqueue_core::TenantId;
use reelqueue_store::{Item, ItemStatus, QueueStore, StoreError};
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::clock::TimeSource;
use crate::driver::UploadDriver;
use crate::readiness::{Readiness, ReadinessEvaluator};

/// Error recorded on items found `processing` when the engine starts.
pub const INTERRUPTED_MESSAGE: &str = "Interrupted (server restarted during upload)";

/// Error prefix used when the upload result itself could not be stored.
pub const RECORD_FAILED_MESSAGE: &str = "Could not record upload result";

const STATUS_WRITE_ATTEMPTS: u32 = 3;
const STATUS_WRITE_BACKOFF: Duration = Duration::from_millis(500);

/// Counters for one pass over all tenants.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TickReport {
    pub tenants: usize,
    pub uploaded: usize,
    pub failed: usize,
    pub missed: usize,
    /// Tenants skipped because another upload held their lock.
    pub skipped: usize,
    /// Tenants whose pass aborted on a store error.
    pub errors: usize,
}

#[derive(Debug, Default)]
enum Outcome {
    #[default]
    Idle,
    Busy,
    Uploaded,
    Failed,
}

#[derive(Debug, Default)]
struct TenantPass {
    missed: usize,
    outcome: Outcome,
}

/// Periodic driver: detects due items and publishes at most one per tenant
/// per tick.
pub struct SchedulerEngine {
    store: Arc<dyn QueueStore>,
    time: Arc<TimeSource>,
    evaluator: ReadinessEvaluator,
    driver: UploadDriver,
    tick_interval: Duration,
}

impl SchedulerEngine {
    pub fn new(store: Arc<dyn QueueStore>, time: Arc<TimeSource>, driver: UploadDriver) -> Self {
        Self {
            store,
            time,
            evaluator: ReadinessEvaluator::default(),
            driver,
            tick_interval: Duration::from_secs(TICK_INTERVAL_SECS),
        }
    }

    pub fn with_evaluator(mut self, evaluator: ReadinessEvaluator) -> Self {
        self.evaluator = evaluator;
        self
    }

    pub fn with_tick_interval(mut self, tick_interval: Duration) -> Self {
        self.tick_interval = tick_interval;
        self
    }

    pub fn time(&self) -> &Arc<TimeSource> {
        &self.time
    }

    /// Recover interrupted uploads, then run a tick every `tick_interval`
    /// until the returned handle is stopped or dropped.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(self: Arc<Self>) -> SchedulerHandle {
        match self.store.fail_processing(INTERRUPTED_MESSAGE) {
            Ok(n) if n > 0 => warn!(count = n, "interrupted uploads marked failed on startup"),
            Err(e) => error!("startup recovery failed: {e}"),
            _ => {}
        }

        let (shutdown, mut rx) = watch::channel(false);
        let engine = self;
        let task = tokio::spawn(async move {
            info!(
                interval_secs = engine.tick_interval.as_secs(),
                "scheduler engine started"
            );
            let mut interval = tokio::time::interval(engine.tick_interval);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        // Ticks are independent tasks; an in-flight upload
                        // never delays the next one.
                        let engine = Arc::clone(&engine);
                        tokio::spawn(async move {
                            engine.tick().await;
                        });
                    }
                    changed = rx.changed() => {
                        if changed.is_err() || *rx.borrow() {
                            info!("scheduler engine shutting down");
                            break;
                        }
                    }
                }
            }
        });

        SchedulerHandle {
            shutdown,
            task: Some(task),
        }
    }

    /// One pass over every tenant. Tenants run concurrently; a failing
    /// tenant never aborts the others.
    pub async fn tick(&self) -> TickReport {
        let tenants = match self.store.list_tenants() {
            Ok(t) => t,
            Err(e) => {
                error!("scheduler tick could not list tenants: {e}");
                return TickReport {
                    errors: 1,
                    ..Default::default()
                };
            }
        };

        let passes = join_all(tenants.iter().map(|t| self.process_tenant(t))).await;

        let mut report = TickReport {
            tenants: tenants.len(),
            ..Default::default()
        };
        for (tenant, pass) in tenants.iter().zip(passes) {
            match pass {
                Ok(pass) => {
                    report.missed += pass.missed;
                    match pass.outcome {
                        Outcome::Idle => {}
                        Outcome::Busy => report.skipped += 1,
                        Outcome::Uploaded => report.uploaded += 1,
                        Outcome::Failed => report.failed += 1,
                    }
                }
                Err(e) => {
                    error!(tenant = %tenant, "tenant pass failed: {e}");
                    report.errors += 1;
                }
            }
        }

        if report.uploaded + report.failed + report.missed > 0 {
            info!(?report, "scheduler tick complete");
        } else {
            debug!(?report, "scheduler tick complete");
        }
        report
    }

    async fn process_tenant(&self, tenant: &TenantId) -> Result<TenantPass, StoreError> {
        let mut pass = TenantPass::default();
        let items = self.store.list(tenant)?;

        for item in items.iter().filter(|i| i.status == ItemStatus::Pending) {
            let now = self.time.now(item.timezone);
            match self.evaluator.evaluate(self.store.as_ref(), tenant, item, &now)? {
                Readiness::NotDue => {}
                Readiness::Missed { .. } => pass.missed += 1,
                Readiness::Due => {
                    let Some(claimed) = self.store.try_lock(tenant, Some(&item.id))? else {
                        debug!(tenant = %tenant, item_id = %item.id, "tenant busy; skipping this tick");
                        pass.outcome = Outcome::Busy;
                        return Ok(pass);
                    };
                    pass.outcome = self.publish(tenant, &claimed).await?;
                    return Ok(pass);
                }
            }
        }
        Ok(pass)
    }

    async fn publish(&self, tenant: &TenantId, item: &Item) -> Result<Outcome, StoreError> {
        info!(tenant = %tenant, item_id = %item.id, title = %item.title, "uploading");

        let (status, error, outcome) = match self.driver.upload(tenant, item).await {
            Ok(published) => {
                info!(
                    tenant = %tenant,
                    item_id = %item.id,
                    video_id = %published.video_id,
                    url = %published.url,
                    "upload complete"
                );
                (ItemStatus::Uploaded, None, Outcome::Uploaded)
            }
            Err(failure) => {
                warn!(tenant = %tenant, item_id = %item.id, err = %failure, "upload failed");
                (ItemStatus::Failed, Some(failure.to_string()), Outcome::Failed)
            }
        };

        match self.record(tenant, &item.id, status, error.as_deref()).await {
            Ok(()) => Ok(outcome),
            Err(e) => {
                error!(tenant = %tenant, item_id = %item.id, %status, "could not record upload result: {e}");
                // a claimed item must never stay `processing`
                let reason = format!("{RECORD_FAILED_MESSAGE}: {e}");
                match self.store.set_status(tenant, &item.id, ItemStatus::Failed, Some(&reason)) {
                    Ok(_) => Ok(Outcome::Failed),
                    Err(e) => {
                        error!(tenant = %tenant, item_id = %item.id, "item left processing: {e}");
                        Err(e)
                    }
                }
            }
        }
    }

    /// Terminal status write, retried on store errors.
    async fn record(
        &self,
        tenant: &TenantId,
        id: &str,
        status: ItemStatus,
        error: Option<&str>,
    ) -> Result<(), StoreError> {
        let mut attempt = 1;
        loop {
            match self.store.set_status(tenant, id, status, error) {
                Ok(Some(_)) => return Ok(()),
                Ok(None) => {
                    debug!(tenant = %tenant, item_id = %id, "item removed during upload");
                    return Ok(());
                }
                Err(e) if attempt < STATUS_WRITE_ATTEMPTS => {
                    warn!(tenant = %tenant, item_id = %id, attempt, "status write failed: {e}");
                    tokio::time::sleep(STATUS_WRITE_BACKOFF).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// Owned lifecycle handle returned by [`SchedulerEngine::start`].
///
/// Dropping the handle stops the loop. Uploads already in flight run to
/// completion.
pub struct SchedulerHandle {
    shutdown: watch::Sender<bool>,
    task: Option<JoinHandle<()>>,
}

impl SchedulerHandle {
    /// Signal the loop to stop. Safe to call any number of times.
    pub fn stop(&self) {
        self.shutdown.send_replace(true);
    }

    pub fn is_stopped(&self) -> bool {
        *self.shutdown.borrow()
    }

    /// Stop and wait for the loop task to exit.
    pub async fn join(mut self) {
        self.stop();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                error!("scheduler task ended abnormally: {e}");
            }
        }
    }
}

impl Drop for SchedulerHandle {
    fn drop(&mut self) {
        self.stop();
    }
}
