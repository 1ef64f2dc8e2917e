#![allow(dead_code)]

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use reelqueue_core::TenantId;
use reelqueue_scheduler::{
    AuthError, Authorizer, FixedClock, PublishError, Published, Publisher, RetryPolicy,
    SchedulerEngine, TimeSource, UploadDriver, UploadRequest,
};
use reelqueue_store::{
    Item, ItemStatus, MediaKind, NewItem, QueueStore, Settings, SqliteQueueStore, StoreError,
};
use tempfile::TempDir;

pub fn epoch() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 6, 1, 9, 0, 0).unwrap()
}

/// Publisher that replays a script of outcomes and records every call.
#[derive(Default)]
pub struct ScriptedPublisher {
    script: Mutex<VecDeque<Result<Published, PublishError>>>,
    calls: Mutex<Vec<UploadRequest>>,
    tokens: Mutex<Vec<String>>,
}

impl ScriptedPublisher {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn push(&self, outcome: Result<Published, PublishError>) {
        self.script.lock().unwrap().push_back(outcome);
    }

    pub fn calls(&self) -> Vec<UploadRequest> {
        self.calls.lock().unwrap().clone()
    }

    pub fn tokens(&self) -> Vec<String> {
        self.tokens.lock().unwrap().clone()
    }
}

#[async_trait]
impl Publisher for ScriptedPublisher {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn publish(&self, token: &str, req: &UploadRequest) -> Result<Published, PublishError> {
        self.calls.lock().unwrap().push(req.clone());
        self.tokens.lock().unwrap().push(token.to_string());
        let n = self.calls.lock().unwrap().len();
        self.script.lock().unwrap().pop_front().unwrap_or_else(|| {
            Ok(Published {
                video_id: format!("vid{n}"),
                url: format!("https://youtu.be/vid{n}"),
            })
        })
    }
}

/// Authorizer with a fixed answer per tenant; counts requests.
#[derive(Default)]
pub struct StaticAuthorizer {
    denied: Mutex<Vec<TenantId>>,
    requests: Mutex<usize>,
}

impl StaticAuthorizer {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn deny(&self, tenant: &TenantId) {
        self.denied.lock().unwrap().push(tenant.clone());
    }

    pub fn requests(&self) -> usize {
        *self.requests.lock().unwrap()
    }
}

#[async_trait]
impl Authorizer for StaticAuthorizer {
    async fn access_token(&self, tenant: &TenantId) -> Result<String, AuthError> {
        *self.requests.lock().unwrap() += 1;
        if self.denied.lock().unwrap().contains(tenant) {
            return Err(AuthError::NotConfigured);
        }
        Ok(format!("token-{tenant}"))
    }
}

/// Store whose first `failures` calls to `set_status` fail as a busy database.
pub struct FlakyStore {
    inner: Arc<SqliteQueueStore>,
    failures: Mutex<usize>,
    status_writes: Mutex<usize>,
}

impl FlakyStore {
    pub fn new(inner: Arc<SqliteQueueStore>, failures: usize) -> Arc<Self> {
        Arc::new(Self {
            inner,
            failures: Mutex::new(failures),
            status_writes: Mutex::new(0),
        })
    }

    pub fn status_writes(&self) -> usize {
        *self.status_writes.lock().unwrap()
    }
}

type StoreResult<T> = Result<T, StoreError>;

impl QueueStore for FlakyStore {
    fn list(&self, tenant: &TenantId) -> StoreResult<Vec<Item>> {
        self.inner.list(tenant)
    }

    fn get(&self, tenant: &TenantId, id: &str) -> StoreResult<Option<Item>> {
        self.inner.get(tenant, id)
    }

    fn add(&self, tenant: &TenantId, item: NewItem) -> StoreResult<Item> {
        self.inner.add(tenant, item)
    }

    fn set_status(
        &self,
        tenant: &TenantId,
        id: &str,
        status: ItemStatus,
        error: Option<&str>,
    ) -> StoreResult<Option<Item>> {
        *self.status_writes.lock().unwrap() += 1;
        {
            let mut failures = self.failures.lock().unwrap();
            if *failures > 0 {
                *failures -= 1;
                return Err(StoreError::Database(rusqlite::Error::SqliteFailure(
                    rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_BUSY),
                    Some("database is locked".into()),
                )));
            }
        }
        self.inner.set_status(tenant, id, status, error)
    }

    fn try_lock(&self, tenant: &TenantId, id: Option<&str>) -> StoreResult<Option<Item>> {
        self.inner.try_lock(tenant, id)
    }

    fn expire_pending(&self, tenant: &TenantId, id: &str, reason: &str) -> StoreResult<Option<Item>> {
        self.inner.expire_pending(tenant, id, reason)
    }

    fn clear_by_status(&self, tenant: &TenantId, status: ItemStatus) -> StoreResult<usize> {
        self.inner.clear_by_status(tenant, status)
    }

    fn remove(&self, tenant: &TenantId, id: &str) -> StoreResult<bool> {
        self.inner.remove(tenant, id)
    }

    fn list_tenants(&self) -> StoreResult<Vec<TenantId>> {
        self.inner.list_tenants()
    }

    fn ensure_tenant(&self, tenant: &TenantId) -> StoreResult<()> {
        self.inner.ensure_tenant(tenant)
    }

    fn settings(&self, tenant: &TenantId) -> StoreResult<Settings> {
        self.inner.settings(tenant)
    }

    fn update_settings(
        &self,
        tenant: &TenantId,
        apply: &mut dyn FnMut(&mut Settings),
    ) -> StoreResult<Settings> {
        self.inner.update_settings(tenant, apply)
    }

    fn reset_settings(&self, tenant: &TenantId) -> StoreResult<()> {
        self.inner.reset_settings(tenant)
    }

    fn fail_processing(&self, reason: &str) -> StoreResult<usize> {
        self.inner.fail_processing(reason)
    }
}

pub struct Harness {
    pub store: Arc<SqliteQueueStore>,
    pub clock: Arc<FixedClock>,
    pub publisher: Arc<ScriptedPublisher>,
    pub authorizer: Arc<StaticAuthorizer>,
    pub engine: Arc<SchedulerEngine>,
    pub payloads: TempDir,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_policy(RetryPolicy::default())
    }

    pub fn with_policy(policy: RetryPolicy) -> Self {
        let store = Arc::new(SqliteQueueStore::in_memory().unwrap());
        Self::build(store.clone(), store, policy)
    }

    /// The engine sees `engine_store`; assertions read `store` directly.
    pub fn with_engine_store(
        store: Arc<SqliteQueueStore>,
        engine_store: Arc<dyn QueueStore>,
    ) -> Self {
        Self::build(store, engine_store, RetryPolicy::default())
    }

    fn build(
        store: Arc<SqliteQueueStore>,
        engine_store: Arc<dyn QueueStore>,
        policy: RetryPolicy,
    ) -> Self {
        let clock = Arc::new(FixedClock::new(epoch()));
        let publisher = ScriptedPublisher::new();
        let authorizer = StaticAuthorizer::new();
        let driver = UploadDriver::new(authorizer.clone(), publisher.clone(), policy);
        let time = Arc::new(TimeSource::local_only(clock.clone()));
        let engine = Arc::new(
            SchedulerEngine::new(engine_store, time, driver)
                .with_tick_interval(Duration::from_secs(60)),
        );
        Self {
            store,
            clock,
            publisher,
            authorizer,
            engine,
            payloads: tempfile::tempdir().unwrap(),
        }
    }

    pub fn payload(&self, name: &str) -> PathBuf {
        let path = self.payloads.path().join(name);
        std::fs::write(&path, b"\x00\x00\x00\x18ftypmp42").unwrap();
        path
    }

    /// Queue an item scheduled `minutes_ago` minutes before the fixed clock.
    pub fn queue(&self, tenant: &TenantId, title: &str, minutes_ago: i64) -> Item {
        let payload = self.payload(&format!("{title}.mp4"));
        self.queue_with_payload(tenant, title, minutes_ago, payload)
    }

    pub fn queue_with_payload(
        &self,
        tenant: &TenantId,
        title: &str,
        minutes_ago: i64,
        payload: PathBuf,
    ) -> Item {
        self.store
            .add(
                tenant,
                NewItem {
                    payload_path: Some(payload),
                    filename: format!("{title}.mp4"),
                    title: title.to_string(),
                    description: format!("about {title}"),
                    tags: vec!["rust".into()],
                    kind: Some(MediaKind::Short),
                    scheduled_at: Some(epoch() - chrono::Duration::minutes(minutes_ago)),
                    timezone: "Asia/Karachi".into(),
                },
            )
            .unwrap()
    }

    pub fn item(&self, tenant: &TenantId, id: &str) -> Item {
        self.store.get(tenant, id).unwrap().unwrap()
    }
}
