use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use reelqueue_core::{parse_timezone, TenantId};
use rusqlite::{types::Type, Connection, OptionalExtension, TransactionBehavior};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::db::init_db;
use crate::error::{Result, StoreError};
use crate::types::{Item, ItemStatus, MediaKind, NewItem, Settings};

/// Error text stored when a caller fails an item without saying why.
const DEFAULT_FAILURE: &str = "Upload failed";

const ITEM_COLUMNS: &str = "id, payload_path, filename, title, description, tags, kind,
     scheduled_at, timezone, status, error, created_at, updated_at";

/// Tenant-scoped durable queue of upload items plus per-tenant settings.
///
/// Every method is atomic with respect to every other caller, including
/// callers holding a different handle on the same backing store.
pub trait QueueStore: Send + Sync {
    /// All items of `tenant`, in creation order.
    fn list(&self, tenant: &TenantId) -> Result<Vec<Item>>;

    fn get(&self, tenant: &TenantId, id: &str) -> Result<Option<Item>>;

    /// Append a new pending item. Rejects items without payload or kind.
    fn add(&self, tenant: &TenantId, item: NewItem) -> Result<Item>;

    /// Move an item along the state machine.
    ///
    /// Returns `Ok(None)` when the id is unknown. Repeating the current
    /// status with the same error is a no-op; leaving a terminal state is an
    /// `InvalidTransition` error. Claiming (`Processing`) goes through
    /// [`QueueStore::try_lock`] only.
    fn set_status(
        &self,
        tenant: &TenantId,
        id: &str,
        status: ItemStatus,
        error: Option<&str>,
    ) -> Result<Option<Item>>;

    /// Claim an item for exclusive processing.
    ///
    /// Succeeds only if nothing else of this tenant is `Processing`. With
    /// `id` that item must be pending; without, the oldest pending item is
    /// claimed. `Ok(None)` on any failure to claim.
    fn try_lock(&self, tenant: &TenantId, id: Option<&str>) -> Result<Option<Item>>;

    /// Fail `id` with `reason` only if it is still pending.
    ///
    /// `Ok(None)` when the item is gone or has moved on (claimed or already
    /// terminal); the caller's view of it was stale.
    fn expire_pending(&self, tenant: &TenantId, id: &str, reason: &str) -> Result<Option<Item>>;

    /// Delete every item in `status` and release their payloads.
    fn clear_by_status(&self, tenant: &TenantId, status: ItemStatus) -> Result<usize>;

    /// Delete one item regardless of status and release its payload.
    fn remove(&self, tenant: &TenantId, id: &str) -> Result<bool>;

    fn list_tenants(&self) -> Result<Vec<TenantId>>;

    /// Register a tenant with empty settings. No-op if it already exists.
    fn ensure_tenant(&self, tenant: &TenantId) -> Result<()>;

    fn settings(&self, tenant: &TenantId) -> Result<Settings>;

    /// Read-modify-write of the settings document as one atomic replace.
    fn update_settings(
        &self,
        tenant: &TenantId,
        apply: &mut dyn FnMut(&mut Settings),
    ) -> Result<Settings>;

    /// Restore the settings document to its empty default.
    fn reset_settings(&self, tenant: &TenantId) -> Result<()>;

    /// Fail every `Processing` item of every tenant with `reason`.
    ///
    /// Only safe while no upload is in flight, i.e. before the scheduler
    /// starts.
    fn fail_processing(&self, reason: &str) -> Result<usize>;
}

/// SQLite-backed [`QueueStore`].
///
/// Wraps one connection in a `Mutex`; writes that read before they write run
/// in `BEGIN IMMEDIATE` transactions so that a second process or connection on
/// the same file is serialized too.
pub struct SqliteQueueStore {
    db: Mutex<Connection>,
}

impl SqliteQueueStore {
    /// Open (creating if needed) a database file and initialise the schema.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
        conn.busy_timeout(Duration::from_secs(5))?;
        Self::new(conn)
    }

    /// Private in-memory database, used by tests and ephemeral runs.
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Self::new(conn)
    }

    /// Wrap an already-open connection, initialising the schema.
    pub fn new(conn: Connection) -> Result<Self> {
        init_db(&conn)?;
        Ok(Self {
            db: Mutex::new(conn),
        })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.db.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl QueueStore for SqliteQueueStore {
    #[instrument(skip(self), fields(tenant = %tenant))]
    fn list(&self, tenant: &TenantId) -> Result<Vec<Item>> {
        let conn = self.conn();
        let mut stmt = conn.prepare_cached(&format!(
            "SELECT {ITEM_COLUMNS} FROM items WHERE tenant_id = ?1 ORDER BY seq"
        ))?;
        let items = stmt
            .query_map([tenant.as_str()], row_to_item)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(items)
    }

    fn get(&self, tenant: &TenantId, id: &str) -> Result<Option<Item>> {
        let conn = self.conn();
        select_item(&conn, tenant, id)
    }

    #[instrument(skip(self, item), fields(tenant = %tenant))]
    fn add(&self, tenant: &TenantId, item: NewItem) -> Result<Item> {
        let payload_path = item
            .payload_path
            .filter(|p| !p.as_os_str().is_empty())
            .ok_or_else(|| StoreError::Validation("payload reference is required".into()))?;
        let kind = item
            .kind
            .ok_or_else(|| StoreError::Validation("media kind is required".into()))?;
        let title = item.title.trim().to_string();
        if title.is_empty() {
            return Err(StoreError::Validation("title is required".into()));
        }
        let timezone =
            parse_timezone(&item.timezone).map_err(|e| StoreError::Validation(e.to_string()))?;
        let tags: Vec<String> = item
            .tags
            .into_iter()
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .collect();

        let now = Utc::now();
        let now_str = now.to_rfc3339();
        let id = Uuid::now_v7().to_string();

        let conn = self.conn();
        insert_tenant(&conn, tenant, &now_str)?;
        conn.execute(
            "INSERT INTO items
             (id, tenant_id, payload_path, filename, title, description, tags, kind,
              scheduled_at, timezone, status, error, created_at, updated_at)
             VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,'pending',NULL,?11,?11)",
            rusqlite::params![
                id,
                tenant.as_str(),
                payload_path.to_string_lossy(),
                item.filename,
                title,
                item.description,
                serde_json::to_string(&tags)?,
                kind.as_str(),
                item.scheduled_at.map(|t| t.to_rfc3339()),
                timezone.name(),
                now_str,
            ],
        )?;

        info!(item_id = %id, %title, %kind, "item queued");

        Ok(Item {
            id,
            payload_path,
            filename: item.filename,
            title,
            description: item.description,
            tags,
            kind,
            scheduled_at: item.scheduled_at,
            timezone,
            status: ItemStatus::Pending,
            error: None,
            created_at: now,
            updated_at: now,
        })
    }

    #[instrument(skip(self, error), fields(tenant = %tenant))]
    fn set_status(
        &self,
        tenant: &TenantId,
        id: &str,
        status: ItemStatus,
        error: Option<&str>,
    ) -> Result<Option<Item>> {
        if status == ItemStatus::Processing {
            return Err(StoreError::Validation(
                "items are claimed with try_lock, not set_status".into(),
            ));
        }

        let mut conn = self.conn();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let Some(current) = select_item(&tx, tenant, id)? else {
            debug!(item_id = %id, "set_status on unknown item");
            return Ok(None);
        };

        let error = match status {
            ItemStatus::Failed => Some(error.unwrap_or(DEFAULT_FAILURE).to_string()),
            _ => None,
        };

        if current.status == status && current.error == error {
            return Ok(Some(current));
        }
        if !current.status.can_transition_to(status) {
            return Err(StoreError::InvalidTransition {
                id: id.to_string(),
                from: current.status,
                to: status,
            });
        }

        let now = Utc::now();
        tx.execute(
            "UPDATE items SET status = ?1, error = ?2, updated_at = ?3
             WHERE tenant_id = ?4 AND id = ?5",
            rusqlite::params![status.as_str(), error, now.to_rfc3339(), tenant.as_str(), id],
        )?;
        tx.commit()?;

        info!(item_id = %id, from = %current.status, to = %status, "status changed");

        Ok(Some(Item {
            status,
            error,
            updated_at: now,
            ..current
        }))
    }

    #[instrument(skip(self), fields(tenant = %tenant))]
    fn try_lock(&self, tenant: &TenantId, id: Option<&str>) -> Result<Option<Item>> {
        let conn = self.conn();
        // One statement: the "nothing processing" check and the status write
        // cannot be interleaved with any other writer.
        let claimed = conn
            .query_row(
                &format!(
                    "UPDATE items SET status = 'processing', updated_at = ?3
                     WHERE seq = (
                         SELECT seq FROM items
                         WHERE tenant_id = ?1 AND status = 'pending'
                           AND (?2 IS NULL OR id = ?2)
                         ORDER BY seq LIMIT 1)
                       AND NOT EXISTS (
                         SELECT 1 FROM items
                         WHERE tenant_id = ?1 AND status = 'processing')
                     RETURNING {ITEM_COLUMNS}"
                ),
                rusqlite::params![tenant.as_str(), id, Utc::now().to_rfc3339()],
                row_to_item,
            )
            .optional();

        match claimed {
            Ok(Some(item)) => {
                info!(item_id = %item.id, "item locked for upload");
                Ok(Some(item))
            }
            Ok(None) => {
                debug!(requested = ?id, "lock not acquired");
                Ok(None)
            }
            // The partial unique index caught a racing writer on another
            // connection; that is a lost race, not a failure.
            Err(rusqlite::Error::SqliteFailure(e, _))
                if e.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                debug!(requested = ?id, "lock lost to concurrent claim");
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    #[instrument(skip(self, reason), fields(tenant = %tenant))]
    fn expire_pending(&self, tenant: &TenantId, id: &str, reason: &str) -> Result<Option<Item>> {
        let conn = self.conn();
        let expired = conn
            .query_row(
                &format!(
                    "UPDATE items SET status = 'failed', error = ?3, updated_at = ?4
                     WHERE tenant_id = ?1 AND id = ?2 AND status = 'pending'
                     RETURNING {ITEM_COLUMNS}"
                ),
                rusqlite::params![tenant.as_str(), id, reason, Utc::now().to_rfc3339()],
                row_to_item,
            )
            .optional()?;
        match &expired {
            Some(_) => info!(item_id = %id, %reason, "pending item failed"),
            None => debug!(item_id = %id, "expire skipped; item no longer pending"),
        }
        Ok(expired)
    }

    #[instrument(skip(self), fields(tenant = %tenant))]
    fn clear_by_status(&self, tenant: &TenantId, status: ItemStatus) -> Result<usize> {
        if status == ItemStatus::Processing {
            return Err(StoreError::Validation(
                "processing items cannot be cleared".into(),
            ));
        }

        let paths = {
            let mut conn = self.conn();
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let paths = {
                let mut stmt = tx.prepare(
                    "SELECT payload_path FROM items WHERE tenant_id = ?1 AND status = ?2",
                )?;
                let rows = stmt
                    .query_map([tenant.as_str(), status.as_str()], |row| {
                        row.get::<_, String>(0)
                    })?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                rows
            };
            tx.execute(
                "DELETE FROM items WHERE tenant_id = ?1 AND status = ?2",
                [tenant.as_str(), status.as_str()],
            )?;
            tx.commit()?;
            paths
        };

        for path in &paths {
            release_payload(Path::new(path));
        }
        info!(%status, count = paths.len(), "items cleared");
        Ok(paths.len())
    }

    #[instrument(skip(self), fields(tenant = %tenant))]
    fn remove(&self, tenant: &TenantId, id: &str) -> Result<bool> {
        let path = {
            let mut conn = self.conn();
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let path: Option<String> = tx
                .query_row(
                    "SELECT payload_path FROM items WHERE tenant_id = ?1 AND id = ?2",
                    [tenant.as_str(), id],
                    |row| row.get(0),
                )
                .optional()?;
            if path.is_some() {
                tx.execute(
                    "DELETE FROM items WHERE tenant_id = ?1 AND id = ?2",
                    [tenant.as_str(), id],
                )?;
                tx.commit()?;
            }
            path
        };

        match path {
            Some(path) => {
                release_payload(Path::new(&path));
                info!(item_id = %id, "item removed");
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn list_tenants(&self) -> Result<Vec<TenantId>> {
        let conn = self.conn();
        let mut stmt = conn.prepare_cached("SELECT id FROM tenants ORDER BY created_at, id")?;
        let tenants = stmt
            .query_map([], |row| row.get::<_, String>(0).map(TenantId))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(tenants)
    }

    fn ensure_tenant(&self, tenant: &TenantId) -> Result<()> {
        let conn = self.conn();
        insert_tenant(&conn, tenant, &Utc::now().to_rfc3339())
    }

    fn settings(&self, tenant: &TenantId) -> Result<Settings> {
        let conn = self.conn();
        let doc: Option<String> = conn
            .query_row(
                "SELECT settings FROM tenants WHERE id = ?1",
                [tenant.as_str()],
                |row| row.get(0),
            )
            .optional()?;
        match doc {
            Some(doc) => Ok(serde_json::from_str(&doc)?),
            None => Ok(Settings::default()),
        }
    }

    #[instrument(skip(self, apply), fields(tenant = %tenant))]
    fn update_settings(
        &self,
        tenant: &TenantId,
        apply: &mut dyn FnMut(&mut Settings),
    ) -> Result<Settings> {
        let now = Utc::now().to_rfc3339();
        let mut conn = self.conn();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        insert_tenant(&tx, tenant, &now)?;

        let doc: String = tx.query_row(
            "SELECT settings FROM tenants WHERE id = ?1",
            [tenant.as_str()],
            |row| row.get(0),
        )?;
        let mut settings: Settings = serde_json::from_str(&doc)?;
        apply(&mut settings);

        tx.execute(
            "UPDATE tenants SET settings = ?1, updated_at = ?2 WHERE id = ?3",
            rusqlite::params![serde_json::to_string(&settings)?, now, tenant.as_str()],
        )?;
        tx.commit()?;
        debug!("settings replaced");
        Ok(settings)
    }

    #[instrument(skip(self), fields(tenant = %tenant))]
    fn reset_settings(&self, tenant: &TenantId) -> Result<()> {
        self.update_settings(tenant, &mut |s| *s = Settings::default())?;
        info!("settings reset");
        Ok(())
    }

    fn fail_processing(&self, reason: &str) -> Result<usize> {
        let conn = self.conn();
        let n = conn.execute(
            "UPDATE items SET status = 'failed', error = ?1, updated_at = ?2
             WHERE status = 'processing'",
            rusqlite::params![reason, Utc::now().to_rfc3339()],
        )?;
        if n > 0 {
            warn!(count = n, %reason, "processing items failed");
        }
        Ok(n)
    }
}

// --- private helpers -------------------------------------------------------

fn insert_tenant(conn: &Connection, tenant: &TenantId, now: &str) -> Result<()> {
    let inserted = conn.execute(
        "INSERT OR IGNORE INTO tenants (id, settings, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?3)",
        rusqlite::params![
            tenant.as_str(),
            serde_json::to_string(&Settings::default())?,
            now
        ],
    )?;
    if inserted > 0 {
        info!(tenant = %tenant, "tenant registered");
    }
    Ok(())
}

fn select_item(conn: &Connection, tenant: &TenantId, id: &str) -> Result<Option<Item>> {
    let item = conn
        .query_row(
            &format!("SELECT {ITEM_COLUMNS} FROM items WHERE tenant_id = ?1 AND id = ?2"),
            [tenant.as_str(), id],
            row_to_item,
        )
        .optional()?;
    Ok(item)
}

/// Delete a payload file owned by a removed item. Already-gone files are fine.
fn release_payload(path: &Path) {
    match std::fs::remove_file(path) {
        Ok(()) => debug!(path = %path.display(), "payload released"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!(path = %path.display(), error = %e, "failed to release payload"),
    }
}

/// Map a row selected with `ITEM_COLUMNS` to an `Item`.
fn row_to_item(row: &rusqlite::Row<'_>) -> rusqlite::Result<Item> {
    let tags: String = row.get(5)?;
    let kind: String = row.get(6)?;
    let scheduled_at: Option<String> = row.get(7)?;
    let timezone: String = row.get(8)?;
    let status: String = row.get(9)?;
    let created_at: String = row.get(11)?;
    let updated_at: String = row.get(12)?;

    Ok(Item {
        id: row.get(0)?,
        payload_path: PathBuf::from(row.get::<_, String>(1)?),
        filename: row.get(2)?,
        title: row.get(3)?,
        description: row.get(4)?,
        tags: serde_json::from_str(&tags).map_err(|e| conversion(5, e.to_string()))?,
        kind: kind.parse::<MediaKind>().map_err(|e| conversion(6, e))?,
        scheduled_at: scheduled_at.map(|s| parse_ts(7, &s)).transpose()?,
        timezone: parse_timezone(&timezone).map_err(|e| conversion(8, e.to_string()))?,
        status: status.parse::<ItemStatus>().map_err(|e| conversion(9, e))?,
        error: row.get(10)?,
        created_at: parse_ts(11, &created_at)?,
        updated_at: parse_ts(12, &updated_at)?,
    })
}

fn parse_ts(idx: usize, raw: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| conversion(idx, e.to_string()))
}

fn conversion(idx: usize, msg: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, msg.into())
}
