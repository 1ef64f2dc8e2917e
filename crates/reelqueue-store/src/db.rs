use rusqlite::Connection;

use crate::error::Result;

/// Initialise the queue schema in `conn`.
///
/// Idempotent. The partial unique index on `(tenant_id) WHERE status =
/// 'processing'` makes a second concurrently processing item for the same
/// tenant unrepresentable, whatever the caller does.
pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS tenants (
            id          TEXT    NOT NULL PRIMARY KEY,
            settings    TEXT    NOT NULL,   -- JSON-encoded Settings document
            created_at  TEXT    NOT NULL,
            updated_at  TEXT    NOT NULL
        ) STRICT;

        CREATE TABLE IF NOT EXISTS items (
            seq           INTEGER PRIMARY KEY AUTOINCREMENT,  -- creation order
            id            TEXT    NOT NULL,
            tenant_id     TEXT    NOT NULL REFERENCES tenants(id) ON DELETE CASCADE,
            payload_path  TEXT    NOT NULL,
            filename      TEXT    NOT NULL,
            title         TEXT    NOT NULL,
            description   TEXT    NOT NULL DEFAULT '',
            tags          TEXT    NOT NULL DEFAULT '[]',  -- JSON array
            kind          TEXT    NOT NULL,
            scheduled_at  TEXT,                           -- RFC 3339 UTC or NULL
            timezone      TEXT    NOT NULL,
            status        TEXT    NOT NULL DEFAULT 'pending',
            error         TEXT,
            created_at    TEXT    NOT NULL,
            updated_at    TEXT    NOT NULL,
            UNIQUE (tenant_id, id)
        ) STRICT;

        CREATE INDEX IF NOT EXISTS idx_items_tenant_status
            ON items (tenant_id, status, seq);

        CREATE UNIQUE INDEX IF NOT EXISTS idx_items_one_processing
            ON items (tenant_id) WHERE status = 'processing';
        ",
    )?;
    Ok(())
}
