//! Schema DDL and `PRAGMA user_version` migrations for the sync database.

use rusqlite::Connection;

use super::error::StoreError;

/// Schema version stamped into `PRAGMA user_version`. Bump on any DDL change.
pub const SCHEMA_VERSION: i32 = 1;

/// Version 1 DDL.
///
/// Timestamps are stored as Unix epoch milliseconds. The handle set is a
/// comma-delimited decimal string so the column stays greppable with plain
/// sqlite3 tooling.
const SCHEMA_V1: &str = r#"
CREATE TABLE IF NOT EXISTS sync_devices (
    identity_key TEXT PRIMARY KEY NOT NULL,
    display_name TEXT NOT NULL DEFAULT '',
    product_name TEXT NOT NULL DEFAULT '',
    manufacturer_name TEXT NOT NULL DEFAULT '',
    vendor_id INTEGER NOT NULL DEFAULT 0,
    product_id INTEGER NOT NULL DEFAULT 0,
    internal_device_id INTEGER NOT NULL DEFAULT 0,
    serial_number TEXT NOT NULL DEFAULT '',
    firmware_version TEXT NOT NULL DEFAULT '',
    synced_handles TEXT NOT NULL DEFAULT '',
    is_syncing INTEGER NOT NULL DEFAULT 0,
    first_sync_at INTEGER,
    updated_at INTEGER NOT NULL,
    created_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_sync_devices_is_syncing ON sync_devices(is_syncing);
"#;

/// Read the schema version stamped in the database. Fresh files read as 0.
pub(crate) fn get_schema_version(conn: &Connection) -> Result<i32, StoreError> {
    let version: i32 = conn.pragma_query_value(None, "user_version", |row| row.get(0))?;
    Ok(version)
}

fn set_schema_version(conn: &Connection, version: i32) -> Result<(), StoreError> {
    conn.pragma_update(None, "user_version", version)?;
    Ok(())
}

/// Create or upgrade the schema. Idempotent, safe on fresh and existing
/// databases alike; a database stamped with a version newer than this build
/// is rejected rather than touched.
pub(crate) fn migrate(conn: &Connection) -> Result<(), StoreError> {
    let current = get_schema_version(conn)?;

    if current > SCHEMA_VERSION {
        return Err(StoreError::UnsupportedSchemaVersion {
            found: current,
            expected: SCHEMA_VERSION,
        });
    }
    if current == SCHEMA_VERSION {
        return Ok(());
    }

    // Version 0 is a fresh (or pre-versioning) database and gets the full
    // DDL, which is IF NOT EXISTS throughout. Later versions add their
    // ALTER steps here, gated on the range being crossed.
    conn.execute_batch(SCHEMA_V1)?;
    set_schema_version(conn, SCHEMA_VERSION)?;
    tracing::debug!(
        from = current,
        to = SCHEMA_VERSION,
        "Sync database schema migrated"
    );
    Ok(())
}
