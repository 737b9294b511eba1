//! Sync store trait and SQLite implementation.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use rusqlite::{Connection, OptionalExtension};

use crate::device::{DeviceDescriptor, DeviceIdentity};

use super::error::StoreError;
use super::schema;
use super::types::{decode_handles_or_empty, encode_handles, SyncRecord};

/// Trait for sync store operations.
///
/// This trait is object-safe and can be used with `Arc<dyn SyncStore>` for
/// shared access across async tasks.
///
/// Mutating operations are read-modify-write sequences over a single device
/// row. Implementations must not let two writers interleave on the same
/// identity key; `SqliteSyncStore` serializes every operation through one
/// connection guard, which covers that discipline for the whole store.
#[async_trait]
pub trait SyncStore: Send + Sync {
    /// Fetch the record for an identity, creating an idle one if absent.
    ///
    /// On an existing record the informational descriptor fields
    /// (display name, product, manufacturer, serial, firmware, attachment
    /// ids) are refreshed and `updated_at` is bumped; `synced_handles`,
    /// `is_syncing`, `first_sync_at` and `created_at` are left untouched.
    async fn resolve_or_create(
        &self,
        identity: &DeviceIdentity,
        descriptor: &DeviceDescriptor,
    ) -> Result<SyncRecord, StoreError>;

    /// Fetch a record without side effects.
    async fn get(&self, identity: &DeviceIdentity) -> Result<Option<SyncRecord>, StoreError>;

    /// Mark the device as syncing.
    ///
    /// Sets `first_sync_at` only if it was never set before, so resumed and
    /// repeated sessions keep the original first-sync timestamp.
    async fn begin_sync(&self, identity: &DeviceIdentity) -> Result<SyncRecord, StoreError>;

    /// Mark the device as idle.
    ///
    /// The handle set and `first_sync_at` are left as they are, so the next
    /// session resumes where this one stopped.
    async fn end_sync(&self, identity: &DeviceIdentity) -> Result<SyncRecord, StoreError>;

    /// Fold confirmed-complete file handles into the persisted set.
    ///
    /// Union semantics: handles already present stay present, so recording
    /// is idempotent and batches may arrive in any order. Handles for
    /// partial or failed transfers must never be passed here.
    async fn record_synced_handles(
        &self,
        identity: &DeviceIdentity,
        handles: &BTreeSet<u32>,
    ) -> Result<SyncRecord, StoreError>;

    /// Read the persisted handle set for an identity.
    ///
    /// An absent record reads as the empty set, as does empty or malformed
    /// stored state.
    async fn synced_handles(&self, identity: &DeviceIdentity)
        -> Result<BTreeSet<u32>, StoreError>;

    /// Delete the record for an identity, if present.
    ///
    /// Returns whether a record was actually deleted. The device starts
    /// from scratch on its next attachment.
    async fn remove(&self, identity: &DeviceIdentity) -> Result<bool, StoreError>;

    /// Every persisted record.
    async fn list_all(&self) -> Result<Vec<SyncRecord>, StoreError>;

    /// Insert or replace a batch of records inside one transaction.
    ///
    /// Used to load a previously exported snapshot; rows with matching
    /// identity keys are replaced wholesale.
    async fn upsert_all(&self, records: &[SyncRecord]) -> Result<(), StoreError>;
}

/// SQLite implementation of the sync store.
pub struct SqliteSyncStore {
    /// Wrapped in Mutex because rusqlite::Connection is not Sync. The guard
    /// is held for the whole of each read-modify-write sequence and never
    /// across an await.
    conn: Mutex<Connection>,
    /// Database file path, kept for error reporting.
    path: PathBuf,
}

impl std::fmt::Debug for SqliteSyncStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteSyncStore")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl SqliteSyncStore {
    /// Open or create the sync database at the given path.
    pub async fn open(path: &Path) -> Result<Self, StoreError> {
        let path = path.to_path_buf();
        let path_clone = path.clone();

        let conn = tokio::task::spawn_blocking(move || {
            let conn = Connection::open(&path_clone).map_err(|e| StoreError::Open {
                path: path_clone.clone(),
                source: e,
            })?;

            // WAL with NORMAL synchronous: readers don't block the writer,
            // and a power cut can lose recent commits but not corrupt.
            conn.pragma_update(None, "journal_mode", "WAL")
                .map_err(StoreError::Migration)?;
            conn.pragma_update(None, "synchronous", "NORMAL")
                .map_err(StoreError::Migration)?;

            schema::migrate(&conn)?;

            Ok::<_, StoreError>(conn)
        })
        .await??;

        Ok(Self {
            conn: Mutex::new(conn),
            path,
        })
    }

    /// In-memory database for tests.
    #[cfg(test)]
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory().map_err(|e| StoreError::Open {
            path: PathBuf::from(":memory:"),
            source: e,
        })?;
        schema::migrate(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            path: PathBuf::from(":memory:"),
        })
    }

    /// Path the store was opened at.
    #[cfg(test)]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl SyncStore for SqliteSyncStore {
    async fn resolve_or_create(
        &self,
        identity: &DeviceIdentity,
        descriptor: &DeviceDescriptor,
    ) -> Result<SyncRecord, StoreError> {
        let now_ms = Utc::now().timestamp_millis();

        let conn = self
            .conn
            .lock()
            .map_err(|e| StoreError::Query(e.to_string()))?;

        let existed: bool = conn
            .query_row(
                "SELECT 1 FROM sync_devices WHERE identity_key = ?1",
                [identity.as_str()],
                |_| Ok(()),
            )
            .optional()
            .map_err(StoreError::query)?
            .is_some();

        // Insert-or-refresh in one statement. On conflict only the
        // informational descriptor columns and updated_at are rewritten;
        // synced_handles, is_syncing, first_sync_at and created_at keep
        // their stored values.
        conn.execute(
            r#"
            INSERT INTO sync_devices (
                identity_key, display_name, product_name, manufacturer_name,
                vendor_id, product_id, internal_device_id, serial_number,
                firmware_version, synced_handles, is_syncing, first_sync_at,
                updated_at, created_at
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, '', 0, NULL, ?10, ?10)
            ON CONFLICT(identity_key) DO UPDATE SET
                display_name = excluded.display_name,
                product_name = excluded.product_name,
                manufacturer_name = excluded.manufacturer_name,
                vendor_id = excluded.vendor_id,
                product_id = excluded.product_id,
                internal_device_id = excluded.internal_device_id,
                serial_number = excluded.serial_number,
                firmware_version = excluded.firmware_version,
                updated_at = excluded.updated_at
            "#,
            rusqlite::params![
                identity.as_str(),
                &descriptor.display_name,
                &descriptor.product_name,
                &descriptor.manufacturer_name,
                descriptor.vendor_id,
                descriptor.product_id,
                descriptor.internal_device_id,
                descriptor.serial.for_record(),
                &descriptor.firmware_version,
                now_ms,
            ],
        )
        .map_err(StoreError::query)?;

        if !existed {
            tracing::debug!(identity = %identity, "Recorded new device");
        }

        require_record(&conn, identity)
    }

    async fn get(&self, identity: &DeviceIdentity) -> Result<Option<SyncRecord>, StoreError> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| StoreError::Query(e.to_string()))?;

        get_by_key(&conn, identity)
    }

    async fn begin_sync(&self, identity: &DeviceIdentity) -> Result<SyncRecord, StoreError> {
        let now_ms = Utc::now().timestamp_millis();

        let conn = self
            .conn
            .lock()
            .map_err(|e| StoreError::Query(e.to_string()))?;

        // COALESCE keeps the stored first-sync timestamp on every session
        // after the first.
        let rows = conn
            .execute(
                "UPDATE sync_devices SET is_syncing = 1, first_sync_at = COALESCE(first_sync_at, ?1), updated_at = ?1 WHERE identity_key = ?2",
                rusqlite::params![now_ms, identity.as_str()],
            )
            .map_err(StoreError::query)?;

        if rows == 0 {
            return Err(StoreError::not_found(identity.as_str()));
        }

        tracing::debug!(identity = %identity, "Sync session started");
        require_record(&conn, identity)
    }

    async fn end_sync(&self, identity: &DeviceIdentity) -> Result<SyncRecord, StoreError> {
        let now_ms = Utc::now().timestamp_millis();

        let conn = self
            .conn
            .lock()
            .map_err(|e| StoreError::Query(e.to_string()))?;

        let rows = conn
            .execute(
                "UPDATE sync_devices SET is_syncing = 0, updated_at = ?1 WHERE identity_key = ?2",
                rusqlite::params![now_ms, identity.as_str()],
            )
            .map_err(StoreError::query)?;

        if rows == 0 {
            return Err(StoreError::not_found(identity.as_str()));
        }

        tracing::debug!(identity = %identity, "Sync session ended");
        require_record(&conn, identity)
    }

    async fn record_synced_handles(
        &self,
        identity: &DeviceIdentity,
        handles: &BTreeSet<u32>,
    ) -> Result<SyncRecord, StoreError> {
        let now_ms = Utc::now().timestamp_millis();

        let conn = self
            .conn
            .lock()
            .map_err(|e| StoreError::Query(e.to_string()))?;

        let stored: Option<String> = conn
            .query_row(
                "SELECT synced_handles FROM sync_devices WHERE identity_key = ?1",
                [identity.as_str()],
                |row| row.get(0),
            )
            .optional()
            .map_err(StoreError::query)?;

        let mut merged = match stored {
            Some(encoded) => decode_handles_or_empty(&encoded),
            None => return Err(StoreError::not_found(identity.as_str())),
        };
        merged.extend(handles.iter().copied());

        conn.execute(
            "UPDATE sync_devices SET synced_handles = ?1, updated_at = ?2 WHERE identity_key = ?3",
            rusqlite::params![encode_handles(&merged), now_ms, identity.as_str()],
        )
        .map_err(StoreError::query)?;

        tracing::debug!(
            identity = %identity,
            recorded = handles.len(),
            total = merged.len(),
            "Recorded synced handles"
        );
        require_record(&conn, identity)
    }

    async fn synced_handles(
        &self,
        identity: &DeviceIdentity,
    ) -> Result<BTreeSet<u32>, StoreError> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| StoreError::Query(e.to_string()))?;

        let stored: Option<String> = conn
            .query_row(
                "SELECT synced_handles FROM sync_devices WHERE identity_key = ?1",
                [identity.as_str()],
                |row| row.get(0),
            )
            .optional()
            .map_err(StoreError::query)?;

        Ok(stored
            .as_deref()
            .map(decode_handles_or_empty)
            .unwrap_or_default())
    }

    async fn remove(&self, identity: &DeviceIdentity) -> Result<bool, StoreError> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| StoreError::Query(e.to_string()))?;

        let rows = conn
            .execute(
                "DELETE FROM sync_devices WHERE identity_key = ?1",
                [identity.as_str()],
            )
            .map_err(StoreError::query)?;

        if rows > 0 {
            tracing::info!(identity = %identity, "Removed sync record");
        }
        Ok(rows > 0)
    }

    async fn list_all(&self) -> Result<Vec<SyncRecord>, StoreError> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| StoreError::Query(e.to_string()))?;

        let mut stmt = conn
            .prepare(
                "SELECT identity_key, display_name, product_name, manufacturer_name, vendor_id, product_id, internal_device_id, serial_number, firmware_version, synced_handles, is_syncing, first_sync_at, updated_at, created_at FROM sync_devices ORDER BY identity_key",
            )
            .map_err(StoreError::query)?;

        let records = stmt
            .query_map([], |row| Ok(row_to_sync_record(row)))
            .map_err(StoreError::query)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(StoreError::query)?;

        Ok(records)
    }

    async fn upsert_all(&self, records: &[SyncRecord]) -> Result<(), StoreError> {
        if records.is_empty() {
            return Ok(());
        }

        let conn = self
            .conn
            .lock()
            .map_err(|e| StoreError::Query(e.to_string()))?;

        // One transaction: a snapshot loads entirely or not at all.
        conn.execute("BEGIN TRANSACTION", [])
            .map_err(StoreError::query)?;

        let result = (|| {
            let mut stmt = conn
                .prepare_cached(
                    r#"
                    INSERT OR REPLACE INTO sync_devices (
                        identity_key, display_name, product_name, manufacturer_name,
                        vendor_id, product_id, internal_device_id, serial_number,
                        firmware_version, synced_handles, is_syncing, first_sync_at,
                        updated_at, created_at
                    )
                    VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
                    "#,
                )
                .map_err(StoreError::query)?;

            for record in records {
                stmt.execute(rusqlite::params![
                    &record.identity_key,
                    &record.display_name,
                    &record.product_name,
                    &record.manufacturer_name,
                    record.vendor_id,
                    record.product_id,
                    record.internal_device_id,
                    &record.serial_number,
                    &record.firmware_version,
                    encode_handles(&record.synced_handles),
                    record.is_syncing,
                    record.first_sync_at.map(|dt| dt.timestamp_millis()),
                    record.updated_at.timestamp_millis(),
                    record.created_at.timestamp_millis(),
                ])
                .map_err(StoreError::query)?;
            }

            Ok::<_, StoreError>(())
        })();

        match result {
            Ok(()) => {
                conn.execute("COMMIT", []).map_err(StoreError::query)?;
                Ok(())
            }
            Err(e) => {
                let _ = conn.execute("ROLLBACK", []);
                Err(e)
            }
        }
    }
}

/// Fetch one record by identity key.
fn get_by_key(
    conn: &Connection,
    identity: &DeviceIdentity,
) -> Result<Option<SyncRecord>, StoreError> {
    conn.query_row(
        "SELECT identity_key, display_name, product_name, manufacturer_name, vendor_id, product_id, internal_device_id, serial_number, firmware_version, synced_handles, is_syncing, first_sync_at, updated_at, created_at FROM sync_devices WHERE identity_key = ?1",
        [identity.as_str()],
        |row| Ok(row_to_sync_record(row)),
    )
    .optional()
    .map_err(StoreError::query)
}

/// Fetch a record that a preceding write guarantees to exist.
fn require_record(
    conn: &Connection,
    identity: &DeviceIdentity,
) -> Result<SyncRecord, StoreError> {
    get_by_key(conn, identity)?.ok_or_else(|| StoreError::not_found(identity.as_str()))
}

/// Convert a database row to a SyncRecord.
///
/// Column order must match the SELECT statements above. Reads are lossy on
/// purpose: a damaged column degrades to its default instead of failing the
/// whole row.
fn row_to_sync_record(row: &rusqlite::Row<'_>) -> SyncRecord {
    let identity_key: String = row.get(0).unwrap_or_default();
    let display_name: String = row.get(1).unwrap_or_default();
    let product_name: String = row.get(2).unwrap_or_default();
    let manufacturer_name: String = row.get(3).unwrap_or_default();
    let vendor_id: u16 = row.get(4).unwrap_or_default();
    let product_id: u16 = row.get(5).unwrap_or_default();
    let internal_device_id: u32 = row.get(6).unwrap_or_default();
    let serial_number: String = row.get(7).unwrap_or_default();
    let firmware_version: String = row.get(8).unwrap_or_default();
    let encoded_handles: String = row.get(9).unwrap_or_default();
    let is_syncing: bool = row.get(10).unwrap_or(false);
    let first_sync_at_ms: Option<i64> = row.get(11).ok();
    let updated_at_ms: i64 = row.get(12).unwrap_or(0);
    let created_at_ms: i64 = row.get(13).unwrap_or(0);

    SyncRecord {
        identity_key,
        display_name,
        product_name,
        manufacturer_name,
        serial_number,
        firmware_version,
        synced_handles: decode_handles_or_empty(&encoded_handles),
        first_sync_at: first_sync_at_ms.and_then(|ms| Utc.timestamp_millis_opt(ms).single()),
        updated_at: Utc
            .timestamp_millis_opt(updated_at_ms)
            .single()
            .unwrap_or(DateTime::UNIX_EPOCH),
        created_at: Utc
            .timestamp_millis_opt(created_at_ms)
            .single()
            .unwrap_or(DateTime::UNIX_EPOCH),
        internal_device_id,
        vendor_id,
        product_id,
        is_syncing,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::SerialAccess;
    use std::fs;
    use std::time::Duration;

    fn test_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir()
            .join("ptpsync_rs")
            .join("sync_db_tests")
            .join(name);
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn canon_descriptor(serial: SerialAccess) -> DeviceDescriptor {
        DeviceDescriptor {
            display_name: "/dev/bus/usb/001/004".to_string(),
            product_name: "EOS R5".to_string(),
            manufacturer_name: "Canon".to_string(),
            firmware_version: "1.8.1".to_string(),
            serial,
            internal_device_id: 1004,
            vendor_id: 0x04a9,
            product_id: 0x32db,
        }
    }

    fn granted(serial: &str) -> SerialAccess {
        SerialAccess::Granted(serial.to_string())
    }

    #[tokio::test]
    async fn test_open_creates_db() {
        let dir = test_dir("open_creates");
        let path = dir.join("test.db");
        let store = SqliteSyncStore::open(&path).await.unwrap();
        assert!(path.exists());
        assert_eq!(store.path(), path);
    }

    #[tokio::test]
    async fn test_resolve_or_create_creates_idle_record() {
        let store = SqliteSyncStore::open_in_memory().unwrap();
        let descriptor = canon_descriptor(granted("SN123"));
        let identity = descriptor.identity();

        let record = store
            .resolve_or_create(&identity, &descriptor)
            .await
            .unwrap();

        assert_eq!(record.identity_key, "Canon_EOS R5_SN123");
        assert_eq!(record.product_name, "EOS R5");
        assert_eq!(record.manufacturer_name, "Canon");
        assert_eq!(record.serial_number, "SN123");
        assert_eq!(record.firmware_version, "1.8.1");
        assert_eq!(record.vendor_id, 0x04a9);
        assert_eq!(record.product_id, 0x32db);
        assert_eq!(record.internal_device_id, 1004);
        assert!(record.synced_handles.is_empty());
        assert!(!record.is_syncing);
        assert!(record.first_sync_at.is_none());
        assert_eq!(record.created_at, record.updated_at);
    }

    #[tokio::test]
    async fn test_resolve_or_create_refreshes_descriptor_fields() {
        let store = SqliteSyncStore::open_in_memory().unwrap();
        let descriptor = canon_descriptor(granted("SN123"));
        let identity = descriptor.identity();

        let created = store
            .resolve_or_create(&identity, &descriptor)
            .await
            .unwrap();
        store.begin_sync(&identity).await.unwrap();
        store
            .record_synced_handles(&identity, &BTreeSet::from([1, 2]))
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(5)).await;

        // Same physical device, reattached: firmware upgraded, new OS ids
        let mut reattached = descriptor.clone();
        reattached.firmware_version = "1.9.0".to_string();
        reattached.internal_device_id = 2031;
        reattached.display_name = "/dev/bus/usb/002/007".to_string();

        let record = store
            .resolve_or_create(&identity, &reattached)
            .await
            .unwrap();

        assert_eq!(record.firmware_version, "1.9.0");
        assert_eq!(record.internal_device_id, 2031);
        assert_eq!(record.display_name, "/dev/bus/usb/002/007");
        // Sync state survives the refresh
        assert_eq!(record.synced_handles, BTreeSet::from([1, 2]));
        assert!(record.is_syncing);
        assert!(record.first_sync_at.is_some());
        assert_eq!(record.created_at, created.created_at);
        assert!(record.updated_at > created.updated_at);
    }

    #[tokio::test]
    async fn test_resolve_or_create_records_empty_serial_when_denied() {
        let store = SqliteSyncStore::open_in_memory().unwrap();
        let descriptor = canon_descriptor(SerialAccess::Denied);
        let identity = descriptor.identity();

        let record = store
            .resolve_or_create(&identity, &descriptor)
            .await
            .unwrap();

        // Key carries the pseudo-serial, the record keeps the raw (empty) value
        assert_eq!(record.identity_key, "Canon_EOS R5_no-permission-1193:13019");
        assert_eq!(record.serial_number, "");
    }

    #[tokio::test]
    async fn test_get_absent_identity_returns_none() {
        let store = SqliteSyncStore::open_in_memory().unwrap();
        let result = store.get(&DeviceIdentity::from("nope")).await.unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_begin_sync_sets_flag_and_first_sync() {
        let store = SqliteSyncStore::open_in_memory().unwrap();
        let descriptor = canon_descriptor(granted("SN123"));
        let identity = descriptor.identity();
        store
            .resolve_or_create(&identity, &descriptor)
            .await
            .unwrap();

        let record = store.begin_sync(&identity).await.unwrap();
        assert!(record.is_syncing);
        assert!(record.first_sync_at.is_some());
    }

    #[tokio::test]
    async fn test_begin_sync_preserves_first_sync_on_later_sessions() {
        let store = SqliteSyncStore::open_in_memory().unwrap();
        let descriptor = canon_descriptor(granted("SN123"));
        let identity = descriptor.identity();
        store
            .resolve_or_create(&identity, &descriptor)
            .await
            .unwrap();

        let first = store.begin_sync(&identity).await.unwrap();
        store.end_sync(&identity).await.unwrap();

        tokio::time::sleep(Duration::from_millis(5)).await;

        let second = store.begin_sync(&identity).await.unwrap();
        assert_eq!(second.first_sync_at, first.first_sync_at);
        assert!(second.updated_at > first.updated_at);
    }

    #[tokio::test]
    async fn test_begin_sync_unknown_identity_errors() {
        let store = SqliteSyncStore::open_in_memory().unwrap();
        let result = store.begin_sync(&DeviceIdentity::from("nope")).await;
        assert!(matches!(result, Err(StoreError::DeviceNotFound { .. })));
    }

    #[tokio::test]
    async fn test_end_sync_clears_flag_and_preserves_state() {
        let store = SqliteSyncStore::open_in_memory().unwrap();
        let descriptor = canon_descriptor(granted("SN123"));
        let identity = descriptor.identity();
        store
            .resolve_or_create(&identity, &descriptor)
            .await
            .unwrap();

        let started = store.begin_sync(&identity).await.unwrap();
        store
            .record_synced_handles(&identity, &BTreeSet::from([7, 8]))
            .await
            .unwrap();

        let record = store.end_sync(&identity).await.unwrap();
        assert!(!record.is_syncing);
        assert_eq!(record.synced_handles, BTreeSet::from([7, 8]));
        assert_eq!(record.first_sync_at, started.first_sync_at);
    }

    #[tokio::test]
    async fn test_end_sync_unknown_identity_errors() {
        let store = SqliteSyncStore::open_in_memory().unwrap();
        let result = store.end_sync(&DeviceIdentity::from("nope")).await;
        assert!(matches!(result, Err(StoreError::DeviceNotFound { .. })));
    }

    #[tokio::test]
    async fn test_record_synced_handles_unions_with_stored_set() {
        let store = SqliteSyncStore::open_in_memory().unwrap();
        let descriptor = canon_descriptor(granted("SN123"));
        let identity = descriptor.identity();
        store
            .resolve_or_create(&identity, &descriptor)
            .await
            .unwrap();

        store
            .record_synced_handles(&identity, &BTreeSet::from([1, 2]))
            .await
            .unwrap();
        let record = store
            .record_synced_handles(&identity, &BTreeSet::from([2, 3]))
            .await
            .unwrap();

        assert_eq!(record.synced_handles, BTreeSet::from([1, 2, 3]));
    }

    #[tokio::test]
    async fn test_record_synced_handles_is_idempotent() {
        let store = SqliteSyncStore::open_in_memory().unwrap();
        let descriptor = canon_descriptor(granted("SN123"));
        let identity = descriptor.identity();
        store
            .resolve_or_create(&identity, &descriptor)
            .await
            .unwrap();

        let handles = BTreeSet::from([1, 2]);
        store
            .record_synced_handles(&identity, &handles)
            .await
            .unwrap();
        let record = store
            .record_synced_handles(&identity, &handles)
            .await
            .unwrap();

        assert_eq!(record.synced_handles, handles);
    }

    #[tokio::test]
    async fn test_record_synced_handles_ignores_batch_order() {
        let first = SqliteSyncStore::open_in_memory().unwrap();
        let second = SqliteSyncStore::open_in_memory().unwrap();
        let descriptor = canon_descriptor(granted("SN123"));
        let identity = descriptor.identity();

        let batch_a = BTreeSet::from([1, 2]);
        let batch_b = BTreeSet::from([3, 4]);

        first
            .resolve_or_create(&identity, &descriptor)
            .await
            .unwrap();
        first.record_synced_handles(&identity, &batch_a).await.unwrap();
        first.record_synced_handles(&identity, &batch_b).await.unwrap();

        second
            .resolve_or_create(&identity, &descriptor)
            .await
            .unwrap();
        second.record_synced_handles(&identity, &batch_b).await.unwrap();
        second.record_synced_handles(&identity, &batch_a).await.unwrap();

        assert_eq!(
            first.synced_handles(&identity).await.unwrap(),
            second.synced_handles(&identity).await.unwrap()
        );
    }

    #[tokio::test]
    async fn test_record_synced_handles_unknown_identity_errors() {
        let store = SqliteSyncStore::open_in_memory().unwrap();
        let result = store
            .record_synced_handles(&DeviceIdentity::from("nope"), &BTreeSet::from([1]))
            .await;
        assert!(matches!(result, Err(StoreError::DeviceNotFound { .. })));
    }

    #[tokio::test]
    async fn test_synced_handles_absent_identity_is_empty() {
        let store = SqliteSyncStore::open_in_memory().unwrap();
        let handles = store
            .synced_handles(&DeviceIdentity::from("nope"))
            .await
            .unwrap();
        assert!(handles.is_empty());
    }

    #[tokio::test]
    async fn test_synced_handles_recovers_from_malformed_column() {
        let store = SqliteSyncStore::open_in_memory().unwrap();
        let descriptor = canon_descriptor(granted("SN123"));
        let identity = descriptor.identity();
        store
            .resolve_or_create(&identity, &descriptor)
            .await
            .unwrap();

        // Simulate a hand-edited database
        {
            let conn = store.conn.lock().unwrap();
            conn.execute(
                "UPDATE sync_devices SET synced_handles = '12,abc,34' WHERE identity_key = ?1",
                [identity.as_str()],
            )
            .unwrap();
        }

        assert!(store.synced_handles(&identity).await.unwrap().is_empty());
        let record = store.get(&identity).await.unwrap().unwrap();
        assert!(record.synced_handles.is_empty());

        // Recording after recovery starts over from the empty set
        let record = store
            .record_synced_handles(&identity, &BTreeSet::from([7]))
            .await
            .unwrap();
        assert_eq!(record.synced_handles, BTreeSet::from([7]));
    }

    #[tokio::test]
    async fn test_remove_reports_whether_a_record_existed() {
        let store = SqliteSyncStore::open_in_memory().unwrap();
        let descriptor = canon_descriptor(granted("SN123"));
        let identity = descriptor.identity();
        store
            .resolve_or_create(&identity, &descriptor)
            .await
            .unwrap();

        assert!(store.remove(&identity).await.unwrap());
        assert!(!store.remove(&identity).await.unwrap());
        assert!(store.get(&identity).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_removed_device_starts_from_scratch_on_reattach() {
        let store = SqliteSyncStore::open_in_memory().unwrap();
        let descriptor = canon_descriptor(granted("SN123"));
        let identity = descriptor.identity();

        store
            .resolve_or_create(&identity, &descriptor)
            .await
            .unwrap();
        store
            .record_synced_handles(&identity, &BTreeSet::from([1, 2, 3]))
            .await
            .unwrap();
        store.remove(&identity).await.unwrap();

        let record = store
            .resolve_or_create(&identity, &descriptor)
            .await
            .unwrap();
        assert!(record.synced_handles.is_empty());
        assert!(record.first_sync_at.is_none());
    }

    #[tokio::test]
    async fn test_list_all_returns_every_record() {
        let store = SqliteSyncStore::open_in_memory().unwrap();

        let canon = canon_descriptor(granted("SN123"));
        let mut nikon = canon_descriptor(granted("Z6-001"));
        nikon.manufacturer_name = "Nikon".to_string();
        nikon.product_name = "Z6".to_string();
        nikon.vendor_id = 0x04b0;

        store
            .resolve_or_create(&canon.identity(), &canon)
            .await
            .unwrap();
        store
            .resolve_or_create(&nikon.identity(), &nikon)
            .await
            .unwrap();

        let records = store.list_all().await.unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].identity_key, "Canon_EOS R5_SN123");
        assert_eq!(records[1].identity_key, "Nikon_Z6_Z6-001");
    }

    #[tokio::test]
    async fn test_upsert_all_round_trips_records() {
        let source = SqliteSyncStore::open_in_memory().unwrap();
        let descriptor = canon_descriptor(granted("SN123"));
        let identity = descriptor.identity();

        source
            .resolve_or_create(&identity, &descriptor)
            .await
            .unwrap();
        source.begin_sync(&identity).await.unwrap();
        source
            .record_synced_handles(&identity, &BTreeSet::from([5, 9]))
            .await
            .unwrap();
        source.end_sync(&identity).await.unwrap();

        let records = source.list_all().await.unwrap();

        let target = SqliteSyncStore::open_in_memory().unwrap();
        target.upsert_all(&records).await.unwrap();

        assert_eq!(target.list_all().await.unwrap(), records);
    }

    #[tokio::test]
    async fn test_upsert_all_empty_is_noop() {
        let store = SqliteSyncStore::open_in_memory().unwrap();
        store.upsert_all(&[]).await.unwrap();
        assert!(store.list_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_upsert_all_replaces_matching_identity_keys() {
        let store = SqliteSyncStore::open_in_memory().unwrap();
        let descriptor = canon_descriptor(granted("SN123"));
        let identity = descriptor.identity();

        store
            .resolve_or_create(&identity, &descriptor)
            .await
            .unwrap();
        store
            .record_synced_handles(&identity, &BTreeSet::from([1]))
            .await
            .unwrap();

        let mut snapshot = store.list_all().await.unwrap();
        snapshot[0].synced_handles = BTreeSet::from([100, 200]);

        store.upsert_all(&snapshot).await.unwrap();

        let handles = store.synced_handles(&identity).await.unwrap();
        assert_eq!(handles, BTreeSet::from([100, 200]));
    }
}
