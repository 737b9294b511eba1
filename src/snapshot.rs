//! JSON snapshot of the sync-device record set.
//!
//! The snapshot moves a host's sync history to another machine (or backs it
//! up) without copying the database file. Handle sets are plain JSON arrays
//! in the snapshot, independent of the database's column encoding, so the
//! format stays stable if the storage layout changes.

use std::path::Path;

use anyhow::{Context, Result};

use crate::state::{SyncRecord, SyncStore};

/// Serialize records to pretty-printed snapshot JSON.
pub fn to_json(records: &[SyncRecord]) -> Result<String> {
    serde_json::to_string_pretty(records).context("Failed to serialize sync records")
}

/// Parse snapshot JSON produced by [`to_json`].
pub fn from_json(data: &str) -> Result<Vec<SyncRecord>> {
    serde_json::from_str(data).context("Snapshot is not a valid sync-record array")
}

/// Load a snapshot file into the store, replacing records with matching
/// identity keys. Returns the number of records loaded.
pub async fn load_into(store: &dyn SyncStore, path: &Path) -> Result<usize> {
    let data = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read snapshot {}", path.display()))?;
    let records = from_json(&data)?;
    store.upsert_all(&records).await?;
    tracing::info!(
        records = records.len(),
        path = %path.display(),
        "Imported sync snapshot"
    );
    Ok(records.len())
}
