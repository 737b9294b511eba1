//! Types for the sync-state module.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::error::MalformedHandleSet;

/// A device's persisted sync state.
///
/// One record per resolved device identity. Fields are ordered for memory
/// layout: heap types first, then the handle set, timestamps, 4/2-byte
/// primitives, and the 1-byte flag at the end.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncRecord {
    // Heap types
    /// Stable identity key. Primary key; immutable once created.
    pub identity_key: String,
    /// OS-assigned device node name from the latest attachment.
    pub display_name: String,
    /// Product string from the descriptor.
    pub product_name: String,
    /// Manufacturer string from the descriptor.
    pub manufacturer_name: String,
    /// Raw serial number, or empty when the platform denied access.
    pub serial_number: String,
    /// Firmware revision string from the latest attachment.
    pub firmware_version: String,
    /// File handles confirmed fully retrieved across all past sessions.
    pub synced_handles: BTreeSet<u32>,

    // Timestamps
    /// First transition into syncing, ever. Set once, then immutable.
    pub first_sync_at: Option<DateTime<Utc>>,
    /// Last mutation of this record.
    pub updated_at: DateTime<Utc>,
    /// When the record was first created.
    pub created_at: DateTime<Utc>,

    // Primitives
    /// OS attachment id from the latest attachment. Unstable across
    /// reconnects; informational only.
    pub internal_device_id: u32,
    /// USB vendor id.
    pub vendor_id: u16,
    /// USB product id.
    pub product_id: u16,
    /// Whether a transfer session is currently running for this device.
    pub is_syncing: bool,
}

impl SyncRecord {
    /// Whether a given camera file handle is already recorded as synced.
    pub fn has_synced(&self, handle: u32) -> bool {
        self.synced_handles.contains(&handle)
    }
}

/// Encode a handle set as comma-delimited decimal for storage.
///
/// The empty set encodes as the empty string, with no delimiters.
pub fn encode_handles(handles: &BTreeSet<u32>) -> String {
    handles
        .iter()
        .map(u32::to_string)
        .collect::<Vec<_>>()
        .join(",")
}

/// Strictly decode a stored handle-set string.
///
/// The empty string decodes to the empty set. Any token that is not a
/// decimal `u32` fails the whole decode.
pub fn decode_handles(encoded: &str) -> Result<BTreeSet<u32>, MalformedHandleSet> {
    if encoded.is_empty() {
        return Ok(BTreeSet::new());
    }
    encoded
        .split(',')
        .map(|token| {
            token.parse::<u32>().map_err(|_| MalformedHandleSet {
                token: token.to_string(),
            })
        })
        .collect()
}

/// Tolerant decode used on read paths: hand-edited or corrupted state is
/// logged and treated as an empty set instead of wedging the device.
pub(crate) fn decode_handles_or_empty(encoded: &str) -> BTreeSet<u32> {
    match decode_handles(encoded) {
        Ok(handles) => handles,
        Err(e) => {
            tracing::warn!(error = %e, "Stored handle set is malformed, treating as empty");
            BTreeSet::new()
        }
    }
}
