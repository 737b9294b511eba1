//! Persistent sync state for attached cameras.
//!
//! This module provides SQLite-based tracking of per-device sync state,
//! keyed by the stable identity from [`crate::device`]. It records which
//! file handles have been fully retrieved and whether a session is in
//! progress, enabling:
//! - Resuming an interrupted transfer without re-downloading
//! - O(1) already-synced checks during camera enumeration
//! - Status reporting
//! - Snapshot export/import between hosts

pub mod db;
pub mod error;
pub mod schema;
pub mod types;

pub use db::{SqliteSyncStore, SyncStore};
pub use error::{MalformedHandleSet, StoreError};
pub use types::{decode_handles, encode_handles, SyncRecord};
