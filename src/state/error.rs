//! Error types for the sync-state module.

use std::path::PathBuf;

use thiserror::Error;

/// Errors surfaced by sync store operations.
#[derive(Error, Debug)]
pub enum StoreError {
    /// The database file could not be opened or created.
    #[error("Failed to open sync database at {path}: {source}")]
    Open {
        path: PathBuf,
        source: rusqlite::Error,
    },

    /// Schema creation or upgrade failed.
    #[error("Sync database migration failed: {0}")]
    Migration(#[from] rusqlite::Error),

    /// A query against the sync database failed.
    #[error("Sync database query failed: {0}")]
    Query(String),

    /// The blocking open task could not be joined.
    #[error("Failed to spawn blocking task: {0}")]
    Spawn(#[from] tokio::task::JoinError),

    /// The database schema version is newer than this build supports.
    #[error("Sync database schema version {found} is newer than supported version {expected}")]
    UnsupportedSchemaVersion { found: i32, expected: i32 },

    /// A lifecycle operation referenced an identity with no record.
    ///
    /// Callers must resolve a device before starting, ending or recording a
    /// session for it. This is a contract violation on the caller's side,
    /// not a transient fault, and is never worth retrying.
    #[error("No sync record for device identity {identity:?}")]
    DeviceNotFound { identity: String },
}

impl StoreError {
    /// Wrap a rusqlite error as a Query failure.
    pub fn query(source: rusqlite::Error) -> Self {
        Self::Query(source.to_string())
    }

    pub(crate) fn not_found(identity: impl Into<String>) -> Self {
        Self::DeviceNotFound {
            identity: identity.into(),
        }
    }
}

/// A persisted handle-set string contains a token that is not a decimal
/// integer.
///
/// Read paths recover from this by treating the stored set as empty, so the
/// error only reaches callers that ask for a strict decode.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Malformed handle set: token {token:?} is not a decimal file handle")]
pub struct MalformedHandleSet {
    pub token: String,
}
