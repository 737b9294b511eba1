//! Transfer-session driver binding one attached camera to the sync store.
//!
//! The transport layer (USB bulk driver, picture-transfer client) owns
//! enumeration and byte movement. This module owns what must survive
//! between sessions: which file handles are already synced and whether the
//! device is mid-session. Completions are persisted one at a time, as the
//! transport confirms them, so pulling the cable mid-transfer loses at most
//! the file that was in flight.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use crate::device::{DeviceDescriptor, DeviceIdentity};
use crate::state::{StoreError, SyncRecord, SyncStore};

/// Transfer progress reported by the transport for one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferEvent {
    /// Bytes are moving. Nothing is persisted for progress.
    Progress {
        handle: u32,
        total_bytes: u64,
        transferred_bytes: u64,
    },
    /// The file finished and was verified by the transport.
    Completed { handle: u32, elapsed: Duration },
    /// The transfer aborted. The handle must not be marked synced.
    Failed { handle: u32, error: String },
}

/// One attached camera's sync session.
///
/// Holds a pre-loaded copy of the synced-handle set so the transport can
/// make O(1) skip decisions while enumerating, without a store query per
/// file. The copy is kept current as completions are recorded.
pub struct SyncSession {
    store: Arc<dyn SyncStore>,
    identity: DeviceIdentity,
    descriptor: DeviceDescriptor,
    synced: BTreeSet<u32>,
}

impl SyncSession {
    /// Resolve the device's identity and fetch or create its sync record.
    ///
    /// Call once per attachment, before any transfer activity.
    pub async fn attach(
        store: Arc<dyn SyncStore>,
        descriptor: DeviceDescriptor,
    ) -> Result<Self, StoreError> {
        let identity = descriptor.identity();
        let record = store.resolve_or_create(&identity, &descriptor).await?;
        tracing::debug!(
            identity = %identity,
            vendor = descriptor.vendor().as_str(),
            vendor_id = descriptor.supported_vendor_id(),
            synced = record.synced_handles.len(),
            "Device attached"
        );
        Ok(Self {
            synced: record.synced_handles,
            store,
            identity,
            descriptor,
        })
    }

    /// The resolved identity of the attached device.
    pub fn identity(&self) -> &DeviceIdentity {
        &self.identity
    }

    /// The descriptor this session was attached with.
    pub fn descriptor(&self) -> &DeviceDescriptor {
        &self.descriptor
    }

    /// Whether a camera file handle was already retrieved, in this session
    /// or any earlier one.
    pub fn already_synced(&self, handle: u32) -> bool {
        self.synced.contains(&handle)
    }

    /// Handles synced so far.
    pub fn synced_handles(&self) -> &BTreeSet<u32> {
        &self.synced
    }

    /// Mark the device as syncing.
    pub async fn begin(&self) -> Result<SyncRecord, StoreError> {
        self.store.begin_sync(&self.identity).await
    }

    /// Mark the device as idle again.
    ///
    /// Call on normal completion and on detach alike; the handle set stays
    /// as it is so the next session resumes from it.
    pub async fn end(&self) -> Result<SyncRecord, StoreError> {
        self.store.end_sync(&self.identity).await
    }

    /// Feed one transport event.
    ///
    /// Returns the refreshed record when the event persisted a change
    /// (a completion), `None` otherwise.
    pub async fn on_event(
        &mut self,
        event: &TransferEvent,
    ) -> Result<Option<SyncRecord>, StoreError> {
        match event {
            TransferEvent::Progress {
                handle,
                total_bytes,
                transferred_bytes,
            } => {
                tracing::trace!(handle, total_bytes, transferred_bytes, "Transfer progress");
                Ok(None)
            }
            TransferEvent::Completed { handle, elapsed } => {
                let record = self
                    .store
                    .record_synced_handles(&self.identity, &BTreeSet::from([*handle]))
                    .await?;
                self.synced.insert(*handle);
                tracing::debug!(
                    handle,
                    elapsed_ms = elapsed.as_millis() as u64,
                    "File synced"
                );
                Ok(Some(record))
            }
            TransferEvent::Failed { handle, error } => {
                tracing::warn!(handle, error = %error, "Transfer failed, handle not recorded");
                Ok(None)
            }
        }
    }
}
