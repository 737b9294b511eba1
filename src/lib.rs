//! Resumable photo-sync session state for PTP cameras.
//!
//! A camera attached over USB picture-transfer exposes its files as opaque
//! integer handles. This crate persists, per physical camera, which handles
//! have already been retrieved, so an interrupted transfer session resumes
//! instead of starting over. Cameras are correlated across
//! disconnect/reconnect cycles by an identity key derived from USB
//! descriptor fields, tolerating platforms that deny serial-number access.
//!
//! The transport itself (USB bulk driver, picture-transfer client) is not
//! part of this crate: a host drives [`session::SyncSession`] with
//! descriptor data and transfer events from its own transport, while the
//! bundled CLI inspects and manages the persisted records.

#![warn(clippy::all)]

pub mod cli;
pub mod config;
pub mod device;
pub mod session;
pub mod snapshot;
pub mod state;
pub mod types;
