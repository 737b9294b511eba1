//! Device identity layer.
//!
//! Turns the descriptor fields the transport reports on attach into a
//! stable identity key that correlates a physical camera across
//! disconnect/reconnect cycles, and classifies known camera vendors.

pub mod descriptor;
pub mod identity;

pub use descriptor::{DeviceDescriptor, SerialAccess};
pub use identity::{CameraVendor, DeviceIdentity};
