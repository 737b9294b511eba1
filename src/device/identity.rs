//! Stable identity derivation for attached cameras.
//!
//! Sync state must survive disconnect/reconnect cycles, but every OS-level
//! attachment id changes when the cable is replugged. The identity key is
//! derived purely from descriptor fields that stay constant for a physical
//! device: manufacturer, product and serial number. When serial access is
//! denied by the platform, a deterministic vendor/product pseudo-serial
//! keeps the key stable (at the cost of aliasing two identical models on
//! such hosts).

use std::fmt;

use super::descriptor::{DeviceDescriptor, SerialAccess};

/// USB vendor id assigned to Canon.
pub const VENDOR_ID_CANON: u16 = 0x04a9;
/// USB vendor id assigned to Nikon.
pub const VENDOR_ID_NIKON: u16 = 0x04b0;
/// USB vendor id assigned to Sony.
pub const VENDOR_ID_SONY: u16 = 0x054c;
/// Sentinel for vendors without a dedicated transport quirk table.
pub const VENDOR_ID_OTHER: u16 = 0xffff;

/// Vendor classification used to pick protocol quirks and for display.
///
/// Informational only: the classification never feeds into identity keys,
/// so an unrecognized vendor still gets full sync-state tracking.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CameraVendor {
    Canon,
    Nikon,
    Sony,
    Other,
}

impl CameraVendor {
    /// Classify a USB vendor id.
    pub fn from_vendor_id(vendor_id: u16) -> Self {
        match vendor_id {
            VENDOR_ID_CANON => CameraVendor::Canon,
            VENDOR_ID_NIKON => CameraVendor::Nikon,
            VENDOR_ID_SONY => CameraVendor::Sony,
            _ => CameraVendor::Other,
        }
    }

    /// Lowercase label for logs and CLI output.
    pub fn as_str(&self) -> &'static str {
        match self {
            CameraVendor::Canon => "canon",
            CameraVendor::Nikon => "nikon",
            CameraVendor::Sony => "sony",
            CameraVendor::Other => "other",
        }
    }
}

/// Stable identity key for one physical camera.
///
/// Opaque to callers: the only guarantees are determinism for a given
/// descriptor and stability across reconnects of the same device.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DeviceIdentity(String);

impl DeviceIdentity {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for DeviceIdentity {
    fn from(key: String) -> Self {
        DeviceIdentity(key)
    }
}

impl From<&str> for DeviceIdentity {
    fn from(key: &str) -> Self {
        DeviceIdentity(key.to_string())
    }
}

impl DeviceDescriptor {
    /// Derive the stable identity key for this device.
    ///
    /// The key is `manufacturer_product_serial`. When the platform denied
    /// serial access, the serial component becomes
    /// `no-permission-<vendor_id>:<product_id>` (decimal), which is stable
    /// per model rather than per unit.
    pub fn identity(&self) -> DeviceIdentity {
        let serial = match &self.serial {
            SerialAccess::Granted(serial) => serial.clone(),
            SerialAccess::Denied => {
                tracing::warn!(
                    vendor_id = self.vendor_id,
                    product_id = self.product_id,
                    "Serial number access denied, deriving identity from vendor/product ids"
                );
                format!("no-permission-{}:{}", self.vendor_id, self.product_id)
            }
        };
        DeviceIdentity(format!(
            "{}_{}_{}",
            self.manufacturer_name, self.product_name, serial
        ))
    }

    /// Vendor classification for this device.
    pub fn vendor(&self) -> CameraVendor {
        CameraVendor::from_vendor_id(self.vendor_id)
    }

    /// Vendor id to hand to the transport when selecting a protocol
    /// initiator: the device's own id when the vendor is recognized,
    /// otherwise the generic sentinel.
    pub fn supported_vendor_id(&self) -> u16 {
        match self.vendor() {
            CameraVendor::Other => VENDOR_ID_OTHER,
            _ => self.vendor_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn canon_r5(serial: SerialAccess) -> DeviceDescriptor {
        DeviceDescriptor {
            display_name: "/dev/bus/usb/001/004".to_string(),
            product_name: "EOS R5".to_string(),
            manufacturer_name: "Canon".to_string(),
            firmware_version: "1.8.1".to_string(),
            serial,
            internal_device_id: 1004,
            vendor_id: VENDOR_ID_CANON,
            product_id: 0x32db,
        }
    }

    #[test]
    fn identity_uses_manufacturer_product_serial() {
        let descriptor = canon_r5(SerialAccess::Granted("SN123".to_string()));
        assert_eq!(descriptor.identity().as_str(), "Canon_EOS R5_SN123");
    }

    #[test]
    fn identity_is_deterministic() {
        let descriptor = canon_r5(SerialAccess::Granted("SN123".to_string()));
        assert_eq!(descriptor.identity(), descriptor.identity());
    }

    #[test]
    fn identity_is_stable_across_reattachment_ids() {
        let first = canon_r5(SerialAccess::Granted("SN123".to_string()));
        let mut second = first.clone();
        second.internal_device_id = 2031;
        second.display_name = "/dev/bus/usb/002/007".to_string();
        assert_eq!(first.identity(), second.identity());
    }

    #[test]
    fn distinct_serials_yield_distinct_identities() {
        let first = canon_r5(SerialAccess::Granted("SN123".to_string()));
        let second = canon_r5(SerialAccess::Granted("SN124".to_string()));
        assert_ne!(first.identity(), second.identity());
    }

    #[test]
    fn denied_serial_falls_back_to_vendor_product_pseudo_serial() {
        let descriptor = canon_r5(SerialAccess::Denied);
        // 0x04a9 = 1193, 0x32db = 13019
        assert_eq!(
            descriptor.identity().as_str(),
            "Canon_EOS R5_no-permission-1193:13019"
        );
    }

    #[test]
    fn denied_serial_identity_is_deterministic() {
        let first = canon_r5(SerialAccess::Denied);
        let second = canon_r5(SerialAccess::Denied);
        assert_eq!(first.identity(), second.identity());
    }

    #[test]
    fn classifies_known_vendors() {
        assert_eq!(
            CameraVendor::from_vendor_id(VENDOR_ID_CANON),
            CameraVendor::Canon
        );
        assert_eq!(
            CameraVendor::from_vendor_id(VENDOR_ID_NIKON),
            CameraVendor::Nikon
        );
        assert_eq!(
            CameraVendor::from_vendor_id(VENDOR_ID_SONY),
            CameraVendor::Sony
        );
        assert_eq!(CameraVendor::from_vendor_id(0x1234), CameraVendor::Other);
    }

    #[test]
    fn supported_vendor_id_passes_known_ids_through() {
        let descriptor = canon_r5(SerialAccess::Granted("SN123".to_string()));
        assert_eq!(descriptor.supported_vendor_id(), VENDOR_ID_CANON);
    }

    #[test]
    fn supported_vendor_id_maps_unknown_vendors_to_sentinel() {
        let mut descriptor = canon_r5(SerialAccess::Granted("SN123".to_string()));
        descriptor.vendor_id = 0x1234;
        assert_eq!(descriptor.supported_vendor_id(), VENDOR_ID_OTHER);
    }

    #[test]
    fn vendor_labels_are_lowercase() {
        assert_eq!(CameraVendor::Canon.as_str(), "canon");
        assert_eq!(CameraVendor::Other.as_str(), "other");
    }
}
