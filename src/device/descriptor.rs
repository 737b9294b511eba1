//! Raw descriptor data for an attached camera, as supplied by the transport
//! layer when a device appears on the bus.

/// Outcome of the transport's attempt to read the USB serial number.
///
/// Some platforms gate the serial string behind a permission the user can
/// decline. Denial is an expected state, not an error: identity derivation
/// falls back to a deterministic vendor/product pseudo-serial so the device
/// still resolves to a stable key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SerialAccess {
    /// Serial string read successfully. May be empty on cheap hardware.
    Granted(String),
    /// The platform refused access to the serial number.
    Denied,
}

impl SerialAccess {
    /// The serial value persisted on the device record: the raw string when
    /// granted, the empty string when denied.
    pub fn for_record(&self) -> &str {
        match self {
            SerialAccess::Granted(serial) => serial,
            SerialAccess::Denied => "",
        }
    }

    /// Whether the platform denied access to the serial number.
    pub fn is_denied(&self) -> bool {
        matches!(self, SerialAccess::Denied)
    }
}

/// Descriptor fields for one attached device.
///
/// Fields are ordered for memory layout efficiency: strings first, then the
/// serial, then fixed-size integers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceDescriptor {
    /// OS-assigned device node name (e.g. `/dev/bus/usb/001/004`). Purely
    /// informational and unstable across reconnects.
    pub display_name: String,
    /// Product string from the descriptor (e.g. "EOS R5").
    pub product_name: String,
    /// Manufacturer string from the descriptor (e.g. "Canon").
    pub manufacturer_name: String,
    /// Firmware revision string, if the transport exposes one.
    pub firmware_version: String,
    /// Serial number, or the denial marker.
    pub serial: SerialAccess,
    /// OS-assigned numeric id for this attachment. Changes on reconnect.
    pub internal_device_id: u32,
    /// USB vendor id.
    pub vendor_id: u16,
    /// USB product id.
    pub product_id: u16,
}
