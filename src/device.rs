//! The external radio-capture collaborator named in spec §1: the USB
//! RTL8812AU/EU driver. It's out of scope to implement, but the engine
//! needs a stable boundary to depend on, so it's expressed here as a trait
//! rather than a concrete device.
//!
//! The other external collaborator named in spec §1, the 802.11 frame
//! injector, is never called directly by this crate: per spec §5 the
//! adaptive-link thread hands its telemetry to the injector's owner over a
//! loopback UDP socket ([`crate::adaptive_link`]), not through a function
//! boundary this crate defines.

use std::time::Duration;

/// Per-antenna receive quality attributes the driver attaches to every
/// captured frame.
#[derive(Debug, Clone, Copy, Default)]
pub struct RxAttributes {
    /// RSSI in dBm-like driver units, per antenna.
    pub rssi: [i8; 2],
    /// SNR in dB, per antenna.
    pub snr: [i8; 2],
}

/// A raw 802.11 frame as handed up by the driver's monitor-mode capture
/// callback.
#[derive(Debug, Clone)]
pub struct Packet {
    /// Radiotap header + 802.11 frame bytes, FCS included.
    pub bytes: Vec<u8>,
    /// Signal attributes for this frame.
    pub rx_attributes: RxAttributes,
}

/// Identifies one enumerable USB radio adapter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceId {
    /// USB vendor ID.
    pub vendor_id: u16,
    /// USB product ID.
    pub product_id: u16,
    /// USB bus number.
    pub bus: u8,
    /// USB port number.
    pub port: u8,
    /// Human-readable name for UI/log display.
    pub display_name: String,
}

/// Boundary to the monitor-mode capture device (RTL8812AU/EU driver).
///
/// A real implementation spawns its own capture thread and invokes a
/// callback with each [`Packet`]; that thread composition is owned by the
/// driver, not this crate (spec §5). `interrupt_callback` lets the
/// supervisor ask a blocking read loop to return promptly on `stop()`.
pub trait RadioDevice: Send {
    /// Enumerate devices exposing the expected monitor-mode interface.
    fn list_devices() -> Vec<DeviceId>
    where
        Self: Sized;

    /// Open and claim a device on the given channel/width. Driver-defined
    /// units; the engine treats both as opaque configuration.
    fn open(device: &DeviceId, channel: u8, channel_width: u32) -> crate::error::Result<Self>
    where
        Self: Sized;

    /// Block (with timeout) for the next captured frame, or `None` if the
    /// interrupt predicate fired first.
    fn recv(&mut self, timeout: Duration) -> Option<Packet>;

    /// Request the driver poll this predicate and return early from `recv`
    /// when it becomes true.
    fn set_interrupt(&mut self, interrupt: Box<dyn Fn() -> bool + Send>);

    /// Set transmit power in mW. Range `[1, 40]`; out-of-range values are
    /// the caller's responsibility to reject (spec §4.E).
    fn set_tx_power(&mut self, mw: u32) -> crate::error::Result<()>;
}
