//! USB transport abstraction
//!
//! The negotiator and session only talk to the bus through these traits.
//! [`crate::backend::RusbTransport`] implements them on top of libusb, and
//! `test_utils::MockTransport` (feature `test-utils`) implements them in
//! memory.
//!
//! Closing a device is expressed by dropping its handle.

use std::time::Duration;

use crate::error::TransportError;

/// Bus-level device access
pub trait UsbTransport {
    type Handle: UsbHandle;

    /// Open the first device matching `vendor_id:product_id`
    ///
    /// Returns `Ok(None)` when no such device is attached.
    fn open_device(
        &self,
        vendor_id: u16,
        product_id: u16,
    ) -> Result<Option<Self::Handle>, TransportError>;

    /// Enumerate every device currently on the bus
    fn list_devices(&self) -> Result<Vec<DeviceSummary>, TransportError>;
}

/// An opened device
///
/// A zero `timeout` means "no limit", as in libusb.
pub trait UsbHandle {
    fn claim_interface(&mut self, interface: u8) -> Result<(), TransportError>;

    fn release_interface(&mut self, interface: u8) -> Result<(), TransportError>;

    /// Detach a kernel driver bound to `interface`
    fn detach_kernel_driver(&mut self, interface: u8) -> Result<(), TransportError>;

    /// Device-to-host control transfer, returns the number of bytes read
    fn control_in(
        &self,
        setup: ControlSetup,
        buf: &mut [u8],
        timeout: Duration,
    ) -> Result<usize, TransportError>;

    /// Host-to-device control transfer, returns the number of bytes written
    fn control_out(
        &self,
        setup: ControlSetup,
        data: &[u8],
        timeout: Duration,
    ) -> Result<usize, TransportError>;

    fn bulk_in(
        &self,
        endpoint: u8,
        buf: &mut [u8],
        timeout: Duration,
    ) -> Result<usize, TransportError>;

    fn bulk_out(&self, endpoint: u8, data: &[u8], timeout: Duration)
    -> Result<usize, TransportError>;

    /// Descriptor tree of the active configuration
    fn active_configuration(&self) -> Result<ConfigurationLayout, TransportError>;
}

/// Request type field of a control setup packet
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    Standard,
    Class,
    Vendor,
    Reserved,
}

/// Recipient field of a control setup packet
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recipient {
    Device,
    Interface,
    Endpoint,
    Other,
}

/// Control transfer parameters, minus direction and payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControlSetup {
    pub kind: RequestKind,
    pub recipient: Recipient,
    pub request: u8,
    pub value: u16,
    pub index: u16,
}

impl ControlSetup {
    /// Vendor request addressed to the device, the only kind AOA uses
    pub const fn vendor(request: u8, value: u16, index: u16) -> Self {
        Self {
            kind: RequestKind::Vendor,
            recipient: Recipient::Device,
            request,
            value,
            index,
        }
    }
}

/// Endpoint transfer type, as declared by the descriptor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferKind {
    Control,
    Isochronous,
    Bulk,
    Interrupt,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointLayout {
    pub address: u8,
    pub transfer_kind: TransferKind,
}

impl EndpointLayout {
    pub fn bulk(address: u8) -> Self {
        Self {
            address,
            transfer_kind: TransferKind::Bulk,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AltSettingLayout {
    pub setting: u8,
    pub endpoints: Vec<EndpointLayout>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct InterfaceLayout {
    pub number: u8,
    pub alt_settings: Vec<AltSettingLayout>,
}

/// Interfaces, alternate settings and endpoints of a configuration, in
/// descriptor order
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ConfigurationLayout {
    pub interfaces: Vec<InterfaceLayout>,
}

impl ConfigurationLayout {
    /// Single interface with a single alternate setting holding `endpoints`
    pub fn single_interface(endpoints: Vec<EndpointLayout>) -> Self {
        Self {
            interfaces: vec![InterfaceLayout {
                number: 0,
                alt_settings: vec![AltSettingLayout {
                    setting: 0,
                    endpoints,
                }],
            }],
        }
    }

    /// All endpoints, walking interfaces then alternate settings
    pub fn endpoints(&self) -> impl Iterator<Item = &EndpointLayout> {
        self.interfaces
            .iter()
            .flat_map(|interface| interface.alt_settings.iter())
            .flat_map(|alt| alt.endpoints.iter())
    }
}

/// Short description of an attached device, used for listings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceSummary {
    pub bus: u8,
    pub address: u8,
    pub vendor_id: u16,
    pub product_id: u16,
    /// Port numbers from the root hub down
    pub port_path: Vec<u8>,
}
