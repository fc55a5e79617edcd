//! libusb transport
//!
//! Implements the transport traits with `rusb`. All calls are blocking and
//! map `rusb::Error` onto [`TransportError`].

use std::time::Duration;

use rusb::{Context, Device, DeviceHandle, UsbContext};
use tracing::{debug, warn};

use crate::error::TransportError;
use crate::transport::{
    AltSettingLayout, ConfigurationLayout, ControlSetup, DeviceSummary, EndpointLayout,
    InterfaceLayout, Recipient, RequestKind, TransferKind, UsbHandle, UsbTransport,
};
use crate::types::Direction;

/// Transport backed by a libusb context
#[derive(Clone)]
pub struct RusbTransport {
    context: Context,
}

impl RusbTransport {
    /// Create a transport with a fresh libusb context
    pub fn new() -> Result<Self, TransportError> {
        let context = Context::new()?;
        Ok(Self { context })
    }

    /// Wrap an existing libusb context
    pub fn with_context(context: Context) -> Self {
        Self { context }
    }

    pub fn context(&self) -> &Context {
        &self.context
    }

    fn find_device(
        &self,
        vendor_id: u16,
        product_id: u16,
    ) -> Result<Option<Device<Context>>, TransportError> {
        let devices = self.context.devices()?;

        for device in devices.iter() {
            let descriptor = match device.device_descriptor() {
                Ok(d) => d,
                Err(e) => {
                    debug!(
                        "Skipping device on bus {} addr {}: {}",
                        device.bus_number(),
                        device.address(),
                        e
                    );
                    continue;
                }
            };

            if descriptor.vendor_id() == vendor_id && descriptor.product_id() == product_id {
                return Ok(Some(device));
            }
        }

        Ok(None)
    }
}

impl UsbTransport for RusbTransport {
    type Handle = DeviceHandle<Context>;

    fn open_device(
        &self,
        vendor_id: u16,
        product_id: u16,
    ) -> Result<Option<Self::Handle>, TransportError> {
        let Some(device) = self.find_device(vendor_id, product_id)? else {
            return Ok(None);
        };

        let handle = device.open().map_err(|e| {
            warn!(
                "Failed to open device {:04x}:{:04x}: {}",
                vendor_id, product_id, e
            );
            TransportError::from(e)
        })?;

        debug!(
            "Opened device {:04x}:{:04x} (bus {}, device {})",
            vendor_id,
            product_id,
            device.bus_number(),
            device.address()
        );
        Ok(Some(handle))
    }

    fn list_devices(&self) -> Result<Vec<DeviceSummary>, TransportError> {
        let devices = self.context.devices()?;
        let mut summaries = Vec::with_capacity(devices.len());

        for device in devices.iter() {
            let descriptor = device.device_descriptor()?;
            summaries.push(DeviceSummary {
                bus: device.bus_number(),
                address: device.address(),
                vendor_id: descriptor.vendor_id(),
                product_id: descriptor.product_id(),
                port_path: device.port_numbers().unwrap_or_default(),
            });
        }

        Ok(summaries)
    }
}

impl UsbHandle for DeviceHandle<Context> {
    fn claim_interface(&mut self, interface: u8) -> Result<(), TransportError> {
        DeviceHandle::claim_interface(self, interface).map_err(Into::into)
    }

    fn release_interface(&mut self, interface: u8) -> Result<(), TransportError> {
        DeviceHandle::release_interface(self, interface).map_err(Into::into)
    }

    fn detach_kernel_driver(&mut self, interface: u8) -> Result<(), TransportError> {
        DeviceHandle::detach_kernel_driver(self, interface).map_err(Into::into)
    }

    fn control_in(
        &self,
        setup: ControlSetup,
        buf: &mut [u8],
        timeout: Duration,
    ) -> Result<usize, TransportError> {
        self.read_control(
            request_type(&setup, Direction::In),
            setup.request,
            setup.value,
            setup.index,
            buf,
            timeout,
        )
        .map_err(Into::into)
    }

    fn control_out(
        &self,
        setup: ControlSetup,
        data: &[u8],
        timeout: Duration,
    ) -> Result<usize, TransportError> {
        self.write_control(
            request_type(&setup, Direction::Out),
            setup.request,
            setup.value,
            setup.index,
            data,
            timeout,
        )
        .map_err(Into::into)
    }

    fn bulk_in(
        &self,
        endpoint: u8,
        buf: &mut [u8],
        timeout: Duration,
    ) -> Result<usize, TransportError> {
        self.read_bulk(endpoint, buf, timeout).map_err(Into::into)
    }

    fn bulk_out(
        &self,
        endpoint: u8,
        data: &[u8],
        timeout: Duration,
    ) -> Result<usize, TransportError> {
        self.write_bulk(endpoint, data, timeout).map_err(Into::into)
    }

    fn active_configuration(&self) -> Result<ConfigurationLayout, TransportError> {
        let config = self.device().active_config_descriptor()?;

        let interfaces = config
            .interfaces()
            .map(|interface| InterfaceLayout {
                number: interface.number(),
                alt_settings: interface
                    .descriptors()
                    .map(|alt| AltSettingLayout {
                        setting: alt.setting_number(),
                        endpoints: alt
                            .endpoint_descriptors()
                            .map(|ep| EndpointLayout {
                                address: ep.address(),
                                transfer_kind: map_transfer_type(ep.transfer_type()),
                            })
                            .collect(),
                    })
                    .collect(),
            })
            .collect();

        Ok(ConfigurationLayout { interfaces })
    }
}

/// `bmRequestType` byte for `setup` in the given direction
pub(crate) fn request_type(setup: &ControlSetup, direction: Direction) -> u8 {
    let direction = match direction {
        Direction::In => rusb::Direction::In,
        Direction::Out => rusb::Direction::Out,
    };
    let kind = match setup.kind {
        RequestKind::Standard => rusb::RequestType::Standard,
        RequestKind::Class => rusb::RequestType::Class,
        RequestKind::Vendor => rusb::RequestType::Vendor,
        RequestKind::Reserved => rusb::RequestType::Reserved,
    };
    let recipient = match setup.recipient {
        Recipient::Device => rusb::Recipient::Device,
        Recipient::Interface => rusb::Recipient::Interface,
        Recipient::Endpoint => rusb::Recipient::Endpoint,
        Recipient::Other => rusb::Recipient::Other,
    };
    rusb::request_type(direction, kind, recipient)
}

fn map_transfer_type(transfer_type: rusb::TransferType) -> TransferKind {
    match transfer_type {
        rusb::TransferType::Control => TransferKind::Control,
        rusb::TransferType::Isochronous => TransferKind::Isochronous,
        rusb::TransferType::Bulk => TransferKind::Bulk,
        rusb::TransferType::Interrupt => TransferKind::Interrupt,
    }
}

impl From<rusb::Error> for TransportError {
    fn from(err: rusb::Error) -> Self {
        #[allow(unreachable_patterns)]
        match err {
            rusb::Error::Io => TransportError::Io,
            rusb::Error::InvalidParam => TransportError::InvalidParam,
            rusb::Error::Access => TransportError::Access,
            rusb::Error::NoDevice => TransportError::NoDevice,
            rusb::Error::NotFound => TransportError::NotFound,
            rusb::Error::Busy => TransportError::Busy,
            rusb::Error::Timeout => TransportError::Timeout,
            rusb::Error::Overflow => TransportError::Overflow,
            rusb::Error::Pipe => TransportError::Pipe,
            rusb::Error::Interrupted => TransportError::Interrupted,
            rusb::Error::NoMem => TransportError::NoMem,
            rusb::Error::NotSupported => TransportError::NotSupported,
            rusb::Error::BadDescriptor => TransportError::BadDescriptor,
            _ => TransportError::Other {
                message: err.to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_map_rusb_error() {
        assert_eq!(TransportError::from(rusb::Error::Timeout), TransportError::Timeout);
        assert_eq!(TransportError::from(rusb::Error::Pipe), TransportError::Pipe);
        assert_eq!(TransportError::from(rusb::Error::NoDevice), TransportError::NoDevice);
        assert_eq!(TransportError::from(rusb::Error::Overflow), TransportError::Overflow);
        assert_eq!(TransportError::from(rusb::Error::Timeout).code(), -7);
    }

    #[test]
    fn test_vendor_request_type() {
        let setup = ControlSetup::vendor(52, 0, 3);
        // LIBUSB_REQUEST_TYPE_VENDOR | LIBUSB_RECIPIENT_DEVICE, plus the IN bit
        assert_eq!(request_type(&setup, Direction::In), 0xC0);
        assert_eq!(request_type(&setup, Direction::Out), 0x40);
    }

    #[test]
    fn test_request_type_recipient_and_kind() {
        let setup = ControlSetup {
            kind: RequestKind::Class,
            recipient: Recipient::Interface,
            request: 0x0A,
            value: 0,
            index: 0,
        };
        assert_eq!(request_type(&setup, Direction::In), 0xA1);
        assert_eq!(request_type(&setup, Direction::Out), 0x21);
    }

    #[test]
    fn test_map_transfer_type() {
        assert_eq!(map_transfer_type(rusb::TransferType::Bulk), TransferKind::Bulk);
        assert_eq!(
            map_transfer_type(rusb::TransferType::Interrupt),
            TransferKind::Interrupt
        );
    }
}
