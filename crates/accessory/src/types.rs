//! Core data types

use std::fmt;

use crate::protocol::StringIndex;

/// Vendor/product pair identifying a physical device on the bus
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeviceIdentity {
    pub vendor_id: u16,
    pub product_id: u16,
}

impl DeviceIdentity {
    pub const fn new(vendor_id: u16, product_id: u16) -> Self {
        Self {
            vendor_id,
            product_id,
        }
    }
}

impl fmt::Display for DeviceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04x}:{:04x}", self.vendor_id, self.product_id)
    }
}

/// Identity strings announced to the phone during the mode switch
///
/// Android uses these to pick the app that handles the accessory.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AccessoryDescriptor {
    pub manufacturer: String,
    pub model: String,
    pub description: String,
    pub version: String,
    pub uri: String,
    pub serial: String,
}

impl AccessoryDescriptor {
    pub fn new(
        manufacturer: impl Into<String>,
        model: impl Into<String>,
        description: impl Into<String>,
        version: impl Into<String>,
        uri: impl Into<String>,
        serial: impl Into<String>,
    ) -> Self {
        Self {
            manufacturer: manufacturer.into(),
            model: model.into(),
            description: description.into(),
            version: version.into(),
            uri: uri.into(),
            serial: serial.into(),
        }
    }

    /// Get the string stored in a slot
    pub fn get(&self, index: StringIndex) -> &str {
        match index {
            StringIndex::Manufacturer => &self.manufacturer,
            StringIndex::Model => &self.model,
            StringIndex::Description => &self.description,
            StringIndex::Version => &self.version,
            StringIndex::Uri => &self.uri,
            StringIndex::Serial => &self.serial,
        }
    }

    /// Iterate over all slots in wire order
    pub fn strings(&self) -> impl Iterator<Item = (StringIndex, &str)> {
        StringIndex::ALL.into_iter().map(|index| (index, self.get(index)))
    }
}

/// Transfer direction, from the host's point of view
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Device to host
    In,
    /// Host to device
    Out,
}

impl Direction {
    /// Direction encoded in bit 7 of an endpoint address
    pub fn of_endpoint(address: u8) -> Self {
        if address & 0x80 != 0 {
            Direction::In
        } else {
            Direction::Out
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::In => write!(f, "IN"),
            Direction::Out => write!(f, "OUT"),
        }
    }
}

/// Resolved bulk endpoint addresses for one session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EndpointPair {
    pub in_address: u8,
    pub out_address: u8,
}

impl fmt::Display for EndpointPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "in={:#04x}, out={:#04x}",
            self.in_address, self.out_address
        )
    }
}
