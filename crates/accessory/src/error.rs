//! Error types

use thiserror::Error;

use crate::types::Direction;

/// Failures reported by the USB transport
///
/// Mirrors the libusb error set so the numeric code survives for callers
/// that want to log or compare it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("Input/output error")]
    Io,

    #[error("Invalid parameter")]
    InvalidParam,

    #[error("Access denied (insufficient permissions)")]
    Access,

    #[error("No such device (it may have been disconnected)")]
    NoDevice,

    #[error("Entity not found")]
    NotFound,

    #[error("Resource busy")]
    Busy,

    #[error("Operation timed out")]
    Timeout,

    #[error("Overflow")]
    Overflow,

    #[error("Pipe error")]
    Pipe,

    #[error("System call interrupted")]
    Interrupted,

    #[error("Insufficient memory")]
    NoMem,

    #[error("Operation not supported or unimplemented on this platform")]
    NotSupported,

    #[error("Malformed descriptor")]
    BadDescriptor,

    #[error("Other error: {message}")]
    Other { message: String },
}

impl TransportError {
    /// libusb numeric error code
    pub fn code(&self) -> i32 {
        match self {
            TransportError::Io => -1,
            TransportError::InvalidParam => -2,
            TransportError::Access => -3,
            TransportError::NoDevice => -4,
            TransportError::NotFound => -5,
            TransportError::Busy => -6,
            TransportError::Timeout => -7,
            TransportError::Overflow => -8,
            TransportError::Pipe => -9,
            TransportError::Interrupted => -10,
            TransportError::NoMem => -11,
            TransportError::NotSupported => -12,
            // libusb has no code for this one, it is reported as "other"
            TransportError::BadDescriptor => -99,
            TransportError::Other { .. } => -99,
        }
    }
}

/// Accessory-level errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AccessoryError {
    /// No matching device on the bus
    #[error("No device found")]
    DeviceNotFound,

    /// The claimed interface has no endpoint for this direction
    #[error("{0} endpoint not found")]
    EndpointNotFound(Direction),

    /// Device reported an AOA protocol version below 1
    #[error("Unsupported accessory protocol version {version}")]
    UnsupportedProtocol { version: u16 },

    /// Transport failure, with the libusb code
    #[error("USB error {code}: {0}", code = .0.code())]
    Usb(TransportError),

    /// A bulk transfer timed out; safe to retry
    #[error("Transfer timed out")]
    Timeout,

    /// Operation on a session that has been closed
    #[error("Device not open")]
    NotOpen,
}

impl AccessoryError {
    /// Whether the caller can simply retry the operation
    pub fn is_recoverable(&self) -> bool {
        matches!(self, AccessoryError::Timeout)
    }

    /// libusb code, if this error came from the transport
    pub fn usb_code(&self) -> Option<i32> {
        match self {
            AccessoryError::Usb(e) => Some(e.code()),
            AccessoryError::Timeout => Some(TransportError::Timeout.code()),
            _ => None,
        }
    }
}

impl From<TransportError> for AccessoryError {
    fn from(err: TransportError) -> Self {
        AccessoryError::Usb(err)
    }
}

/// Type alias for accessory results
pub type Result<T> = std::result::Result<T, AccessoryError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_error_codes() {
        assert_eq!(TransportError::Io.code(), -1);
        assert_eq!(TransportError::Timeout.code(), -7);
        assert_eq!(TransportError::Overflow.code(), -8);
        assert_eq!(TransportError::Pipe.code(), -9);
    }

    #[test]
    fn test_usb_error_display_carries_code() {
        let err = AccessoryError::Usb(TransportError::Pipe);
        let msg = err.to_string();
        assert!(msg.contains("-9"));
        assert!(msg.contains("Pipe error"));
    }

    #[test]
    fn test_endpoint_not_found_display() {
        let err = AccessoryError::EndpointNotFound(Direction::Out);
        assert_eq!(err.to_string(), "OUT endpoint not found");
    }

    #[test]
    fn test_only_timeout_is_recoverable() {
        assert!(AccessoryError::Timeout.is_recoverable());
        assert!(!AccessoryError::Usb(TransportError::Timeout).is_recoverable());
        assert!(!AccessoryError::NotOpen.is_recoverable());
        assert!(!AccessoryError::DeviceNotFound.is_recoverable());
    }

    #[test]
    fn test_usb_code() {
        assert_eq!(AccessoryError::Usb(TransportError::Busy).usb_code(), Some(-6));
        assert_eq!(AccessoryError::Timeout.usb_code(), Some(-7));
        assert_eq!(AccessoryError::NotOpen.usb_code(), None);
    }
}
