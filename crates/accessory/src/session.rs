//! Accessory session
//!
//! An open accessory: a claimed interface plus its resolved endpoint pair.
//! Sessions are only created by [`crate::Negotiator::open`]; once closed
//! they stay closed.

use std::io;
use std::time::Duration;

use tracing::{debug, warn};

use crate::error::{AccessoryError, Result, TransportError};
use crate::transport::UsbHandle;
use crate::types::{DeviceIdentity, EndpointPair};

/// Open device handle with one claimed interface
///
/// Dropping it releases the interface, then closes the handle.
pub(crate) struct ClaimedHandle<H: UsbHandle> {
    handle: H,
    interface: u8,
}

impl<H: UsbHandle> ClaimedHandle<H> {
    /// Claim `interface` on an opened handle
    ///
    /// When `detach_kernel_driver` is set, a bound kernel driver is detached
    /// first; failing to do so is only logged. On claim failure the handle is
    /// dropped (closed) before the error is returned.
    pub(crate) fn claim(
        mut handle: H,
        interface: u8,
        detach_kernel_driver: bool,
    ) -> std::result::Result<Self, TransportError> {
        if detach_kernel_driver {
            match handle.detach_kernel_driver(interface) {
                Ok(()) => debug!("Detached kernel driver from interface {}", interface),
                Err(e) => debug!(
                    "Could not detach kernel driver from interface {}: {}",
                    interface, e
                ),
            }
        }

        handle.claim_interface(interface).map_err(|e| {
            warn!("Failed to claim interface {}: {}", interface, e);
            e
        })?;
        debug!("Claimed interface {}", interface);

        Ok(Self { handle, interface })
    }

    pub(crate) fn handle(&self) -> &H {
        &self.handle
    }
}

impl<H: UsbHandle> Drop for ClaimedHandle<H> {
    fn drop(&mut self) {
        if let Err(e) = self.handle.release_interface(self.interface) {
            warn!("Failed to release interface {}: {}", self.interface, e);
        } else {
            debug!("Released interface {}", self.interface);
        }
    }
}

enum SessionState<H: UsbHandle> {
    Open(ClaimedHandle<H>),
    Closed,
}

/// Bidirectional byte stream over an accessory's bulk endpoints
///
/// Not safe to share between threads without external locking; every
/// operation blocks up to its timeout. A zero timeout waits forever.
pub struct AccessorySession<H: UsbHandle> {
    state: SessionState<H>,
    identity: DeviceIdentity,
    endpoints: EndpointPair,
    /// Timeout used by the `io::Read`/`io::Write` impls
    io_timeout: Duration,
}

impl<H: UsbHandle> AccessorySession<H> {
    pub(crate) fn new(
        claimed: ClaimedHandle<H>,
        identity: DeviceIdentity,
        endpoints: EndpointPair,
    ) -> Self {
        Self {
            state: SessionState::Open(claimed),
            identity,
            endpoints,
            io_timeout: Duration::ZERO,
        }
    }

    /// Read up to `buf.len()` bytes from the inbound endpoint
    ///
    /// A transfer that times out returns [`AccessoryError::Timeout`] so the
    /// caller can poll again.
    pub fn read(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize> {
        let endpoint = self.endpoints.in_address;
        let claimed = self.claimed()?;

        let n = claimed
            .handle()
            .bulk_in(endpoint, buf, timeout)
            .map_err(map_bulk_error)?;
        debug!("Read {} bytes from endpoint {:#04x}", n, endpoint);
        Ok(n)
    }

    /// Write `data` to the outbound endpoint, returns the bytes sent
    pub fn write(&mut self, data: &[u8], timeout: Duration) -> Result<usize> {
        let endpoint = self.endpoints.out_address;
        let claimed = self.claimed()?;

        let n = claimed
            .handle()
            .bulk_out(endpoint, data, timeout)
            .map_err(map_bulk_error)?;
        debug!("Wrote {} bytes to endpoint {:#04x}", n, endpoint);
        Ok(n)
    }

    /// Release the interface and close the device
    ///
    /// Calling it again is a no-op.
    pub fn close(&mut self) {
        let state = std::mem::replace(&mut self.state, SessionState::Closed);
        if let SessionState::Open(claimed) = state {
            drop(claimed);
            debug!("Closed accessory {}", self.identity);
        }
    }

    pub fn is_open(&self) -> bool {
        matches!(self.state, SessionState::Open(_))
    }

    pub fn endpoints(&self) -> EndpointPair {
        self.endpoints
    }

    /// Vendor/product the accessory was opened under
    pub fn identity(&self) -> DeviceIdentity {
        self.identity
    }

    pub fn io_timeout(&self) -> Duration {
        self.io_timeout
    }

    /// Set the timeout used by the `io::Read`/`io::Write` impls
    pub fn set_io_timeout(&mut self, timeout: Duration) {
        self.io_timeout = timeout;
    }

    fn claimed(&self) -> Result<&ClaimedHandle<H>> {
        match &self.state {
            SessionState::Open(claimed) => Ok(claimed),
            SessionState::Closed => Err(AccessoryError::NotOpen),
        }
    }
}

impl<H: UsbHandle> Drop for AccessorySession<H> {
    fn drop(&mut self) {
        self.close();
    }
}

impl<H: UsbHandle> io::Read for AccessorySession<H> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let timeout = self.io_timeout;
        AccessorySession::read(self, buf, timeout).map_err(into_io_error)
    }
}

impl<H: UsbHandle> io::Write for AccessorySession<H> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let timeout = self.io_timeout;
        AccessorySession::write(self, buf, timeout).map_err(into_io_error)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

fn map_bulk_error(err: TransportError) -> AccessoryError {
    match err {
        TransportError::Timeout => AccessoryError::Timeout,
        other => AccessoryError::Usb(other),
    }
}

fn into_io_error(err: AccessoryError) -> io::Error {
    let kind = match &err {
        AccessoryError::Timeout => io::ErrorKind::TimedOut,
        AccessoryError::NotOpen => io::ErrorKind::NotConnected,
        AccessoryError::Usb(TransportError::NoDevice) => io::ErrorKind::BrokenPipe,
        _ => io::ErrorKind::Other,
    };
    io::Error::new(kind, err)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_map_bulk_error() {
        assert_eq!(map_bulk_error(TransportError::Timeout), AccessoryError::Timeout);
        assert_eq!(
            map_bulk_error(TransportError::Pipe),
            AccessoryError::Usb(TransportError::Pipe)
        );
    }

    #[test]
    fn test_into_io_error_kinds() {
        assert_eq!(
            into_io_error(AccessoryError::Timeout).kind(),
            io::ErrorKind::TimedOut
        );
        assert_eq!(
            into_io_error(AccessoryError::NotOpen).kind(),
            io::ErrorKind::NotConnected
        );
        assert_eq!(
            into_io_error(AccessoryError::Usb(TransportError::Io)).kind(),
            io::ErrorKind::Other
        );
    }
}
