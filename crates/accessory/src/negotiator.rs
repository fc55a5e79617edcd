//! Accessory mode negotiation
//!
//! Two paths lead to an open session:
//! - **Direct**: a device already enumerates as `0x18D1` with an accessory
//!   product ID. Claim interface 0, resolve endpoints, done.
//! - **Switch**: open the caller's device, check the AOA protocol version,
//!   send the identity strings and the start request, then wait for the
//!   device to re-enumerate and try the direct path once more.
//!
//! Every failure after a claim releases the interface before the error is
//! returned (see `ClaimedHandle`).

use std::thread;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::endpoints::resolve_endpoints;
use crate::error::{AccessoryError, Result};
use crate::protocol::{
    ACCESSORY_GET_PROTOCOL, ACCESSORY_INTERFACE, ACCESSORY_PRODUCT_IDS, ACCESSORY_SEND_STRING,
    ACCESSORY_START, ACCESSORY_VENDOR_ID, MIN_PROTOCOL_VERSION, decode_protocol_version,
    encode_string,
};
use crate::session::{AccessorySession, ClaimedHandle};
use crate::transport::{ControlSetup, UsbHandle, UsbTransport};
use crate::types::{AccessoryDescriptor, DeviceIdentity};

/// Default wait for the device to re-enumerate after the start request
pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_millis(2000);

/// Default wait before handing an opened session to the caller
pub const DEFAULT_STABILIZE_DELAY: Duration = Duration::from_millis(100);

/// Timing and platform knobs for [`Negotiator`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NegotiatorConfig {
    /// Sleep between the start request and the second direct-path attempt
    pub settle_delay: Duration,
    /// Sleep after a successful open, before returning the session
    pub stabilize_delay: Duration,
    /// Timeout for each handshake control transfer (zero = no limit)
    pub control_timeout: Duration,
    /// Detach a kernel driver from interface 0 before claiming it on the
    /// caller's device
    pub detach_kernel_driver: bool,
}

impl Default for NegotiatorConfig {
    fn default() -> Self {
        Self {
            settle_delay: DEFAULT_SETTLE_DELAY,
            stabilize_delay: DEFAULT_STABILIZE_DELAY,
            control_timeout: Duration::ZERO,
            detach_kernel_driver: cfg!(target_os = "linux"),
        }
    }
}

impl NegotiatorConfig {
    pub fn with_settle_delay(mut self, delay: Duration) -> Self {
        self.settle_delay = delay;
        self
    }

    pub fn with_stabilize_delay(mut self, delay: Duration) -> Self {
        self.stabilize_delay = delay;
        self
    }

    pub fn with_control_timeout(mut self, timeout: Duration) -> Self {
        self.control_timeout = timeout;
        self
    }

    pub fn with_detach_kernel_driver(mut self, detach: bool) -> Self {
        self.detach_kernel_driver = detach;
        self
    }

    /// No sleeps at all, for tests against an in-memory transport
    pub fn immediate() -> Self {
        Self::default()
            .with_settle_delay(Duration::ZERO)
            .with_stabilize_delay(Duration::ZERO)
    }
}

/// Drives the AOA handshake over a transport
pub struct Negotiator<T: UsbTransport> {
    transport: T,
    config: NegotiatorConfig,
}

impl<T: UsbTransport> Negotiator<T> {
    pub fn new(transport: T, config: NegotiatorConfig) -> Self {
        Self { transport, config }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn config(&self) -> &NegotiatorConfig {
        &self.config
    }

    /// Open an accessory session for `identity`
    ///
    /// Tries the direct path first; if no accessory-mode device is attached,
    /// switches `identity` into accessory mode and tries once more.
    pub fn open(
        &self,
        identity: DeviceIdentity,
        descriptor: &AccessoryDescriptor,
    ) -> Result<AccessorySession<T::Handle>> {
        let session = match self.open_accessory()? {
            Some(session) => {
                info!("Device already in accessory mode: {}", session.identity());
                session
            }
            None => {
                info!(
                    "No accessory-mode device found, switching {} into accessory mode",
                    identity
                );
                self.switch_device(identity, descriptor)?;

                debug!(
                    "Waiting {}ms for device to re-enumerate",
                    self.config.settle_delay.as_millis()
                );
                sleep(self.config.settle_delay);

                self.open_accessory()?.ok_or_else(|| {
                    warn!("Device did not re-enumerate in accessory mode");
                    AccessoryError::DeviceNotFound
                })?
            }
        };

        sleep(self.config.stabilize_delay);
        info!(
            "Accessory session open on {} ({})",
            session.identity(),
            session.endpoints()
        );
        Ok(session)
    }

    /// Direct path
    ///
    /// `Ok(None)` means no device with an accessory vendor/product ID could be
    /// opened. Claim and endpoint failures are returned as errors.
    fn open_accessory(&self) -> Result<Option<AccessorySession<T::Handle>>> {
        let Some((identity, handle)) = self.find_accessory_device() else {
            return Ok(None);
        };

        let claimed = ClaimedHandle::claim(handle, ACCESSORY_INTERFACE, false)?;
        let layout = claimed.handle().active_configuration()?;
        let endpoints = resolve_endpoints(&layout)?;

        Ok(Some(AccessorySession::new(claimed, identity, endpoints)))
    }

    fn find_accessory_device(&self) -> Option<(DeviceIdentity, T::Handle)> {
        ACCESSORY_PRODUCT_IDS.iter().find_map(|&product_id| {
            let identity = DeviceIdentity::new(ACCESSORY_VENDOR_ID, product_id);
            match self.transport.open_device(identity.vendor_id, identity.product_id) {
                Ok(Some(handle)) => Some((identity, handle)),
                Ok(None) => None,
                Err(e) => {
                    debug!("Could not open {}: {}", identity, e);
                    None
                }
            }
        })
    }

    /// Switch path: handshake with the caller's device
    ///
    /// On return the interface has been released and the handle closed,
    /// whether the handshake succeeded or not.
    fn switch_device(
        &self,
        identity: DeviceIdentity,
        descriptor: &AccessoryDescriptor,
    ) -> Result<()> {
        let handle = self
            .transport
            .open_device(identity.vendor_id, identity.product_id)?
            .ok_or(AccessoryError::DeviceNotFound)?;

        let claimed = ClaimedHandle::claim(
            handle,
            ACCESSORY_INTERFACE,
            self.config.detach_kernel_driver,
        )?;

        let version = self.get_protocol(&claimed)?;
        info!("Accessory protocol version: {}", version);
        if version < MIN_PROTOCOL_VERSION {
            return Err(AccessoryError::UnsupportedProtocol { version });
        }

        for (index, value) in descriptor.strings() {
            debug!("Sending {:?} string: {:?}", index, value);
            self.control_out(
                &claimed,
                ControlSetup::vendor(ACCESSORY_SEND_STRING, 0, index.wire_index()),
                &encode_string(value),
            )?;
        }

        debug!("Sending accessory start request");
        self.control_out(&claimed, ControlSetup::vendor(ACCESSORY_START, 0, 0), &[])?;

        drop(claimed);
        Ok(())
    }

    fn get_protocol(&self, claimed: &ClaimedHandle<T::Handle>) -> Result<u16> {
        let mut reply = [0u8; 2];
        let n = claimed.handle().control_in(
            ControlSetup::vendor(ACCESSORY_GET_PROTOCOL, 0, 0),
            &mut reply,
            self.config.control_timeout,
        )?;
        debug!("Get-protocol reply: {:?}", &reply[..n]);
        Ok(decode_protocol_version(&reply[..n]))
    }

    fn control_out(
        &self,
        claimed: &ClaimedHandle<T::Handle>,
        setup: ControlSetup,
        data: &[u8],
    ) -> Result<()> {
        claimed
            .handle()
            .control_out(setup, data, self.config.control_timeout)
            .map_err(|e| {
                warn!("Control transfer {} failed: {}", setup.request, e);
                AccessoryError::Usb(e)
            })?;
        Ok(())
    }
}

fn sleep(delay: Duration) {
    if !delay.is_zero() {
        thread::sleep(delay);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = NegotiatorConfig::default();
        assert_eq!(config.settle_delay, Duration::from_millis(2000));
        assert_eq!(config.stabilize_delay, Duration::from_millis(100));
        assert_eq!(config.control_timeout, Duration::ZERO);
        assert_eq!(config.detach_kernel_driver, cfg!(target_os = "linux"));
    }

    #[test]
    fn test_immediate_config() {
        let config = NegotiatorConfig::immediate();
        assert!(config.settle_delay.is_zero());
        assert!(config.stabilize_delay.is_zero());
    }

    #[test]
    fn test_builder_setters() {
        let config = NegotiatorConfig::default()
            .with_control_timeout(Duration::from_secs(1))
            .with_detach_kernel_driver(false);
        assert_eq!(config.control_timeout, Duration::from_secs(1));
        assert!(!config.detach_kernel_driver);
    }
}
