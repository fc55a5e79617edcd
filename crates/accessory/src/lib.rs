//! Android Open Accessory (AOA) host library
//!
//! This crate drives the AOA handshake over USB and exposes the resulting
//! bulk endpoint pair as a blocking byte stream.
//!
//! The flow is:
//! 1. [`Negotiator::open`] looks for a device that is already in accessory
//!    mode (vendor `0x18D1`, one of the accessory product IDs).
//! 2. If none is present it opens the caller's device, checks the AOA
//!    protocol version, sends the six identity strings and the start request,
//!    waits for re-enumeration and looks again.
//! 3. The claimed accessory interface is handed back as an
//!    [`AccessorySession`] with `read`/`write`/`close`.
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//! use accessory::{
//!     AccessoryDescriptor, DeviceIdentity, Negotiator, NegotiatorConfig, RusbTransport,
//! };
//!
//! # fn main() -> accessory::Result<()> {
//! let transport = RusbTransport::new()?;
//! let negotiator = Negotiator::new(transport, NegotiatorConfig::default());
//!
//! let descriptor = AccessoryDescriptor::new(
//!     "AccessoryTest", "TestDemo", "test", "1.0", "https://example.com", "",
//! );
//! let mut session = negotiator.open(DeviceIdentity::new(0x2717, 0xff40), &descriptor)?;
//!
//! let mut buf = [0u8; 1024];
//! let n = session.read(&mut buf, Duration::from_millis(200))?;
//! session.write(&buf[..n], Duration::ZERO)?;
//! session.close();
//! # Ok(())
//! # }
//! ```

pub mod backend;
pub mod endpoints;
pub mod error;
pub mod negotiator;
pub mod protocol;
pub mod session;
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
pub mod transport;
pub mod types;

pub use backend::RusbTransport;
pub use endpoints::resolve_endpoints;
pub use error::{AccessoryError, Result, TransportError};
pub use negotiator::{Negotiator, NegotiatorConfig};
pub use session::AccessorySession;
pub use transport::{
    AltSettingLayout, ConfigurationLayout, ControlSetup, DeviceSummary, EndpointLayout,
    InterfaceLayout, Recipient, RequestKind, TransferKind, UsbHandle, UsbTransport,
};
pub use types::{AccessoryDescriptor, DeviceIdentity, Direction, EndpointPair};
