//! Test utilities
//!
//! [`MockTransport`] is an in-memory bus. Tests register [`MockDevice`]s,
//! run the negotiator or a session against it and then inspect the ordered
//! [`MockEvent`] log.
//!
//! # Example
//!
//! ```
//! use accessory::test_utils::{MockDevice, MockTransport};
//! use accessory::{AccessoryDescriptor, DeviceIdentity, Negotiator, NegotiatorConfig};
//!
//! let transport = MockTransport::new();
//! transport.add_device(MockDevice::accessory(0x2D00));
//!
//! let negotiator = Negotiator::new(transport.clone(), NegotiatorConfig::immediate());
//! let session = negotiator
//!     .open(DeviceIdentity::new(0x2717, 0xff40), &AccessoryDescriptor::default())
//!     .unwrap();
//!
//! assert!(session.is_open());
//! assert_eq!(transport.claimed_count(), 1);
//! ```

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use crate::backend::request_type;
use crate::error::TransportError;
use crate::protocol::{ACCESSORY_START, ACCESSORY_VENDOR_ID};
use crate::transport::{
    ConfigurationLayout, ControlSetup, DeviceSummary, EndpointLayout, UsbHandle, UsbTransport,
};
use crate::types::{DeviceIdentity, Direction};

/// One recorded transport operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockEvent {
    Open(DeviceIdentity),
    Close(DeviceIdentity),
    DetachKernelDriver { interface: u8 },
    Claim { interface: u8 },
    Release { interface: u8 },
    ControlIn {
        request_type: u8,
        request: u8,
        value: u16,
        index: u16,
        length: usize,
    },
    ControlOut {
        request_type: u8,
        request: u8,
        value: u16,
        index: u16,
        data: Vec<u8>,
    },
    BulkIn { endpoint: u8, length: usize },
    BulkOut { endpoint: u8, data: Vec<u8> },
}

/// Scripted device behaviour
#[derive(Debug, Clone)]
pub struct MockDevice {
    identity: DeviceIdentity,
    layout: ConfigurationLayout,
    protocol_reply: Vec<u8>,
    reenumerate_as: Option<DeviceIdentity>,
    open_error: Option<TransportError>,
    claim_error: Option<TransportError>,
    detach_error: Option<TransportError>,
    control_errors: Vec<(u8, Option<u16>, TransportError)>,
    bulk_error: Option<TransportError>,
    write_limit: Option<usize>,
    inbound: VecDeque<Vec<u8>>,
    written: Vec<Vec<u8>>,
}

impl MockDevice {
    /// Device with bulk endpoints `0x81`/`0x02` that speaks AOA version 2
    pub fn new(vendor_id: u16, product_id: u16) -> Self {
        Self {
            identity: DeviceIdentity::new(vendor_id, product_id),
            layout: ConfigurationLayout::single_interface(vec![
                EndpointLayout::bulk(0x81),
                EndpointLayout::bulk(0x02),
            ]),
            protocol_reply: 2u16.to_le_bytes().to_vec(),
            reenumerate_as: None,
            open_error: None,
            claim_error: None,
            detach_error: None,
            control_errors: Vec::new(),
            bulk_error: None,
            write_limit: None,
            inbound: VecDeque::new(),
            written: Vec::new(),
        }
    }

    /// Device already in accessory mode
    pub fn accessory(product_id: u16) -> Self {
        Self::new(ACCESSORY_VENDOR_ID, product_id)
    }

    pub fn with_layout(mut self, layout: ConfigurationLayout) -> Self {
        self.layout = layout;
        self
    }

    /// Single interface holding endpoints with these addresses
    pub fn with_endpoints(self, addresses: &[u8]) -> Self {
        self.with_layout(ConfigurationLayout::single_interface(
            addresses.iter().copied().map(EndpointLayout::bulk).collect(),
        ))
    }

    pub fn with_protocol_version(mut self, version: u16) -> Self {
        self.protocol_reply = version.to_le_bytes().to_vec();
        self
    }

    /// Raw get-protocol reply, for short or malformed answers
    pub fn with_protocol_reply(mut self, reply: &[u8]) -> Self {
        self.protocol_reply = reply.to_vec();
        self
    }

    /// After the start request, reappear as `0x18D1:product_id`
    pub fn reenumerates_as(mut self, product_id: u16) -> Self {
        self.reenumerate_as = Some(DeviceIdentity::new(ACCESSORY_VENDOR_ID, product_id));
        self
    }

    pub fn with_open_error(mut self, err: TransportError) -> Self {
        self.open_error = Some(err);
        self
    }

    pub fn with_claim_error(mut self, err: TransportError) -> Self {
        self.claim_error = Some(err);
        self
    }

    pub fn with_detach_error(mut self, err: TransportError) -> Self {
        self.detach_error = Some(err);
        self
    }

    /// Fail control request `request` (any index)
    pub fn with_control_error(mut self, request: u8, err: TransportError) -> Self {
        self.control_errors.push((request, None, err));
        self
    }

    /// Fail control request `request` only for `wIndex == index`
    pub fn with_control_error_at(mut self, request: u8, index: u16, err: TransportError) -> Self {
        self.control_errors.push((request, Some(index), err));
        self
    }

    /// Fail every bulk transfer
    pub fn with_bulk_error(mut self, err: TransportError) -> Self {
        self.bulk_error = Some(err);
        self
    }

    /// Accept at most `limit` bytes per bulk OUT transfer (0 = none at all)
    pub fn with_write_limit(mut self, limit: usize) -> Self {
        self.write_limit = Some(limit);
        self
    }

    pub fn with_inbound(mut self, data: &[u8]) -> Self {
        self.inbound.push_back(data.to_vec());
        self
    }

    fn control_error(&self, request: u8, index: u16) -> Option<TransportError> {
        self.control_errors
            .iter()
            .find(|(r, i, _)| *r == request && i.is_none_or(|i| i == index))
            .map(|(_, _, e)| e.clone())
    }
}

#[derive(Debug, Default)]
struct MockState {
    devices: Vec<MockDevice>,
    events: Vec<MockEvent>,
    claimed: usize,
    open_handles: usize,
}

/// In-memory transport; clones share the same bus
#[derive(Debug, Clone, Default)]
pub struct MockTransport {
    state: Arc<Mutex<MockState>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_device(&self, device: MockDevice) {
        self.lock().devices.push(device);
    }

    /// All recorded operations, oldest first
    pub fn events(&self) -> Vec<MockEvent> {
        self.lock().events.clone()
    }

    /// Only the control transfers, as `(request, index)` pairs
    pub fn control_requests(&self) -> Vec<(u8, u16)> {
        self.lock()
            .events
            .iter()
            .filter_map(|event| match event {
                MockEvent::ControlIn { request, index, .. }
                | MockEvent::ControlOut { request, index, .. } => Some((*request, *index)),
                _ => None,
            })
            .collect()
    }

    /// Number of interfaces currently claimed across all handles
    pub fn claimed_count(&self) -> usize {
        self.lock().claimed
    }

    /// Number of handles not yet closed
    pub fn open_handle_count(&self) -> usize {
        self.lock().open_handles
    }

    /// Number of recorded operations
    pub fn event_count(&self) -> usize {
        self.lock().events.len()
    }

    /// Queue inbound bulk data on the device currently known as `identity`
    pub fn push_inbound(&self, identity: DeviceIdentity, data: &[u8]) {
        let mut state = self.lock();
        if let Some(device) = state.devices.iter_mut().find(|d| d.identity == identity) {
            device.inbound.push_back(data.to_vec());
        }
    }

    /// Bulk OUT payloads received by the device currently known as `identity`
    pub fn written(&self, identity: DeviceIdentity) -> Vec<Vec<u8>> {
        self.lock()
            .devices
            .iter()
            .find(|d| d.identity == identity)
            .map(|d| d.written.clone())
            .unwrap_or_default()
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        lock_state(&self.state)
    }
}

fn lock_state(state: &Mutex<MockState>) -> MutexGuard<'_, MockState> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl UsbTransport for MockTransport {
    type Handle = MockHandle;

    fn open_device(
        &self,
        vendor_id: u16,
        product_id: u16,
    ) -> Result<Option<Self::Handle>, TransportError> {
        let identity = DeviceIdentity::new(vendor_id, product_id);
        let mut state = self.lock();

        let Some(device) = state.devices.iter().position(|d| d.identity == identity) else {
            return Ok(None);
        };
        if let Some(err) = state.devices[device].open_error.clone() {
            return Err(err);
        }

        state.events.push(MockEvent::Open(identity));
        state.open_handles += 1;

        Ok(Some(MockHandle {
            state: Arc::clone(&self.state),
            device,
            identity,
            claimed: Vec::new(),
        }))
    }

    fn list_devices(&self) -> Result<Vec<DeviceSummary>, TransportError> {
        Ok(self
            .lock()
            .devices
            .iter()
            .enumerate()
            .map(|(i, d)| DeviceSummary {
                bus: 1,
                address: i as u8 + 1,
                vendor_id: d.identity.vendor_id,
                product_id: d.identity.product_id,
                port_path: vec![i as u8 + 1],
            })
            .collect())
    }
}

/// Handle returned by [`MockTransport`]; dropping it records a close
#[derive(Debug)]
pub struct MockHandle {
    state: Arc<Mutex<MockState>>,
    device: usize,
    identity: DeviceIdentity,
    claimed: Vec<u8>,
}

impl MockHandle {
    fn lock(&self) -> MutexGuard<'_, MockState> {
        lock_state(&self.state)
    }
}

impl UsbHandle for MockHandle {
    fn claim_interface(&mut self, interface: u8) -> Result<(), TransportError> {
        let mut state = lock_state(&self.state);
        if let Some(err) = state.devices[self.device].claim_error.clone() {
            return Err(err);
        }
        if self.claimed.contains(&interface) {
            return Err(TransportError::Busy);
        }

        state.events.push(MockEvent::Claim { interface });
        state.claimed += 1;
        self.claimed.push(interface);
        Ok(())
    }

    fn release_interface(&mut self, interface: u8) -> Result<(), TransportError> {
        let Some(pos) = self.claimed.iter().position(|&i| i == interface) else {
            return Err(TransportError::NotFound);
        };

        let mut state = lock_state(&self.state);
        state.events.push(MockEvent::Release { interface });
        state.claimed -= 1;
        self.claimed.remove(pos);
        Ok(())
    }

    fn detach_kernel_driver(&mut self, interface: u8) -> Result<(), TransportError> {
        let mut state = self.lock();
        state.events.push(MockEvent::DetachKernelDriver { interface });
        match state.devices[self.device].detach_error.clone() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn control_in(
        &self,
        setup: ControlSetup,
        buf: &mut [u8],
        _timeout: Duration,
    ) -> Result<usize, TransportError> {
        let mut state = self.lock();
        state.events.push(MockEvent::ControlIn {
            request_type: request_type(&setup, Direction::In),
            request: setup.request,
            value: setup.value,
            index: setup.index,
            length: buf.len(),
        });

        let device = &state.devices[self.device];
        if let Some(err) = device.control_error(setup.request, setup.index) {
            return Err(err);
        }

        let n = device.protocol_reply.len().min(buf.len());
        buf[..n].copy_from_slice(&device.protocol_reply[..n]);
        Ok(n)
    }

    fn control_out(
        &self,
        setup: ControlSetup,
        data: &[u8],
        _timeout: Duration,
    ) -> Result<usize, TransportError> {
        let mut state = self.lock();
        state.events.push(MockEvent::ControlOut {
            request_type: request_type(&setup, Direction::Out),
            request: setup.request,
            value: setup.value,
            index: setup.index,
            data: data.to_vec(),
        });

        let device = &mut state.devices[self.device];
        if let Some(err) = device.control_error(setup.request, setup.index) {
            return Err(err);
        }

        if setup.request == ACCESSORY_START {
            if let Some(identity) = device.reenumerate_as.take() {
                device.identity = identity;
            }
        }
        Ok(data.len())
    }

    fn bulk_in(
        &self,
        endpoint: u8,
        buf: &mut [u8],
        _timeout: Duration,
    ) -> Result<usize, TransportError> {
        let mut state = self.lock();
        state.events.push(MockEvent::BulkIn {
            endpoint,
            length: buf.len(),
        });

        let device = &mut state.devices[self.device];
        if let Some(err) = device.bulk_error.clone() {
            return Err(err);
        }

        let Some(data) = device.inbound.front() else {
            return Err(TransportError::Timeout);
        };
        if data.len() > buf.len() {
            return Err(TransportError::Overflow);
        }

        let n = data.len();
        buf[..n].copy_from_slice(data);
        device.inbound.pop_front();
        Ok(n)
    }

    fn bulk_out(
        &self,
        endpoint: u8,
        data: &[u8],
        _timeout: Duration,
    ) -> Result<usize, TransportError> {
        let mut state = self.lock();
        state.events.push(MockEvent::BulkOut {
            endpoint,
            data: data.to_vec(),
        });

        let device = &mut state.devices[self.device];
        if let Some(err) = device.bulk_error.clone() {
            return Err(err);
        }

        let n = device.write_limit.map_or(data.len(), |limit| limit.min(data.len()));
        if n > 0 {
            device.written.push(data[..n].to_vec());
        }
        Ok(n)
    }

    fn active_configuration(&self) -> Result<ConfigurationLayout, TransportError> {
        Ok(self.lock().devices[self.device].layout.clone())
    }
}

impl Drop for MockHandle {
    fn drop(&mut self) {
        let mut state = lock_state(&self.state);
        // libusb_close releases whatever is still claimed
        state.claimed -= self.claimed.len();
        state.open_handles -= 1;
        state.events.push(MockEvent::Close(self.identity));
    }
}
