//! Session Integration Tests
//!
//! Exercises read/write/close on a session opened against the in-memory
//! transport.
//!
//! Run with: `cargo test -p accessory --test session_tests`

use std::io::{Read, Write};
use std::time::Duration;

use accessory::protocol::ACCESSORY_VENDOR_ID;
use accessory::test_utils::{MockDevice, MockEvent, MockHandle, MockTransport};
use accessory::{
    AccessoryDescriptor, AccessoryError, AccessorySession, DeviceIdentity, Negotiator,
    NegotiatorConfig, TransportError,
};

const ACCESSORY: DeviceIdentity = DeviceIdentity::new(ACCESSORY_VENDOR_ID, 0x2D00);
const TIMEOUT: Duration = Duration::from_millis(200);

fn open_session(device: MockDevice) -> (MockTransport, AccessorySession<MockHandle>) {
    let transport = MockTransport::new();
    transport.add_device(device);

    let session = Negotiator::new(transport.clone(), NegotiatorConfig::immediate())
        .open(
            DeviceIdentity::new(0x2717, 0xff40),
            &AccessoryDescriptor::default(),
        )
        .unwrap();
    (transport, session)
}

// ============================================================================
// Read Tests
// ============================================================================

#[test]
fn test_read_uses_in_endpoint() {
    let (transport, mut session) =
        open_session(MockDevice::accessory(0x2D00).with_inbound(b"ping"));

    let mut buf = [0u8; 64];
    let n = session.read(&mut buf, TIMEOUT).unwrap();

    assert_eq!(&buf[..n], b"ping");
    assert_eq!(
        transport.events().last(),
        Some(&MockEvent::BulkIn {
            endpoint: 0x81,
            length: 64
        })
    );
}

#[test]
fn test_read_without_data_times_out() {
    let (_transport, mut session) = open_session(MockDevice::accessory(0x2D00));

    let mut buf = [0u8; 64];
    let err = session.read(&mut buf, TIMEOUT).unwrap_err();

    assert_eq!(err, AccessoryError::Timeout);
    assert!(err.is_recoverable());
    // Still usable after a timeout
    assert!(session.is_open());
}

#[test]
fn test_read_after_timeout_gets_later_data() {
    let (transport, mut session) = open_session(MockDevice::accessory(0x2D00));
    let mut buf = [0u8; 64];

    assert_eq!(session.read(&mut buf, TIMEOUT), Err(AccessoryError::Timeout));

    transport.push_inbound(ACCESSORY, b"late");
    assert_eq!(session.read(&mut buf, TIMEOUT), Ok(4));
    assert_eq!(&buf[..4], b"late");
}

#[test]
fn test_read_overflow_is_usb_error() {
    let (_transport, mut session) =
        open_session(MockDevice::accessory(0x2D00).with_inbound(&[0u8; 32]));

    let mut buf = [0u8; 8];
    let err = session.read(&mut buf, TIMEOUT).unwrap_err();

    assert_eq!(err, AccessoryError::Usb(TransportError::Overflow));
    assert_eq!(err.usb_code(), Some(-8));
}

#[test]
fn test_read_error_does_not_close_session() {
    let (transport, mut session) =
        open_session(MockDevice::accessory(0x2D00).with_bulk_error(TransportError::Pipe));

    let mut buf = [0u8; 8];
    assert_eq!(
        session.read(&mut buf, TIMEOUT),
        Err(AccessoryError::Usb(TransportError::Pipe))
    );
    assert!(session.is_open());
    assert_eq!(transport.claimed_count(), 1);
}

// ============================================================================
// Write Tests
// ============================================================================

#[test]
fn test_write_uses_out_endpoint() {
    let (transport, mut session) = open_session(MockDevice::accessory(0x2D00));

    let n = session.write(b"hello", TIMEOUT).unwrap();

    assert_eq!(n, 5);
    assert_eq!(transport.written(ACCESSORY), vec![b"hello".to_vec()]);
    assert_eq!(
        transport.events().last(),
        Some(&MockEvent::BulkOut {
            endpoint: 0x02,
            data: b"hello".to_vec()
        })
    );
}

#[test]
fn test_write_timeout_is_distinct() {
    let (_transport, mut session) =
        open_session(MockDevice::accessory(0x2D00).with_bulk_error(TransportError::Timeout));

    assert_eq!(session.write(b"x", TIMEOUT), Err(AccessoryError::Timeout));
}

#[test]
fn test_write_on_closed_session() {
    let (transport, mut session) = open_session(MockDevice::accessory(0x2D00));
    session.close();
    let before = transport.event_count();

    assert_eq!(session.write(&[0u8; 16], TIMEOUT), Err(AccessoryError::NotOpen));
    // The transport was not touched
    assert_eq!(transport.event_count(), before);
}

#[test]
fn test_read_on_closed_session() {
    let (transport, mut session) = open_session(MockDevice::accessory(0x2D00).with_inbound(b"x"));
    session.close();
    let before = transport.event_count();

    let mut buf = [0u8; 8];
    assert_eq!(session.read(&mut buf, TIMEOUT), Err(AccessoryError::NotOpen));
    assert_eq!(transport.event_count(), before);
}

// ============================================================================
// Lifecycle Tests
// ============================================================================

#[test]
fn test_close_releases_once() {
    let (transport, mut session) = open_session(MockDevice::accessory(0x2D00));
    assert_eq!(transport.claimed_count(), 1);

    session.close();
    session.close();

    assert!(!session.is_open());
    assert_eq!(transport.claimed_count(), 0);
    assert_eq!(transport.open_handle_count(), 0);

    let releases = transport
        .events()
        .iter()
        .filter(|e| matches!(e, MockEvent::Release { .. }))
        .count();
    assert_eq!(releases, 1);
}

#[test]
fn test_close_order_release_then_close() {
    let (transport, mut session) = open_session(MockDevice::accessory(0x2D00));
    session.close();

    let events = transport.events();
    let n = events.len();
    assert_eq!(events[n - 2], MockEvent::Release { interface: 0 });
    assert_eq!(events[n - 1], MockEvent::Close(ACCESSORY));
}

#[test]
fn test_drop_closes_session() {
    let (transport, session) = open_session(MockDevice::accessory(0x2D00));
    drop(session);

    assert_eq!(transport.claimed_count(), 0);
    assert_eq!(transport.open_handle_count(), 0);
}

#[test]
fn test_drop_after_close_does_not_release_again() {
    let (transport, mut session) = open_session(MockDevice::accessory(0x2D00));
    session.close();
    let before = transport.event_count();

    drop(session);

    assert_eq!(transport.event_count(), before);
}

#[test]
fn test_endpoints_survive_close() {
    let (_transport, mut session) =
        open_session(MockDevice::accessory(0x2D00).with_endpoints(&[0x02, 0x83]));
    let endpoints = session.endpoints();
    session.close();

    assert_eq!(session.endpoints(), endpoints);
    assert_eq!(endpoints.in_address, 0x83);
    assert_eq!(endpoints.out_address, 0x02);
}

// ============================================================================
// std::io Tests
// ============================================================================

#[test]
fn test_io_read_write() {
    let (transport, mut session) = open_session(MockDevice::accessory(0x2D00).with_inbound(b"abc"));
    session.set_io_timeout(TIMEOUT);

    let mut buf = [0u8; 16];
    let n = Read::read(&mut session, &mut buf).unwrap();
    assert_eq!(&buf[..n], b"abc");

    Write::write_all(&mut session, b"xyz").unwrap();
    session.flush().unwrap();
    assert_eq!(transport.written(ACCESSORY), vec![b"xyz".to_vec()]);
}

#[test]
fn test_io_error_kinds() {
    let (_transport, mut session) = open_session(MockDevice::accessory(0x2D00));

    let mut buf = [0u8; 16];
    let err = Read::read(&mut session, &mut buf).unwrap_err();
    assert_eq!(err.kind(), std::io::ErrorKind::TimedOut);

    session.close();
    let err = Write::write(&mut session, b"x").unwrap_err();
    assert_eq!(err.kind(), std::io::ErrorKind::NotConnected);
}
