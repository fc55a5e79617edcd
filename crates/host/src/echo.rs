//! Read/echo loop over an open accessory session

use std::time::Duration;

use accessory::{AccessoryError, AccessorySession, TransportError, UsbHandle};
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct EchoOptions {
    pub read_timeout: Duration,
    pub write_timeout: Duration,
    /// Starting size of the receive buffer
    pub initial_buffer: usize,
    /// Overflows past this size end the loop
    pub max_buffer: usize,
    /// Stop after this many echoed messages
    pub max_messages: Option<u64>,
}

impl Default for EchoOptions {
    fn default() -> Self {
        Self {
            read_timeout: Duration::from_millis(200),
            write_timeout: Duration::ZERO,
            initial_buffer: 1024,
            max_buffer: 1024 * 1024,
            max_messages: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EchoStats {
    pub messages: u64,
    pub bytes_read: u64,
    pub bytes_written: u64,
}

/// Read messages and write each one back until an error or the message limit
///
/// Timeouts are polled through. An overflowing read doubles the buffer and
/// retries. A write that accepts no bytes ends the loop with
/// `Usb(TransportError::Io)`. `on_message` sees every received payload
/// before it is echoed.
pub fn run_echo<H, F>(
    session: &mut AccessorySession<H>,
    options: &EchoOptions,
    mut on_message: F,
) -> accessory::Result<EchoStats>
where
    H: UsbHandle,
    F: FnMut(&[u8]),
{
    let mut stats = EchoStats::default();
    let mut buf = vec![0u8; options.initial_buffer.max(1)];

    while options.max_messages.is_none_or(|max| stats.messages < max) {
        let n = match session.read(&mut buf, options.read_timeout) {
            Ok(0) => continue,
            Ok(n) => n,
            Err(AccessoryError::Timeout) => continue,
            Err(AccessoryError::Usb(TransportError::Overflow)) => {
                let grown = buf.len() * 2;
                if grown > options.max_buffer {
                    warn!("Message exceeds {} byte buffer limit", options.max_buffer);
                    return Err(AccessoryError::Usb(TransportError::Overflow));
                }
                debug!("Growing receive buffer to {} bytes", grown);
                buf.resize(grown, 0);
                continue;
            }
            Err(e) => {
                warn!("Read failed: {}", e);
                return Err(e);
            }
        };

        let message = &buf[..n];
        stats.messages += 1;
        stats.bytes_read += n as u64;
        on_message(message);

        let mut sent = 0;
        while sent < n {
            match session.write(&message[sent..], options.write_timeout)? {
                0 => {
                    warn!("Write stalled after {} of {} bytes", sent, n);
                    return Err(AccessoryError::Usb(TransportError::Io));
                }
                written => sent += written,
            }
        }
        stats.bytes_written += sent as u64;
    }

    info!(
        "Echoed {} messages ({} bytes)",
        stats.messages, stats.bytes_written
    );
    Ok(stats)
}
