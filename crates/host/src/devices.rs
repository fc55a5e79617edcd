//! Attached device listing

use accessory::protocol::is_accessory_device;
use accessory::{DeviceSummary, UsbTransport};

/// One listing line, e.g. `18d1:2d01 (bus 1, device 7) path: 1.4`
///
/// The path is left out for devices with no port numbers.
pub fn format_device(device: &DeviceSummary) -> String {
    let mut line = format!(
        "{:04x}:{:04x} (bus {}, device {})",
        device.vendor_id, device.product_id, device.bus, device.address
    );
    if !device.port_path.is_empty() {
        let path = device
            .port_path
            .iter()
            .map(u8::to_string)
            .collect::<Vec<_>>()
            .join(".");
        line.push_str(" path: ");
        line.push_str(&path);
    }
    if is_accessory_device(device.vendor_id, device.product_id) {
        line.push_str(" [accessory]");
    }
    line
}

/// Print every attached device to stdout
pub fn print_devices<T: UsbTransport>(transport: &T) -> accessory::Result<usize> {
    let devices = transport.list_devices()?;

    if devices.is_empty() {
        println!("No USB devices found.");
    } else {
        println!("Found {} USB device(s):\n", devices.len());
        for device in &devices {
            println!("  {}", format_device(device));
        }
    }

    Ok(devices.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use accessory::test_utils::{MockDevice, MockTransport};

    #[test]
    fn test_format_device() {
        let device = DeviceSummary {
            bus: 3,
            address: 12,
            vendor_id: 0x2717,
            product_id: 0xff40,
            port_path: vec![1, 4, 2],
        };
        assert_eq!(
            format_device(&device),
            "2717:ff40 (bus 3, device 12) path: 1.4.2"
        );
    }

    #[test]
    fn test_format_accessory_device() {
        let device = DeviceSummary {
            bus: 1,
            address: 7,
            vendor_id: 0x18D1,
            product_id: 0x2D01,
            port_path: vec![1],
        };
        assert_eq!(
            format_device(&device),
            "18d1:2d01 (bus 1, device 7) path: 1 [accessory]"
        );
    }

    #[test]
    fn test_format_root_port() {
        let device = DeviceSummary {
            bus: 2,
            address: 1,
            vendor_id: 0x1d6b,
            product_id: 0x0002,
            port_path: vec![],
        };
        assert_eq!(format_device(&device), "1d6b:0002 (bus 2, device 1)");
    }

    #[test]
    fn test_print_devices_counts() {
        let transport = MockTransport::new();
        assert_eq!(print_devices(&transport).unwrap(), 0);

        transport.add_device(MockDevice::new(0x2717, 0xff40));
        transport.add_device(MockDevice::accessory(0x2D00));
        assert_eq!(print_devices(&transport).unwrap(), 2);
    }
}
