//! AOA wire constants
//!
//! Values here are fixed by the Android Open Accessory protocol and must
//! match exactly for a phone to accept the handshake.

/// Google's reserved vendor ID, used by devices in accessory mode
pub const ACCESSORY_VENDOR_ID: u16 = 0x18D1;

/// Product IDs a device may re-enumerate with once in accessory mode
///
/// `0x2D00` accessory, `0x2D01` accessory + ADB, `0x2D04` accessory + audio,
/// `0x2D05` accessory + audio + ADB.
pub const ACCESSORY_PRODUCT_IDS: [u16; 4] = [0x2D00, 0x2D01, 0x2D04, 0x2D05];

/// Vendor request: read the supported protocol version (2 bytes, little endian)
pub const ACCESSORY_GET_PROTOCOL: u8 = 51;
/// Vendor request: send one identity string, `index` selects which
pub const ACCESSORY_SEND_STRING: u8 = 52;
/// Vendor request: switch the device into accessory mode
pub const ACCESSORY_START: u8 = 53;

/// Lowest protocol version that supports accessory mode
pub const MIN_PROTOCOL_VERSION: u16 = 1;

/// Interface claimed both before and after the mode switch
pub const ACCESSORY_INTERFACE: u8 = 0;

/// Identity string slots, in the order they are sent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum StringIndex {
    Manufacturer = 0,
    Model = 1,
    Description = 2,
    Version = 3,
    Uri = 4,
    Serial = 5,
}

impl StringIndex {
    /// All slots in wire order
    pub const ALL: [StringIndex; 6] = [
        StringIndex::Manufacturer,
        StringIndex::Model,
        StringIndex::Description,
        StringIndex::Version,
        StringIndex::Uri,
        StringIndex::Serial,
    ];

    /// Value placed in the `wIndex` field of the send-string request
    pub fn wire_index(self) -> u16 {
        self as u16
    }
}

/// Check whether a vendor/product pair identifies a device in accessory mode
pub fn is_accessory_device(vendor_id: u16, product_id: u16) -> bool {
    vendor_id == ACCESSORY_VENDOR_ID && ACCESSORY_PRODUCT_IDS.contains(&product_id)
}

/// Encode an identity string as sent on the wire (null-terminated)
pub fn encode_string(value: &str) -> Vec<u8> {
    let bytes = value.as_bytes();
    let mut data = Vec::with_capacity(bytes.len() + 1);
    data.extend_from_slice(bytes);
    data.push(0);
    data
}

/// Decode the get-protocol reply
///
/// Replies shorter than two bytes are read as version 0.
pub fn decode_protocol_version(reply: &[u8]) -> u16 {
    match reply {
        [lo, hi, ..] => u16::from_le_bytes([*lo, *hi]),
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_codes() {
        assert_eq!(ACCESSORY_GET_PROTOCOL, 0x33);
        assert_eq!(ACCESSORY_SEND_STRING, 0x34);
        assert_eq!(ACCESSORY_START, 0x35);
    }

    #[test]
    fn test_string_index_order() {
        let indices: Vec<u16> = StringIndex::ALL.iter().map(|i| i.wire_index()).collect();
        assert_eq!(indices, vec![0, 1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_is_accessory_device() {
        assert!(is_accessory_device(0x18D1, 0x2D00));
        assert!(is_accessory_device(0x18D1, 0x2D05));
        assert!(!is_accessory_device(0x18D1, 0x2D02));
        assert!(!is_accessory_device(0x2717, 0x2D00));
    }

    #[test]
    fn test_encode_string_is_null_terminated() {
        assert_eq!(encode_string("1.0"), vec![b'1', b'.', b'0', 0]);
        assert_eq!(encode_string(""), vec![0]);
    }

    #[test]
    fn test_decode_protocol_version() {
        assert_eq!(decode_protocol_version(&[2, 0]), 2);
        assert_eq!(decode_protocol_version(&[0x01, 0x01]), 0x0101);
        assert_eq!(decode_protocol_version(&[1]), 0);
        assert_eq!(decode_protocol_version(&[]), 0);
    }
}
