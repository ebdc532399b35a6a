//! Core wire types for the BGAPI protocol.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ProtocolError;

/// Header size: flags/length-high, length-low, class, method.
pub const HEADER_SIZE: usize = 4;

/// Maximum frame size (header included) the BLE112 firmware emits.
pub const MAX_FRAME_SIZE: usize = 64;

/// Positional sanity masks for the four header bytes.
///
/// `byte & mask` must be zero: byte 0 carries the technology type (always
/// Bluetooth Smart, `0000`), byte 1 keeps the payload under 128 bytes,
/// byte 2 is a class id (0-7) and byte 3 a method id (0-31).
pub const HEADER_CHECK_MASKS: [u8; HEADER_SIZE] = [0x78, 0x80, 0xF8, 0xE0];

/// Event flag in header byte 0.
pub const EVENT_FLAG: u8 = 0x80;

/// Command class identifiers.
pub mod class {
    pub const SYSTEM: u8 = 0;
    pub const FLASH: u8 = 1;
    pub const ATTRIBUTES: u8 = 2;
    pub const CONNECTION: u8 = 3;
    pub const ATTCLIENT: u8 = 4;
    pub const SM: u8 = 5;
    pub const GAP: u8 = 6;
    pub const HARDWARE: u8 = 7;
}

/// Identity of a packet type: class, method/event id and direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PacketKey {
    pub class: u8,
    pub method: u8,
    pub is_event: bool,
}

impl PacketKey {
    /// Key of a command or its response.
    pub const fn response(class: u8, method: u8) -> Self {
        Self {
            class,
            method,
            is_event: false,
        }
    }

    /// Key of an event.
    pub const fn event(class: u8, method: u8) -> Self {
        Self {
            class,
            method,
            is_event: true,
        }
    }
}

impl fmt::Display for PacketKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = if self.is_event { "evt" } else { "rsp" };
        write!(f, "{}({}:{})", kind, self.class, self.method)
    }
}

/// Decoded 4-byte frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub key: PacketKey,
    pub payload_len: usize,
}

impl FrameHeader {
    pub fn new(key: PacketKey, payload_len: usize) -> Self {
        Self { key, payload_len }
    }

    /// Check a single header byte against its positional mask.
    pub fn check_byte(position: usize, value: u8) -> Result<(), ProtocolError> {
        match HEADER_CHECK_MASKS.get(position) {
            Some(mask) if value & mask != 0 => Err(ProtocolError::HeaderCheck { position, value }),
            _ => Ok(()),
        }
    }

    /// Parse and validate a complete header.
    ///
    /// The payload length is 11 bits: the low three bits of byte 0 are the
    /// high part, byte 1 the low part.
    pub fn parse(bytes: &[u8; HEADER_SIZE]) -> Result<Self, ProtocolError> {
        for (position, value) in bytes.iter().enumerate() {
            Self::check_byte(position, *value)?;
        }

        let payload_len = (((bytes[0] & 0x07) as usize) << 8) | bytes[1] as usize;
        let header = Self {
            key: PacketKey {
                class: bytes[2],
                method: bytes[3],
                is_event: bytes[0] & EVENT_FLAG != 0,
            },
            payload_len,
        };

        if header.frame_len() > MAX_FRAME_SIZE {
            return Err(ProtocolError::FrameTooLarge(header.frame_len(), MAX_FRAME_SIZE));
        }
        Ok(header)
    }

    /// Total frame length, header included.
    pub fn frame_len(&self) -> usize {
        HEADER_SIZE + self.payload_len
    }

    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let flags = if self.key.is_event { EVENT_FLAG } else { 0 };
        [
            flags | ((self.payload_len >> 8) as u8 & 0x07),
            (self.payload_len & 0xFF) as u8,
            self.key.class,
            self.key.method,
        ]
    }
}

/// 48-bit Bluetooth device address, most significant byte first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct BdAddr(pub [u8; 6]);

impl BdAddr {
    /// Build from the little-endian wire order.
    pub fn from_wire(bytes: [u8; 6]) -> Self {
        let mut addr = bytes;
        addr.reverse();
        BdAddr(addr)
    }

    pub fn to_wire(self) -> [u8; 6] {
        let mut bytes = self.0;
        bytes.reverse();
        bytes
    }
}

impl fmt::Display for BdAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let b = self.0;
        write!(
            f,
            "{:02X}:{:02X}:{:02X}:{:02X}:{:02X}:{:02X}",
            b[0], b[1], b[2], b[3], b[4], b[5]
        )
    }
}

impl std::str::FromStr for BdAddr {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut addr = [0u8; 6];
        let mut parts = s.split(':');
        for byte in addr.iter_mut() {
            let part = parts
                .next()
                .ok_or_else(|| ProtocolError::Decode(format!("short address: {}", s)))?;
            *byte = u8::from_str_radix(part, 16)
                .map_err(|e| ProtocolError::Decode(format!("bad address {}: {}", s, e)))?;
        }
        if parts.next().is_some() {
            return Err(ProtocolError::Decode(format!("long address: {}", s)));
        }
        Ok(BdAddr(addr))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_response_header() {
        let header = FrameHeader::parse(&[0x00, 0x02, 0x00, 0x00]).unwrap();
        assert_eq!(header.key, PacketKey::response(0, 0));
        assert_eq!(header.payload_len, 2);
        assert_eq!(header.frame_len(), 6);
    }

    #[test]
    fn test_parse_event_header() {
        let header = FrameHeader::parse(&[0x80, 0x10, 0x06, 0x00]).unwrap();
        assert!(header.key.is_event);
        assert_eq!(header.key.class, class::GAP);
        assert_eq!(header.payload_len, 16);
    }

    #[test]
    fn test_header_sanity_masks() {
        assert!(matches!(
            FrameHeader::parse(&[0x08, 0x00, 0x00, 0x00]),
            Err(ProtocolError::HeaderCheck { position: 0, .. })
        ));
        assert!(matches!(
            FrameHeader::parse(&[0x00, 0xFF, 0x00, 0x00]),
            Err(ProtocolError::HeaderCheck { position: 1, value: 0xFF })
        ));
        assert!(matches!(
            FrameHeader::parse(&[0x00, 0x00, 0x08, 0x00]),
            Err(ProtocolError::HeaderCheck { position: 2, .. })
        ));
        assert!(matches!(
            FrameHeader::parse(&[0x00, 0x00, 0x00, 0x20]),
            Err(ProtocolError::HeaderCheck { position: 3, .. })
        ));
    }

    #[test]
    fn test_length_high_bits_count() {
        // 0x01 in the high bits is a 256+ byte payload: legal bits, illegal size.
        let result = FrameHeader::parse(&[0x01, 0x00, 0x00, 0x00]);
        assert_eq!(result, Err(ProtocolError::FrameTooLarge(260, MAX_FRAME_SIZE)));

        let result = FrameHeader::parse(&[0x00, 0x3D, 0x00, 0x00]);
        assert_eq!(result, Err(ProtocolError::FrameTooLarge(65, MAX_FRAME_SIZE)));
    }

    #[test]
    fn test_header_to_bytes() {
        let header = FrameHeader::new(PacketKey::event(4, 5), 9);
        assert_eq!(header.to_bytes(), [0x80, 0x09, 0x04, 0x05]);
        assert_eq!(FrameHeader::parse(&header.to_bytes()).unwrap(), header);
    }

    #[test]
    fn test_address_display_and_parse() {
        let addr = BdAddr::from_wire([0x66, 0x55, 0x44, 0x33, 0x22, 0x11]);
        assert_eq!(addr.to_string(), "11:22:33:44:55:66");
        assert_eq!("11:22:33:44:55:66".parse::<BdAddr>().unwrap(), addr);
        assert!("11:22:33".parse::<BdAddr>().is_err());
        assert!("11:22:33:44:55:66:77".parse::<BdAddr>().is_err());
    }
}
