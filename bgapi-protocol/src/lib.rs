//! Wire protocol for BlueGiga BGAPI devices (BLE112, BLED112, BLE113).
//!
//! This crate turns the unframed serial byte stream of a BGAPI device into
//! typed packets and back. It performs no I/O; the serial handler lives in
//! `bgapi-transport`.
//!
//! # Frame Format
//!
//! ```text
//! +------------------+--------+--------+--------+------------------+
//! | E | TTTT | LLL   | Length | Class  | Method |     Payload      |
//! | byte 0           | low    | 0-7    | 0-31   |    (variable)    |
//! +------------------+--------+--------+--------+------------------+
//! ```
//!
//! `E` is the event flag, `TTTT` the technology type (always zero) and
//! `LLL` the high bits of the payload length. Frames never exceed
//! [`MAX_FRAME_SIZE`] bytes.
//!
//! # Example
//!
//! ```rust
//! use bgapi_protocol::{BgapiCommand, BgapiPacket, BgapiResponse, FrameReader, FrameStatus, PacketRegistry};
//!
//! let registry = PacketRegistry::ble112();
//! let mut reader = FrameReader::new();
//!
//! // Outgoing
//! let frame = BgapiCommand::SystemHello.serialize().unwrap();
//! assert_eq!(&frame[..], &[0x00, 0x00, 0x00, 0x01]);
//!
//! // Incoming: a stray byte, then the hello response
//! let mut decoded = None;
//! for byte in [0xFF, 0x00, 0x00, 0x00, 0x01] {
//!     if let FrameStatus::Frame(frame) = reader.push(byte) {
//!         decoded = Some(registry.decode(&frame).unwrap());
//!     }
//! }
//! assert_eq!(decoded, Some(BgapiPacket::Response(BgapiResponse::SystemHello)));
//! ```

pub mod codec;
pub mod error;
pub mod framer;
pub mod packets;
pub mod registry;
pub mod types;

pub use codec::{uuid_from_short, uuid_to_short, BgapiReader, BgapiWriter};
pub use error::{BgapiResult, ProtocolError};
pub use framer::{FrameReader, FrameState, FrameStatus};
pub use packets::{BgapiCommand, BgapiEvent, BgapiPacket, BgapiResponse, DiscoverMode, SystemInfo};
pub use registry::{DecodeFn, Decoder, PacketRegistry};
pub use types::{
    class, BdAddr, FrameHeader, PacketKey, EVENT_FLAG, HEADER_CHECK_MASKS, HEADER_SIZE,
    MAX_FRAME_SIZE,
};
