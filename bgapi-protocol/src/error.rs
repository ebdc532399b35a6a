//! Error types for the BGAPI wire protocol.

use thiserror::Error;

use crate::types::PacketKey;

/// Protocol-level errors raised while framing or decoding BGAPI packets.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// A header byte failed its positional sanity mask.
    #[error("Header byte {position} failed sanity check: 0x{value:02X}")]
    HeaderCheck { position: usize, value: u8 },

    /// The header announces a frame longer than the device can send.
    #[error("Frame too large: {0} bytes (max: {1})")]
    FrameTooLarge(usize, usize),

    /// A field read ran past the end of the frame.
    #[error("Malformed frame: needed {needed} bytes, {available} available")]
    MalformedFrame { needed: usize, available: usize },

    /// No decoder is registered for this packet key.
    #[error("Unknown packet: {0}")]
    UnknownPacket(PacketKey),

    /// UUID length prefix is not 2, 4 or 16.
    #[error("Invalid UUID length: {0}")]
    InvalidUuidLength(usize),

    /// Failed to decode message payload.
    #[error("Failed to decode packet: {0}")]
    Decode(String),
}

/// Result code carried by most BGAPI responses and some events.
///
/// Codes are grouped by origin: 0x01xx BGAPI, 0x02xx Bluetooth controller,
/// 0x03xx security manager, 0x04xx attribute protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum BgapiResult {
    Success,
    InvalidParameter,
    DeviceInWrongState,
    OutOfMemory,
    FeatureNotImplemented,
    CommandNotRecognized,
    Timeout,
    NotConnected,
    Flow,
    UserAttribute,
    InvalidLicenseKey,
    CommandTooLong,
    OutOfBonds,
    AuthenticationFailure,
    ConnectionTimeout,
    ConnectionTerminatedByLocalHost,
    RemoteUserTerminatedConnection,
    AttributeNotFound,
    /// Any code this crate does not name.
    Other(u16),
}

impl From<u16> for BgapiResult {
    fn from(value: u16) -> Self {
        match value {
            0x0000 => BgapiResult::Success,
            0x0180 => BgapiResult::InvalidParameter,
            0x0181 => BgapiResult::DeviceInWrongState,
            0x0182 => BgapiResult::OutOfMemory,
            0x0183 => BgapiResult::FeatureNotImplemented,
            0x0184 => BgapiResult::CommandNotRecognized,
            0x0185 => BgapiResult::Timeout,
            0x0186 => BgapiResult::NotConnected,
            0x0187 => BgapiResult::Flow,
            0x0188 => BgapiResult::UserAttribute,
            0x0189 => BgapiResult::InvalidLicenseKey,
            0x018A => BgapiResult::CommandTooLong,
            0x018B => BgapiResult::OutOfBonds,
            0x0205 => BgapiResult::AuthenticationFailure,
            0x0208 => BgapiResult::ConnectionTimeout,
            0x0216 => BgapiResult::ConnectionTerminatedByLocalHost,
            0x0213 => BgapiResult::RemoteUserTerminatedConnection,
            0x040A => BgapiResult::AttributeNotFound,
            other => BgapiResult::Other(other),
        }
    }
}

impl From<BgapiResult> for u16 {
    fn from(value: BgapiResult) -> Self {
        match value {
            BgapiResult::Success => 0x0000,
            BgapiResult::InvalidParameter => 0x0180,
            BgapiResult::DeviceInWrongState => 0x0181,
            BgapiResult::OutOfMemory => 0x0182,
            BgapiResult::FeatureNotImplemented => 0x0183,
            BgapiResult::CommandNotRecognized => 0x0184,
            BgapiResult::Timeout => 0x0185,
            BgapiResult::NotConnected => 0x0186,
            BgapiResult::Flow => 0x0187,
            BgapiResult::UserAttribute => 0x0188,
            BgapiResult::InvalidLicenseKey => 0x0189,
            BgapiResult::CommandTooLong => 0x018A,
            BgapiResult::OutOfBonds => 0x018B,
            BgapiResult::AuthenticationFailure => 0x0205,
            BgapiResult::ConnectionTimeout => 0x0208,
            BgapiResult::ConnectionTerminatedByLocalHost => 0x0216,
            BgapiResult::RemoteUserTerminatedConnection => 0x0213,
            BgapiResult::AttributeNotFound => 0x040A,
            BgapiResult::Other(code) => code,
        }
    }
}

impl BgapiResult {
    /// Returns true if this result code indicates success.
    pub fn is_success(self) -> bool {
        self == BgapiResult::Success
    }
}
