//! Field-level codec for BGAPI payloads.
//!
//! All multi-byte integers are little-endian. Variable-length fields
//! (`uint8array`) carry a one-byte length prefix. Addresses travel in
//! reversed byte order.
//!
//! UUIDs are a `uint8array` of 2, 4 or 16 bytes, least significant byte
//! first. Short forms are offsets on the Bluetooth base UUID:
//!
//! ```text
//! wire:  02 0D 18                      -> 0000180d-0000-1000-8000-00805f9b34fb
//! wire:  10 01 02 03 .. 0F 10          -> 100f0e0d-0c0b-0a09-0807-060504030201
//! ```

use bytes::{BufMut, Bytes, BytesMut};
use uuid::Uuid;

use crate::error::ProtocolError;
use crate::types::{BdAddr, FrameHeader, PacketKey, HEADER_SIZE, MAX_FRAME_SIZE};

/// Bluetooth base UUID, `00000000-0000-1000-8000-00805F9B34FB`.
pub const BASE_UUID: u128 = 0x0000_0000_0000_1000_8000_0080_5F9B_34FB;

const BASE_UUID_LOW_MASK: u128 = (1u128 << 96) - 1;

/// Expand a 16- or 32-bit short UUID onto the base UUID.
pub fn uuid_from_short(short: u32) -> Uuid {
    Uuid::from_u128(BASE_UUID | ((short as u128) << 96))
}

/// Return the short form of a UUID that sits on the base UUID.
pub fn uuid_to_short(uuid: &Uuid) -> Option<u32> {
    let value = uuid.as_u128();
    if value & BASE_UUID_LOW_MASK == BASE_UUID {
        Some((value >> 96) as u32)
    } else {
        None
    }
}

/// Cursor over a received frame.
#[derive(Debug, Clone)]
pub struct BgapiReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> BgapiReader<'a> {
    /// Start reading `buf` at `offset`.
    pub fn new(buf: &'a [u8], offset: usize) -> Self {
        Self { buf, pos: offset }
    }

    /// Start reading the payload of a complete frame.
    pub fn payload(frame: &'a [u8]) -> Self {
        Self::new(frame, HEADER_SIZE)
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.buf.len().saturating_sub(self.pos)
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], ProtocolError> {
        if self.remaining() < n {
            return Err(ProtocolError::MalformedFrame {
                needed: n,
                available: self.remaining(),
            });
        }
        let slice = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    pub fn read_u8(&mut self) -> Result<u8, ProtocolError> {
        Ok(self.take(1)?[0])
    }

    pub fn read_i8(&mut self) -> Result<i8, ProtocolError> {
        Ok(self.read_u8()? as i8)
    }

    pub fn read_bool(&mut self) -> Result<bool, ProtocolError> {
        Ok(self.read_u8()? != 0)
    }

    pub fn read_u16(&mut self) -> Result<u16, ProtocolError> {
        let b = self.take(2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    pub fn read_u32(&mut self) -> Result<u32, ProtocolError> {
        let b = self.take(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    /// Read a length-prefixed byte array.
    pub fn read_u8_array(&mut self) -> Result<Vec<u8>, ProtocolError> {
        let len = self.read_u8()? as usize;
        Ok(self.take(len)?.to_vec())
    }

    pub fn read_address(&mut self) -> Result<BdAddr, ProtocolError> {
        let b = self.take(6)?;
        Ok(BdAddr::from_wire([b[0], b[1], b[2], b[3], b[4], b[5]]))
    }

    /// Read a length-prefixed UUID.
    pub fn read_uuid(&mut self) -> Result<Uuid, ProtocolError> {
        let len = self.read_u8()? as usize;
        let b = self.take(len)?;
        match len {
            2 => Ok(uuid_from_short(u16::from_le_bytes([b[0], b[1]]) as u32)),
            4 => Ok(uuid_from_short(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))),
            16 => {
                let mut bytes = [0u8; 16];
                bytes.copy_from_slice(b);
                Ok(Uuid::from_u128(u128::from_le_bytes(bytes)))
            }
            other => Err(ProtocolError::InvalidUuidLength(other)),
        }
    }
}

/// Builder for an outgoing frame.
#[derive(Debug)]
pub struct BgapiWriter {
    buf: BytesMut,
}

impl Default for BgapiWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl BgapiWriter {
    pub fn new() -> Self {
        let mut buf = BytesMut::with_capacity(crate::types::MAX_FRAME_SIZE);
        buf.put_slice(&[0u8; HEADER_SIZE]);
        Self { buf }
    }

    pub fn put_u8(&mut self, value: u8) -> &mut Self {
        self.buf.put_u8(value);
        self
    }

    pub fn put_i8(&mut self, value: i8) -> &mut Self {
        self.buf.put_i8(value);
        self
    }

    pub fn put_bool(&mut self, value: bool) -> &mut Self {
        self.buf.put_u8(u8::from(value));
        self
    }

    pub fn put_u16(&mut self, value: u16) -> &mut Self {
        self.buf.put_u16_le(value);
        self
    }

    pub fn put_u32(&mut self, value: u32) -> &mut Self {
        self.buf.put_u32_le(value);
        self
    }

    /// Write a length-prefixed byte array.
    ///
    /// Arrays too long for the length prefix cannot fit in a frame either;
    /// `finish` rejects them.
    pub fn put_u8_array(&mut self, data: &[u8]) -> &mut Self {
        self.buf.put_u8(data.len().min(u8::MAX as usize) as u8);
        self.buf.put_slice(data);
        self
    }

    pub fn put_address(&mut self, addr: &BdAddr) -> &mut Self {
        self.buf.put_slice(&addr.to_wire());
        self
    }

    /// Write a UUID in its shortest wire form.
    pub fn put_uuid(&mut self, uuid: &Uuid) -> &mut Self {
        match uuid_to_short(uuid) {
            Some(short) if short <= u16::MAX as u32 => {
                self.buf.put_u8(2);
                self.buf.put_u16_le(short as u16);
            }
            Some(short) => {
                self.buf.put_u8(4);
                self.buf.put_u32_le(short);
            }
            None => {
                self.buf.put_u8(16);
                self.buf.put_slice(&uuid.as_u128().to_le_bytes());
            }
        }
        self
    }

    /// Fill in the header and return the complete frame.
    ///
    /// Fails with `FrameTooLarge` if the frame exceeds [`MAX_FRAME_SIZE`].
    pub fn finish(mut self, key: PacketKey) -> Result<Bytes, ProtocolError> {
        if self.buf.len() > MAX_FRAME_SIZE {
            return Err(ProtocolError::FrameTooLarge(self.buf.len(), MAX_FRAME_SIZE));
        }
        let header = FrameHeader::new(key, self.buf.len() - HEADER_SIZE);
        self.buf[..HEADER_SIZE].copy_from_slice(&header.to_bytes());
        Ok(self.buf.freeze())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_integers() {
        let buf = [0xFF, 0x7F, 0x01, 0x34, 0x12, 0x78, 0x56, 0x34, 0x12];
        let mut reader = BgapiReader::new(&buf, 0);
        assert_eq!(reader.read_i8().unwrap(), -1);
        assert_eq!(reader.read_u8().unwrap(), 0x7F);
        assert!(reader.read_bool().unwrap());
        assert_eq!(reader.read_u16().unwrap(), 0x1234);
        assert_eq!(reader.read_u32().unwrap(), 0x1234_5678);
        assert_eq!(reader.remaining(), 0);
    }

    #[test]
    fn test_read_u32_carries_high_byte() {
        let buf = [0x00, 0x00, 0x00, 0x80];
        let mut reader = BgapiReader::new(&buf, 0);
        assert_eq!(reader.read_u32().unwrap(), 0x8000_0000);
    }

    #[test]
    fn test_read_starts_at_offset() {
        let buf = [0x00, 0x02, 0x00, 0x00, 0xAA, 0xBB];
        let mut reader = BgapiReader::payload(&buf);
        assert_eq!(reader.position(), HEADER_SIZE);
        assert_eq!(reader.read_u16().unwrap(), 0xBBAA);
    }

    #[test]
    fn test_read_past_end() {
        let buf = [0x01];
        let mut reader = BgapiReader::new(&buf, 0);
        assert_eq!(
            reader.read_u16(),
            Err(ProtocolError::MalformedFrame {
                needed: 2,
                available: 1
            })
        );

        let buf = [0x05, 0x01, 0x02];
        let mut reader = BgapiReader::new(&buf, 0);
        assert!(matches!(
            reader.read_u8_array(),
            Err(ProtocolError::MalformedFrame { needed: 5, available: 2 })
        ));
    }

    #[test]
    fn test_read_address() {
        let buf = [0x06, 0x05, 0x04, 0x03, 0x02, 0x01];
        let mut reader = BgapiReader::new(&buf, 0);
        assert_eq!(reader.read_address().unwrap().to_string(), "01:02:03:04:05:06");
    }

    #[test]
    fn test_read_short_uuids() {
        let buf = [0x02, 0x0D, 0x18, 0x04, 0x78, 0x56, 0x34, 0x12];
        let mut reader = BgapiReader::new(&buf, 0);
        assert_eq!(
            reader.read_uuid().unwrap().to_string(),
            "0000180d-0000-1000-8000-00805f9b34fb"
        );
        assert_eq!(
            reader.read_uuid().unwrap().to_string(),
            "12345678-0000-1000-8000-00805f9b34fb"
        );
    }

    #[test]
    fn test_read_full_uuid_is_deterministic() {
        let mut buf = vec![16u8];
        buf.extend(1u8..=16);

        let first = BgapiReader::new(&buf, 0).read_uuid().unwrap();
        let second = BgapiReader::new(&buf, 0).read_uuid().unwrap();
        assert_eq!(first.as_bytes(), second.as_bytes());
        assert_eq!(first.to_string(), "100f0e0d-0c0b-0a09-0807-060504030201");
    }

    #[test]
    fn test_read_uuid_bad_length() {
        let buf = [0x03, 0x01, 0x02, 0x03];
        let mut reader = BgapiReader::new(&buf, 0);
        assert_eq!(reader.read_uuid(), Err(ProtocolError::InvalidUuidLength(3)));
    }

    #[test]
    fn test_writer_builds_header() {
        let mut writer = BgapiWriter::new();
        writer.put_u8(0x01).put_u16(0x0203);
        let frame = writer.finish(PacketKey::response(4, 4)).unwrap();
        assert_eq!(&frame[..], &[0x00, 0x03, 0x04, 0x04, 0x01, 0x03, 0x02]);
    }

    #[test]
    fn test_writer_uuid_forms() {
        let mut writer = BgapiWriter::new();
        writer.put_uuid(&uuid_from_short(0x2800));
        writer.put_uuid(&uuid_from_short(0x0001_2800));
        writer.put_uuid(&Uuid::from_u128(0x100f0e0d_0c0b_0a09_0807_060504030201));
        let frame = writer.finish(PacketKey::response(0, 0)).unwrap();

        let mut reader = BgapiReader::payload(&frame);
        assert_eq!(reader.read_uuid().unwrap(), uuid_from_short(0x2800));
        assert_eq!(reader.read_uuid().unwrap(), uuid_from_short(0x0001_2800));
        assert_eq!(
            reader.read_uuid().unwrap(),
            Uuid::from_u128(0x100f0e0d_0c0b_0a09_0807_060504030201)
        );
        assert_eq!(frame[4], 2);
        assert_eq!(frame[7], 4);
        assert_eq!(frame[12], 16);
    }

    #[test]
    fn test_writer_accepts_maximum_frame() {
        let mut writer = BgapiWriter::new();
        writer.put_u8_array(&[0x5A; MAX_FRAME_SIZE - HEADER_SIZE - 1]);
        let frame = writer.finish(PacketKey::event(4, 5)).unwrap();
        assert_eq!(frame.len(), MAX_FRAME_SIZE);
        assert!(FrameHeader::parse(&[frame[0], frame[1], frame[2], frame[3]]).is_ok());
    }

    #[test]
    fn test_writer_rejects_oversized_frame() {
        let mut writer = BgapiWriter::new();
        writer.put_u8_array(&[0x5A; MAX_FRAME_SIZE - HEADER_SIZE]);
        assert_eq!(
            writer.finish(PacketKey::event(4, 5)),
            Err(ProtocolError::FrameTooLarge(MAX_FRAME_SIZE + 1, MAX_FRAME_SIZE))
        );

        let mut writer = BgapiWriter::new();
        writer.put_u8_array(&[0xAB; 300]);
        assert_eq!(
            writer.finish(PacketKey::response(4, 5)),
            Err(ProtocolError::FrameTooLarge(HEADER_SIZE + 301, MAX_FRAME_SIZE))
        );
    }
}
