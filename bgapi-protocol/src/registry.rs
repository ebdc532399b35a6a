//! Mapping from packet keys to decoders.

use std::collections::HashMap;

use log::trace;

use crate::codec::BgapiReader;
use crate::error::ProtocolError;
use crate::packets::{self, event, method, BgapiEvent, BgapiPacket, BgapiResponse};
use crate::types::{class, FrameHeader, PacketKey, HEADER_SIZE};

/// Decoder over a reader positioned at the start of the payload.
pub type DecodeFn = fn(&mut BgapiReader<'_>) -> Result<BgapiPacket, ProtocolError>;

/// How a registered key is turned into a packet.
#[derive(Clone, Copy)]
pub enum Decoder {
    /// Typed decoder.
    Typed(DecodeFn),
    /// Keep the payload as raw bytes.
    Opaque,
}

impl std::fmt::Debug for Decoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Decoder::Typed(_) => f.write_str("Decoder::Typed"),
            Decoder::Opaque => f.write_str("Decoder::Opaque"),
        }
    }
}

/// Table of known packet types, built once and shared with the reader.
#[derive(Debug, Clone, Default)]
pub struct PacketRegistry {
    decoders: HashMap<PacketKey, Decoder>,
}

impl PacketRegistry {
    /// Empty registry. Every frame decodes to `UnknownPacket`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding every response and event this crate implements.
    pub fn ble112() -> Self {
        let responses: [(u8, u8, DecodeFn); 13] = [
            (class::SYSTEM, method::SYSTEM_HELLO, packets::decode_system_hello),
            (class::SYSTEM, method::SYSTEM_ADDRESS_GET, packets::decode_system_address_get),
            (class::SYSTEM, method::SYSTEM_GET_INFO, packets::decode_system_get_info),
            (class::CONNECTION, method::CONNECTION_DISCONNECT, packets::decode_connection_disconnect),
            (class::CONNECTION, method::CONNECTION_GET_STATUS, packets::decode_connection_get_status),
            (
                class::ATTCLIENT,
                method::ATTCLIENT_READ_BY_GROUP_TYPE,
                packets::decode_attclient_read_by_group_type,
            ),
            (
                class::ATTCLIENT,
                method::ATTCLIENT_FIND_INFORMATION,
                packets::decode_attclient_find_information,
            ),
            (
                class::ATTCLIENT,
                method::ATTCLIENT_READ_BY_HANDLE,
                packets::decode_attclient_read_by_handle,
            ),
            (
                class::ATTCLIENT,
                method::ATTCLIENT_ATTRIBUTE_WRITE,
                packets::decode_attclient_attribute_write,
            ),
            (class::GAP, method::GAP_SET_MODE, packets::decode_gap_set_mode),
            (class::GAP, method::GAP_DISCOVER, packets::decode_gap_discover),
            (class::GAP, method::GAP_CONNECT_DIRECT, packets::decode_gap_connect_direct),
            (class::GAP, method::GAP_END_PROCEDURE, packets::decode_gap_end_procedure),
        ];
        let events: [(u8, u8, DecodeFn); 8] = [
            (class::SYSTEM, event::SYSTEM_BOOT, packets::decode_system_boot),
            (class::CONNECTION, event::CONNECTION_STATUS, packets::decode_connection_status),
            (
                class::CONNECTION,
                event::CONNECTION_DISCONNECTED,
                packets::decode_connection_disconnected,
            ),
            (
                class::ATTCLIENT,
                event::ATTCLIENT_PROCEDURE_COMPLETED,
                packets::decode_attclient_procedure_completed,
            ),
            (class::ATTCLIENT, event::ATTCLIENT_GROUP_FOUND, packets::decode_attclient_group_found),
            (
                class::ATTCLIENT,
                event::ATTCLIENT_FIND_INFORMATION_FOUND,
                packets::decode_attclient_find_information_found,
            ),
            (
                class::ATTCLIENT,
                event::ATTCLIENT_ATTRIBUTE_VALUE,
                packets::decode_attclient_attribute_value,
            ),
            (class::GAP, event::GAP_SCAN_RESPONSE, packets::decode_gap_scan_response),
        ];

        let mut registry = Self::new();
        for (class, method, decode) in responses {
            registry.register(PacketKey::response(class, method), decode);
        }
        for (class, id, decode) in events {
            registry.register(PacketKey::event(class, id), decode);
        }
        registry
    }

    /// Register a typed decoder, replacing any previous entry for the key.
    pub fn register(&mut self, key: PacketKey, decode: DecodeFn) -> &mut Self {
        self.decoders.insert(key, Decoder::Typed(decode));
        self
    }

    /// Pass frames with this key through undecoded.
    pub fn register_opaque(&mut self, key: PacketKey) -> &mut Self {
        self.decoders.insert(key, Decoder::Opaque);
        self
    }

    pub fn lookup(&self, class: u8, method: u8, is_event: bool) -> Option<Decoder> {
        self.decoders
            .get(&PacketKey {
                class,
                method,
                is_event,
            })
            .copied()
    }

    pub fn len(&self) -> usize {
        self.decoders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.decoders.is_empty()
    }

    /// Decode a complete frame, header included.
    pub fn decode(&self, frame: &[u8]) -> Result<BgapiPacket, ProtocolError> {
        let header_bytes: [u8; HEADER_SIZE] = frame
            .get(..HEADER_SIZE)
            .and_then(|b| b.try_into().ok())
            .ok_or(ProtocolError::MalformedFrame {
                needed: HEADER_SIZE,
                available: frame.len(),
            })?;
        let header = FrameHeader::parse(&header_bytes)?;
        if frame.len() < header.frame_len() {
            return Err(ProtocolError::MalformedFrame {
                needed: header.frame_len(),
                available: frame.len(),
            });
        }
        let frame = &frame[..header.frame_len()];
        let key = header.key;

        let decoder = self
            .lookup(key.class, key.method, key.is_event)
            .ok_or(ProtocolError::UnknownPacket(key))?;

        match decoder {
            Decoder::Typed(decode) => {
                let mut reader = BgapiReader::payload(frame);
                let packet = decode(&mut reader)?;
                if reader.remaining() > 0 {
                    trace!("{}: ignoring {} trailing bytes", key, reader.remaining());
                }
                Ok(packet)
            }
            Decoder::Opaque => {
                let payload = frame[HEADER_SIZE..].to_vec();
                Ok(if key.is_event {
                    BgapiPacket::Event(BgapiEvent::Opaque {
                        class: key.class,
                        method: key.method,
                        payload,
                    })
                } else {
                    BgapiPacket::Response(BgapiResponse::Opaque {
                        class: key.class,
                        method: key.method,
                        payload,
                    })
                })
            }
        }
    }
}
