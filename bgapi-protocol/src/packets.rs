//! Typed BGAPI packets.
//!
//! Commands travel host to device. Every command except `system_reset`
//! is answered by a response carrying the same class and method id.
//! Events are unsolicited and carry the event flag.

use bytes::Bytes;
use serde::Serialize;
use uuid::Uuid;

use crate::codec::{BgapiReader, BgapiWriter};
use crate::error::{BgapiResult, ProtocolError};
use crate::types::{class, BdAddr, PacketKey};

/// Method ids of the implemented commands, grouped per class.
pub mod method {
    pub const SYSTEM_RESET: u8 = 0;
    pub const SYSTEM_HELLO: u8 = 1;
    pub const SYSTEM_ADDRESS_GET: u8 = 2;
    pub const SYSTEM_GET_INFO: u8 = 8;

    pub const CONNECTION_DISCONNECT: u8 = 0;
    pub const CONNECTION_GET_STATUS: u8 = 7;

    pub const ATTCLIENT_READ_BY_GROUP_TYPE: u8 = 1;
    pub const ATTCLIENT_FIND_INFORMATION: u8 = 3;
    pub const ATTCLIENT_READ_BY_HANDLE: u8 = 4;
    pub const ATTCLIENT_ATTRIBUTE_WRITE: u8 = 5;

    pub const GAP_SET_MODE: u8 = 1;
    pub const GAP_DISCOVER: u8 = 2;
    pub const GAP_CONNECT_DIRECT: u8 = 3;
    pub const GAP_END_PROCEDURE: u8 = 4;
}

/// Event ids of the implemented events, grouped per class.
pub mod event {
    pub const SYSTEM_BOOT: u8 = 0;

    pub const CONNECTION_STATUS: u8 = 0;
    pub const CONNECTION_DISCONNECTED: u8 = 4;

    pub const ATTCLIENT_PROCEDURE_COMPLETED: u8 = 1;
    pub const ATTCLIENT_GROUP_FOUND: u8 = 2;
    pub const ATTCLIENT_FIND_INFORMATION_FOUND: u8 = 4;
    pub const ATTCLIENT_ATTRIBUTE_VALUE: u8 = 5;

    pub const GAP_SCAN_RESPONSE: u8 = 0;
}

/// GAP discovery mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[repr(u8)]
pub enum DiscoverMode {
    Limited = 0,
    Generic = 1,
    Observation = 2,
}

/// Firmware and hardware versions reported at boot and by `system_get_info`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SystemInfo {
    pub major: u16,
    pub minor: u16,
    pub patch: u16,
    pub build: u16,
    pub ll_version: u16,
    pub protocol_version: u8,
    pub hw: u8,
}

impl SystemInfo {
    fn decode(reader: &mut BgapiReader<'_>) -> Result<Self, ProtocolError> {
        Ok(Self {
            major: reader.read_u16()?,
            minor: reader.read_u16()?,
            patch: reader.read_u16()?,
            build: reader.read_u16()?,
            ll_version: reader.read_u16()?,
            protocol_version: reader.read_u8()?,
            hw: reader.read_u8()?,
        })
    }

    fn encode(&self, writer: &mut BgapiWriter) {
        writer
            .put_u16(self.major)
            .put_u16(self.minor)
            .put_u16(self.patch)
            .put_u16(self.build)
            .put_u16(self.ll_version)
            .put_u8(self.protocol_version)
            .put_u8(self.hw);
    }
}

/// Outgoing command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BgapiCommand {
    SystemReset { boot_in_dfu: bool },
    SystemHello,
    SystemAddressGet,
    SystemGetInfo,
    ConnectionDisconnect { connection: u8 },
    ConnectionGetStatus { connection: u8 },
    AttclientReadByGroupType { connection: u8, start: u16, end: u16, uuid: Uuid },
    AttclientFindInformation { connection: u8, start: u16, end: u16 },
    AttclientReadByHandle { connection: u8, chr_handle: u16 },
    AttclientAttributeWrite { connection: u8, att_handle: u16, data: Vec<u8> },
    GapSetMode { discover: u8, connect: u8 },
    GapDiscover { mode: DiscoverMode },
    GapConnectDirect {
        address: BdAddr,
        address_type: u8,
        conn_interval_min: u16,
        conn_interval_max: u16,
        timeout: u16,
        latency: u16,
    },
    GapEndProcedure,
}

impl BgapiCommand {
    pub fn key(&self) -> PacketKey {
        use BgapiCommand::*;
        let (class, method) = match self {
            SystemReset { .. } => (class::SYSTEM, method::SYSTEM_RESET),
            SystemHello => (class::SYSTEM, method::SYSTEM_HELLO),
            SystemAddressGet => (class::SYSTEM, method::SYSTEM_ADDRESS_GET),
            SystemGetInfo => (class::SYSTEM, method::SYSTEM_GET_INFO),
            ConnectionDisconnect { .. } => (class::CONNECTION, method::CONNECTION_DISCONNECT),
            ConnectionGetStatus { .. } => (class::CONNECTION, method::CONNECTION_GET_STATUS),
            AttclientReadByGroupType { .. } => (class::ATTCLIENT, method::ATTCLIENT_READ_BY_GROUP_TYPE),
            AttclientFindInformation { .. } => (class::ATTCLIENT, method::ATTCLIENT_FIND_INFORMATION),
            AttclientReadByHandle { .. } => (class::ATTCLIENT, method::ATTCLIENT_READ_BY_HANDLE),
            AttclientAttributeWrite { .. } => (class::ATTCLIENT, method::ATTCLIENT_ATTRIBUTE_WRITE),
            GapSetMode { .. } => (class::GAP, method::GAP_SET_MODE),
            GapDiscover { .. } => (class::GAP, method::GAP_DISCOVER),
            GapConnectDirect { .. } => (class::GAP, method::GAP_CONNECT_DIRECT),
            GapEndProcedure => (class::GAP, method::GAP_END_PROCEDURE),
        };
        PacketKey::response(class, method)
    }

    /// Key of the response the device answers with, if any.
    pub fn expected_response(&self) -> Option<PacketKey> {
        match self {
            BgapiCommand::SystemReset { .. } => None,
            _ => Some(self.key()),
        }
    }

    /// Connection handle addressed by this command.
    pub fn connection(&self) -> Option<u8> {
        use BgapiCommand::*;
        match self {
            ConnectionDisconnect { connection }
            | ConnectionGetStatus { connection }
            | AttclientReadByGroupType { connection, .. }
            | AttclientFindInformation { connection, .. }
            | AttclientReadByHandle { connection, .. }
            | AttclientAttributeWrite { connection, .. } => Some(*connection),
            _ => None,
        }
    }

    /// Encode the complete frame. Fails if it would exceed `MAX_FRAME_SIZE`.
    pub fn serialize(&self) -> Result<Bytes, ProtocolError> {
        use BgapiCommand::*;
        let mut w = BgapiWriter::new();
        match self {
            SystemReset { boot_in_dfu } => {
                w.put_bool(*boot_in_dfu);
            }
            SystemHello | SystemAddressGet | SystemGetInfo | GapEndProcedure => {}
            ConnectionDisconnect { connection } | ConnectionGetStatus { connection } => {
                w.put_u8(*connection);
            }
            AttclientReadByGroupType { connection, start, end, uuid } => {
                w.put_u8(*connection).put_u16(*start).put_u16(*end).put_uuid(uuid);
            }
            AttclientFindInformation { connection, start, end } => {
                w.put_u8(*connection).put_u16(*start).put_u16(*end);
            }
            AttclientReadByHandle { connection, chr_handle } => {
                w.put_u8(*connection).put_u16(*chr_handle);
            }
            AttclientAttributeWrite { connection, att_handle, data } => {
                w.put_u8(*connection).put_u16(*att_handle).put_u8_array(data);
            }
            GapSetMode { discover, connect } => {
                w.put_u8(*discover).put_u8(*connect);
            }
            GapDiscover { mode } => {
                w.put_u8(*mode as u8);
            }
            GapConnectDirect {
                address,
                address_type,
                conn_interval_min,
                conn_interval_max,
                timeout,
                latency,
            } => {
                w.put_address(address)
                    .put_u8(*address_type)
                    .put_u16(*conn_interval_min)
                    .put_u16(*conn_interval_max)
                    .put_u16(*timeout)
                    .put_u16(*latency);
            }
        }
        w.finish(self.key())
    }
}

/// Response to a command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum BgapiResponse {
    SystemHello,
    SystemAddressGet { address: BdAddr },
    SystemGetInfo(SystemInfo),
    ConnectionDisconnect { connection: u8, result: BgapiResult },
    ConnectionGetStatus { connection: u8 },
    AttclientReadByGroupType { connection: u8, result: BgapiResult },
    AttclientFindInformation { connection: u8, result: BgapiResult },
    AttclientReadByHandle { connection: u8, result: BgapiResult },
    AttclientAttributeWrite { connection: u8, result: BgapiResult },
    GapSetMode { result: BgapiResult },
    GapDiscover { result: BgapiResult },
    GapConnectDirect { result: BgapiResult, connection: u8 },
    GapEndProcedure { result: BgapiResult },
    /// Response registered as pass-through; payload left undecoded.
    Opaque { class: u8, method: u8, payload: Vec<u8> },
}

impl BgapiResponse {
    pub fn key(&self) -> PacketKey {
        use BgapiResponse::*;
        let (class, method) = match self {
            SystemHello => (class::SYSTEM, method::SYSTEM_HELLO),
            SystemAddressGet { .. } => (class::SYSTEM, method::SYSTEM_ADDRESS_GET),
            SystemGetInfo(_) => (class::SYSTEM, method::SYSTEM_GET_INFO),
            ConnectionDisconnect { .. } => (class::CONNECTION, method::CONNECTION_DISCONNECT),
            ConnectionGetStatus { .. } => (class::CONNECTION, method::CONNECTION_GET_STATUS),
            AttclientReadByGroupType { .. } => (class::ATTCLIENT, method::ATTCLIENT_READ_BY_GROUP_TYPE),
            AttclientFindInformation { .. } => (class::ATTCLIENT, method::ATTCLIENT_FIND_INFORMATION),
            AttclientReadByHandle { .. } => (class::ATTCLIENT, method::ATTCLIENT_READ_BY_HANDLE),
            AttclientAttributeWrite { .. } => (class::ATTCLIENT, method::ATTCLIENT_ATTRIBUTE_WRITE),
            GapSetMode { .. } => (class::GAP, method::GAP_SET_MODE),
            GapDiscover { .. } => (class::GAP, method::GAP_DISCOVER),
            GapConnectDirect { .. } => (class::GAP, method::GAP_CONNECT_DIRECT),
            GapEndProcedure { .. } => (class::GAP, method::GAP_END_PROCEDURE),
            Opaque { class, method, .. } => (*class, *method),
        };
        PacketKey::response(class, method)
    }

    /// Connection handle echoed by this response.
    pub fn connection(&self) -> Option<u8> {
        use BgapiResponse::*;
        match self {
            ConnectionDisconnect { connection, .. }
            | ConnectionGetStatus { connection }
            | AttclientReadByGroupType { connection, .. }
            | AttclientFindInformation { connection, .. }
            | AttclientReadByHandle { connection, .. }
            | AttclientAttributeWrite { connection, .. } => Some(*connection),
            _ => None,
        }
    }

    /// Result code, for responses that carry one.
    pub fn result(&self) -> Option<BgapiResult> {
        use BgapiResponse::*;
        match self {
            ConnectionDisconnect { result, .. }
            | AttclientReadByGroupType { result, .. }
            | AttclientFindInformation { result, .. }
            | AttclientReadByHandle { result, .. }
            | AttclientAttributeWrite { result, .. }
            | GapSetMode { result }
            | GapDiscover { result }
            | GapConnectDirect { result, .. }
            | GapEndProcedure { result } => Some(*result),
            _ => None,
        }
    }

    pub fn serialize(&self) -> Result<Bytes, ProtocolError> {
        use BgapiResponse::*;
        let mut w = BgapiWriter::new();
        match self {
            SystemHello => {}
            SystemAddressGet { address } => {
                w.put_address(address);
            }
            SystemGetInfo(info) => info.encode(&mut w),
            ConnectionDisconnect { connection, result }
            | AttclientReadByGroupType { connection, result }
            | AttclientFindInformation { connection, result }
            | AttclientReadByHandle { connection, result }
            | AttclientAttributeWrite { connection, result } => {
                w.put_u8(*connection).put_u16((*result).into());
            }
            ConnectionGetStatus { connection } => {
                w.put_u8(*connection);
            }
            GapSetMode { result } | GapDiscover { result } | GapEndProcedure { result } => {
                w.put_u16((*result).into());
            }
            GapConnectDirect { result, connection } => {
                w.put_u16((*result).into()).put_u8(*connection);
            }
            Opaque { payload, .. } => {
                for byte in payload {
                    w.put_u8(*byte);
                }
            }
        }
        w.finish(self.key())
    }
}

/// Unsolicited notification from the device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum BgapiEvent {
    SystemBoot(SystemInfo),
    ConnectionStatus {
        connection: u8,
        flags: u8,
        address: BdAddr,
        address_type: u8,
        conn_interval: u16,
        timeout: u16,
        latency: u16,
        bonding: u8,
    },
    ConnectionDisconnected { connection: u8, reason: BgapiResult },
    AttclientProcedureCompleted { connection: u8, result: BgapiResult, chr_handle: u16 },
    AttclientGroupFound { connection: u8, start: u16, end: u16, uuid: Uuid },
    AttclientFindInformationFound { connection: u8, chr_handle: u16, uuid: Uuid },
    AttclientAttributeValue { connection: u8, att_handle: u16, value_type: u8, value: Vec<u8> },
    GapScanResponse {
        rssi: i8,
        packet_type: u8,
        sender: BdAddr,
        address_type: u8,
        bond: u8,
        data: Vec<u8>,
    },
    /// Event registered as pass-through; payload left undecoded.
    Opaque { class: u8, method: u8, payload: Vec<u8> },
}

impl BgapiEvent {
    pub fn key(&self) -> PacketKey {
        use BgapiEvent::*;
        let (class, id) = match self {
            SystemBoot(_) => (class::SYSTEM, event::SYSTEM_BOOT),
            ConnectionStatus { .. } => (class::CONNECTION, event::CONNECTION_STATUS),
            ConnectionDisconnected { .. } => (class::CONNECTION, event::CONNECTION_DISCONNECTED),
            AttclientProcedureCompleted { .. } => (class::ATTCLIENT, event::ATTCLIENT_PROCEDURE_COMPLETED),
            AttclientGroupFound { .. } => (class::ATTCLIENT, event::ATTCLIENT_GROUP_FOUND),
            AttclientFindInformationFound { .. } => {
                (class::ATTCLIENT, event::ATTCLIENT_FIND_INFORMATION_FOUND)
            }
            AttclientAttributeValue { .. } => (class::ATTCLIENT, event::ATTCLIENT_ATTRIBUTE_VALUE),
            GapScanResponse { .. } => (class::GAP, event::GAP_SCAN_RESPONSE),
            Opaque { class, method, .. } => (*class, *method),
        };
        PacketKey::event(class, id)
    }

    pub fn serialize(&self) -> Result<Bytes, ProtocolError> {
        use BgapiEvent::*;
        let mut w = BgapiWriter::new();
        match self {
            SystemBoot(info) => info.encode(&mut w),
            ConnectionStatus {
                connection,
                flags,
                address,
                address_type,
                conn_interval,
                timeout,
                latency,
                bonding,
            } => {
                w.put_u8(*connection)
                    .put_u8(*flags)
                    .put_address(address)
                    .put_u8(*address_type)
                    .put_u16(*conn_interval)
                    .put_u16(*timeout)
                    .put_u16(*latency)
                    .put_u8(*bonding);
            }
            ConnectionDisconnected { connection, reason } => {
                w.put_u8(*connection).put_u16((*reason).into());
            }
            AttclientProcedureCompleted { connection, result, chr_handle } => {
                w.put_u8(*connection).put_u16((*result).into()).put_u16(*chr_handle);
            }
            AttclientGroupFound { connection, start, end, uuid } => {
                w.put_u8(*connection).put_u16(*start).put_u16(*end).put_uuid(uuid);
            }
            AttclientFindInformationFound { connection, chr_handle, uuid } => {
                w.put_u8(*connection).put_u16(*chr_handle).put_uuid(uuid);
            }
            AttclientAttributeValue { connection, att_handle, value_type, value } => {
                w.put_u8(*connection)
                    .put_u16(*att_handle)
                    .put_u8(*value_type)
                    .put_u8_array(value);
            }
            GapScanResponse { rssi, packet_type, sender, address_type, bond, data } => {
                w.put_i8(*rssi)
                    .put_u8(*packet_type)
                    .put_address(sender)
                    .put_u8(*address_type)
                    .put_u8(*bond)
                    .put_u8_array(data);
            }
            Opaque { payload, .. } => {
                for byte in payload {
                    w.put_u8(*byte);
                }
            }
        }
        w.finish(self.key())
    }
}

/// A decoded incoming packet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum BgapiPacket {
    Response(BgapiResponse),
    Event(BgapiEvent),
}

impl BgapiPacket {
    pub fn is_event(&self) -> bool {
        matches!(self, BgapiPacket::Event(_))
    }

    pub fn key(&self) -> PacketKey {
        match self {
            BgapiPacket::Response(response) => response.key(),
            BgapiPacket::Event(event) => event.key(),
        }
    }

    pub fn serialize(&self) -> Result<Bytes, ProtocolError> {
        match self {
            BgapiPacket::Response(response) => response.serialize(),
            BgapiPacket::Event(event) => event.serialize(),
        }
    }
}

// Decoders. Each receives a reader positioned at the start of the payload.

pub(crate) fn decode_system_hello(_: &mut BgapiReader<'_>) -> Result<BgapiPacket, ProtocolError> {
    Ok(BgapiPacket::Response(BgapiResponse::SystemHello))
}

pub(crate) fn decode_system_address_get(r: &mut BgapiReader<'_>) -> Result<BgapiPacket, ProtocolError> {
    Ok(BgapiPacket::Response(BgapiResponse::SystemAddressGet {
        address: r.read_address()?,
    }))
}

pub(crate) fn decode_system_get_info(r: &mut BgapiReader<'_>) -> Result<BgapiPacket, ProtocolError> {
    Ok(BgapiPacket::Response(BgapiResponse::SystemGetInfo(SystemInfo::decode(r)?)))
}

fn read_connection_result(r: &mut BgapiReader<'_>) -> Result<(u8, BgapiResult), ProtocolError> {
    Ok((r.read_u8()?, BgapiResult::from(r.read_u16()?)))
}

pub(crate) fn decode_connection_disconnect(r: &mut BgapiReader<'_>) -> Result<BgapiPacket, ProtocolError> {
    let (connection, result) = read_connection_result(r)?;
    Ok(BgapiPacket::Response(BgapiResponse::ConnectionDisconnect { connection, result }))
}

pub(crate) fn decode_connection_get_status(r: &mut BgapiReader<'_>) -> Result<BgapiPacket, ProtocolError> {
    Ok(BgapiPacket::Response(BgapiResponse::ConnectionGetStatus {
        connection: r.read_u8()?,
    }))
}

pub(crate) fn decode_attclient_read_by_group_type(
    r: &mut BgapiReader<'_>,
) -> Result<BgapiPacket, ProtocolError> {
    let (connection, result) = read_connection_result(r)?;
    Ok(BgapiPacket::Response(BgapiResponse::AttclientReadByGroupType { connection, result }))
}

pub(crate) fn decode_attclient_find_information(
    r: &mut BgapiReader<'_>,
) -> Result<BgapiPacket, ProtocolError> {
    let (connection, result) = read_connection_result(r)?;
    Ok(BgapiPacket::Response(BgapiResponse::AttclientFindInformation { connection, result }))
}

pub(crate) fn decode_attclient_read_by_handle(
    r: &mut BgapiReader<'_>,
) -> Result<BgapiPacket, ProtocolError> {
    let (connection, result) = read_connection_result(r)?;
    Ok(BgapiPacket::Response(BgapiResponse::AttclientReadByHandle { connection, result }))
}

pub(crate) fn decode_attclient_attribute_write(
    r: &mut BgapiReader<'_>,
) -> Result<BgapiPacket, ProtocolError> {
    let (connection, result) = read_connection_result(r)?;
    Ok(BgapiPacket::Response(BgapiResponse::AttclientAttributeWrite { connection, result }))
}

pub(crate) fn decode_gap_set_mode(r: &mut BgapiReader<'_>) -> Result<BgapiPacket, ProtocolError> {
    Ok(BgapiPacket::Response(BgapiResponse::GapSetMode {
        result: r.read_u16()?.into(),
    }))
}

pub(crate) fn decode_gap_discover(r: &mut BgapiReader<'_>) -> Result<BgapiPacket, ProtocolError> {
    Ok(BgapiPacket::Response(BgapiResponse::GapDiscover {
        result: r.read_u16()?.into(),
    }))
}

pub(crate) fn decode_gap_connect_direct(r: &mut BgapiReader<'_>) -> Result<BgapiPacket, ProtocolError> {
    Ok(BgapiPacket::Response(BgapiResponse::GapConnectDirect {
        result: r.read_u16()?.into(),
        connection: r.read_u8()?,
    }))
}

pub(crate) fn decode_gap_end_procedure(r: &mut BgapiReader<'_>) -> Result<BgapiPacket, ProtocolError> {
    Ok(BgapiPacket::Response(BgapiResponse::GapEndProcedure {
        result: r.read_u16()?.into(),
    }))
}

pub(crate) fn decode_system_boot(r: &mut BgapiReader<'_>) -> Result<BgapiPacket, ProtocolError> {
    Ok(BgapiPacket::Event(BgapiEvent::SystemBoot(SystemInfo::decode(r)?)))
}

pub(crate) fn decode_connection_status(r: &mut BgapiReader<'_>) -> Result<BgapiPacket, ProtocolError> {
    Ok(BgapiPacket::Event(BgapiEvent::ConnectionStatus {
        connection: r.read_u8()?,
        flags: r.read_u8()?,
        address: r.read_address()?,
        address_type: r.read_u8()?,
        conn_interval: r.read_u16()?,
        timeout: r.read_u16()?,
        latency: r.read_u16()?,
        bonding: r.read_u8()?,
    }))
}

pub(crate) fn decode_connection_disconnected(
    r: &mut BgapiReader<'_>,
) -> Result<BgapiPacket, ProtocolError> {
    let (connection, reason) = read_connection_result(r)?;
    Ok(BgapiPacket::Event(BgapiEvent::ConnectionDisconnected { connection, reason }))
}

pub(crate) fn decode_attclient_procedure_completed(
    r: &mut BgapiReader<'_>,
) -> Result<BgapiPacket, ProtocolError> {
    let (connection, result) = read_connection_result(r)?;
    Ok(BgapiPacket::Event(BgapiEvent::AttclientProcedureCompleted {
        connection,
        result,
        chr_handle: r.read_u16()?,
    }))
}

pub(crate) fn decode_attclient_group_found(r: &mut BgapiReader<'_>) -> Result<BgapiPacket, ProtocolError> {
    Ok(BgapiPacket::Event(BgapiEvent::AttclientGroupFound {
        connection: r.read_u8()?,
        start: r.read_u16()?,
        end: r.read_u16()?,
        uuid: r.read_uuid()?,
    }))
}

pub(crate) fn decode_attclient_find_information_found(
    r: &mut BgapiReader<'_>,
) -> Result<BgapiPacket, ProtocolError> {
    Ok(BgapiPacket::Event(BgapiEvent::AttclientFindInformationFound {
        connection: r.read_u8()?,
        chr_handle: r.read_u16()?,
        uuid: r.read_uuid()?,
    }))
}

pub(crate) fn decode_attclient_attribute_value(
    r: &mut BgapiReader<'_>,
) -> Result<BgapiPacket, ProtocolError> {
    Ok(BgapiPacket::Event(BgapiEvent::AttclientAttributeValue {
        connection: r.read_u8()?,
        att_handle: r.read_u16()?,
        value_type: r.read_u8()?,
        value: r.read_u8_array()?,
    }))
}

pub(crate) fn decode_gap_scan_response(r: &mut BgapiReader<'_>) -> Result<BgapiPacket, ProtocolError> {
    Ok(BgapiPacket::Event(BgapiEvent::GapScanResponse {
        rssi: r.read_i8()?,
        packet_type: r.read_u8()?,
        sender: r.read_address()?,
        address_type: r.read_u8()?,
        bond: r.read_u8()?,
        data: r.read_u8_array()?,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serialize_hello() {
        let frame = BgapiCommand::SystemHello.serialize().unwrap();
        assert_eq!(&frame[..], &[0x00, 0x00, 0x00, 0x01]);
    }

    #[test]
    fn test_serialize_reset_has_no_response() {
        let cmd = BgapiCommand::SystemReset { boot_in_dfu: false };
        assert_eq!(&cmd.serialize().unwrap()[..], &[0x00, 0x01, 0x00, 0x00, 0x00]);
        assert_eq!(cmd.expected_response(), None);
    }

    #[test]
    fn test_serialize_attribute_write() {
        let cmd = BgapiCommand::AttclientAttributeWrite {
            connection: 1,
            att_handle: 0x002A,
            data: vec![0x01, 0x00],
        };
        assert_eq!(
            &cmd.serialize().unwrap()[..],
            &[0x00, 0x06, 0x04, 0x05, 0x01, 0x2A, 0x00, 0x02, 0x01, 0x00]
        );
        assert_eq!(cmd.connection(), Some(1));
        assert_eq!(cmd.expected_response(), Some(PacketKey::response(4, 5)));
    }

    #[test]
    fn test_serialize_connect_direct() {
        let cmd = BgapiCommand::GapConnectDirect {
            address: "00:07:80:12:34:56".parse().unwrap(),
            address_type: 0,
            conn_interval_min: 60,
            conn_interval_max: 76,
            timeout: 100,
            latency: 0,
        };
        let frame = cmd.serialize().unwrap();
        assert_eq!(frame.len(), 4 + 15);
        assert_eq!(&frame[4..10], &[0x56, 0x34, 0x12, 0x80, 0x07, 0x00]);
    }

    #[test]
    fn test_response_accessors() {
        let rsp = BgapiResponse::AttclientReadByHandle {
            connection: 3,
            result: BgapiResult::Success,
        };
        assert_eq!(rsp.connection(), Some(3));
        assert_eq!(rsp.result(), Some(BgapiResult::Success));
        assert_eq!(rsp.key(), PacketKey::response(4, 4));
        assert_eq!(BgapiResponse::SystemHello.result(), None);
    }

    #[test]
    fn test_packet_is_event() {
        let event = BgapiPacket::Event(BgapiEvent::ConnectionDisconnected {
            connection: 0,
            reason: BgapiResult::ConnectionTimeout,
        });
        assert!(event.is_event());
        assert!(event.key().is_event);
        assert!(!BgapiPacket::Response(BgapiResponse::SystemHello).is_event());
    }

    #[test]
    fn test_oversized_command_is_rejected() {
        let cmd = BgapiCommand::AttclientAttributeWrite {
            connection: 0,
            att_handle: 0x0025,
            data: vec![0xAB; 300],
        };
        assert_eq!(
            cmd.serialize(),
            Err(ProtocolError::FrameTooLarge(4 + 3 + 1 + 300, crate::types::MAX_FRAME_SIZE))
        );
    }

    #[test]
    fn test_oversized_event_is_rejected() {
        let event = BgapiEvent::AttclientAttributeValue {
            connection: 0,
            att_handle: 0x0025,
            value_type: 1,
            value: vec![0x11; 70],
        };
        assert!(matches!(event.serialize(), Err(ProtocolError::FrameTooLarge(79, 64))));

        let fits = BgapiEvent::AttclientAttributeValue {
            connection: 0,
            att_handle: 0x0025,
            value_type: 1,
            value: vec![0x11; 55],
        };
        assert_eq!(fits.serialize().unwrap().len(), 64);
    }
}
