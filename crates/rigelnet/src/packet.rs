//! Wire-level packet framing: fixed header, little-endian integers,
//! a small set of packet types, and the handshake/disconnect payloads.

use crate::error::NetError;

/// Protocol family magic, stamped into every header so stray UDP traffic
/// from other protocols is rejected instead of misparsed.
pub const PROTOCOL_MAGIC: u32 = 0x5249_474E; // "RIGN"

pub const PROTOCOL_VERSION: u32 = 1;

/// Size in bytes of the fixed packet header.
pub const HEADER_LEN: usize = 4 + 4 + 1 + 1 + 4 + 4 + 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PacketType {
    Data = 0,
    DataMore = 1,
    DataTail = 2,
    Heartbeat = 3,
    Connect = 4,
    ConnectResponse = 5,
    Disconnect = 6,
}

impl PacketType {
    fn from_u8(v: u8) -> Result<Self, NetError> {
        Ok(match v {
            0 => Self::Data,
            1 => Self::DataMore,
            2 => Self::DataTail,
            3 => Self::Heartbeat,
            4 => Self::Connect,
            5 => Self::ConnectResponse,
            6 => Self::Disconnect,
            other => return Err(NetError::IllegalMessage(format!("unknown packet type {other}"))),
        })
    }
}

bitflags::bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct PacketFlags: u8 {
        const RELIABLE        = 1 << 0;
        const FRAGMENTED      = 1 << 1;
        const FINAL_FRAGMENT  = 1 << 2;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectReason {
    Graceful = 0,
    Error = 1,
    TimedOut = 2,
}

impl DisconnectReason {
    fn from_u8(v: u8) -> Result<Self, NetError> {
        Ok(match v {
            0 => Self::Graceful,
            1 => Self::Error,
            2 => Self::TimedOut,
            other => return Err(NetError::IllegalMessage(format!("unknown disconnect reason {other}"))),
        })
    }
}

/// A fully decoded packet: header fields plus the raw payload bytes.
#[derive(Debug, Clone)]
pub struct Packet {
    pub sequence: u32,
    pub packet_type: PacketType,
    pub flags: PacketFlags,
    pub ack_ceiling: u32,
    pub ack_bitmap: u32,
    pub payload: Vec<u8>,
}

impl Packet {
    pub fn is_reliable(&self) -> bool {
        self.flags.contains(PacketFlags::RELIABLE)
    }

    pub fn is_fragmented(&self) -> bool {
        self.flags.contains(PacketFlags::FRAGMENTED)
    }

    pub fn is_final_fragment(&self) -> bool {
        self.flags.contains(PacketFlags::FINAL_FRAGMENT)
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(HEADER_LEN + self.payload.len());
        buf.extend_from_slice(&PROTOCOL_MAGIC.to_le_bytes());
        buf.extend_from_slice(&self.sequence.to_le_bytes());
        buf.push(self.packet_type as u8);
        buf.push(self.flags.bits());
        buf.extend_from_slice(&self.ack_ceiling.to_le_bytes());
        buf.extend_from_slice(&self.ack_bitmap.to_le_bytes());
        buf.extend_from_slice(&(self.payload.len() as u32).to_le_bytes());
        buf.extend_from_slice(&self.payload);
        buf
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, NetError> {
        if bytes.len() < HEADER_LEN {
            return Err(NetError::IllegalMessage("packet shorter than header".into()));
        }
        let magic = read_u32(bytes, 0);
        if magic != PROTOCOL_MAGIC {
            return Err(NetError::IllegalMessage(format!("bad magic {magic:#x}")));
        }
        let sequence = read_u32(bytes, 4);
        let packet_type = PacketType::from_u8(bytes[8])?;
        let flags = PacketFlags::from_bits_truncate(bytes[9]);
        let ack_ceiling = read_u32(bytes, 10);
        let ack_bitmap = read_u32(bytes, 14);
        let payload_len = read_u32(bytes, 18) as usize;
        let payload = bytes
            .get(HEADER_LEN..HEADER_LEN + payload_len)
            .ok_or_else(|| NetError::IllegalMessage("payload length exceeds packet size".into()))?
            .to_vec();
        Ok(Self {
            sequence,
            packet_type,
            flags,
            ack_ceiling,
            ack_bitmap,
            payload,
        })
    }
}

fn read_u32(bytes: &[u8], at: usize) -> u32 {
    u32::from_le_bytes(bytes[at..at + 4].try_into().unwrap())
}

/// Length-prefixed UTF-8 string reader/writer shared by the handshake and
/// disconnect payloads, and by RPC argument packing.
pub fn write_lp_string(buf: &mut Vec<u8>, s: &str) {
    buf.extend_from_slice(&(s.len() as u32).to_le_bytes());
    buf.extend_from_slice(s.as_bytes());
}

pub fn read_lp_string(bytes: &[u8], at: usize) -> Result<(String, usize), NetError> {
    let len = read_u32(bytes, at) as usize;
    let start = at + 4;
    let s = bytes
        .get(start..start + len)
        .ok_or_else(|| NetError::IllegalMessage("truncated length-prefixed string".into()))?;
    let s = String::from_utf8(s.to_vec()).map_err(|e| NetError::IllegalMessage(e.to_string()))?;
    Ok((s, start + len))
}

pub struct ConnectPayload {
    pub passphrase: String,
    pub protocol_version: u32,
}

impl ConnectPayload {
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        write_lp_string(&mut buf, &self.passphrase);
        buf.extend_from_slice(&self.protocol_version.to_le_bytes());
        buf
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, NetError> {
        let (passphrase, after) = read_lp_string(bytes, 0)?;
        let protocol_version = read_u32(bytes, after);
        Ok(Self {
            passphrase,
            protocol_version,
        })
    }
}

pub struct DisconnectPayload {
    pub reason: DisconnectReason,
    pub message: String,
}

impl DisconnectPayload {
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = vec![self.reason as u8];
        write_lp_string(&mut buf, &self.message);
        buf
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, NetError> {
        if bytes.is_empty() {
            return Err(NetError::IllegalMessage("empty disconnect payload".into()));
        }
        let reason = DisconnectReason::from_u8(bytes[0])?;
        let (message, _) = read_lp_string(bytes, 1)?;
        Ok(Self { reason, message })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn packet_round_trips() {
        let p = Packet {
            sequence: 42,
            packet_type: PacketType::Data,
            flags: PacketFlags::RELIABLE,
            ack_ceiling: 10,
            ack_bitmap: 0b1011,
            payload: b"hello".to_vec(),
        };
        let bytes = p.encode();
        let decoded = Packet::decode(&bytes).unwrap();
        assert_eq!(decoded.sequence, 42);
        assert_eq!(decoded.packet_type, PacketType::Data);
        assert!(decoded.is_reliable());
        assert_eq!(decoded.payload, b"hello");
    }

    #[test]
    fn rejects_bad_magic() {
        let mut bytes = vec![0u8; HEADER_LEN];
        bytes[0] = 0xFF;
        assert!(Packet::decode(&bytes).is_err());
    }

    #[test]
    fn connect_payload_round_trips() {
        let payload = ConnectPayload {
            passphrase: "hunter2".into(),
            protocol_version: PROTOCOL_VERSION,
        };
        let bytes = payload.encode();
        let decoded = ConnectPayload::decode(&bytes).unwrap();
        assert_eq!(decoded.passphrase, "hunter2");
        assert_eq!(decoded.protocol_version, PROTOCOL_VERSION);
    }

    #[test]
    fn disconnect_payload_round_trips() {
        let payload = DisconnectPayload {
            reason: DisconnectReason::TimedOut,
            message: "no heartbeat".into(),
        };
        let bytes = payload.encode();
        let decoded = DisconnectPayload::decode(&bytes).unwrap();
        assert_eq!(decoded.reason, DisconnectReason::TimedOut);
        assert_eq!(decoded.message, "no heartbeat");
    }
}
