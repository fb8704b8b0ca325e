//! PWOSPF wire format.
//!
//! Every PWOSPF packet starts with a 24 byte header followed by a Hello or
//! Link State Update body. All fields are in network byte order.

use std::net::Ipv4Addr;

use thiserror::Error;

use crate::RouterId;

pub const PWOSPF_VERSION: u8 = 2;
pub const HEADER_LEN: usize = 24;
pub const HELLO_BODY_LEN: usize = 8;
pub const LSU_BODY_LEN: usize = 8;
pub const ADVERTISEMENT_LEN: usize = 12;

/// Destination of every Hello ("AllSPFRouters").
pub const ALL_SPF_ROUTERS: Ipv4Addr = Ipv4Addr::new(224, 0, 0, 5);

/// Flood TTL stamped on self-originated updates.
pub const INITIAL_LSU_TTL: u16 = 64;

const TYPE_HELLO: u8 = 1;
const TYPE_LINK_STATE_UPDATE: u8 = 4;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PacketError {
    #[error("truncated packet: need {needed} bytes, got {actual}")]
    Truncated { needed: usize, actual: usize },

    #[error("unsupported version {0}")]
    BadVersion(u8),

    #[error("unknown packet type {0}")]
    UnknownType(u8),

    #[error("checksum mismatch: carried {carried:#06x}, computed {computed:#06x}")]
    BadChecksum { carried: u16, computed: u16 },

    #[error("authentication type {0} is not supported")]
    BadAuthType(u16),

    #[error("length field {0} does not match the body")]
    BadLength(u16),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HelloMessage {
    pub mask: Ipv4Addr,
    pub hello_interval: u16,
}

/// One advertised link: a subnet and the router on its far side
/// (`0.0.0.0` when no neighbor has been confirmed there).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Advertisement {
    pub subnet: Ipv4Addr,
    pub mask: Ipv4Addr,
    pub router_id: RouterId,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LsuMessage {
    pub sequence: u16,
    pub ttl: u16,
    pub advertisements: Vec<Advertisement>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProtocolMessage {
    Hello(HelloMessage),
    LinkStateUpdate(LsuMessage),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PwospfPacket {
    pub router_id: RouterId,
    pub area_id: u32,
    pub message: ProtocolMessage,
}

impl PwospfPacket {
    pub fn hello(router_id: RouterId, area_id: u32, mask: Ipv4Addr, hello_interval: u16) -> Self {
        Self {
            router_id,
            area_id,
            message: ProtocolMessage::Hello(HelloMessage { mask, hello_interval }),
        }
    }

    pub fn link_state_update(router_id: RouterId, area_id: u32, lsu: LsuMessage) -> Self {
        Self {
            router_id,
            area_id,
            message: ProtocolMessage::LinkStateUpdate(lsu),
        }
    }

    pub fn encoded_len(&self) -> usize {
        HEADER_LEN
            + match &self.message {
                ProtocolMessage::Hello(_) => HELLO_BODY_LEN,
                ProtocolMessage::LinkStateUpdate(lsu) => {
                    LSU_BODY_LEN + lsu.advertisements.len() * ADVERTISEMENT_LEN
                }
            }
    }

    /// Serializes the packet and fills in its checksum.
    pub fn encode(&self) -> Vec<u8> {
        let len = self.encoded_len();
        let mut buf = Vec::with_capacity(len);

        let kind = match self.message {
            ProtocolMessage::Hello(_) => TYPE_HELLO,
            ProtocolMessage::LinkStateUpdate(_) => TYPE_LINK_STATE_UPDATE,
        };
        buf.push(PWOSPF_VERSION);
        buf.push(kind);
        buf.extend_from_slice(&(len as u16).to_be_bytes());
        buf.extend_from_slice(&self.router_id.octets());
        buf.extend_from_slice(&self.area_id.to_be_bytes());
        buf.extend_from_slice(&[0u8; 2]); // checksum
        buf.extend_from_slice(&[0u8; 2]); // auth type
        buf.extend_from_slice(&[0u8; 8]); // auth data

        match &self.message {
            ProtocolMessage::Hello(hello) => {
                buf.extend_from_slice(&hello.mask.octets());
                buf.extend_from_slice(&hello.hello_interval.to_be_bytes());
                buf.extend_from_slice(&[0u8; 2]);
            }
            ProtocolMessage::LinkStateUpdate(lsu) => {
                buf.extend_from_slice(&lsu.sequence.to_be_bytes());
                buf.extend_from_slice(&lsu.ttl.to_be_bytes());
                buf.extend_from_slice(&(lsu.advertisements.len() as u32).to_be_bytes());
                for adv in &lsu.advertisements {
                    buf.extend_from_slice(&adv.subnet.octets());
                    buf.extend_from_slice(&adv.mask.octets());
                    buf.extend_from_slice(&adv.router_id.octets());
                }
            }
        }

        let sum = checksum(&buf);
        buf[12..14].copy_from_slice(&sum.to_be_bytes());
        buf
    }

    /// Parses and validates a packet. Area and router id checks are left to
    /// the caller since they depend on local configuration.
    pub fn decode(bytes: &[u8]) -> Result<Self, PacketError> {
        ensure_len(bytes, HEADER_LEN)?;

        let version = bytes[0];
        if version != PWOSPF_VERSION {
            return Err(PacketError::BadVersion(version));
        }

        let length = u16::from_be_bytes([bytes[2], bytes[3]]);
        if (length as usize) < HEADER_LEN {
            return Err(PacketError::BadLength(length));
        }
        ensure_len(bytes, length as usize)?;
        let bytes = &bytes[..length as usize];

        let carried = u16::from_be_bytes([bytes[12], bytes[13]]);
        let computed = checksum(bytes);
        if carried != computed {
            return Err(PacketError::BadChecksum { carried, computed });
        }

        let auth_type = u16::from_be_bytes([bytes[14], bytes[15]]);
        if auth_type != 0 {
            return Err(PacketError::BadAuthType(auth_type));
        }

        let router_id = read_addr(bytes, 4);
        let area_id = u32::from_be_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]);
        let body = &bytes[HEADER_LEN..];

        let message = match bytes[1] {
            TYPE_HELLO => {
                ensure_len(body, HELLO_BODY_LEN)?;
                ProtocolMessage::Hello(HelloMessage {
                    mask: read_addr(body, 0),
                    hello_interval: u16::from_be_bytes([body[4], body[5]]),
                })
            }
            TYPE_LINK_STATE_UPDATE => {
                ensure_len(body, LSU_BODY_LEN)?;
                let sequence = u16::from_be_bytes([body[0], body[1]]);
                let ttl = u16::from_be_bytes([body[2], body[3]]);
                let count = u32::from_be_bytes([body[4], body[5], body[6], body[7]]) as usize;

                let adverts = &body[LSU_BODY_LEN..];
                if adverts.len() != count * ADVERTISEMENT_LEN {
                    return Err(PacketError::BadLength(length));
                }

                let advertisements = adverts
                    .chunks_exact(ADVERTISEMENT_LEN)
                    .map(|chunk| Advertisement {
                        subnet: read_addr(chunk, 0),
                        mask: read_addr(chunk, 4),
                        router_id: read_addr(chunk, 8),
                    })
                    .collect();

                ProtocolMessage::LinkStateUpdate(LsuMessage {
                    sequence,
                    ttl,
                    advertisements,
                })
            }
            other => return Err(PacketError::UnknownType(other)),
        };

        Ok(Self {
            router_id,
            area_id,
            message,
        })
    }
}

/// Ones'-complement checksum over the packet with the checksum field and the
/// 64-bit authentication field left out.
pub fn checksum(bytes: &[u8]) -> u16 {
    let mut sum: u32 = 0;

    for (index, word) in bytes.chunks(2).enumerate() {
        if index == 6 || (8..=11).contains(&index) {
            continue;
        }
        let value = match word {
            [hi, lo] => u16::from_be_bytes([*hi, *lo]),
            [hi] => u16::from_be_bytes([*hi, 0]),
            _ => 0,
        };
        sum += value as u32;
    }

    while sum >> 16 != 0 {
        sum = (sum & 0xffff) + (sum >> 16);
    }

    !(sum as u16)
}

fn ensure_len(bytes: &[u8], needed: usize) -> Result<(), PacketError> {
    if bytes.len() < needed {
        Err(PacketError::Truncated {
            needed,
            actual: bytes.len(),
        })
    } else {
        Ok(())
    }
}

fn read_addr(bytes: &[u8], offset: usize) -> Ipv4Addr {
    Ipv4Addr::new(
        bytes[offset],
        bytes[offset + 1],
        bytes[offset + 2],
        bytes[offset + 3],
    )
}
