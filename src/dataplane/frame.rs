//! Ethernet, IPv4 and ARP framing around PWOSPF payloads.

use std::net::Ipv4Addr;

use pnet::packet::Packet;
use pnet::packet::arp::{ArpHardwareTypes, ArpOperation, ArpOperations, ArpPacket, MutableArpPacket};
use pnet::packet::ethernet::{EtherTypes, EthernetPacket, MutableEthernetPacket};
use pnet::packet::ip::{IpNextHeaderProtocol, IpNextHeaderProtocols};
use pnet::packet::ipv4::{self, Ipv4Packet, MutableIpv4Packet};
use pnet::util::MacAddr;

use crate::error::{Result, RouterError};
use crate::protocol::packet::PacketError;

pub const PWOSPF_PROTOCOL: IpNextHeaderProtocol = IpNextHeaderProtocols::OspfigP;

const ETHERNET_HEADER_LEN: usize = 14;
const IPV4_HEADER_LEN: usize = 20;
const ARP_PACKET_LEN: usize = 28;
const MIN_FRAME_LEN: usize = 60;
const IP_TTL: u8 = 64;

/// An ARP message as seen by the resolver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArpMessage {
    pub operation: ArpOperation,
    pub sender_mac: MacAddr,
    pub sender_ip: Ipv4Addr,
    pub target_ip: Ipv4Addr,
}

/// Classification of a received frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    Pwospf {
        source: Ipv4Addr,
        destination: Ipv4Addr,
        payload: Vec<u8>,
    },
    Arp(ArpMessage),
    Ignored,
}

fn too_short(needed: usize, actual: usize) -> RouterError {
    RouterError::Malformed(PacketError::Truncated { needed, actual })
}

/// Wraps a PWOSPF payload in IPv4 and Ethernet headers.
pub fn ipv4_frame(
    src_mac: MacAddr,
    dst_mac: MacAddr,
    src_ip: Ipv4Addr,
    dst_ip: Ipv4Addr,
    payload: &[u8],
) -> Result<Vec<u8>> {
    let ip_len = IPV4_HEADER_LEN + payload.len();
    let mut ip_buf = vec![0u8; ip_len];
    {
        let mut ip = MutableIpv4Packet::new(&mut ip_buf).ok_or_else(|| too_short(IPV4_HEADER_LEN, ip_len))?;
        ip.set_version(4);
        ip.set_header_length(5);
        ip.set_total_length(ip_len as u16);
        ip.set_ttl(IP_TTL);
        ip.set_next_level_protocol(PWOSPF_PROTOCOL);
        ip.set_source(src_ip);
        ip.set_destination(dst_ip);
        ip.set_payload(payload);
        let sum = ipv4::checksum(&ip.to_immutable());
        ip.set_checksum(sum);
    }

    ethernet_frame(src_mac, dst_mac, EthernetKind::Ipv4, &ip_buf)
}

/// Builds an ARP request or reply frame.
pub fn arp_frame(
    operation: ArpOperation,
    src_mac: MacAddr,
    src_ip: Ipv4Addr,
    target_mac: MacAddr,
    target_ip: Ipv4Addr,
) -> Result<Vec<u8>> {
    let mut arp_buf = vec![0u8; ARP_PACKET_LEN];
    {
        let mut arp = MutableArpPacket::new(&mut arp_buf).ok_or_else(|| too_short(ARP_PACKET_LEN, 0))?;
        arp.set_hardware_type(ArpHardwareTypes::Ethernet);
        arp.set_protocol_type(EtherTypes::Ipv4);
        arp.set_hw_addr_len(6);
        arp.set_proto_addr_len(4);
        arp.set_operation(operation);
        arp.set_sender_hw_addr(src_mac);
        arp.set_sender_proto_addr(src_ip);
        arp.set_target_hw_addr(target_mac);
        arp.set_target_proto_addr(target_ip);
    }

    let dst_mac = if operation == ArpOperations::Request {
        MacAddr::broadcast()
    } else {
        target_mac
    };
    ethernet_frame(src_mac, dst_mac, EthernetKind::Arp, &arp_buf)
}

enum EthernetKind {
    Ipv4,
    Arp,
}

fn ethernet_frame(src: MacAddr, dst: MacAddr, kind: EthernetKind, payload: &[u8]) -> Result<Vec<u8>> {
    let len = (ETHERNET_HEADER_LEN + payload.len()).max(MIN_FRAME_LEN);
    let mut buf = vec![0u8; len];
    {
        let mut eth = MutableEthernetPacket::new(&mut buf).ok_or_else(|| too_short(ETHERNET_HEADER_LEN, len))?;
        eth.set_destination(dst);
        eth.set_source(src);
        eth.set_ethertype(match kind {
            EthernetKind::Ipv4 => EtherTypes::Ipv4,
            EthernetKind::Arp => EtherTypes::Arp,
        });
    }
    buf[ETHERNET_HEADER_LEN..ETHERNET_HEADER_LEN + payload.len()].copy_from_slice(payload);
    Ok(buf)
}

/// Rewrites the destination MAC of an already built frame.
pub fn set_destination(frame: &mut [u8], mac: MacAddr) {
    if let Some(mut eth) = MutableEthernetPacket::new(frame) {
        eth.set_destination(mac);
    }
}

pub fn parse(frame: &[u8]) -> Inbound {
    let Some(eth) = EthernetPacket::new(frame) else {
        return Inbound::Ignored;
    };

    match eth.get_ethertype() {
        EtherTypes::Ipv4 => {
            let Some(ip) = Ipv4Packet::new(eth.payload()) else {
                return Inbound::Ignored;
            };
            if ip.get_version() != 4 || ip.get_next_level_protocol() != PWOSPF_PROTOCOL {
                return Inbound::Ignored;
            }
            Inbound::Pwospf {
                source: ip.get_source(),
                destination: ip.get_destination(),
                payload: ip.payload().to_vec(),
            }
        }
        EtherTypes::Arp => {
            let Some(arp) = ArpPacket::new(eth.payload()) else {
                return Inbound::Ignored;
            };
            if arp.get_hardware_type() != ArpHardwareTypes::Ethernet
                || arp.get_protocol_type() != EtherTypes::Ipv4
            {
                return Inbound::Ignored;
            }
            Inbound::Arp(ArpMessage {
                operation: arp.get_operation(),
                sender_mac: arp.get_sender_hw_addr(),
                sender_ip: arp.get_sender_proto_addr(),
                target_ip: arp.get_target_proto_addr(),
            })
        }
        _ => Inbound::Ignored,
    }
}
