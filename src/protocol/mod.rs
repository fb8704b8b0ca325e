//! PWOSPF: Hello and LSU processing, flooding, and the background tasks
//! that drive them.

pub mod flood;
pub mod hello;
pub mod lsu;
pub mod packet;
pub mod recompute;
pub mod task_manager;

use std::net::Ipv4Addr;
use std::time::Instant;

use log::debug;

use crate::RouterState;
use crate::arp;
use crate::config::ProtocolSettings;
use crate::dataplane::frame::{self, Inbound};
use crate::network::{InterfaceTable, TopologyDb};
use packet::{ProtocolMessage, PwospfPacket};

pub use task_manager::{TaskManager, start_tasks};

/// Entry point for every frame received on `interface`.
pub async fn handle_frame(state: &RouterState, interface: &str, data: &[u8], now: Instant) {
    if !state.interfaces.read().await.is_active(interface) {
        debug!("Dropping frame on inactive interface {}", interface);
        return;
    }

    match frame::parse(data) {
        Inbound::Arp(msg) => {
            if let Err(e) = arp::handle_arp(state, interface, msg, now).await {
                debug!("ARP handling on {} failed: {}", interface, e);
            }
        }
        Inbound::Pwospf { source, payload, .. } => {
            handle_pwospf(state, interface, source, &payload, now).await;
        }
        Inbound::Ignored => {}
    }
}

async fn handle_pwospf(state: &RouterState, interface: &str, source: Ipv4Addr, payload: &[u8], now: Instant) {
    let packet = match PwospfPacket::decode(payload) {
        Ok(packet) => packet,
        Err(e) => {
            debug!("Dropping PWOSPF packet from {} on {}: {}", source, interface, e);
            return;
        }
    };

    let settings = state.settings().await;
    if packet.area_id != settings.area_id {
        debug!(
            "Dropping packet from {} for area {} (ours is {})",
            packet.router_id, packet.area_id, settings.area_id
        );
        return;
    }
    if packet.router_id == state.router_id {
        debug!("Dropping our own packet echoed on {}", interface);
        return;
    }

    match packet.message {
        ProtocolMessage::Hello(hello) => {
            hello::handle_hello(state, interface, source, packet.router_id, &hello, &settings, now).await;
        }
        ProtocolMessage::LinkStateUpdate(lsu) => {
            lsu::handle_lsu(state, source, packet.router_id, packet.area_id, &lsu, &settings, now).await;
        }
    }
}

/// Reaction to any change of our own link set or neighbor set: schedule a
/// recomputation and tell everyone.
pub(crate) fn propagate_changes(
    state: &RouterState,
    interfaces: &InterfaceTable,
    topology: &mut TopologyDb,
    settings: &ProtocolSettings,
    now: Instant,
) {
    state.recompute.mark_dirty();
    flood_self_advertisement(state, interfaces, topology, settings, now);
}

/// Originates our advertisement and queues it for every neighbor. Nothing
/// happens while LSU broadcasting is switched off.
pub(crate) fn flood_self_advertisement(
    state: &RouterState,
    interfaces: &InterfaceTable,
    topology: &mut TopologyDb,
    settings: &ProtocolSettings,
    now: Instant,
) -> usize {
    if !settings.lsu_broadcast {
        return 0;
    }

    let lsu = topology.originate(now);
    let sequence = lsu.sequence;
    let packet = PwospfPacket::link_state_update(state.router_id, settings.area_id, lsu);
    let queued = flood::queue_flood(state, interfaces, &packet.encode(), None);
    debug!("Flooded own LSU seq {} to {} neighbors", sequence, queued);
    queued
}
