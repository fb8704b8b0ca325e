//! Outbound LSU delivery. Packets are queued while the topology lock is held
//! and sent later by a task that holds no table lock.

use std::net::Ipv4Addr;
use std::time::Instant;

use log::debug;
use pnet::util::MacAddr;
use tokio::sync::mpsc;

use crate::RouterState;
use crate::arp;
use crate::dataplane::frame;
use crate::error::{Result, RouterError};
use crate::network::InterfaceTable;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FloodPacket {
    pub interface: String,
    pub destination: Ipv4Addr,
    /// Encoded PWOSPF packet.
    pub payload: Vec<u8>,
}

pub type FloodQueue = mpsc::UnboundedReceiver<FloodPacket>;

/// Queues `payload` for every neighbor except the one at `exclude`.
pub fn queue_flood(
    state: &RouterState,
    interfaces: &InterfaceTable,
    payload: &[u8],
    exclude: Option<Ipv4Addr>,
) -> usize {
    let mut queued = 0;
    for target in interfaces.flood_targets(exclude) {
        let packet = FloodPacket {
            interface: target.interface,
            destination: target.neighbor,
            payload: payload.to_vec(),
        };
        if state.queue_flood(packet) {
            queued += 1;
        }
    }
    queued
}

/// Routes, frames and transmits one queued packet.
pub async fn dispatch(state: &RouterState, packet: FloodPacket, now: Instant) -> Result<()> {
    let (interface, next_hop) = match state.routing_table.read().await.lookup(packet.destination) {
        Ok(hop) => (hop.interface, hop.ip),
        // Neighbors are on-link even before the first recomputation.
        Err(_) => (packet.interface.clone(), packet.destination),
    };

    let (mac, source) = {
        let interfaces = state.interfaces.read().await;
        let iface = interfaces
            .get(&interface)
            .filter(|i| i.active)
            .ok_or_else(|| RouterError::UnknownInterface(interface.clone()))?;
        (iface.mac, iface.ip)
    };

    let data = frame::ipv4_frame(mac, MacAddr::zero(), source, packet.destination, &packet.payload)?;
    arp::send_ip(state, &interface, next_hop, data, now).await
}

/// Sends everything currently queued. Returns how many packets were handled.
pub async fn drain(state: &RouterState, queue: &mut FloodQueue, now: Instant) -> usize {
    let mut handled = 0;
    while let Ok(packet) = queue.try_recv() {
        let destination = packet.destination;
        if let Err(e) = dispatch(state, packet, now).await {
            debug!("Dropping flood to {}: {}", destination, e);
        }
        handled += 1;
    }
    handled
}
