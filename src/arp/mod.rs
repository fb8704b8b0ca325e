//! Address resolution: the cache, the pending queue, and the glue that moves
//! frames between them and the transport.

pub mod cache;
pub mod queue;

use std::net::Ipv4Addr;
use std::time::Instant;

use log::{debug, info, warn};
use pnet::packet::arp::ArpOperations;
use pnet::util::MacAddr;

use crate::RouterState;
use crate::dataplane::frame::{self, ArpMessage};
use crate::error::{Result, RouterError};
use crate::network::InterfaceTable;

pub use cache::{ArpCache, ArpEntry, ArpRecord};
pub use queue::{
    ARP_RETRY_INTERVAL, ArpPending, ArpQueue, Enqueued, Exhausted, MAX_ARP_REQUESTS, MAX_PENDING_PACKETS,
};

fn build_request(interfaces: &InterfaceTable, interface: &str, target: Ipv4Addr) -> Result<Vec<u8>> {
    let iface = interfaces
        .get(interface)
        .ok_or_else(|| RouterError::UnknownInterface(interface.to_string()))?;
    frame::arp_frame(ArpOperations::Request, iface.mac, iface.ip, MacAddr::zero(), target)
}

/// Sends an Ethernet frame to `next_hop`, filling in its destination MAC.
/// On a cache miss the frame is parked and a request goes out if none is
/// pending for that address yet. Fails with `ArpQueueFull` when too many
/// frames already wait on that address.
pub async fn send_ip(
    state: &RouterState,
    interface: &str,
    next_hop: Ipv4Addr,
    mut data: Vec<u8>,
    now: Instant,
) -> Result<()> {
    let ttl = state.settings().await.arp_ttl();

    let request = {
        let cache = state.arp_cache.read().await;
        if let Some(mac) = cache.resolve(next_hop, now, ttl) {
            drop(cache);
            frame::set_destination(&mut data, mac);
            state.send_frame(interface, &data);
            return Ok(());
        }

        let mut queue = state.arp_queue.lock().await;
        match queue.enqueue(next_hop, interface, data, now) {
            Enqueued::Queued => None,
            Enqueued::Full => return Err(RouterError::ArpQueueFull(next_hop)),
            Enqueued::RequestNeeded => {
                let interfaces = state.interfaces.read().await;
                Some(build_request(&interfaces, interface, next_hop)?)
            }
        }
    };

    if let Some(request) = request {
        debug!("Resolving {} on {}", next_hop, interface);
        state.send_frame(interface, &request);
    }
    Ok(())
}

/// Handles an ARP packet received on `interface`.
pub async fn handle_arp(state: &RouterState, interface: &str, msg: ArpMessage, now: Instant) -> Result<()> {
    match msg.operation {
        ArpOperations::Request => {
            let reply = {
                let interfaces = state.interfaces.read().await;
                let Some(iface) = interfaces.get(interface).filter(|i| i.active) else {
                    return Ok(());
                };
                if iface.ip != msg.target_ip {
                    return Ok(());
                }
                frame::arp_frame(
                    ArpOperations::Reply,
                    iface.mac,
                    iface.ip,
                    msg.sender_mac,
                    msg.sender_ip,
                )?
            };

            learn(state, msg.sender_ip, msg.sender_mac, now).await;
            state.send_frame(interface, &reply);
        }
        ArpOperations::Reply => {
            learn(state, msg.sender_ip, msg.sender_mac, now).await;
        }
        other => debug!("Ignoring ARP operation {:?} on {}", other, interface),
    }
    Ok(())
}

/// Records a learned `ip -> mac` mapping and releases any frames that were
/// waiting for it, in the order they were queued. Returns how many frames
/// were sent.
pub async fn learn(state: &RouterState, ip: Ipv4Addr, mac: MacAddr, now: Instant) -> usize {
    install(state, ip, mac, false, now).await
}

pub(crate) async fn install(state: &RouterState, ip: Ipv4Addr, mac: MacAddr, is_static: bool, now: Instant) -> usize {
    let (records, mac, pending) = {
        let mut cache = state.arp_cache.write().await;
        cache.update(ip, mac, is_static, now);
        let effective = cache.lookup(ip).unwrap_or(mac);
        let pending = state.arp_queue.lock().await.resolve(ip);
        (cache.records(), effective, pending)
    };

    state.sync_arp(&records);

    let Some(pending) = pending else {
        return 0;
    };
    info!(
        "Resolved {} to {}, flushing {} packets",
        ip,
        mac,
        pending.packets.len()
    );

    let mut sent = 0;
    for mut data in pending.packets {
        frame::set_destination(&mut data, mac);
        if state.send_frame(&pending.interface, &data) {
            sent += 1;
        }
    }
    sent
}

/// Periodic upkeep: expires stale cache entries, retries pending requests
/// and gives up on those out of attempts. The exhausted entries are returned
/// with the packets that could not be delivered.
pub async fn maintain(state: &RouterState, now: Instant) -> Vec<Exhausted> {
    let ttl = state.settings().await.arp_ttl();

    let (records, requests, exhausted) = {
        let mut cache = state.arp_cache.write().await;
        let expired = cache.expire(now, ttl);
        let records = (!expired.is_empty()).then(|| cache.records());
        for ip in &expired {
            debug!("ARP entry for {} expired", ip);
        }

        let tick = state.arp_queue.lock().await.tick(now);

        let interfaces = state.interfaces.read().await;
        let requests: Vec<(String, Vec<u8>)> = tick
            .retries
            .iter()
            .filter_map(|retry| match build_request(&interfaces, &retry.interface, retry.next_hop) {
                Ok(request) => Some((retry.interface.clone(), request)),
                Err(e) => {
                    warn!("Cannot retry ARP for {}: {}", retry.next_hop, e);
                    None
                }
            })
            .collect();

        (records, requests, tick.exhausted)
    };

    if let Some(records) = records {
        state.sync_arp(&records);
    }
    for (interface, request) in &requests {
        state.send_frame(interface, request);
    }
    for entry in &exhausted {
        warn!(
            "No ARP reply from {} on {}, dropping {} packets",
            entry.next_hop,
            entry.interface,
            entry.packets.len()
        );
    }

    exhausted
}
