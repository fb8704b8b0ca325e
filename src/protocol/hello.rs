use std::net::Ipv4Addr;
use std::time::Instant;

use log::{debug, info, warn};
use pnet::util::MacAddr;

use super::packet::{ALL_SPF_ROUTERS, HelloMessage, PwospfPacket};
use super::propagate_changes;
use crate::config::ProtocolSettings;
use crate::dataplane::frame;
use crate::network::HelloOutcome;
use crate::{RouterId, RouterState};

/// Broadcasts a Hello on every active interface. Returns how many went out.
pub async fn send_hellos(state: &RouterState, now: Instant) -> usize {
    let settings = state.settings().await;

    let frames: Vec<(String, Vec<u8>)> = {
        let mut interfaces = state.interfaces.write().await;
        interfaces
            .active_mut()
            .filter_map(|iface| {
                let packet = PwospfPacket::hello(
                    state.router_id,
                    settings.area_id,
                    iface.mask,
                    settings.hello_interval,
                );
                match frame::ipv4_frame(
                    iface.mac,
                    MacAddr::broadcast(),
                    iface.ip,
                    ALL_SPF_ROUTERS,
                    &packet.encode(),
                ) {
                    Ok(data) => {
                        iface.last_hello_sent = Some(now);
                        Some((iface.name.clone(), data))
                    }
                    Err(e) => {
                        warn!("Cannot build Hello for {}: {}", iface.name, e);
                        None
                    }
                }
            })
            .collect()
    };

    let sent = frames
        .iter()
        .filter(|(interface, data)| state.send_frame(interface, data))
        .count();
    debug!("Sent {} Hellos", sent);
    sent
}

pub async fn handle_hello(
    state: &RouterState,
    interface: &str,
    source: Ipv4Addr,
    router_id: RouterId,
    hello: &HelloMessage,
    settings: &ProtocolSettings,
    now: Instant,
) {
    let mut interfaces = state.interfaces.write().await;
    let Some(iface) = interfaces.get(interface) else {
        return;
    };

    if hello.hello_interval != settings.hello_interval {
        debug!(
            "Hello from {} on {} has interval {} (ours is {})",
            router_id, interface, hello.hello_interval, settings.hello_interval
        );
        return;
    }
    if hello.mask != iface.mask {
        debug!(
            "Hello from {} on {} has mask {} (ours is {})",
            router_id, interface, hello.mask, iface.mask
        );
        return;
    }
    let (subnet, mask) = (iface.subnet(), iface.mask);

    match interfaces.record_hello(interface, source, router_id, now) {
        Some(HelloOutcome::NewNeighbor) => {
            info!("New neighbor {} at {} on {}", router_id, source, interface);
            let mut topology = state.topology.lock().await;
            topology.confirm_neighbor(subnet, mask, router_id);
            propagate_changes(state, &interfaces, &mut topology, settings, now);
        }
        Some(HelloOutcome::Refreshed) => {}
        None => debug!("Hello on inactive interface {}", interface),
    }
}
