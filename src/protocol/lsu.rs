use std::net::Ipv4Addr;
use std::time::Instant;

use log::{debug, info};

use super::packet::{LsuMessage, PwospfPacket};
use super::{flood, flood_self_advertisement, propagate_changes};
use crate::config::ProtocolSettings;
use crate::network::LsuOutcome;
use crate::{RouterId, RouterState};

/// Applies an LSU originated by `origin` and received from the neighbor at
/// `source`. News is passed on to every other neighbor while TTL remains.
pub async fn handle_lsu(
    state: &RouterState,
    source: Ipv4Addr,
    origin: RouterId,
    area_id: u32,
    lsu: &LsuMessage,
    settings: &ProtocolSettings,
    now: Instant,
) -> LsuOutcome {
    let interfaces = state.interfaces.read().await;
    let mut topology = state.topology.lock().await;

    let outcome = topology.apply_lsu(origin, area_id, lsu, now);

    if outcome.applied() && lsu.ttl > 1 {
        let forwarded = LsuMessage {
            ttl: lsu.ttl - 1,
            ..lsu.clone()
        };
        let packet = PwospfPacket::link_state_update(origin, area_id, forwarded);
        let queued = flood::queue_flood(state, &interfaces, &packet.encode(), Some(source));
        debug!(
            "Forwarding LSU {} seq {} to {} neighbors",
            origin, lsu.sequence, queued
        );
    }

    if outcome.topology_changed() {
        propagate_changes(state, &interfaces, &mut topology, settings, now);
    }

    outcome
}

/// Floods our advertisement once `lsu_interval` has passed since the last one.
pub async fn originate_if_due(state: &RouterState, now: Instant) -> bool {
    let settings = state.settings().await;
    if !settings.lsu_broadcast {
        return false;
    }

    let interfaces = state.interfaces.read().await;
    let mut topology = state.topology.lock().await;

    let due = topology
        .self_last_update()
        .is_none_or(|last| now.saturating_duration_since(last) > settings.lsu_period());
    if due {
        flood_self_advertisement(state, &interfaces, &mut topology, &settings, now);
    }
    due
}

/// Drops silent neighbors and stale routers. Any removal triggers a single
/// recomputation and a flood of our advertisement.
pub async fn age_neighbors_and_routers(state: &RouterState, now: Instant) -> bool {
    let settings = state.settings().await;

    let mut interfaces = state.interfaces.write().await;
    let expired = interfaces.expire_neighbors(now, settings.neighbor_timeout());

    let mut topology = state.topology.lock().await;
    for nbr in &expired {
        info!(
            "Neighbor {} at {} on {} timed out",
            nbr.router_id, nbr.ip, nbr.interface
        );
        topology.drop_neighbor(nbr.subnet, nbr.mask, nbr.router_id);
    }
    let routers = topology.expire_routers(now, settings.router_timeout());

    let changed = !expired.is_empty() || !routers.is_empty();
    if changed {
        propagate_changes(state, &interfaces, &mut topology, &settings, now);
    }
    changed
}
