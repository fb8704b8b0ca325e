//! Turns the shortest-path tree into forwarding entries.

use std::collections::HashMap;
use std::net::Ipv4Addr;

use log::{debug, warn};

use crate::RouterId;
use crate::network::{InterfaceTable, TopologyDb, UNCONFIRMED};
use crate::routing_table::{RouteEntry, RouteSource};

/// Best known way to reach one subnet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteWrapper {
    pub subnet: Ipv4Addr,
    pub mask: Ipv4Addr,
    pub distance: u32,
    /// Router we hand the traffic to; `UNCONFIRMED` for our own stub links.
    pub next_router: RouterId,
    pub directly_connected: bool,
}

/// First router on the path from us to `router_id`. Our own id and our direct
/// neighbors map to themselves.
fn first_hop(topology: &TopologyDb, router_id: RouterId) -> Option<RouterId> {
    let mut current = topology.router(router_id)?;

    loop {
        let Some(parent_id) = current.parent else {
            return Some(current.router_id);
        };
        let parent = topology.router(parent_id)?;
        if parent.distance == 0 {
            return Some(current.router_id);
        }
        current = parent;
    }
}

/// Collects one wrapper per advertised subnet, keeping the one owned by the
/// closest router. Must run after `compute_shortest_paths`.
pub fn collect_route_wrappers(topology: &TopologyDb) -> Vec<RouteWrapper> {
    let self_id = topology.self_id();
    let mut best: HashMap<(Ipv4Addr, Ipv4Addr), RouteWrapper> = HashMap::new();

    let mut routers: Vec<_> = topology
        .routers()
        .filter(|r| r.distance != u32::MAX)
        .collect();
    // Deterministic winner among routers at the same distance.
    routers.sort_by_key(|r| (r.distance, u32::from(r.router_id)));

    for router in routers {
        let directly_connected = router.router_id == self_id;

        for link in &router.links {
            let key = (link.subnet, link.mask);
            if best.get(&key).is_some_and(|w| w.distance <= router.distance) {
                continue;
            }

            let next_router = if router.parent.is_none() {
                link.router_id
            } else {
                match first_hop(topology, router.router_id) {
                    Some(id) => id,
                    None => continue,
                }
            };

            best.insert(
                key,
                RouteWrapper {
                    subnet: link.subnet,
                    mask: link.mask,
                    distance: router.distance,
                    next_router,
                    directly_connected,
                },
            );
        }
    }

    let mut wrappers: Vec<RouteWrapper> = best.into_values().collect();
    wrappers.sort_by_key(|w| (u32::from(w.mask), u32::from(w.subnet)));
    wrappers
}

/// Resolves every wrapper to an outgoing interface and gateway. Wrappers
/// with no usable interface (typically our own default route) are skipped.
pub fn synthesize_routes(topology: &TopologyDb, interfaces: &InterfaceTable) -> Vec<RouteEntry> {
    let mut routes = Vec::new();

    for wrapper in collect_route_wrappers(topology) {
        let via_neighbor = (wrapper.next_router != UNCONFIRMED)
            .then(|| interfaces.neighbor_by_router(wrapper.next_router))
            .flatten();

        let entry = match (via_neighbor, wrapper.directly_connected) {
            (Some((iface, _)), true) => RouteEntry::new(
                wrapper.subnet,
                wrapper.mask,
                Ipv4Addr::UNSPECIFIED,
                &iface.name,
                RouteSource::Protocol,
            ),
            (Some((iface, gateway)), false) => RouteEntry::new(
                wrapper.subnet,
                wrapper.mask,
                gateway,
                &iface.name,
                RouteSource::Protocol,
            ),
            (None, true) => match interfaces.serving(wrapper.subnet, wrapper.mask) {
                Some(iface) => RouteEntry::new(
                    wrapper.subnet,
                    wrapper.mask,
                    Ipv4Addr::UNSPECIFIED,
                    &iface.name,
                    RouteSource::Protocol,
                ),
                None => {
                    debug!(
                        "No interface for local subnet {}/{}",
                        wrapper.subnet, wrapper.mask
                    );
                    continue;
                }
            },
            (None, false) => {
                warn!(
                    "Next hop router {} for {}/{} is not a neighbor",
                    wrapper.next_router, wrapper.subnet, wrapper.mask
                );
                continue;
            }
        };

        routes.push(entry);
    }

    routes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algorithms::compute_shortest_paths;
    use crate::network::Interface;
    use crate::protocol::packet::{Advertisement, LsuMessage};
    use pnet::util::MacAddr;
    use std::time::Instant;

    const A: RouterId = Ipv4Addr::new(1, 1, 1, 1);
    const B: RouterId = Ipv4Addr::new(2, 2, 2, 2);
    const C: RouterId = Ipv4Addr::new(3, 3, 3, 3);
    const P30: Ipv4Addr = Ipv4Addr::new(255, 255, 255, 252);
    const P24: Ipv4Addr = Ipv4Addr::new(255, 255, 255, 0);

    fn adv(subnet: [u8; 4], mask: Ipv4Addr, router_id: RouterId) -> Advertisement {
        Advertisement {
            subnet: subnet.into(),
            mask,
            router_id,
        }
    }

    fn lsu(advertisements: Vec<Advertisement>) -> LsuMessage {
        LsuMessage {
            sequence: 1,
            ttl: 64,
            advertisements,
        }
    }

    /// A - B - C chain: A owns 10.0.1.0/24, A-B on 10.0.0.0/30,
    /// B-C on 10.0.0.4/30, C owns 10.0.3.0/24.
    fn chain() -> (TopologyDb, InterfaceTable) {
        let now = Instant::now();
        let mut db = TopologyDb::new(A, 0, now);
        db.add_local_link([10, 0, 0, 0].into(), P30);
        db.add_local_link([10, 0, 1, 0].into(), P24);
        db.confirm_neighbor([10, 0, 0, 0].into(), P30, B);

        db.apply_lsu(
            B,
            0,
            &lsu(vec![adv([10, 0, 0, 0], P30, A), adv([10, 0, 0, 4], P30, C)]),
            now,
        );
        db.apply_lsu(
            C,
            0,
            &lsu(vec![adv([10, 0, 0, 4], P30, B), adv([10, 0, 3, 0], P24, UNCONFIRMED)]),
            now,
        );
        db.determine_active_links();
        compute_shortest_paths(&mut db);

        let mut interfaces = InterfaceTable::new(vec![
            Interface::new("eth0", MacAddr::new(0, 0, 0, 0, 0, 1), [10, 0, 0, 1].into(), P30),
            Interface::new("eth1", MacAddr::new(0, 0, 0, 0, 0, 2), [10, 0, 1, 1].into(), P24),
        ]);
        interfaces.record_hello("eth0", [10, 0, 0, 2].into(), B, now);

        (db, interfaces)
    }

    fn find<'a>(routes: &'a [RouteEntry], dest: [u8; 4]) -> Option<&'a RouteEntry> {
        routes.iter().find(|r| r.destination == Ipv4Addr::from(dest))
    }

    #[test]
    fn test_wrappers_prefer_closest_owner() {
        let (db, _) = chain();
        let wrappers = collect_route_wrappers(&db);

        let shared = wrappers
            .iter()
            .find(|w| w.subnet == Ipv4Addr::new(10, 0, 0, 0))
            .unwrap();
        assert_eq!(shared.distance, 0);
        assert!(shared.directly_connected);

        let remote = wrappers
            .iter()
            .find(|w| w.subnet == Ipv4Addr::new(10, 0, 3, 0))
            .unwrap();
        assert_eq!(remote.distance, 2);
        assert_eq!(remote.next_router, B);
        assert!(!remote.directly_connected);
    }

    #[test]
    fn test_synthesized_routes() {
        let (db, interfaces) = chain();
        let routes = synthesize_routes(&db, &interfaces);

        assert_eq!(routes.len(), 4);

        let local = find(&routes, [10, 0, 1, 0]).unwrap();
        assert_eq!(local.interface, "eth1");
        assert!(local.gateway.is_unspecified());

        let link = find(&routes, [10, 0, 0, 0]).unwrap();
        assert_eq!(link.interface, "eth0");
        assert!(link.gateway.is_unspecified());

        for dest in [[10, 0, 0, 4], [10, 0, 3, 0]] {
            let route = find(&routes, dest).unwrap();
            assert_eq!(route.interface, "eth0");
            assert_eq!(route.gateway, Ipv4Addr::new(10, 0, 0, 2));
            assert_eq!(route.source, RouteSource::Protocol);
            assert!(route.active);
        }
    }

    #[test]
    fn test_unreachable_router_contributes_nothing() {
        let now = Instant::now();
        let mut db = TopologyDb::new(A, 0, now);
        db.apply_lsu(C, 0, &lsu(vec![adv([10, 0, 3, 0], P24, UNCONFIRMED)]), now);
        db.determine_active_links();
        compute_shortest_paths(&mut db);

        assert!(collect_route_wrappers(&db).is_empty());
    }

    #[test]
    fn test_default_link_without_interface_is_skipped() {
        let now = Instant::now();
        let mut db = TopologyDb::new(A, 0, now);
        db.add_local_link(Ipv4Addr::UNSPECIFIED, Ipv4Addr::UNSPECIFIED);
        db.determine_active_links();
        compute_shortest_paths(&mut db);

        assert_eq!(collect_route_wrappers(&db).len(), 1);
        assert!(synthesize_routes(&db, &InterfaceTable::default()).is_empty());
    }
}
