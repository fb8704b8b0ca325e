use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};

use crate::RouterId;
use crate::network::{TopologyDb, UNCONFIRMED};

#[derive(Debug, PartialEq, Eq)]
struct State {
    cost: u32,
    router: RouterId,
}

impl Ord for State {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reverse ordering for min-heap
        other
            .cost
            .cmp(&self.cost)
            .then_with(|| u32::from(other.router).cmp(&u32::from(self.router)))
    }
}

impl PartialOrd for State {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Runs Dijkstra from our own router over active links, every hop costing 1.
/// Results are written into each router's `distance`, `parent` and `fixed`
/// fields; unreachable routers keep `u32::MAX`. Returns how many routers
/// were reached, self included.
pub fn compute_shortest_paths(topology: &mut TopologyDb) -> usize {
    let source = topology.self_id();

    // Edges only lead to routers we hold an advertisement for.
    let edges: HashMap<RouterId, Vec<RouterId>> = topology
        .routers()
        .map(|router| {
            let next: Vec<RouterId> = router
                .links
                .iter()
                .filter(|link| link.active && link.router_id != UNCONFIRMED)
                .map(|link| link.router_id)
                .filter(|id| topology.router(*id).is_some())
                .collect();
            (router.router_id, next)
        })
        .collect();

    for router in topology.routers_mut() {
        router.distance = u32::MAX;
        router.fixed = false;
        router.parent = None;
    }

    let Some(local) = topology.router_mut(source) else {
        return 0;
    };
    local.distance = 0;

    let mut heap = BinaryHeap::new();
    heap.push(State { cost: 0, router: source });
    let mut reached = 0;

    while let Some(State { cost, router }) = heap.pop() {
        let Some(node) = topology.router_mut(router) else {
            continue;
        };
        // Skip if we've already found a better path
        if node.fixed || cost > node.distance {
            continue;
        }
        node.fixed = true;
        reached += 1;

        for &neighbor in edges.get(&router).into_iter().flatten() {
            let Some(next) = topology.router_mut(neighbor) else {
                continue;
            };
            if !next.fixed && cost + 1 < next.distance {
                next.distance = cost + 1;
                next.parent = Some(router);
                heap.push(State {
                    cost: cost + 1,
                    router: neighbor,
                });
            }
        }
    }

    reached
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::packet::{Advertisement, LsuMessage};
    use std::collections::VecDeque;
    use std::net::Ipv4Addr;
    use std::time::Instant;

    fn rid(n: u8) -> RouterId {
        Ipv4Addr::new(n, n, n, n)
    }

    fn p2p(a: u8, b: u8) -> (Ipv4Addr, Ipv4Addr) {
        let (lo, hi) = if a < b { (a, b) } else { (b, a) };
        (Ipv4Addr::new(10, lo, hi, 0), Ipv4Addr::new(255, 255, 255, 252))
    }

    /// Builds a topology where router 1 is self and every listed pair is a
    /// mutually confirmed point-to-point link.
    fn build(routers: u8, edges: &[(u8, u8)]) -> TopologyDb {
        let now = Instant::now();
        let mut db = TopologyDb::new(rid(1), 0, now);

        for n in 1..=routers {
            let adverts: Vec<Advertisement> = edges
                .iter()
                .filter_map(|&(a, b)| {
                    let peer = if a == n { b } else if b == n { a } else { return None };
                    let (subnet, mask) = p2p(a, b);
                    Some(Advertisement {
                        subnet,
                        mask,
                        router_id: rid(peer),
                    })
                })
                .collect();

            if n == 1 {
                for adv in &adverts {
                    db.confirm_neighbor(adv.subnet, adv.mask, adv.router_id);
                }
            } else {
                db.apply_lsu(
                    rid(n),
                    0,
                    &LsuMessage {
                        sequence: 1,
                        ttl: 64,
                        advertisements: adverts,
                    },
                    now,
                );
            }
        }

        db.determine_active_links();
        db
    }

    fn bfs(routers: u8, edges: &[(u8, u8)]) -> HashMap<u8, u32> {
        let mut dist = HashMap::new();
        let mut queue = VecDeque::new();
        dist.insert(1u8, 0u32);
        queue.push_back(1u8);

        while let Some(n) = queue.pop_front() {
            let d = dist[&n];
            for &(a, b) in edges {
                let peer = if a == n { b } else if b == n { a } else { continue };
                if peer <= routers && !dist.contains_key(&peer) {
                    dist.insert(peer, d + 1);
                    queue.push_back(peer);
                }
            }
        }
        dist
    }

    fn check_against_bfs(routers: u8, edges: &[(u8, u8)]) {
        let mut db = build(routers, edges);
        compute_shortest_paths(&mut db);
        let expected = bfs(routers, edges);

        for n in 1..=routers {
            let router = db.router(rid(n)).unwrap();
            match expected.get(&n) {
                Some(&d) => assert_eq!(router.distance, d, "router {}", n),
                None => assert_eq!(router.distance, u32::MAX, "router {}", n),
            }
        }
    }

    #[test]
    fn test_chain() {
        check_against_bfs(4, &[(1, 2), (2, 3), (3, 4)]);
    }

    #[test]
    fn test_ring_with_chord() {
        check_against_bfs(6, &[(1, 2), (2, 3), (3, 4), (4, 5), (5, 6), (6, 1), (2, 5)]);
    }

    #[test]
    fn test_mesh() {
        check_against_bfs(
            7,
            &[(1, 2), (1, 3), (2, 4), (3, 4), (4, 5), (5, 6), (3, 6), (6, 7), (2, 7)],
        );
    }

    #[test]
    fn test_disconnected_router_stays_unreachable() {
        check_against_bfs(4, &[(1, 2), (3, 4)]);
    }

    #[test]
    fn test_parent_pointers_lead_home() {
        let mut db = build(4, &[(1, 2), (2, 3), (3, 4)]);
        assert_eq!(compute_shortest_paths(&mut db), 4);

        assert_eq!(db.router(rid(4)).unwrap().parent, Some(rid(3)));
        assert_eq!(db.router(rid(2)).unwrap().parent, Some(rid(1)));
        assert_eq!(db.router(rid(1)).unwrap().parent, None);
    }

    #[test]
    fn test_one_sided_link_is_not_an_edge() {
        let now = Instant::now();
        let mut db = TopologyDb::new(rid(1), 0, now);
        let (subnet, mask) = p2p(1, 2);
        db.confirm_neighbor(subnet, mask, rid(2));
        db.apply_lsu(
            rid(2),
            0,
            &LsuMessage {
                sequence: 1,
                ttl: 64,
                advertisements: vec![Advertisement {
                    subnet,
                    mask,
                    router_id: UNCONFIRMED,
                }],
            },
            now,
        );
        db.determine_active_links();

        assert_eq!(compute_shortest_paths(&mut db), 1);
        assert_eq!(db.router(rid(2)).unwrap().distance, u32::MAX);
    }
}
