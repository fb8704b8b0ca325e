use std::net::Ipv4Addr;
use std::time::{Duration, Instant};

use pnet::util::MacAddr;
use serde::Serialize;

use crate::RouterId;

/// A router seen on one of our links through its Hello messages.
#[derive(Debug, Clone)]
pub struct Neighbor {
    pub ip: Ipv4Addr,
    pub router_id: RouterId,
    pub last_hello: Instant,
}

#[derive(Debug, Clone)]
pub struct Interface {
    pub name: String,
    pub mac: MacAddr,
    pub ip: Ipv4Addr,
    pub mask: Ipv4Addr,
    pub active: bool,
    pub last_hello_sent: Option<Instant>,
    pub neighbors: Vec<Neighbor>,
}

impl Interface {
    pub fn new(name: impl Into<String>, mac: MacAddr, ip: Ipv4Addr, mask: Ipv4Addr) -> Self {
        Self {
            name: name.into(),
            mac,
            ip,
            mask,
            active: true,
            last_hello_sent: None,
            neighbors: Vec::new(),
        }
    }

    pub fn subnet(&self) -> Ipv4Addr {
        Ipv4Addr::from(u32::from(self.ip) & u32::from(self.mask))
    }

    pub fn serves(&self, subnet: Ipv4Addr, mask: Ipv4Addr) -> bool {
        self.mask == mask && self.subnet() == Ipv4Addr::from(u32::from(subnet) & u32::from(mask))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HelloOutcome {
    /// First Hello from this (address, router id) pair on the interface.
    NewNeighbor,
    Refreshed,
}

/// A neighbor removed by the aging sweep, along with the link it lived on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpiredNeighbor {
    pub interface: String,
    pub subnet: Ipv4Addr,
    pub mask: Ipv4Addr,
    pub ip: Ipv4Addr,
    pub router_id: RouterId,
}

/// Where a flooded packet must go.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FloodTarget {
    pub interface: String,
    pub neighbor: Ipv4Addr,
}

#[derive(Debug, Clone, Serialize)]
pub struct InterfaceSummary {
    pub name: String,
    pub mac: String,
    pub ip: Ipv4Addr,
    pub mask: Ipv4Addr,
    pub active: bool,
    pub neighbors: Vec<(Ipv4Addr, RouterId)>,
}

#[derive(Debug, Clone, Default)]
pub struct InterfaceTable {
    interfaces: Vec<Interface>,
}

impl InterfaceTable {
    pub fn new(interfaces: Vec<Interface>) -> Self {
        Self { interfaces }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Interface> {
        self.interfaces.iter()
    }

    pub fn active(&self) -> impl Iterator<Item = &Interface> {
        self.interfaces.iter().filter(|iface| iface.active)
    }

    pub fn active_mut(&mut self) -> impl Iterator<Item = &mut Interface> {
        self.interfaces.iter_mut().filter(|iface| iface.active)
    }

    pub fn get(&self, name: &str) -> Option<&Interface> {
        self.interfaces.iter().find(|iface| iface.name == name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Interface> {
        self.interfaces.iter_mut().find(|iface| iface.name == name)
    }

    pub fn is_active(&self, name: &str) -> bool {
        self.get(name).is_some_and(|iface| iface.active)
    }

    /// Interface owning `ip` as its own address.
    pub fn by_address(&self, ip: Ipv4Addr) -> Option<&Interface> {
        self.active().find(|iface| iface.ip == ip)
    }

    /// Active interface with a neighbor whose router id is `router_id`,
    /// together with that neighbor's address.
    pub fn neighbor_by_router(&self, router_id: RouterId) -> Option<(&Interface, Ipv4Addr)> {
        self.active().find_map(|iface| {
            iface
                .neighbors
                .iter()
                .find(|nbr| nbr.router_id == router_id)
                .map(|nbr| (iface, nbr.ip))
        })
    }

    /// Active interface directly attached to `subnet/mask`.
    pub fn serving(&self, subnet: Ipv4Addr, mask: Ipv4Addr) -> Option<&Interface> {
        self.active().find(|iface| iface.serves(subnet, mask))
    }

    /// Records a Hello from `ip`/`router_id` received on `interface`.
    /// Returns `None` when the interface is unknown or down.
    pub fn record_hello(
        &mut self,
        interface: &str,
        ip: Ipv4Addr,
        router_id: RouterId,
        now: Instant,
    ) -> Option<HelloOutcome> {
        let iface = self.get_mut(interface).filter(|iface| iface.active)?;

        if let Some(nbr) = iface
            .neighbors
            .iter_mut()
            .find(|nbr| nbr.ip == ip && nbr.router_id == router_id)
        {
            nbr.last_hello = now;
            return Some(HelloOutcome::Refreshed);
        }

        iface.neighbors.push(Neighbor {
            ip,
            router_id,
            last_hello: now,
        });
        Some(HelloOutcome::NewNeighbor)
    }

    /// Removes neighbors silent for longer than `dead_interval`.
    pub fn expire_neighbors(&mut self, now: Instant, dead_interval: Duration) -> Vec<ExpiredNeighbor> {
        let mut expired = Vec::new();

        for iface in self.interfaces.iter_mut() {
            let subnet = iface.subnet();
            let mask = iface.mask;
            let name = iface.name.clone();

            iface.neighbors.retain(|nbr| {
                let alive = now.saturating_duration_since(nbr.last_hello) <= dead_interval;
                if !alive {
                    expired.push(ExpiredNeighbor {
                        interface: name.clone(),
                        subnet,
                        mask,
                        ip: nbr.ip,
                        router_id: nbr.router_id,
                    });
                }
                alive
            });
        }

        expired
    }

    /// Every neighbor on an active interface, optionally skipping the one at
    /// `exclude` (the sender of a packet being re-flooded).
    pub fn flood_targets(&self, exclude: Option<Ipv4Addr>) -> Vec<FloodTarget> {
        self.active()
            .flat_map(|iface| {
                iface
                    .neighbors
                    .iter()
                    .filter(move |nbr| Some(nbr.ip) != exclude)
                    .map(move |nbr| FloodTarget {
                        interface: iface.name.clone(),
                        neighbor: nbr.ip,
                    })
            })
            .collect()
    }

    pub fn summaries(&self) -> Vec<InterfaceSummary> {
        self.interfaces
            .iter()
            .map(|iface| InterfaceSummary {
                name: iface.name.clone(),
                mac: iface.mac.to_string(),
                ip: iface.ip,
                mask: iface.mask,
                active: iface.active,
                neighbors: iface.neighbors.iter().map(|n| (n.ip, n.router_id)).collect(),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> InterfaceTable {
        InterfaceTable::new(vec![
            Interface::new(
                "eth0",
                MacAddr::new(0, 0, 0, 0, 0, 1),
                Ipv4Addr::new(10, 0, 0, 1),
                Ipv4Addr::new(255, 255, 255, 252),
            ),
            Interface::new(
                "eth1",
                MacAddr::new(0, 0, 0, 0, 0, 2),
                Ipv4Addr::new(10, 0, 2, 1),
                Ipv4Addr::new(255, 255, 255, 0),
            ),
        ])
    }

    #[test]
    fn test_record_hello_new_then_refresh() {
        let mut table = table();
        let now = Instant::now();
        let peer = Ipv4Addr::new(10, 0, 0, 2);

        assert_eq!(
            table.record_hello("eth0", peer, peer, now),
            Some(HelloOutcome::NewNeighbor)
        );
        assert_eq!(
            table.record_hello("eth0", peer, peer, now + Duration::from_secs(5)),
            Some(HelloOutcome::Refreshed)
        );
        assert_eq!(table.get("eth0").unwrap().neighbors.len(), 1);
        assert_eq!(table.record_hello("eth9", peer, peer, now), None);
    }

    #[test]
    fn test_hello_on_inactive_interface_is_ignored() {
        let mut table = table();
        table.get_mut("eth1").unwrap().active = false;
        let peer = Ipv4Addr::new(10, 0, 2, 7);

        assert_eq!(table.record_hello("eth1", peer, peer, Instant::now()), None);
    }

    #[test]
    fn test_expire_neighbors() {
        let mut table = table();
        let start = Instant::now();
        let old = Ipv4Addr::new(10, 0, 0, 2);
        let fresh = Ipv4Addr::new(10, 0, 2, 9);
        table.record_hello("eth0", old, old, start);
        table.record_hello("eth1", fresh, fresh, start + Duration::from_secs(10));

        let expired = table.expire_neighbors(start + Duration::from_secs(16), Duration::from_secs(15));

        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].interface, "eth0");
        assert_eq!(expired[0].subnet, Ipv4Addr::new(10, 0, 0, 0));
        assert!(table.get("eth0").unwrap().neighbors.is_empty());
        assert_eq!(table.get("eth1").unwrap().neighbors.len(), 1);
    }

    #[test]
    fn test_flood_targets_skip_excluded_neighbor() {
        let mut table = table();
        let now = Instant::now();
        let a = Ipv4Addr::new(10, 0, 0, 2);
        let b = Ipv4Addr::new(10, 0, 2, 2);
        table.record_hello("eth0", a, a, now);
        table.record_hello("eth1", b, b, now);

        let targets = table.flood_targets(Some(a));
        assert_eq!(targets.len(), 1);
        assert_eq!(targets[0].neighbor, b);
        assert_eq!(targets[0].interface, "eth1");
    }

    #[test]
    fn test_neighbor_lookup_by_router_id() {
        let mut table = table();
        let rid = Ipv4Addr::new(2, 2, 2, 2);
        let ip = Ipv4Addr::new(10, 0, 2, 2);
        table.record_hello("eth1", ip, rid, Instant::now());

        let (iface, addr) = table.neighbor_by_router(rid).unwrap();
        assert_eq!(iface.name, "eth1");
        assert_eq!(addr, ip);
        assert!(table.neighbor_by_router(Ipv4Addr::new(9, 9, 9, 9)).is_none());
    }
}
