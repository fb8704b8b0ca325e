use std::fmt;
use std::net::Ipv4Addr;

use log::{debug, info};
use serde::Serialize;

use crate::error::{Result, RouterError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum RouteSource {
    Static,   // configured, survives recomputation
    Protocol, // produced by the shortest-path computation
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RouteEntry {
    pub destination: Ipv4Addr,
    pub mask: Ipv4Addr,
    /// `0.0.0.0` when the destination is directly connected.
    pub gateway: Ipv4Addr,
    pub interface: String,
    pub source: RouteSource,
    pub active: bool,
}

impl RouteEntry {
    pub fn new(
        destination: Ipv4Addr,
        mask: Ipv4Addr,
        gateway: Ipv4Addr,
        interface: impl Into<String>,
        source: RouteSource,
    ) -> Self {
        Self {
            destination: Ipv4Addr::from(u32::from(destination) & u32::from(mask)),
            mask,
            gateway,
            interface: interface.into(),
            source,
            active: true,
        }
    }

    pub fn is_static(&self) -> bool {
        self.source == RouteSource::Static
    }

    pub fn prefix_len(&self) -> u32 {
        u32::from(self.mask).count_ones()
    }

    pub fn matches(&self, target: Ipv4Addr) -> bool {
        let mask = u32::from(self.mask);
        u32::from(target) & mask == u32::from(self.destination) & mask
    }
}

impl fmt::Display for RouteEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.destination, self.prefix_len())?;
        if self.gateway.is_unspecified() {
            write!(f, " dev {}", self.interface)?;
        } else {
            write!(f, " via {} dev {}", self.gateway, self.interface)?;
        }
        if self.is_static() {
            write!(f, " static")?;
        }
        Ok(())
    }
}

/// Result of a longest-prefix-match lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NextHop {
    pub ip: Ipv4Addr,
    pub interface: String,
}

/// Forwarding table: static entries merged with the dynamic entries of the
/// last recomputation, kept sorted most specific first.
#[derive(Debug, Clone, Default)]
pub struct RoutingTable {
    routes: Vec<RouteEntry>,
}

impl RoutingTable {
    pub fn new() -> Self {
        Self { routes: Vec::new() }
    }

    pub fn with_static_routes(routes: Vec<RouteEntry>) -> Self {
        let mut table = Self {
            routes: routes
                .into_iter()
                .map(|mut route| {
                    route.source = RouteSource::Static;
                    route
                })
                .collect(),
        };
        table.sort();
        table
    }

    pub fn get_routes(&self) -> &[RouteEntry] {
        &self.routes
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Swaps in a new set of protocol routes; static routes are untouched.
    pub fn replace_dynamic(&mut self, computed: Vec<RouteEntry>) {
        self.routes.retain(RouteEntry::is_static);
        self.routes.extend(computed.into_iter().filter(|r| !r.is_static()));
        self.sort();
        debug!("Routing table now holds {} entries", self.routes.len());
    }

    /// Adds or replaces a static route for the same prefix.
    pub fn add_static(&mut self, mut route: RouteEntry) {
        route.source = RouteSource::Static;
        self.routes
            .retain(|r| !(r.is_static() && r.destination == route.destination && r.mask == route.mask));
        info!("Adding static route {}", route);
        self.routes.push(route);
        self.sort();
    }

    pub fn remove_static(&mut self, destination: Ipv4Addr, mask: Ipv4Addr) -> bool {
        let destination = Ipv4Addr::from(u32::from(destination) & u32::from(mask));
        let before = self.routes.len();
        self.routes
            .retain(|r| !(r.is_static() && r.destination == destination && r.mask == mask));
        self.routes.len() != before
    }

    /// Interface went down: its protocol routes go away and its static routes
    /// are kept but ignored by lookups.
    pub fn deactivate_interface(&mut self, interface: &str) {
        self.routes.retain(|r| r.is_static() || r.interface != interface);
        for route in self.routes.iter_mut().filter(|r| r.interface == interface) {
            route.active = false;
        }
    }

    pub fn activate_interface(&mut self, interface: &str) {
        for route in self.routes.iter_mut().filter(|r| r.interface == interface) {
            route.active = true;
        }
    }

    /// Longest-prefix match over active entries. A directly connected match
    /// yields the destination itself as next hop.
    pub fn lookup(&self, target: Ipv4Addr) -> Result<NextHop> {
        let mut best: Option<&RouteEntry> = None;

        for route in self.routes.iter().filter(|r| r.active && r.matches(target)) {
            if best.is_none_or(|b| route.prefix_len() > b.prefix_len()) {
                best = Some(route);
            }
        }

        let route = best.ok_or(RouterError::NoRoute(target))?;
        let ip = if route.gateway.is_unspecified() {
            target
        } else {
            route.gateway
        };

        Ok(NextHop {
            ip,
            interface: route.interface.clone(),
        })
    }

    /// Longest mask first, then highest prefix, with static routes ahead of
    /// protocol routes for the same prefix.
    fn sort(&mut self) {
        self.routes.sort_by(|a, b| {
            u32::from(b.mask)
                .cmp(&u32::from(a.mask))
                .then_with(|| u32::from(b.destination).cmp(&u32::from(a.destination)))
                .then_with(|| a.source.cmp(&b.source))
        });
    }
}
