use std::collections::{HashMap, HashSet};
use std::net::Ipv4Addr;
use std::time::{Duration, Instant};

use log::{debug, info};
use serde::Serialize;

use crate::RouterId;
use crate::protocol::packet::{Advertisement, INITIAL_LSU_TTL, LsuMessage};

/// Neighbor router id carried by a link nobody has confirmed yet.
pub const UNCONFIRMED: RouterId = Ipv4Addr::UNSPECIFIED;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RouterLink {
    pub subnet: Ipv4Addr,
    pub mask: Ipv4Addr,
    pub router_id: RouterId,
    pub active: bool,
}

impl RouterLink {
    pub fn new(subnet: Ipv4Addr, mask: Ipv4Addr, router_id: RouterId) -> Self {
        Self {
            subnet: Ipv4Addr::from(u32::from(subnet) & u32::from(mask)),
            mask,
            router_id,
            active: false,
        }
    }

    fn key(&self) -> (Ipv4Addr, Ipv4Addr, RouterId) {
        (self.subnet, self.mask, self.router_id)
    }

    fn on(&self, subnet: Ipv4Addr, mask: Ipv4Addr) -> bool {
        self.mask == mask && self.subnet == Ipv4Addr::from(u32::from(subnet) & u32::from(mask))
    }
}

impl From<&Advertisement> for RouterLink {
    fn from(adv: &Advertisement) -> Self {
        RouterLink::new(adv.subnet, adv.mask, adv.router_id)
    }
}

/// A node of the link-state graph.
#[derive(Debug, Clone)]
pub struct Router {
    pub router_id: RouterId,
    pub area_id: u32,
    pub sequence: u16,
    pub last_update: Instant,
    pub distance: u32,
    pub fixed: bool,
    pub parent: Option<RouterId>,
    pub links: Vec<RouterLink>,
}

impl Router {
    fn new(router_id: RouterId, area_id: u32, sequence: u16, now: Instant) -> Self {
        Self {
            router_id,
            area_id,
            sequence,
            last_update: now,
            distance: u32::MAX,
            fixed: false,
            parent: None,
            links: Vec::new(),
        }
    }

    /// Replaces the link list with `incoming`, keeping the order of links
    /// that survive. Returns whether the set of links changed.
    fn reconcile(&mut self, incoming: &[Advertisement]) -> bool {
        let mut wanted: Vec<RouterLink> = Vec::with_capacity(incoming.len());
        for link in incoming.iter().map(RouterLink::from) {
            if !wanted.iter().any(|w| w.key() == link.key()) {
                wanted.push(link);
            }
        }

        let before = self.links.len();
        self.links
            .retain(|link| wanted.iter().any(|w| w.key() == link.key()));
        let mut changed = self.links.len() != before;

        for link in wanted {
            if !self.links.iter().any(|l| l.key() == link.key()) {
                self.links.push(link);
                changed = true;
            }
        }

        changed
    }
}

/// What applying a received LSU did to the database.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LsuOutcome {
    SelfOriginated,
    /// Sequence number not newer than the stored one.
    Stale,
    Learned,
    Updated { changed: bool },
}

impl LsuOutcome {
    /// Whether the packet carried news and should be re-flooded.
    pub fn applied(self) -> bool {
        matches!(self, LsuOutcome::Learned | LsuOutcome::Updated { .. })
    }

    pub fn topology_changed(self) -> bool {
        matches!(
            self,
            LsuOutcome::Learned | LsuOutcome::Updated { changed: true }
        )
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RouterSummary {
    pub router_id: RouterId,
    pub sequence: u16,
    pub distance: Option<u32>,
    pub links: Vec<RouterLink>,
}

#[derive(Debug, Clone)]
pub struct TopologyDb {
    self_id: RouterId,
    area_id: u32,
    routers: HashMap<RouterId, Router>,
}

impl TopologyDb {
    pub fn new(self_id: RouterId, area_id: u32, now: Instant) -> Self {
        let mut routers = HashMap::new();
        let mut local = Router::new(self_id, area_id, 0, now);
        local.distance = 0;
        routers.insert(self_id, local);

        Self {
            self_id,
            area_id,
            routers,
        }
    }

    pub fn self_id(&self) -> RouterId {
        self.self_id
    }

    pub fn set_area(&mut self, area_id: u32) {
        self.area_id = area_id;
        self.self_router_mut().area_id = area_id;
    }

    pub fn router(&self, router_id: RouterId) -> Option<&Router> {
        self.routers.get(&router_id)
    }

    pub fn routers(&self) -> impl Iterator<Item = &Router> {
        self.routers.values()
    }

    pub fn routers_mut(&mut self) -> impl Iterator<Item = &mut Router> {
        self.routers.values_mut()
    }

    pub fn router_mut(&mut self, router_id: RouterId) -> Option<&mut Router> {
        self.routers.get_mut(&router_id)
    }

    pub fn len(&self) -> usize {
        self.routers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routers.is_empty()
    }

    pub fn self_links(&self) -> &[RouterLink] {
        self.routers
            .get(&self.self_id)
            .map_or(&[][..], |router| &router.links)
    }

    pub fn self_last_update(&self) -> Option<Instant> {
        self.routers.get(&self.self_id).map(|r| r.last_update)
    }

    fn self_router_mut(&mut self) -> &mut Router {
        let (id, area) = (self.self_id, self.area_id);
        self.routers.entry(id).or_insert_with(|| {
            let mut local = Router::new(id, area, 0, Instant::now());
            local.distance = 0;
            local
        })
    }

    /// Advertises a locally attached subnet with no confirmed neighbor yet.
    pub fn add_local_link(&mut self, subnet: Ipv4Addr, mask: Ipv4Addr) -> bool {
        let local = self.self_router_mut();
        if local.links.iter().any(|link| link.on(subnet, mask)) {
            return false;
        }
        local.links.push(RouterLink::new(subnet, mask, UNCONFIRMED));
        true
    }

    /// Stops advertising every link on `subnet/mask`.
    pub fn remove_local_links(&mut self, subnet: Ipv4Addr, mask: Ipv4Addr) -> bool {
        let local = self.self_router_mut();
        let before = local.links.len();
        local.links.retain(|link| !link.on(subnet, mask));
        local.links.len() != before
    }

    /// Points a link of ours at a freshly discovered neighbor: the first
    /// unconfirmed link on that subnet is claimed, otherwise a new link is added.
    pub fn confirm_neighbor(&mut self, subnet: Ipv4Addr, mask: Ipv4Addr, router_id: RouterId) -> bool {
        let local = self.self_router_mut();

        if local
            .links
            .iter()
            .any(|link| link.on(subnet, mask) && link.router_id == router_id)
        {
            return false;
        }

        match local
            .links
            .iter_mut()
            .find(|link| link.on(subnet, mask) && link.router_id == UNCONFIRMED)
        {
            Some(link) => link.router_id = router_id,
            None => local.links.push(RouterLink::new(subnet, mask, router_id)),
        }
        true
    }

    /// Undoes `confirm_neighbor` after the neighbor went silent. The last link
    /// on a subnet is kept and blanked so the subnet stays advertised.
    pub fn drop_neighbor(&mut self, subnet: Ipv4Addr, mask: Ipv4Addr, router_id: RouterId) -> bool {
        let local = self.self_router_mut();
        let on_subnet = local.links.iter().filter(|link| link.on(subnet, mask)).count();

        if on_subnet == 1 {
            if let Some(link) = local
                .links
                .iter_mut()
                .find(|link| link.on(subnet, mask) && link.router_id == router_id)
            {
                link.router_id = UNCONFIRMED;
                link.active = false;
                return true;
            }
            return false;
        }

        let before = local.links.len();
        if let Some(pos) = local
            .links
            .iter()
            .position(|link| link.on(subnet, mask) && link.router_id == router_id)
        {
            local.links.remove(pos);
        }
        local.links.len() != before
    }

    /// Applies an LSU originated by `origin`.
    pub fn apply_lsu(&mut self, origin: RouterId, area_id: u32, lsu: &LsuMessage, now: Instant) -> LsuOutcome {
        if origin == self.self_id {
            return LsuOutcome::SelfOriginated;
        }

        match self.routers.get_mut(&origin) {
            Some(router) => {
                if lsu.sequence <= router.sequence {
                    debug!(
                        "Ignoring LSU from {} with sequence {} (have {})",
                        origin, lsu.sequence, router.sequence
                    );
                    return LsuOutcome::Stale;
                }
                router.sequence = lsu.sequence;
                router.last_update = now;
                let changed = router.reconcile(&lsu.advertisements);
                if changed {
                    info!("Router {} advertised a new link set", origin);
                }
                LsuOutcome::Updated { changed }
            }
            None => {
                let mut router = Router::new(origin, area_id, lsu.sequence, now);
                router.reconcile(&lsu.advertisements);
                info!(
                    "Learned router {} with {} links",
                    origin,
                    router.links.len()
                );
                self.routers.insert(origin, router);
                LsuOutcome::Learned
            }
        }
    }

    /// Recomputes every link's `active` flag: a link is usable only when the
    /// router at its far end advertises the same subnet pointing back at us.
    pub fn determine_active_links(&mut self) {
        let advertised: HashSet<(RouterId, Ipv4Addr, Ipv4Addr, RouterId)> = self
            .routers
            .values()
            .flat_map(|router| {
                router
                    .links
                    .iter()
                    .map(move |link| (router.router_id, link.subnet, link.mask, link.router_id))
            })
            .collect();

        for router in self.routers.values_mut() {
            let owner = router.router_id;
            for link in router.links.iter_mut() {
                link.active = link.router_id != UNCONFIRMED
                    && advertised.contains(&(link.router_id, link.subnet, link.mask, owner));
            }
        }
    }

    /// Drops routers not heard from within `max_age`. Our own entry is never aged.
    pub fn expire_routers(&mut self, now: Instant, max_age: Duration) -> Vec<RouterId> {
        let self_id = self.self_id;
        let expired: Vec<RouterId> = self
            .routers
            .values()
            .filter(|r| r.router_id != self_id)
            .filter(|r| now.saturating_duration_since(r.last_update) > max_age)
            .map(|r| r.router_id)
            .collect();

        for id in &expired {
            info!("Router {} timed out", id);
            self.routers.remove(id);
        }
        expired
    }

    /// Builds our own advertisement from the current link set, then bumps the
    /// sequence number and the origination timestamp.
    pub fn originate(&mut self, now: Instant) -> LsuMessage {
        let local = self.self_router_mut();
        let lsu = LsuMessage {
            sequence: local.sequence,
            ttl: INITIAL_LSU_TTL,
            advertisements: local
                .links
                .iter()
                .map(|link| Advertisement {
                    subnet: link.subnet,
                    mask: link.mask,
                    router_id: link.router_id,
                })
                .collect(),
        };
        // After 65535 the counter wraps to 0 and peers discard our updates as
        // stale until their copy of us ages out after 3 x lsu_interval.
        local.sequence = local.sequence.wrapping_add(1);
        local.last_update = now;
        lsu
    }

    pub fn summaries(&self) -> Vec<RouterSummary> {
        let mut out: Vec<RouterSummary> = self
            .routers
            .values()
            .map(|r| RouterSummary {
                router_id: r.router_id,
                sequence: r.sequence,
                distance: (r.distance != u32::MAX).then_some(r.distance),
                links: r.links.clone(),
            })
            .collect();
        out.sort_by_key(|s| u32::from(s.router_id));
        out
    }
}
