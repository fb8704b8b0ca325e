pub mod admin;
pub mod algorithms;
pub mod arp;
pub mod config;
pub mod dataplane;
pub mod error;
pub mod network;
pub mod protocol;
pub mod routing_table;

use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use log::{info, warn};
use serde::Serialize;
use tokio::sync::{Mutex, RwLock, mpsc};

use arp::{ArpCache, ArpQueue, ArpRecord};
use config::{ProtocolSettings, RouterConfig};
use dataplane::{DataplaneSync, PacketTransport};
use network::interface::InterfaceSummary;
use network::topology::RouterSummary;
use network::{InterfaceTable, TopologyDb};
use protocol::flood::{FloodPacket, FloodQueue};
use protocol::recompute::RecomputeSignal;
use routing_table::{RouteEntry, RoutingTable};

/// Routers are identified by one of their IPv4 addresses.
pub type RouterId = Ipv4Addr;

/// Everything the control plane knows, one lock per table.
///
/// Locks must be taken in this order: `arp_cache`, `arp_queue`,
/// `interfaces`, `routing_table`, `topology`. `settings` is copied out and
/// released before any other lock is taken.
pub struct RouterState {
    pub router_id: RouterId,
    pub settings: RwLock<ProtocolSettings>,
    pub arp_cache: RwLock<ArpCache>,
    pub arp_queue: Mutex<ArpQueue>,
    pub interfaces: RwLock<InterfaceTable>,
    pub routing_table: RwLock<RoutingTable>,
    pub topology: Mutex<TopologyDb>,
    pub recompute: RecomputeSignal,
    flood_tx: mpsc::UnboundedSender<FloodPacket>,
    transport: Arc<dyn PacketTransport>,
    dataplane: Arc<dyn DataplaneSync>,
}

pub type SharedRouterState = Arc<RouterState>;

/// Point-in-time dump of the router's tables, used by the debug task.
#[derive(Debug, Clone, Serialize)]
pub struct RouterSnapshot {
    pub generated_at: DateTime<Utc>,
    pub router_id: RouterId,
    pub settings: ProtocolSettings,
    pub interfaces: Vec<InterfaceSummary>,
    pub routes: Vec<RouteEntry>,
    pub arp: Vec<ArpRecord>,
    pub routers: Vec<RouterSummary>,
}

impl RouterState {
    /// Builds the shared state from configuration. The returned queue must be
    /// handed to the flood sender.
    pub fn new(
        config: &RouterConfig,
        static_routes: Vec<RouteEntry>,
        transport: Arc<dyn PacketTransport>,
        dataplane: Arc<dyn DataplaneSync>,
        now: Instant,
    ) -> anyhow::Result<(SharedRouterState, FloodQueue)> {
        let router_id = config.router_id()?;
        let settings = config.settings();
        let interfaces = InterfaceTable::new(config.build_interfaces()?);

        let mut topology = TopologyDb::new(router_id, settings.area_id, now);
        for iface in interfaces.active() {
            topology.add_local_link(iface.subnet(), iface.mask);
        }
        if static_routes.iter().any(|r| r.mask.is_unspecified()) {
            topology.add_local_link(Ipv4Addr::UNSPECIFIED, Ipv4Addr::UNSPECIFIED);
        }

        let mut arp_cache = ArpCache::new();
        for (ip, mac) in config.static_arp_entries()? {
            arp_cache.update(ip, mac, true, now);
        }

        let (flood_tx, flood_rx) = mpsc::unbounded_channel();

        info!(
            "Router {} starting with {} interfaces and {} static routes",
            router_id,
            config.interfaces.len(),
            static_routes.len()
        );

        let state = Arc::new(RouterState {
            router_id,
            settings: RwLock::new(settings),
            arp_cache: RwLock::new(arp_cache),
            arp_queue: Mutex::new(ArpQueue::new()),
            interfaces: RwLock::new(interfaces),
            routing_table: RwLock::new(RoutingTable::with_static_routes(static_routes)),
            topology: Mutex::new(topology),
            recompute: RecomputeSignal::new(),
            flood_tx,
            transport,
            dataplane,
        });
        state.recompute.mark_dirty();

        Ok((state, flood_rx))
    }

    pub async fn settings(&self) -> ProtocolSettings {
        *self.settings.read().await
    }

    /// Hands a frame to the transport. Failures are logged and reported as `false`.
    pub fn send_frame(&self, interface: &str, frame: &[u8]) -> bool {
        match self.transport.send(interface, frame) {
            Ok(()) => true,
            Err(e) => {
                warn!("Failed to send frame on {}: {}", interface, e);
                false
            }
        }
    }

    pub(crate) fn queue_flood(&self, packet: FloodPacket) -> bool {
        self.flood_tx.send(packet).is_ok()
    }

    pub fn sync_routes(&self, routes: &[RouteEntry]) {
        if let Err(e) = self.dataplane.push_routes(routes) {
            warn!("Route sync failed: {}", e);
        }
    }

    pub fn sync_arp(&self, records: &[ArpRecord]) {
        if let Err(e) = self.dataplane.push_arp_entries(records) {
            warn!("ARP sync failed: {}", e);
        }
    }

    pub async fn snapshot(&self) -> RouterSnapshot {
        let settings = self.settings().await;
        let arp = self.arp_cache.read().await.records();
        let interfaces = self.interfaces.read().await.summaries();
        let routes = self.routing_table.read().await.get_routes().to_vec();
        let routers = self.topology.lock().await.summaries();

        RouterSnapshot {
            generated_at: Utc::now(),
            router_id: self.router_id,
            settings,
            interfaces,
            routes,
            arp,
            routers,
        }
    }
}
