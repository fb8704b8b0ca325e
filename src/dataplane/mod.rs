//! Seams to the outside world: frame I/O on named interfaces and the
//! forwarding fast path that mirrors our tables.

pub mod frame;
pub mod loopback;
pub mod pnet_transport;

use log::{debug, info};

use crate::arp::ArpRecord;
use crate::error::Result;
use crate::routing_table::RouteEntry;

pub use loopback::{RecordingTransport, SentFrame};
pub use pnet_transport::ChannelTransport;

/// Raw frame delivered by a transport.
#[derive(Debug, Clone)]
pub struct ReceivedFrame {
    pub interface: String,
    pub data: Vec<u8>,
}

pub trait PacketTransport: Send + Sync {
    fn send(&self, interface: &str, frame: &[u8]) -> Result<()>;
}

/// Receives a full copy of a table every time it changes.
pub trait DataplaneSync: Send + Sync {
    fn push_routes(&self, routes: &[RouteEntry]) -> Result<()>;
    fn push_arp_entries(&self, entries: &[ArpRecord]) -> Result<()>;
}

/// Dataplane used when no forwarding hardware is attached.
#[derive(Debug, Default)]
pub struct LoggingDataplane;

impl DataplaneSync for LoggingDataplane {
    fn push_routes(&self, routes: &[RouteEntry]) -> Result<()> {
        info!("Dataplane: installing {} routes", routes.len());
        for route in routes {
            debug!("  {}", route);
        }
        Ok(())
    }

    fn push_arp_entries(&self, entries: &[ArpRecord]) -> Result<()> {
        info!("Dataplane: installing {} ARP entries", entries.len());
        for entry in entries {
            debug!("  {} -> {}{}", entry.ip, entry.mac, if entry.is_static { " (static)" } else { "" });
        }
        Ok(())
    }
}
