#![allow(dead_code)]

use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Instant;

use pnet::util::MacAddr;

use pwospf_router::config::RouterConfig;
use pwospf_router::dataplane::frame;
use pwospf_router::dataplane::{LoggingDataplane, RecordingTransport, SentFrame};
use pwospf_router::protocol::flood::{self, FloodQueue};
use pwospf_router::protocol::handle_frame;
use pwospf_router::protocol::packet::{ALL_SPF_ROUTERS, PwospfPacket};
use pwospf_router::{RouterState, SharedRouterState};

pub const PEER_MAC: MacAddr = MacAddr(0x02, 0, 0, 0, 0, 0xfe);

pub struct Node {
    pub state: SharedRouterState,
    pub transport: Arc<RecordingTransport>,
    pub queue: FloodQueue,
}

/// Builds a router from `(name, mac, address)` triples.
pub fn node(interfaces: &[(&str, &str, &str)], now: Instant) -> Node {
    let interfaces: Vec<String> = interfaces
        .iter()
        .map(|(name, mac, address)| {
            format!(
                r#"{{ "name": "{}", "mac": "{}", "address": "{}" }}"#,
                name, mac, address
            )
        })
        .collect();
    let json = format!(r#"{{ "interfaces": [{}] }}"#, interfaces.join(","));
    let config: RouterConfig = serde_json::from_str(&json).unwrap();

    let transport = Arc::new(RecordingTransport::new());
    let (state, queue) = RouterState::new(
        &config,
        vec![],
        transport.clone(),
        Arc::new(LoggingDataplane),
        now,
    )
    .unwrap();

    Node {
        state,
        transport,
        queue,
    }
}

/// Delivers the frames `from` sent on `from_iface` to `to` on `to_iface`.
/// Frames on other interfaces are dropped. Returns how many were delivered.
pub async fn relay(frames: Vec<SentFrame>, from_iface: &str, to: &Node, to_iface: &str, now: Instant) -> usize {
    let mut delivered = 0;
    for sent in frames.into_iter().filter(|f| f.interface == from_iface) {
        handle_frame(&to.state, to_iface, &sent.data, now).await;
        delivered += 1;
    }
    delivered
}

/// Exchanges traffic between two routers wired `a.eth0 <-> b.eth0` until
/// both go quiet.
pub async fn converge(a: &mut Node, b: &mut Node, now: Instant) {
    for _ in 0..32 {
        flood::drain(&a.state, &mut a.queue, now).await;
        flood::drain(&b.state, &mut b.queue, now).await;

        let from_a = a.transport.take();
        let from_b = b.transport.take();
        if from_a.is_empty() && from_b.is_empty() {
            return;
        }

        relay(from_a, "eth0", b, "eth0", now).await;
        relay(from_b, "eth0", a, "eth0", now).await;
    }
    panic!("routers did not converge");
}

/// A PWOSPF packet as a neighbor at `src_ip` would put it on the wire.
pub fn pwospf_frame(src_ip: Ipv4Addr, packet: &PwospfPacket) -> Vec<u8> {
    frame::ipv4_frame(
        PEER_MAC,
        MacAddr::broadcast(),
        src_ip,
        ALL_SPF_ROUTERS,
        &packet.encode(),
    )
    .unwrap()
}

pub fn hello_from(router_id: Ipv4Addr, src_ip: Ipv4Addr, mask: Ipv4Addr) -> Vec<u8> {
    pwospf_frame(src_ip, &PwospfPacket::hello(router_id, 0, mask, 5))
}
