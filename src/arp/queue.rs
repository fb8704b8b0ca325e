//! Packets parked while their next hop is being resolved.

use std::collections::{HashMap, VecDeque};
use std::net::Ipv4Addr;
use std::time::{Duration, Instant};

use log::debug;

/// Requests sent for one next hop before giving up.
pub const MAX_ARP_REQUESTS: u8 = 5;
pub const ARP_RETRY_INTERVAL: Duration = Duration::from_secs(1);
/// Frames buffered per next hop while its resolution is pending.
pub const MAX_PENDING_PACKETS: usize = 64;

#[derive(Debug)]
pub struct ArpPending {
    pub next_hop: Ipv4Addr,
    pub interface: String,
    pub attempts: u8,
    pub last_request: Instant,
    /// Ethernet frames waiting for a destination MAC, oldest first.
    pub packets: VecDeque<Vec<u8>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Enqueued {
    /// First miss for this next hop; the caller must send a request.
    RequestNeeded,
    Queued,
    /// The buffer for this next hop is full; the frame was not kept.
    Full,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryRequest {
    pub next_hop: Ipv4Addr,
    pub interface: String,
}

/// Resolution that ran out of attempts, with the packets it was holding.
#[derive(Debug)]
pub struct Exhausted {
    pub next_hop: Ipv4Addr,
    pub interface: String,
    pub packets: Vec<Vec<u8>>,
}

#[derive(Debug, Default)]
pub struct QueueTick {
    pub retries: Vec<RetryRequest>,
    pub exhausted: Vec<Exhausted>,
}

#[derive(Debug, Default)]
pub struct ArpQueue {
    pending: HashMap<Ipv4Addr, ArpPending>,
}

impl ArpQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enqueue(&mut self, next_hop: Ipv4Addr, interface: &str, frame: Vec<u8>, now: Instant) -> Enqueued {
        if let Some(entry) = self.pending.get_mut(&next_hop) {
            if entry.packets.len() >= MAX_PENDING_PACKETS {
                return Enqueued::Full;
            }
            entry.packets.push_back(frame);
            return Enqueued::Queued;
        }

        let mut packets = VecDeque::new();
        packets.push_back(frame);
        self.pending.insert(
            next_hop,
            ArpPending {
                next_hop,
                interface: interface.to_string(),
                attempts: 1,
                last_request: now,
                packets,
            },
        );
        Enqueued::RequestNeeded
    }

    /// Advances every pending resolution: overdue entries are retried until
    /// they have used up their attempts, then dropped.
    pub fn tick(&mut self, now: Instant) -> QueueTick {
        let mut tick = QueueTick::default();

        for entry in self.pending.values_mut() {
            if now.saturating_duration_since(entry.last_request) <= ARP_RETRY_INTERVAL {
                continue;
            }
            if entry.attempts < MAX_ARP_REQUESTS {
                entry.attempts += 1;
                entry.last_request = now;
                tick.retries.push(RetryRequest {
                    next_hop: entry.next_hop,
                    interface: entry.interface.clone(),
                });
            }
        }

        let exhausted: Vec<Ipv4Addr> = self
            .pending
            .values()
            .filter(|e| e.attempts >= MAX_ARP_REQUESTS)
            .filter(|e| now.saturating_duration_since(e.last_request) > ARP_RETRY_INTERVAL)
            .map(|e| e.next_hop)
            .collect();

        for ip in exhausted {
            if let Some(entry) = self.pending.remove(&ip) {
                debug!(
                    "Giving up on {} after {} requests, dropping {} packets",
                    ip,
                    entry.attempts,
                    entry.packets.len()
                );
                tick.exhausted.push(Exhausted {
                    next_hop: entry.next_hop,
                    interface: entry.interface,
                    packets: entry.packets.into(),
                });
            }
        }

        tick
    }

    /// Removes the entry for `ip` now that its MAC is known.
    pub fn resolve(&mut self, ip: Ipv4Addr) -> Option<ArpPending> {
        self.pending.remove(&ip)
    }

    pub fn get(&self, ip: Ipv4Addr) -> Option<&ArpPending> {
        self.pending.get(&ip)
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}
