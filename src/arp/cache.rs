//! IP to MAC cache with TTL expiry.

use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::time::{Duration, Instant};

use log::debug;
use pnet::util::MacAddr;
use serde::Serialize;

#[derive(Debug, Clone)]
pub struct ArpEntry {
    pub mac: MacAddr,
    pub refreshed: Instant,
    pub is_static: bool,
}

/// Flattened entry handed to the dataplane and to status dumps.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArpRecord {
    pub ip: Ipv4Addr,
    pub mac: String,
    pub is_static: bool,
}

#[derive(Debug, Default)]
pub struct ArpCache {
    entries: HashMap<Ipv4Addr, ArpEntry>,
}

impl ArpCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Any stored mapping, fresh or not.
    pub fn lookup(&self, ip: Ipv4Addr) -> Option<MacAddr> {
        self.entries.get(&ip).map(|e| e.mac)
    }

    /// Mapping usable for sending: static, or learned within `ttl`.
    pub fn resolve(&self, ip: Ipv4Addr, now: Instant, ttl: Duration) -> Option<MacAddr> {
        self.entries
            .get(&ip)
            .filter(|e| e.is_static || now.saturating_duration_since(e.refreshed) <= ttl)
            .map(|e| e.mac)
    }

    /// Inserts or refreshes a mapping. A learned mapping never downgrades a
    /// static one.
    pub fn update(&mut self, ip: Ipv4Addr, mac: MacAddr, is_static: bool, now: Instant) {
        if let Some(existing) = self.entries.get(&ip) {
            if existing.is_static && !is_static {
                debug!("Keeping static ARP entry for {}", ip);
                return;
            }
        }

        self.entries.insert(
            ip,
            ArpEntry {
                mac,
                refreshed: now,
                is_static,
            },
        );
    }

    pub fn get(&self, ip: Ipv4Addr) -> Option<&ArpEntry> {
        self.entries.get(&ip)
    }

    pub fn remove(&mut self, ip: Ipv4Addr) -> bool {
        self.entries.remove(&ip).is_some()
    }

    /// Drops learned entries older than `ttl`.
    pub fn expire(&mut self, now: Instant, ttl: Duration) -> Vec<Ipv4Addr> {
        let mut expired = Vec::new();
        self.entries.retain(|ip, entry| {
            let keep = entry.is_static || now.saturating_duration_since(entry.refreshed) <= ttl;
            if !keep {
                expired.push(*ip);
            }
            keep
        });
        expired
    }

    pub fn records(&self) -> Vec<ArpRecord> {
        let mut records: Vec<ArpRecord> = self
            .entries
            .iter()
            .map(|(ip, e)| ArpRecord {
                ip: *ip,
                mac: e.mac.to_string(),
                is_static: e.is_static,
            })
            .collect();
        records.sort_by_key(|r| u32::from(r.ip));
        records
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MAC: MacAddr = MacAddr(0x00, 0x11, 0x22, 0x33, 0x44, 0x55);

    #[test]
    fn test_insert_and_lookup() {
        let mut cache = ArpCache::new();
        let ip = Ipv4Addr::new(192, 168, 1, 1);
        cache.update(ip, MAC, false, Instant::now());

        assert_eq!(cache.lookup(ip), Some(MAC));
        assert_eq!(cache.lookup(Ipv4Addr::new(192, 168, 1, 2)), None);
    }

    #[test]
    fn test_learned_entries_expire() {
        let mut cache = ArpCache::new();
        let start = Instant::now();
        let learned = Ipv4Addr::new(10, 0, 0, 2);
        let pinned = Ipv4Addr::new(10, 0, 0, 3);
        cache.update(learned, MAC, false, start);
        cache.update(pinned, MAC, true, start);

        let ttl = Duration::from_secs(300);
        assert!(cache.expire(start + Duration::from_secs(300), ttl).is_empty());

        let expired = cache.expire(start + Duration::from_secs(301), ttl);
        assert_eq!(expired, vec![learned]);
        assert_eq!(cache.lookup(pinned), Some(MAC));
    }

    #[test]
    fn test_lapsed_entry_is_not_resolved_before_sweep() {
        let mut cache = ArpCache::new();
        let start = Instant::now();
        let learned = Ipv4Addr::new(10, 0, 0, 2);
        let pinned = Ipv4Addr::new(10, 0, 0, 3);
        cache.update(learned, MAC, false, start);
        cache.update(pinned, MAC, true, start);

        let ttl = Duration::from_secs(300);
        assert_eq!(cache.resolve(learned, start + ttl, ttl), Some(MAC));

        let later = start + ttl + Duration::from_millis(1);
        assert_eq!(cache.resolve(learned, later, ttl), None);
        assert_eq!(cache.resolve(pinned, later, ttl), Some(MAC));
        // Still stored until the sweep runs.
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_refresh_resets_ttl() {
        let mut cache = ArpCache::new();
        let start = Instant::now();
        let ip = Ipv4Addr::new(10, 0, 0, 2);
        cache.update(ip, MAC, false, start);
        cache.update(ip, MAC, false, start + Duration::from_secs(200));

        assert!(cache.expire(start + Duration::from_secs(400), Duration::from_secs(300)).is_empty());
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_static_entry_not_overwritten_by_learned() {
        let mut cache = ArpCache::new();
        let ip = Ipv4Addr::new(10, 0, 0, 2);
        let other = MacAddr(0xaa, 0xbb, 0xcc, 0xdd, 0xee, 0xff);
        cache.update(ip, MAC, true, Instant::now());
        cache.update(ip, other, false, Instant::now());

        assert_eq!(cache.lookup(ip), Some(MAC));
    }
}
