use std::fs;
use std::net::Ipv4Addr;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};
use ipnet::Ipv4Net;
use pnet::util::MacAddr;
use serde::{Deserialize, Serialize};

use crate::RouterId;
use crate::network::Interface;
use crate::routing_table::{RouteEntry, RouteSource};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RouterConfig {
    pub interfaces: Vec<InterfaceConfig>,
    pub area_id: u32,
    pub hello_interval: u16, // seconds
    pub lsu_interval: u16,   // seconds
    pub arp_ttl: u64,        // seconds
    pub lsu_broadcast: bool,
    pub static_arp: Vec<StaticArpConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InterfaceConfig {
    pub name: String,
    pub mac: String,
    /// Address and prefix, e.g. `10.0.0.1/30`.
    pub address: String,
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StaticArpConfig {
    pub ip: Ipv4Addr,
    pub mac: String,
}

fn enabled_by_default() -> bool {
    true
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            interfaces: vec![],
            area_id: 0,
            hello_interval: 5,
            lsu_interval: 30,
            arp_ttl: 300,
            lsu_broadcast: true,
            static_arp: vec![],
        }
    }
}

/// Protocol knobs that can change while the router runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ProtocolSettings {
    pub area_id: u32,
    pub hello_interval: u16,
    pub lsu_interval: u16,
    pub arp_ttl: u64,
    pub lsu_broadcast: bool,
}

impl Default for ProtocolSettings {
    fn default() -> Self {
        RouterConfig::default().settings()
    }
}

impl ProtocolSettings {
    /// Silence after which a neighbor is declared dead.
    pub fn neighbor_timeout(&self) -> Duration {
        Duration::from_secs(3 * self.hello_interval as u64)
    }

    /// Age after which a remote router's advertisement is discarded.
    pub fn router_timeout(&self) -> Duration {
        Duration::from_secs(3 * self.lsu_interval as u64)
    }

    /// Hellos go out a second ahead of the advertised interval.
    pub fn hello_period(&self) -> Duration {
        Duration::from_secs(self.hello_interval.saturating_sub(1).max(1) as u64)
    }

    pub fn lsu_period(&self) -> Duration {
        Duration::from_secs(self.lsu_interval as u64)
    }

    pub fn arp_ttl(&self) -> Duration {
        Duration::from_secs(self.arp_ttl)
    }
}

impl RouterConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let config: RouterConfig = serde_json::from_str(&content)
            .with_context(|| format!("parsing config {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.interfaces.is_empty() {
            bail!("no interfaces configured");
        }
        if self.hello_interval == 0 || self.lsu_interval == 0 {
            bail!("hello and LSU intervals must be positive");
        }
        for iface in &self.interfaces {
            iface.network()?;
            iface.mac_addr()?;
        }
        Ok(())
    }

    pub fn settings(&self) -> ProtocolSettings {
        ProtocolSettings {
            area_id: self.area_id,
            hello_interval: self.hello_interval,
            lsu_interval: self.lsu_interval,
            arp_ttl: self.arp_ttl,
            lsu_broadcast: self.lsu_broadcast,
        }
    }

    pub fn get_enabled_interfaces(&self) -> Vec<&InterfaceConfig> {
        self.interfaces.iter().filter(|i| i.enabled).collect()
    }

    pub fn get_interface_by_name(&self, name: &str) -> Option<&InterfaceConfig> {
        self.interfaces.iter().find(|i| i.name == name)
    }

    /// The address of `eth0`, or of the first interface when there is no `eth0`.
    pub fn router_id(&self) -> Result<RouterId> {
        let iface = self
            .get_interface_by_name("eth0")
            .or_else(|| self.interfaces.first())
            .ok_or_else(|| anyhow!("cannot pick a router id without interfaces"))?;
        Ok(iface.network()?.addr())
    }

    pub fn build_interfaces(&self) -> Result<Vec<Interface>> {
        self.interfaces
            .iter()
            .map(|cfg| {
                let net = cfg.network()?;
                let mut iface = Interface::new(&cfg.name, cfg.mac_addr()?, net.addr(), net.netmask());
                iface.active = cfg.enabled;
                Ok(iface)
            })
            .collect()
    }

    pub fn static_arp_entries(&self) -> Result<Vec<(Ipv4Addr, MacAddr)>> {
        self.static_arp
            .iter()
            .map(|entry| Ok((entry.ip, parse_mac(&entry.mac)?)))
            .collect()
    }
}

impl InterfaceConfig {
    pub fn network(&self) -> Result<Ipv4Net> {
        self.address
            .parse::<Ipv4Net>()
            .with_context(|| format!("interface {}: bad address {:?}", self.name, self.address))
    }

    pub fn mac_addr(&self) -> Result<MacAddr> {
        parse_mac(&self.mac).with_context(|| format!("interface {}", self.name))
    }
}

fn parse_mac(text: &str) -> Result<MacAddr> {
    text.parse::<MacAddr>()
        .map_err(|e| anyhow!("bad MAC address {:?}: {:?}", text, e))
}

/// Parses a static routing table: one `destination gateway mask interface`
/// route per line. Blank lines and `#` comments are skipped.
pub fn parse_static_routes(text: &str) -> Result<Vec<RouteEntry>> {
    let mut routes = Vec::new();

    for (number, line) in text.lines().enumerate() {
        let line = line.split('#').next().unwrap_or("").trim();
        if line.is_empty() {
            continue;
        }

        let fields: Vec<&str> = line.split_whitespace().collect();
        let [dest, gateway, mask, iface] = fields.as_slice() else {
            bail!("line {}: expected `dest gateway mask interface`", number + 1);
        };

        let parse = |field: &str| -> Result<Ipv4Addr> {
            field
                .parse()
                .with_context(|| format!("line {}: bad address {:?}", number + 1, field))
        };

        routes.push(RouteEntry::new(
            parse(dest)?,
            parse(mask)?,
            parse(gateway)?,
            *iface,
            RouteSource::Static,
        ));
    }

    Ok(routes)
}

pub fn load_static_routes(path: impl AsRef<Path>) -> Result<Vec<RouteEntry>> {
    let path = path.as_ref();
    let content = fs::read_to_string(path)
        .with_context(|| format!("reading routes {}", path.display()))?;
    parse_static_routes(&content)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> RouterConfig {
        serde_json::from_str(
            r#"{
                "interfaces": [
                    { "name": "eth1", "mac": "00:00:00:00:00:02", "address": "10.0.1.1/24" },
                    { "name": "eth0", "mac": "00:00:00:00:00:01", "address": "10.0.0.1/30" }
                ],
                "hello_interval": 10
            }"#,
        )
        .unwrap()
    }

    #[test]
    fn test_defaults_fill_missing_fields() {
        let config = sample();
        assert_eq!(config.hello_interval, 10);
        assert_eq!(config.lsu_interval, 30);
        assert_eq!(config.arp_ttl, 300);
        assert!(config.lsu_broadcast);
        assert!(config.interfaces.iter().all(|i| i.enabled));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_router_id_prefers_eth0() {
        assert_eq!(sample().router_id().unwrap(), Ipv4Addr::new(10, 0, 0, 1));

        let mut config = sample();
        config.interfaces.retain(|i| i.name != "eth0");
        assert_eq!(config.router_id().unwrap(), Ipv4Addr::new(10, 0, 1, 1));
    }

    #[test]
    fn test_build_interfaces() {
        let interfaces = sample().build_interfaces().unwrap();
        assert_eq!(interfaces[1].name, "eth0");
        assert_eq!(interfaces[1].mask, Ipv4Addr::new(255, 255, 255, 252));
        assert_eq!(interfaces[1].subnet(), Ipv4Addr::new(10, 0, 0, 0));
    }

    #[test]
    fn test_settings_timeouts() {
        let settings = sample().settings();
        assert_eq!(settings.neighbor_timeout(), Duration::from_secs(30));
        assert_eq!(settings.router_timeout(), Duration::from_secs(90));
        assert_eq!(settings.hello_period(), Duration::from_secs(9));
    }

    #[test]
    fn test_bad_mac_is_rejected() {
        let mut config = sample();
        config.interfaces[0].mac = "zz:00".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_parse_static_routes() {
        let text = "\
            # default route\n\
            0.0.0.0 192.168.0.254 0.0.0.0 eth0\n\
            \n\
            10.5.0.0 0.0.0.0 255.255.0.0 eth1   # local\n";
        let routes = parse_static_routes(text).unwrap();

        assert_eq!(routes.len(), 2);
        assert_eq!(routes[0].gateway, Ipv4Addr::new(192, 168, 0, 254));
        assert_eq!(routes[0].mask, Ipv4Addr::UNSPECIFIED);
        assert_eq!(routes[1].interface, "eth1");
        assert!(routes.iter().all(RouteEntry::is_static));
    }

    #[test]
    fn test_parse_static_routes_reports_line() {
        let err = parse_static_routes("10.0.0.0 0.0.0.0 eth0\n").unwrap_err();
        assert!(err.to_string().contains("line 1"));
    }
}
