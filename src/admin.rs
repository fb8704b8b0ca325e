//! Runtime administration of a running router.

use std::net::Ipv4Addr;
use std::time::Instant;

use log::info;
use pnet::util::MacAddr;

use crate::RouterState;
use crate::arp;
use crate::error::{Result, RouterError};
use crate::protocol::{flood_self_advertisement, hello, propagate_changes};
use crate::routing_table::RouteEntry;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdminCommand {
    InterfaceUp(String),
    InterfaceDown(String),
    SetLsuBroadcast(bool),
    SetHelloInterval(u16),
    SetLsuInterval(u16),
    SetAreaId(u32),
    AddStaticRoute(RouteEntry),
    DeleteStaticRoute { destination: Ipv4Addr, mask: Ipv4Addr },
    AddStaticArp { ip: Ipv4Addr, mac: MacAddr },
    DeleteStaticArp(Ipv4Addr),
    SendHello,
    SendLsu,
}

pub async fn apply(state: &RouterState, command: AdminCommand, now: Instant) -> Result<()> {
    info!("Admin: {:?}", command);

    match command {
        AdminCommand::InterfaceUp(name) => set_interface(state, &name, true, now).await,
        AdminCommand::InterfaceDown(name) => set_interface(state, &name, false, now).await,
        AdminCommand::SetLsuBroadcast(enabled) => {
            state.settings.write().await.lsu_broadcast = enabled;
            Ok(())
        }
        AdminCommand::SetHelloInterval(seconds) => {
            if seconds == 0 {
                return Err(RouterError::Config("hello interval must be positive".into()));
            }
            state.settings.write().await.hello_interval = seconds;
            Ok(())
        }
        AdminCommand::SetLsuInterval(seconds) => {
            if seconds == 0 {
                return Err(RouterError::Config("LSU interval must be positive".into()));
            }
            state.settings.write().await.lsu_interval = seconds;
            Ok(())
        }
        AdminCommand::SetAreaId(area_id) => {
            state.settings.write().await.area_id = area_id;
            state.topology.lock().await.set_area(area_id);
            Ok(())
        }
        AdminCommand::AddStaticRoute(route) => add_static_route(state, route, now).await,
        AdminCommand::DeleteStaticRoute { destination, mask } => {
            delete_static_route(state, destination, mask, now).await
        }
        AdminCommand::AddStaticArp { ip, mac } => {
            arp::install(state, ip, mac, true, now).await;
            Ok(())
        }
        AdminCommand::DeleteStaticArp(ip) => {
            let records = {
                let mut cache = state.arp_cache.write().await;
                if !cache.get(ip).is_some_and(|entry| entry.is_static) {
                    return Err(RouterError::Config(format!("no static ARP entry for {}", ip)));
                }
                cache.remove(ip);
                cache.records()
            };
            state.sync_arp(&records);
            Ok(())
        }
        AdminCommand::SendHello => {
            hello::send_hellos(state, now).await;
            Ok(())
        }
        AdminCommand::SendLsu => {
            let settings = state.settings().await;
            let interfaces = state.interfaces.read().await;
            let mut topology = state.topology.lock().await;
            flood_self_advertisement(state, &interfaces, &mut topology, &settings, now);
            Ok(())
        }
    }
}

/// Brings an interface up or down. Either way its neighbors are forgotten;
/// going down also withdraws its links and routes.
async fn set_interface(state: &RouterState, name: &str, up: bool, now: Instant) -> Result<()> {
    let settings = state.settings().await;

    let routes = {
        let mut interfaces = state.interfaces.write().await;
        let iface = interfaces
            .get_mut(name)
            .ok_or_else(|| RouterError::UnknownInterface(name.to_string()))?;
        if iface.active == up {
            return Ok(());
        }
        iface.active = up;
        iface.neighbors.clear();
        let (subnet, mask) = (iface.subnet(), iface.mask);

        let mut table = state.routing_table.write().await;
        let mut topology = state.topology.lock().await;
        if up {
            table.activate_interface(name);
            topology.add_local_link(subnet, mask);
        } else {
            table.deactivate_interface(name);
            topology.remove_local_links(subnet, mask);
        }

        propagate_changes(state, &interfaces, &mut topology, &settings, now);
        table.get_routes().to_vec()
    };

    info!("Interface {} is now {}", name, if up { "up" } else { "down" });
    state.sync_routes(&routes);
    Ok(())
}

async fn add_static_route(state: &RouterState, route: RouteEntry, now: Instant) -> Result<()> {
    let settings = state.settings().await;

    let routes = {
        let interfaces = state.interfaces.read().await;
        if interfaces.get(&route.interface).is_none() {
            return Err(RouterError::UnknownInterface(route.interface));
        }
        let is_default = route.mask.is_unspecified();

        let mut table = state.routing_table.write().await;
        table.add_static(route);

        if is_default {
            let mut topology = state.topology.lock().await;
            if topology.add_local_link(Ipv4Addr::UNSPECIFIED, Ipv4Addr::UNSPECIFIED) {
                propagate_changes(state, &interfaces, &mut topology, &settings, now);
            }
        }
        table.get_routes().to_vec()
    };

    state.sync_routes(&routes);
    Ok(())
}

async fn delete_static_route(state: &RouterState, destination: Ipv4Addr, mask: Ipv4Addr, now: Instant) -> Result<()> {
    let settings = state.settings().await;

    let routes = {
        let interfaces = state.interfaces.read().await;
        let mut table = state.routing_table.write().await;
        if !table.remove_static(destination, mask) {
            return Err(RouterError::NoRoute(destination));
        }

        let default_left = table
            .get_routes()
            .iter()
            .any(|r| r.is_static() && r.mask.is_unspecified());
        if mask.is_unspecified() && !default_left {
            let mut topology = state.topology.lock().await;
            if topology.remove_local_links(Ipv4Addr::UNSPECIFIED, Ipv4Addr::UNSPECIFIED) {
                propagate_changes(state, &interfaces, &mut topology, &settings, now);
            }
        }
        table.get_routes().to_vec()
    };

    state.sync_routes(&routes);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RouterConfig;
    use crate::dataplane::{LoggingDataplane, RecordingTransport};
    use crate::routing_table::RouteSource;
    use crate::SharedRouterState;
    use std::sync::Arc;

    fn router() -> SharedRouterState {
        let config: RouterConfig = serde_json::from_str(
            r#"{ "interfaces": [
                { "name": "eth0", "mac": "00:00:00:00:00:01", "address": "10.0.0.1/30" },
                { "name": "eth1", "mac": "00:00:00:00:00:02", "address": "10.0.1.1/24" }
            ] }"#,
        )
        .unwrap();
        let (state, _queue) = RouterState::new(
            &config,
            vec![],
            Arc::new(RecordingTransport::new()),
            Arc::new(LoggingDataplane),
            Instant::now(),
        )
        .unwrap();
        state
    }

    #[tokio::test]
    async fn test_interface_down_withdraws_links() {
        let state = router();
        let now = Instant::now();

        apply(&state, AdminCommand::InterfaceDown("eth1".into()), now).await.unwrap();
        assert!(!state.interfaces.read().await.is_active("eth1"));
        assert_eq!(state.topology.lock().await.self_links().len(), 1);
        assert!(state.recompute.is_dirty());

        apply(&state, AdminCommand::InterfaceUp("eth1".into()), now).await.unwrap();
        assert!(state.interfaces.read().await.is_active("eth1"));
        assert_eq!(state.topology.lock().await.self_links().len(), 2);
    }

    #[tokio::test]
    async fn test_unknown_interface() {
        let state = router();
        let err = apply(&state, AdminCommand::InterfaceDown("eth7".into()), Instant::now())
            .await
            .unwrap_err();
        assert!(matches!(err, RouterError::UnknownInterface(_)));
    }

    #[tokio::test]
    async fn test_static_default_route_is_advertised() {
        let state = router();
        let now = Instant::now();
        let default = RouteEntry::new(
            Ipv4Addr::UNSPECIFIED,
            Ipv4Addr::UNSPECIFIED,
            Ipv4Addr::new(10, 0, 0, 2),
            "eth0",
            RouteSource::Static,
        );

        apply(&state, AdminCommand::AddStaticRoute(default), now).await.unwrap();
        assert!(state
            .topology
            .lock()
            .await
            .self_links()
            .iter()
            .any(|l| l.mask.is_unspecified()));

        apply(
            &state,
            AdminCommand::DeleteStaticRoute {
                destination: Ipv4Addr::UNSPECIFIED,
                mask: Ipv4Addr::UNSPECIFIED,
            },
            now,
        )
        .await
        .unwrap();
        assert_eq!(state.topology.lock().await.self_links().len(), 2);
        assert!(state.routing_table.read().await.is_empty());
    }

    #[tokio::test]
    async fn test_static_arp_add_and_delete() {
        let state = router();
        let now = Instant::now();
        let ip = Ipv4Addr::new(10, 0, 1, 50);
        let mac = MacAddr::new(0, 1, 2, 3, 4, 5);

        apply(&state, AdminCommand::AddStaticArp { ip, mac }, now).await.unwrap();
        assert_eq!(state.arp_cache.read().await.lookup(ip), Some(mac));

        apply(&state, AdminCommand::DeleteStaticArp(ip), now).await.unwrap();
        assert!(state.arp_cache.read().await.lookup(ip).is_none());
        assert!(apply(&state, AdminCommand::DeleteStaticArp(ip), now).await.is_err());
    }

    #[tokio::test]
    async fn test_settings_updates() {
        let state = router();
        let now = Instant::now();

        apply(&state, AdminCommand::SetHelloInterval(7), now).await.unwrap();
        apply(&state, AdminCommand::SetLsuBroadcast(false), now).await.unwrap();
        apply(&state, AdminCommand::SetAreaId(3), now).await.unwrap();
        assert!(apply(&state, AdminCommand::SetLsuInterval(0), now).await.is_err());

        let settings = state.settings().await;
        assert_eq!(settings.hello_interval, 7);
        assert!(!settings.lsu_broadcast);
        assert_eq!(settings.area_id, 3);
        assert_eq!(settings.lsu_interval, 30);
    }
}
