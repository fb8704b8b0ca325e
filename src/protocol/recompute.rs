use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use log::{debug, info};
use tokio::sync::Notify;

use crate::RouterState;
use crate::algorithms::{compute_shortest_paths, synthesize_routes};

/// Dirty flag shared between everything that changes the topology and the
/// worker that rebuilds the routing table.
#[derive(Debug, Default)]
pub struct RecomputeSignal {
    dirty: AtomicBool,
    requests: AtomicU64,
    notify: Notify,
}

impl RecomputeSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark_dirty(&self) {
        self.dirty.store(true, Ordering::SeqCst);
        self.requests.fetch_add(1, Ordering::SeqCst);
        self.notify.notify_one();
    }

    /// Clears the flag, returning whether it was set.
    pub fn take_dirty(&self) -> bool {
        self.dirty.swap(false, Ordering::SeqCst)
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::SeqCst)
    }

    /// Total number of `mark_dirty` calls so far.
    pub fn requests(&self) -> u64 {
        self.requests.load(Ordering::SeqCst)
    }

    pub async fn notified(&self) {
        self.notify.notified().await
    }
}

/// Rebuilds the dynamic part of the routing table from the current topology
/// and pushes the result to the dataplane. Returns the table size.
pub async fn recompute_routes(state: &RouterState) -> usize {
    let routes = {
        let interfaces = state.interfaces.read().await;
        let mut table = state.routing_table.write().await;
        let mut topology = state.topology.lock().await;

        topology.determine_active_links();
        let reached = compute_shortest_paths(&mut topology);
        let computed = synthesize_routes(&topology, &interfaces);
        debug!(
            "Shortest paths reach {} of {} routers, {} protocol routes",
            reached,
            topology.len(),
            computed.len()
        );

        table.replace_dynamic(computed);
        table.get_routes().to_vec()
    };

    info!("Routing table recomputed ({} entries)", routes.len());
    for route in &routes {
        debug!("  {}", route);
    }
    state.sync_routes(&routes);
    routes.len()
}

/// Recomputes only when something marked the topology dirty since the last run.
pub async fn recompute_if_dirty(state: &RouterState) -> bool {
    if !state.recompute.take_dirty() {
        return false;
    }
    recompute_routes(state).await;
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_take_dirty_clears_flag() {
        let signal = RecomputeSignal::new();
        assert!(!signal.take_dirty());

        signal.mark_dirty();
        signal.mark_dirty();
        assert!(signal.is_dirty());
        assert_eq!(signal.requests(), 2);

        assert!(signal.take_dirty());
        assert!(!signal.is_dirty());
        assert!(!signal.take_dirty());
    }

    #[tokio::test]
    async fn test_notified_after_mark() {
        let signal = RecomputeSignal::new();
        signal.mark_dirty();
        // notify_one stores a permit when nobody is waiting yet.
        signal.notified().await;
        assert!(signal.take_dirty());
    }
}
