use std::time::{Duration, Instant};

use log::{debug, info, warn};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio::time::{interval, sleep};

use super::flood::{self, FloodQueue};
use super::{handle_frame, hello, lsu, recompute};
use crate::SharedRouterState;
use crate::arp;
use crate::dataplane::ReceivedFrame;

const HOUSEKEEPING_INTERVAL: Duration = Duration::from_secs(1);
const DEBUG_INTERVAL: Duration = Duration::from_secs(10);

/// Handles of the running protocol tasks.
pub struct TaskManager {
    handles: Vec<JoinHandle<()>>,
    shutdown_tx: broadcast::Sender<()>,
}

impl TaskManager {
    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Signals every task and waits for all of them to finish.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(());
        for handle in self.handles {
            if let Err(e) = handle.await {
                warn!("Protocol task ended abnormally: {}", e);
            }
        }
        info!("All protocol tasks stopped");
    }
}

pub fn start_tasks(
    state: SharedRouterState,
    flood_queue: FloodQueue,
    frames: mpsc::Receiver<ReceivedFrame>,
    debug_mode: bool,
) -> TaskManager {
    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);

    let mut handles = vec![
        tokio::spawn(hello_task(state.clone(), shutdown_rx.resubscribe())),
        tokio::spawn(aging_task(state.clone(), shutdown_rx.resubscribe())),
        tokio::spawn(lsu_task(state.clone(), shutdown_rx.resubscribe())),
        tokio::spawn(recompute_task(state.clone(), shutdown_rx.resubscribe())),
        tokio::spawn(flood_task(state.clone(), flood_queue, shutdown_rx.resubscribe())),
        tokio::spawn(arp_task(state.clone(), shutdown_rx.resubscribe())),
        tokio::spawn(receive_task(state.clone(), frames, shutdown_rx.resubscribe())),
    ];

    if debug_mode {
        handles.push(tokio::spawn(debug_task(state, shutdown_rx.resubscribe())));
    }

    info!("All protocol tasks started");
    TaskManager { handles, shutdown_tx }
}

async fn hello_task(state: SharedRouterState, mut shutdown_rx: broadcast::Receiver<()>) {
    loop {
        hello::send_hellos(&state, Instant::now()).await;
        // The interval may be changed at runtime.
        let period = state.settings().await.hello_period();

        tokio::select! {
            _ = shutdown_rx.recv() => {
                debug!("Hello task shutting down");
                break;
            }
            _ = sleep(period) => {}
        }
    }
}

async fn aging_task(state: SharedRouterState, mut shutdown_rx: broadcast::Receiver<()>) {
    let mut interval = interval(HOUSEKEEPING_INTERVAL);

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => {
                debug!("Aging task shutting down");
                break;
            }
            _ = interval.tick() => {
                lsu::age_neighbors_and_routers(&state, Instant::now()).await;
            }
        }
    }
}

async fn lsu_task(state: SharedRouterState, mut shutdown_rx: broadcast::Receiver<()>) {
    let mut interval = interval(HOUSEKEEPING_INTERVAL);

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => {
                debug!("LSU task shutting down");
                break;
            }
            _ = interval.tick() => {
                lsu::originate_if_due(&state, Instant::now()).await;
            }
        }
    }
}

async fn recompute_task(state: SharedRouterState, mut shutdown_rx: broadcast::Receiver<()>) {
    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => {
                debug!("Recompute task shutting down");
                break;
            }
            _ = state.recompute.notified() => {}
            _ = sleep(HOUSEKEEPING_INTERVAL) => {}
        }

        recompute::recompute_if_dirty(&state).await;
    }
}

async fn flood_task(
    state: SharedRouterState,
    mut queue: FloodQueue,
    mut shutdown_rx: broadcast::Receiver<()>,
) {
    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => {
                debug!("Flood task shutting down");
                break;
            }
            packet = queue.recv() => {
                let Some(packet) = packet else {
                    break;
                };
                let destination = packet.destination;
                if let Err(e) = flood::dispatch(&state, packet, Instant::now()).await {
                    debug!("Dropping flood to {}: {}", destination, e);
                }
            }
        }
    }
}

async fn arp_task(state: SharedRouterState, mut shutdown_rx: broadcast::Receiver<()>) {
    let mut interval = interval(HOUSEKEEPING_INTERVAL);

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => {
                debug!("ARP task shutting down");
                break;
            }
            _ = interval.tick() => {
                arp::maintain(&state, Instant::now()).await;
            }
        }
    }
}

async fn receive_task(
    state: SharedRouterState,
    mut frames: mpsc::Receiver<ReceivedFrame>,
    mut shutdown_rx: broadcast::Receiver<()>,
) {
    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => {
                debug!("Receive task shutting down");
                break;
            }
            frame = frames.recv() => {
                let Some(frame) = frame else {
                    warn!("Transport closed, receive task exiting");
                    break;
                };
                handle_frame(&state, &frame.interface, &frame.data, Instant::now()).await;
            }
        }
    }
}

async fn debug_task(state: SharedRouterState, mut shutdown_rx: broadcast::Receiver<()>) {
    let mut interval = interval(DEBUG_INTERVAL);

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => {
                debug!("Debug task shutting down");
                break;
            }
            _ = interval.tick() => {
                let snapshot = state.snapshot().await;
                match serde_json::to_string_pretty(&snapshot) {
                    Ok(json) => info!("=== DEBUG STATUS ===\n{}", json),
                    Err(e) => warn!("Cannot serialize status: {}", e),
                }
            }
        }
    }
}
