use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::Parser;
use log::info;
use tokio::runtime::Builder;
use tokio::sync::mpsc;

use pwospf_router::RouterState;
use pwospf_router::config::{RouterConfig, load_static_routes};
use pwospf_router::dataplane::{ChannelTransport, LoggingDataplane};
use pwospf_router::protocol::start_tasks;

const FRAME_QUEUE_DEPTH: usize = 1024;

#[derive(Parser)]
#[command(name = "pwospf-router", about = "PWOSPF link-state router control plane")]
struct Cli {
    /// Router configuration (JSON)
    #[arg(long)]
    config: PathBuf,

    /// Static routing table, one `dest gateway mask interface` per line
    #[arg(long)]
    routes: Option<PathBuf>,

    #[arg(long, default_value = "info")]
    log_level: String,

    /// Periodically log a JSON dump of all tables
    #[arg(long)]
    debug: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(cli.log_level.as_str())).init();

    let config = RouterConfig::load(&cli.config)?;
    let static_routes = match &cli.routes {
        Some(path) => load_static_routes(path)?,
        None => Vec::new(),
    };

    let rt = Builder::new_multi_thread().enable_all().build()?;

    rt.block_on(async {
        let (frames_tx, frames_rx) = mpsc::channel(FRAME_QUEUE_DEPTH);
        let names: Vec<String> = config
            .get_enabled_interfaces()
            .iter()
            .map(|i| i.name.clone())
            .collect();
        let transport = ChannelTransport::open(&names, frames_tx)?;

        let (state, flood_queue) = RouterState::new(
            &config,
            static_routes,
            Arc::new(transport),
            Arc::new(LoggingDataplane),
            Instant::now(),
        )?;
        info!("Router id {}", state.router_id);

        let tasks = start_tasks(state, flood_queue, frames_rx, cli.debug);

        tokio::signal::ctrl_c()
            .await
            .context("waiting for Ctrl-C")?;
        info!("Shutting down");
        tasks.shutdown().await;

        Ok(())
    })
}
