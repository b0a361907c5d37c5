use clap::Parser;
use modsim_engine::{Simulation, SimulationConfig};
use std::path::PathBuf;
use tracing::info;

#[derive(Debug, Parser)]
#[command(name = "modsim", about = "Serve simulated Modbus slave devices")]
struct Args {
    /// Simulation description (JSON).
    #[arg(long, short)]
    config: PathBuf,
    /// Tracing filter, e.g. "info" or "modsim_engine=debug".
    /// Falls back to RUST_LOG.
    #[arg(long)]
    log_filter: Option<String>,
}

fn init_tracing(filter: Option<&str>) {
    let filter = match filter {
        Some(filter) => tracing_subscriber::EnvFilter::new(filter),
        None => tracing_subscriber::EnvFilter::from_default_env(),
    };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .try_init();
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    init_tracing(args.log_filter.as_deref());

    let text = std::fs::read_to_string(&args.config)?;
    let config = SimulationConfig::from_json(&text)?;

    let mut simulation = Simulation::from_config(&config)?;
    simulation.start().await?;
    info!(config = %args.config.display(), "simulation running, ctrl-c to stop");

    tokio::signal::ctrl_c().await?;
    info!("shutting down");
    simulation.stop().await;
    Ok(())
}
