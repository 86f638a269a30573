//! Latency swarm binary
//!
//! Simulates a Vivaldi swarm and prints a convergence report as JSON.

use vivaldi_node::{Swarm, SwarmConfig};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "lat_swarm=info,vivaldi=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = SwarmConfig::from_env()?;
    tracing::info!(
        nodes = config.nodes,
        rounds = config.rounds,
        fanout = config.gossip.fanout,
        patience = config.gossip.patience,
        "Starting latency swarm"
    );

    let swarm = Swarm::build(config)?;
    let report = swarm.run().await;

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
