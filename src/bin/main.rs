use anyhow::{Context, Result};
use btc_handshake::NodeConfig;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let config = NodeConfig::from_env().context("Failed to read configuration")?;

    tracing::info!("Attempting to connect to the Bitcoin node at {}", config.address);

    // The error is reported once, by anyhow on the way out of main.
    let outcome = btc_handshake::run(&config).await.map_err(|err| {
        let phase = err.phase();
        anyhow::Error::new(err).context(format!(
            "Handshake with {} failed while {}",
            config.address, phase
        ))
    })?;

    if let Some(peer) = &outcome.peer_version {
        tracing::info!("Peer {} speaks protocol {}", peer.user_agent, peer.version);
    }
    tracing::info!("Handshake with {} completed successfully", config.address);

    Ok(())
}
