//! Runs the lockstep battle server with the default configuration.
//!
//! `RUST_LOG` controls log output, e.g. `RUST_LOG=lockstep_room=debug`.

use lockstep::prelude::*;
use tracing_subscriber::{EnvFilter, fmt};

#[tokio::main]
async fn main() -> Result<(), LockstepError> {
    fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(true)
        .compact()
        .init();

    let config = ServerConfig::default();
    tracing::info!(
        lobby = %config.lobby_addr(),
        battle_port = config.battle_port,
        "starting lockstep server"
    );
    let server = LockstepServer::<AcceptAll, BincodeCodec>::builder().config(config).build(AcceptAll).await?;

    let handle = server.handle();
    tokio::spawn(async move {
        if let Err(error) = tokio::signal::ctrl_c().await {
            tracing::error!(%error, "failed to listen for interrupt");
            return;
        }
        tracing::info!("interrupt received, shutting down");
        handle.shutdown();
    });

    server.run().await
}
