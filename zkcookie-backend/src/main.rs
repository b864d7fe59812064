//! zkcookie-server
//!
//! Issues origin-bound challenges, verifies cookie-circuit proofs against
//! them and hands out signed session cookies.

use std::sync::Arc;

use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use zkcookie_backend::{serve, spawn_sweeper, AppState, ServerConfig};
use zkcookie_verifier::Groth16Oracle;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = ServerConfig::from_env()?;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,zkcookie_backend=debug".into());
    if config.log_json {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    if config.dev_secret {
        warn!("using the built-in development session secret; never run this in production");
    }

    let oracle = Arc::new(Groth16Oracle::from_path(&config.vk_path));
    match oracle.ensure_loaded() {
        Ok(()) => info!(path = %config.vk_path.display(), "verification key loaded"),
        // Keeps retrying on each verify; requests get 503 until the key shows up.
        Err(err) => warn!(path = %config.vk_path.display(), error = %err, "verifier not ready"),
    }

    let state = AppState::from_config(&config, oracle)?;
    info!(
        nonce_ttl_ms = config.nonce_ttl_ms,
        session_ttl_ms = config.session_ttl_ms,
        nullifiers = ?config.nullifier_store,
        challenges = ?config.challenge_store,
        "stores opened"
    );

    let sweeper = spawn_sweeper(state.challenges().clone(), config.sweep_interval);
    serve(&config, state).await?;
    sweeper.abort();
    Ok(())
}
