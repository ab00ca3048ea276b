//! Commitment registry node
//!
//! Serves the registry over HTTP:
//! - Accepts Groth16 registration proofs and records their commitments
//! - Serves Merkle paths and roots of the identity and eligibility trees
//! - Persists trees and the nullifier ledger under `DATA_DIR`

mod api;
mod config;

use std::sync::Arc;

use anyhow::{Context, Result};
use registry_core::{FileStore, Registry};
use registry_smt::PoseidonBackend;
use registry_verifier::build_verifier;
use tokio::net::TcpListener;
use tracing::info;

use crate::api::AppState;
use crate::config::NodeConfig;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    info!("Starting commitment registry node...");

    let config = NodeConfig::from_env()?;
    info!("  Data dir: {}", config.data_dir.display());
    info!("  Tree depth: {}", config.registry.depth);
    info!("  Field check: {}", config.registry.field_check_mode);
    info!("  Verifier: {}", config.verifier.mode);

    let store = FileStore::open(&config.data_dir)
        .with_context(|| format!("opening data dir {}", config.data_dir.display()))?;
    let registry = Registry::open(config.registry.clone(), Arc::new(store), Arc::new(PoseidonBackend))
        .context("opening registry")?;
    info!("Nullifier count: {}", registry.ledger_len()?);

    let verifier = build_verifier(&config.verifier).context("building proof verifier")?;

    let state = AppState { registry: Arc::new(registry), verifier };
    let app = api::router(state, config.max_body_size);

    let listener = TcpListener::bind(&config.listen_addr)
        .await
        .with_context(|| format!("binding {}", config.listen_addr))?;
    info!("HTTP server listening on {}", config.listen_addr);
    axum::serve(listener, app).with_graceful_shutdown(shutdown_signal()).await?;

    info!("Node stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}
