//! # courier-server
//!
//! Real-time presence and message-relay service.
//!
//! This binary provides:
//! - **WebSocket gateway** over which clients register an identity and
//!   exchange direct and group messages as named JSON events
//! - **Connection registry** tracking which identities are currently
//!   reachable, with the online-set broadcast on every change
//! - **Group lifecycle management** (create/update/delete, membership
//!   mutation) persisted in SQLite, with per-group message history
//! - **File upload endpoint** plus static serving of uploaded files, so
//!   clients can relay file descriptors instead of raw bytes

mod api;
mod config;
mod error;
mod files;
mod gateway;
mod groups;
mod registry;
mod router;

use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::info;
use tracing_subscriber::EnvFilter;

use courier_store::Database;

use crate::api::AppState;
use crate::config::ServerConfig;
use crate::files::FileStore;
use crate::groups::GroupManager;
use crate::registry::Registry;
use crate::router::Router;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // -----------------------------------------------------------------------
    // 1. Initialize tracing (respects RUST_LOG env var)
    // -----------------------------------------------------------------------
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,courier_server=debug")),
        )
        .init();

    info!("Starting Courier server v{}", env!("CARGO_PKG_VERSION"));

    // -----------------------------------------------------------------------
    // 2. Load configuration
    // -----------------------------------------------------------------------
    let config = ServerConfig::from_env();
    info!(?config, "Loaded configuration");

    // -----------------------------------------------------------------------
    // 3. Initialize subsystems
    // -----------------------------------------------------------------------

    // Durable store (group metadata, message history, last-known handles)
    let database = match &config.database_path {
        Some(path) => Database::open_at(path)?,
        None => Database::new()?,
    };
    let store = Arc::new(Mutex::new(database));

    // Upload directory (created if missing)
    let files = Arc::new(
        FileStore::new(config.upload_dir.clone(), config.max_upload_size)
            .await
            .map_err(|e| anyhow::anyhow!("file store init failed: {e}"))?,
    );

    // Connection registry and the router that resolves recipients in it
    let registry = Arc::new(Registry::new());
    let router = Router::new(registry.clone());

    // Group lifecycle manager
    let groups = Arc::new(GroupManager::new(store.clone(), router.clone()));

    let state = AppState {
        registry,
        router,
        groups,
        store,
        files,
        config: Arc::new(config.clone()),
    };

    // -----------------------------------------------------------------------
    // 4. Run the HTTP/WebSocket server (blocks until shutdown)
    // -----------------------------------------------------------------------
    // tokio::select! ensures that if either the server or a shutdown signal
    // arrives, we exit cleanly.
    tokio::select! {
        result = api::serve(state, config.http_addr) => {
            if let Err(e) = result {
                tracing::error!(error = %e, "HTTP server failed");
                return Err(e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
        }
    }

    Ok(())
}
