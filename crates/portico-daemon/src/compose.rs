// crates/portico-daemon/src/compose.rs
//
// Composition root: builds the business collaborators, the service registry
// and the lifecycle coordinator from configuration, in that order.

use std::sync::Arc;

use thiserror::Error;

use portico_core::{PlatformApi, PlatformService, PorticoError, UserRepository};
use portico_gateway::GatewayConfig;
use portico_rpc::handlers::platform;
use portico_rpc::{InterceptorChain, RpcError, ServiceRegistry};
use portico_store::InMemoryUserStore;

use crate::config::{ConfigError, DaemonConfig, StorageBackend};
use crate::lifecycle::LifecycleCoordinator;

#[derive(Debug, Error)]
pub enum ComposeError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Failed to open user store: {0}")]
    Storage(#[from] PorticoError),

    #[error(transparent)]
    Rpc(#[from] RpcError),
}

/// Wire every collaborator and return a coordinator ready to start.
pub fn build(config: &DaemonConfig) -> Result<LifecycleCoordinator, ComposeError> {
    config.validate()?;

    let users = open_user_store(config)?;
    let platform_api: Arc<dyn PlatformApi> = Arc::new(PlatformService::new(users));

    let mut registry = ServiceRegistry::new();
    registry.add(platform::registration(platform_api))?;

    let gateway = GatewayConfig {
        prefix: config.server.http.prefix.clone(),
        dial_timeout: config.dial_timeout(),
    };

    Ok(
        LifecycleCoordinator::new(&config.server.grpc.addr, &config.server.http.addr)
            .with_interceptors(InterceptorChain::standard())
            .with_registry(registry)
            .with_rest_mappings(platform::rest_mappings())
            .with_gateway_config(gateway),
    )
}

fn open_user_store(config: &DaemonConfig) -> Result<Arc<dyn UserRepository>, ComposeError> {
    match config.storage.backend {
        StorageBackend::Memory => {
            tracing::info!("Using in-memory user store");
            Ok(Arc::new(InMemoryUserStore::new()))
        }
        StorageBackend::Rocksdb => open_rocks(&expand_tilde(&config.storage.path)),
    }
}

#[cfg(feature = "rocksdb")]
fn open_rocks(path: &str) -> Result<Arc<dyn UserRepository>, ComposeError> {
    let store = portico_store::RocksUserStore::open(path)?;
    tracing::info!("Opened RocksDB user store at {}", path);
    Ok(Arc::new(store))
}

#[cfg(not(feature = "rocksdb"))]
fn open_rocks(path: &str) -> Result<Arc<dyn UserRepository>, ComposeError> {
    Err(ComposeError::Config(ConfigError::Invalid(format!(
        "storage backend 'rocksdb' at {} requires building with the rocksdb feature",
        path
    ))))
}

/// Expand a leading `~/` to the current user's home directory.
fn expand_tilde(path: &str) -> String {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest).to_string_lossy().to_string();
        }
    }
    path.to_string()
}
