// crates/portico-daemon/src/lifecycle.rs
//
// Startup and shutdown ordering for the two listeners.
//
// Startup:  rpc configure -> rpc start -> gateway register (dials rpc) ->
//           gateway start
// Shutdown: gateway stop -> rpc drain, inside one overall deadline

use std::net::SocketAddr;
use std::time::{Duration, Instant};

use thiserror::Error;

use portico_gateway::{GatewayConfig, GatewayError, GatewayProxy};
use portico_rpc::{DrainOutcome, InterceptorChain, RestMapping, RpcError, RpcServer, ServerState, ServiceRegistry};

#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("RPC server: {0}")]
    Rpc(#[from] RpcError),

    #[error("Gateway: {0}")]
    Gateway(#[from] GatewayError),

    #[error("Coordinator was already started")]
    AlreadyStarted,
}

/// Bound addresses of both listeners.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Endpoints {
    pub rpc: SocketAddr,
    pub http: SocketAddr,
}

/// Outcome of a coordinated stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShutdownReport {
    pub gateway: DrainOutcome,
    pub rpc: DrainOutcome,
    pub elapsed: Duration,
}

impl ShutdownReport {
    /// True when neither listener hit its deadline.
    pub fn is_clean(&self) -> bool {
        self.gateway.is_clean() && self.rpc.is_clean()
    }
}

/// Owns the RPC server and the gateway and sequences their lifecycles.
pub struct LifecycleCoordinator {
    grpc_addr: String,
    http_addr: String,
    rpc: RpcServer,
    gateway: GatewayProxy,
    chain: InterceptorChain,
    registry: ServiceRegistry,
    mappings: Vec<RestMapping>,
    started: bool,
}

impl std::fmt::Debug for LifecycleCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LifecycleCoordinator")
            .field("grpc_addr", &self.grpc_addr)
            .field("http_addr", &self.http_addr)
            .field("rpc", &self.rpc.state())
            .field("gateway", &self.gateway.state())
            .finish()
    }
}

impl LifecycleCoordinator {
    /// A coordinator with the standard interceptor chain, an empty registry
    /// and no REST mappings.
    pub fn new(grpc_addr: impl Into<String>, http_addr: impl Into<String>) -> Self {
        Self {
            grpc_addr: grpc_addr.into(),
            http_addr: http_addr.into(),
            rpc: RpcServer::new(),
            gateway: GatewayProxy::new(GatewayConfig::default()),
            chain: InterceptorChain::standard(),
            registry: ServiceRegistry::new(),
            mappings: Vec::new(),
            started: false,
        }
    }

    pub fn with_interceptors(mut self, chain: InterceptorChain) -> Self {
        self.chain = chain;
        self
    }

    pub fn with_registry(mut self, registry: ServiceRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn with_rest_mappings(mut self, mappings: Vec<RestMapping>) -> Self {
        self.mappings = mappings;
        self
    }

    pub fn with_gateway_config(mut self, config: GatewayConfig) -> Self {
        self.gateway = GatewayProxy::new(config);
        self
    }

    pub fn rpc_state(&self) -> ServerState {
        self.rpc.state()
    }

    pub fn gateway_state(&self) -> ServerState {
        self.gateway.state()
    }

    /// Bring both listeners up. Returns once both accept traffic, or with the
    /// first error; a failing RPC step leaves the gateway untouched.
    pub async fn start(&mut self) -> Result<Endpoints, LifecycleError> {
        if self.started {
            return Err(LifecycleError::AlreadyStarted);
        }
        self.started = true;

        self.rpc.configure(self.chain.clone(), &mut self.registry)?;
        let rpc = self.rpc.start(&self.grpc_addr).await?;

        let mappings = std::mem::take(&mut self.mappings);
        self.gateway
            .register_from_endpoint(&rpc.to_string(), mappings)
            .await?;
        let http = self.gateway.start(&self.http_addr).await?;

        tracing::info!(rpc = %rpc, http = %http, "Portico front door started");
        Ok(Endpoints { rpc, http })
    }

    /// Stop the gateway, then drain the RPC server, within `deadline`
    /// overall. Components that never started are reported `NotStarted`.
    pub async fn stop(&mut self, deadline: Duration) -> ShutdownReport {
        let started = Instant::now();
        tracing::info!("Shutting down (deadline {} ms)", deadline.as_millis());

        let gateway = match self.gateway.stop(deadline).await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::warn!("Gateway stop skipped: {}", e);
                DrainOutcome::NotStarted
            }
        };

        let remaining = deadline.saturating_sub(started.elapsed());
        let rpc = match self.rpc.stop(remaining).await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::warn!("RPC stop skipped: {}", e);
                DrainOutcome::NotStarted
            }
        };

        let report = ShutdownReport {
            gateway,
            rpc,
            elapsed: started.elapsed(),
        };
        tracing::info!(
            gateway = ?report.gateway,
            rpc = ?report.rpc,
            elapsed_ms = report.elapsed.as_millis() as u64,
            "Shutdown complete"
        );
        report
    }
}
