// crates/portico-gateway/src/error.rs

use thiserror::Error;

use portico_rpc::{InvalidTransition, RpcError};

/// Errors raised while building, starting or stopping the gateway.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// The RPC endpoint could not be reached at registration time.
    #[error("Failed to dial RPC endpoint {endpoint}: {source}")]
    Dial {
        endpoint: String,
        #[source]
        source: RpcError,
    },

    /// The HTTP listen address could not be bound.
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// A mapping cannot be turned into a route.
    #[error("Invalid route for {method}: {reason}")]
    InvalidRoute { method: String, reason: String },

    /// Two mappings claim the same verb and path.
    #[error("Duplicate route {verb} {path}")]
    DuplicateRoute { verb: String, path: String },

    /// A lifecycle operation was invoked in the wrong state.
    #[error(transparent)]
    InvalidState(#[from] InvalidTransition),
}
