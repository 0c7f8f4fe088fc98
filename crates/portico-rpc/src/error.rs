// crates/portico-rpc/src/error.rs

use thiserror::Error;
use tonic::Status;

use portico_core::PorticoError;

use crate::state::InvalidTransition;

/// Errors raised while building, starting or stopping the RPC transport.
///
/// Per-call failures never surface here; they travel back to the caller as
/// a `tonic::Status`.
#[derive(Debug, Error)]
pub enum RpcError {
    /// The listen address could not be bound. Fatal; never retried.
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// A service registration callback failed.
    #[error("Registration '{service}' failed: {source}")]
    Registration {
        service: String,
        #[source]
        source: RegistrationError,
    },

    /// The registry was already applied; it accepts no further changes.
    #[error("Service registry is frozen")]
    RegistryFrozen,

    /// A lifecycle operation was invoked in the wrong state.
    #[error(transparent)]
    InvalidState(#[from] InvalidTransition),

    /// An outbound connection to an RPC endpoint could not be established.
    #[error("Failed to connect to {endpoint}: {reason}")]
    Connect { endpoint: String, reason: String },
}

/// Errors raised by a registration callback while it fills the method table.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RegistrationError {
    #[error("method {0} is already registered")]
    DuplicateMethod(String),

    #[error("invalid descriptor for {path}: {reason}")]
    InvalidDescriptor { path: String, reason: String },

    #[error("{0}")]
    Failed(String),
}

/// Map a domain error onto the RPC status returned to the caller.
pub fn status_from_domain(err: PorticoError) -> Status {
    match err {
        PorticoError::NotFound(msg) => Status::not_found(msg),
        PorticoError::AlreadyExists(msg) => Status::already_exists(msg),
        PorticoError::InvalidArgument(msg) => Status::invalid_argument(msg),
        PorticoError::Storage(msg) | PorticoError::Serialization(msg) => {
            tracing::error!(error = %msg, "platform backend failure");
            Status::internal("internal server error")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tonic::Code;

    #[test]
    fn domain_errors_map_to_status_codes() {
        let cases = [
            (PorticoError::NotFound("user 7".into()), Code::NotFound),
            (PorticoError::AlreadyExists("email".into()), Code::AlreadyExists),
            (PorticoError::InvalidArgument("id".into()), Code::InvalidArgument),
            (PorticoError::Storage("disk".into()), Code::Internal),
            (PorticoError::Serialization("json".into()), Code::Internal),
        ];
        for (err, code) in cases {
            assert_eq!(status_from_domain(err).code(), code);
        }
    }

    #[test]
    fn backend_details_are_not_leaked() {
        let status = status_from_domain(PorticoError::Storage("rocksdb: corruption at /var/lib".into()));
        assert_eq!(status.message(), "internal server error");
    }
}
