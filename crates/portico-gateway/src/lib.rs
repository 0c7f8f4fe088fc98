// crates/portico-gateway/src/lib.rs
//
// portico-gateway: REST front for the Portico RPC server.
//
// The GatewayProxy turns declared RestMappings into axum routes mounted under
// a fixed prefix. Each route merges path, query and body parameters into a
// JSON object, transcodes it into the RPC request message and calls the RPC
// server over loopback. `/healthz` is served directly by the gateway.

pub mod error;
pub mod proxy;
pub mod route;
pub mod status;

pub use error::GatewayError;
pub use proxy::{GatewayConfig, GatewayProxy};
pub use route::GatewayRoute;
pub use status::ErrorBody;
