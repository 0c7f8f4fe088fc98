// crates/portico-rpc/src/lib.rs
//
// portico-rpc: gRPC transport and handlers for the Portico front door.
//
// Calls arrive over HTTP/2 with standard gRPC framing and protobuf payloads.
// Message bytes are routed by method path to a handler registered in the
// MethodTable, passing through the InterceptorChain on the way. Services are
// contributed through a ServiceRegistry applied once before the listener
// binds. The standard health and reflection services (tonic-health,
// tonic-reflection) are always served alongside them.

pub mod client;
pub mod codec;
pub mod descriptor;
pub mod error;
pub mod handlers;
pub mod health;
pub mod interceptor;
pub mod method;
pub mod middleware;
pub mod reflection;
pub mod registry;
pub mod schema;
pub mod server;
pub mod state;
pub mod transcode;

// Re-export the main types for ergonomic access.
pub use client::RpcClient;
pub use descriptor::{HttpRule, HttpVerb, MethodDescriptor};
pub use error::{RegistrationError, RpcError};
pub use interceptor::{CallContext, Interceptor, InterceptorChain, Next, UnaryCall, UnaryHandler};
pub use method::MethodTable;
pub use middleware::{CallLogger, Recovery};
pub use registry::{ServiceRegistration, ServiceRegistry};
pub use server::{DrainOutcome, RpcServer, ServerMonitor};
pub use state::{InvalidTransition, ServerState, ServerStateMachine};
pub use transcode::{RestMapping, TranscodeError};

// Status type shared by every handler signature.
pub use tonic::{Code, Status};
