// crates/portico-rpc/src/handlers/mod.rs
//
// Handler modules for the RPC services the daemon exposes.
// Each module defines its message types, method descriptors, handler
// functions, a ServiceRegistration and the REST mappings for its methods.

pub mod platform;
