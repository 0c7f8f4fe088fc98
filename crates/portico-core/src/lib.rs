// crates/portico-core/src/lib.rs
//
// portico-core: Core types, traits, and business logic for the Portico front door.
//
// This is the leaf crate that all other crates in the workspace depend on.
// It defines the User record, the shared error type, the repository and
// platform capability traits, and the PlatformService that the RPC handlers
// call into.

pub mod error;
pub mod service;
pub mod traits;
pub mod user;

// Re-export key types for ergonomic access from downstream crates.
// Usage: `use portico_core::User;`

// User types
pub use user::{NewUser, User, EMAIL_MAX_LEN, USERNAME_MAX_LEN};

// Error type
pub use error::PorticoError;

// Traits
pub use traits::{PlatformApi, UserRepository};

// Service
pub use service::PlatformService;
