// crates/portico-daemon/src/lib.rs
//
// portico-daemon: configuration, lifecycle coordination and the composition
// root for the Portico front door. The `portico-daemon` binary is a thin
// wrapper over these modules.

pub mod compose;
pub mod config;
pub mod lifecycle;
pub mod telemetry;

pub use compose::{build, ComposeError};
pub use config::{ConfigError, DaemonConfig};
pub use lifecycle::{Endpoints, LifecycleCoordinator, LifecycleError, ShutdownReport};
