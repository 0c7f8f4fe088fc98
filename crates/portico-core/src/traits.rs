// crates/portico-core/src/traits.rs

use async_trait::async_trait;

use crate::error::PorticoError;
use crate::user::{NewUser, User};

/// Trait for persistent User storage.
///
/// Implemented by portico-store (in-memory and RocksDB backends).
#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Insert a new user, assigning its id and timestamps.
    /// Fails with `AlreadyExists` if the username or email is taken.
    async fn create(&self, user: NewUser) -> Result<User, PorticoError>;

    /// Retrieve a live (not soft-deleted) user by id.
    async fn get_by_id(&self, id: u64) -> Result<User, PorticoError>;

    /// Soft-delete a user by id. Fails with `NotFound` if absent or already deleted.
    async fn soft_delete(&self, id: u64) -> Result<(), PorticoError>;
}

/// The capability set the RPC handlers consume.
///
/// Implemented by `PlatformService`; tests substitute their own.
#[async_trait]
pub trait PlatformApi: Send + Sync {
    /// Liveness probe of the business layer.
    fn ping(&self) -> String;

    /// Create a user after validating its fields.
    async fn create_user(&self, user: NewUser) -> Result<User, PorticoError>;

    /// Look up a user by id.
    async fn get_user(&self, id: u64) -> Result<User, PorticoError>;

    /// Soft-delete a user by id.
    async fn delete_user(&self, id: u64) -> Result<(), PorticoError>;
}
