// crates/portico-core/src/service.rs
//
// PlatformService: the business layer behind the platform RPC handlers.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::PorticoError;
use crate::traits::{PlatformApi, UserRepository};
use crate::user::{NewUser, User};

/// Reply returned by `ping`.
pub const PONG: &str = "pong";

/// Business logic for the platform service, backed by any `UserRepository`.
#[derive(Clone)]
pub struct PlatformService {
    users: Arc<dyn UserRepository>,
}

impl std::fmt::Debug for PlatformService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlatformService").finish_non_exhaustive()
    }
}

impl PlatformService {
    pub fn new(users: Arc<dyn UserRepository>) -> Self {
        Self { users }
    }
}

#[async_trait]
impl PlatformApi for PlatformService {
    fn ping(&self) -> String {
        PONG.to_string()
    }

    async fn create_user(&self, user: NewUser) -> Result<User, PorticoError> {
        user.validate()?;
        let user = NewUser {
            username: user.username.trim().to_string(),
            email: user.email.trim().to_lowercase(),
        };
        self.users.create(user).await
    }

    async fn get_user(&self, id: u64) -> Result<User, PorticoError> {
        if id == 0 {
            return Err(PorticoError::InvalidArgument("id must be positive".to_string()));
        }
        self.users.get_by_id(id).await
    }

    async fn delete_user(&self, id: u64) -> Result<(), PorticoError> {
        if id == 0 {
            return Err(PorticoError::InvalidArgument("id must be positive".to_string()));
        }
        self.users.soft_delete(id).await
    }
}
