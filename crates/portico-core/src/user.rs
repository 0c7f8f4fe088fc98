// crates/portico-core/src/user.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::PorticoError;

/// Maximum length of a username, in characters.
pub const USERNAME_MAX_LEN: usize = 64;

/// Maximum length of an email address, in characters.
pub const EMAIL_MAX_LEN: usize = 128;

/// A platform user record.
///
/// Uniquely identified by `id` and uniquely keyed by both `username` and
/// `email`. Deletion is soft: `deleted_at` is set and the record becomes
/// invisible to lookups, but its unique keys stay reserved.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct User {
    /// Auto-assigned identifier, starting at 1.
    pub id: u64,
    /// Unique login name.
    pub username: String,
    /// Unique email address.
    pub email: String,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last modification timestamp.
    pub updated_at: DateTime<Utc>,
    /// Soft-deletion timestamp, if deleted.
    pub deleted_at: Option<DateTime<Utc>>,
}

impl User {
    /// Whether the record has been soft-deleted.
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}

/// Fields supplied by a caller creating a user. The repository assigns the
/// id and timestamps.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NewUser {
    pub username: String,
    pub email: String,
}

impl NewUser {
    pub fn new(username: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            email: email.into(),
        }
    }

    /// Check field constraints before the record reaches storage.
    pub fn validate(&self) -> Result<(), PorticoError> {
        let username = self.username.trim();
        if username.is_empty() {
            return Err(PorticoError::InvalidArgument(
                "username must not be empty".to_string(),
            ));
        }
        if username.chars().count() > USERNAME_MAX_LEN {
            return Err(PorticoError::InvalidArgument(format!(
                "username exceeds {} characters",
                USERNAME_MAX_LEN
            )));
        }
        let email = self.email.trim();
        match email.split_once('@') {
            Some((local, domain)) if !local.trim().is_empty() && !domain.trim().is_empty() => {}
            _ => {
                return Err(PorticoError::InvalidArgument(format!(
                    "email '{}' is not an address",
                    email
                )))
            }
        }
        if email.chars().count() > EMAIL_MAX_LEN {
            return Err(PorticoError::InvalidArgument(format!(
                "email exceeds {} characters",
                EMAIL_MAX_LEN
            )));
        }
        Ok(())
    }
}
