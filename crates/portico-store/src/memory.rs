// crates/portico-store/src/memory.rs
//
// In-memory user repository implementing the `UserRepository` trait.
//
// All state lives behind a single RwLock so that the uniqueness checks and
// the insert happen atomically with respect to other writers.

use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::Utc;

use portico_core::error::PorticoError;
use portico_core::traits::UserRepository;
use portico_core::user::{NewUser, User};

#[derive(Debug, Default)]
struct Tables {
    /// Primary table, id -> user (soft-deleted rows included).
    users: BTreeMap<u64, User>,
    /// Unique index: username -> id.
    by_username: HashMap<String, u64>,
    /// Unique index: email -> id.
    by_email: HashMap<String, u64>,
    /// Last id handed out.
    last_id: u64,
}

/// In-memory user store. Ids are assigned sequentially starting at 1.
#[derive(Debug, Default)]
pub struct InMemoryUserStore {
    tables: RwLock<Tables>,
}

impl InMemoryUserStore {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored rows, soft-deleted ones included.
    pub fn len(&self) -> usize {
        self.tables.read().map(|t| t.users.len()).unwrap_or(0)
    }

    /// Return whether the store holds no rows.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn poisoned() -> PorticoError {
    PorticoError::Storage("user table lock poisoned".to_string())
}

#[async_trait]
impl UserRepository for InMemoryUserStore {
    async fn create(&self, user: NewUser) -> Result<User, PorticoError> {
        let mut tables = self.tables.write().map_err(|_| poisoned())?;

        if tables.by_username.contains_key(&user.username) {
            return Err(PorticoError::AlreadyExists(format!(
                "username '{}'",
                user.username
            )));
        }
        if tables.by_email.contains_key(&user.email) {
            return Err(PorticoError::AlreadyExists(format!("email '{}'", user.email)));
        }

        tables.last_id += 1;
        let now = Utc::now();
        let record = User {
            id: tables.last_id,
            username: user.username,
            email: user.email,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        };

        tables.by_username.insert(record.username.clone(), record.id);
        tables.by_email.insert(record.email.clone(), record.id);
        tables.users.insert(record.id, record.clone());
        Ok(record)
    }

    async fn get_by_id(&self, id: u64) -> Result<User, PorticoError> {
        let tables = self.tables.read().map_err(|_| poisoned())?;
        match tables.users.get(&id) {
            Some(user) if !user.is_deleted() => Ok(user.clone()),
            _ => Err(PorticoError::NotFound(format!("user {}", id))),
        }
    }

    async fn soft_delete(&self, id: u64) -> Result<(), PorticoError> {
        let mut tables = self.tables.write().map_err(|_| poisoned())?;
        match tables.users.get_mut(&id) {
            Some(user) if !user.is_deleted() => {
                let now = Utc::now();
                user.deleted_at = Some(now);
                user.updated_at = now;
                Ok(())
            }
            _ => Err(PorticoError::NotFound(format!("user {}", id))),
        }
    }
}
