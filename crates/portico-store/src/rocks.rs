// crates/portico-store/src/rocks.rs
//
// RocksDB-backed persistent storage for Users.
//
// Key format:
//   - Primary:   `user:{id:020}`        -> JSON-serialized User
//   - Unique:    `username:{username}`  -> id (decimal string)
//   - Unique:    `email:{email}`        -> id (decimal string)
//   - Counter:   `meta:last_id`         -> last assigned id (decimal string)
//
// Ids are zero-padded so the primary keyspace iterates in id order.
// Writes go through a mutex so the uniqueness check, the id bump and the
// batch write form one critical section.

use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use rocksdb::{DBWithThreadMode, MultiThreaded, Options, WriteBatch};

use portico_core::error::PorticoError;
use portico_core::traits::UserRepository;
use portico_core::user::{NewUser, User};

const LAST_ID_KEY: &[u8] = b"meta:last_id";

/// RocksDB wrapper implementing the `UserRepository` trait.
#[derive(Debug)]
pub struct RocksUserStore {
    db: DBWithThreadMode<MultiThreaded>,
    write_lock: Mutex<()>,
}

impl RocksUserStore {
    /// Open a RocksDB database at the given filesystem path.
    ///
    /// Creates the database directory if it does not exist.
    pub fn open(path: &str) -> Result<Self, PorticoError> {
        let mut opts = Options::default();
        opts.create_if_missing(true);

        let db = DBWithThreadMode::<MultiThreaded>::open(&opts, path).map_err(|e| {
            PorticoError::Storage(format!("Failed to open RocksDB at {}: {}", path, e))
        })?;

        Ok(Self {
            db,
            write_lock: Mutex::new(()),
        })
    }

    /// Build the primary key for a User: `user:{id:020}`.
    fn user_key(id: u64) -> Vec<u8> {
        format!("user:{:020}", id).into_bytes()
    }

    /// Build the unique index key for a username.
    fn username_key(username: &str) -> Vec<u8> {
        format!("username:{}", username).into_bytes()
    }

    /// Build the unique index key for an email.
    fn email_key(email: &str) -> Vec<u8> {
        format!("email:{}", email).into_bytes()
    }

    /// Get raw bytes from RocksDB, mapping errors to PorticoError::Storage.
    fn get_raw(&self, key: &[u8]) -> Result<Option<Vec<u8>>, PorticoError> {
        self.db
            .get(key)
            .map_err(|e| PorticoError::Storage(format!("RocksDB get failed: {}", e)))
    }

    /// Commit a write batch, mapping errors to PorticoError::Storage.
    fn write(&self, batch: WriteBatch) -> Result<(), PorticoError> {
        self.db
            .write(batch)
            .map_err(|e| PorticoError::Storage(format!("RocksDB write failed: {}", e)))
    }

    fn last_id(&self) -> Result<u64, PorticoError> {
        match self.get_raw(LAST_ID_KEY)? {
            Some(bytes) => std::str::from_utf8(&bytes)
                .ok()
                .and_then(|s| s.parse().ok())
                .ok_or_else(|| PorticoError::Storage("corrupt id counter".to_string())),
            None => Ok(0),
        }
    }

    /// Read a User row regardless of its deletion state.
    fn load(&self, id: u64) -> Result<Option<User>, PorticoError> {
        match self.get_raw(&Self::user_key(id))? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, ()>, PorticoError> {
        self.write_lock
            .lock()
            .map_err(|_| PorticoError::Storage("write lock poisoned".to_string()))
    }
}

#[async_trait]
impl UserRepository for RocksUserStore {
    async fn create(&self, user: NewUser) -> Result<User, PorticoError> {
        let _guard = self.lock()?;

        if self.get_raw(&Self::username_key(&user.username))?.is_some() {
            return Err(PorticoError::AlreadyExists(format!(
                "username '{}'",
                user.username
            )));
        }
        if self.get_raw(&Self::email_key(&user.email))?.is_some() {
            return Err(PorticoError::AlreadyExists(format!("email '{}'", user.email)));
        }

        let id = self.last_id()? + 1;
        let now = Utc::now();
        let record = User {
            id,
            username: user.username,
            email: user.email,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        };

        let id_str = id.to_string();
        let mut batch = WriteBatch::default();
        batch.put(Self::user_key(id), serde_json::to_vec(&record)?);
        batch.put(Self::username_key(&record.username), id_str.as_bytes());
        batch.put(Self::email_key(&record.email), id_str.as_bytes());
        batch.put(LAST_ID_KEY, id_str.as_bytes());
        self.write(batch)?;

        Ok(record)
    }

    async fn get_by_id(&self, id: u64) -> Result<User, PorticoError> {
        match self.load(id)? {
            Some(user) if !user.is_deleted() => Ok(user),
            _ => Err(PorticoError::NotFound(format!("user {}", id))),
        }
    }

    async fn soft_delete(&self, id: u64) -> Result<(), PorticoError> {
        let _guard = self.lock()?;

        let mut user = match self.load(id)? {
            Some(user) if !user.is_deleted() => user,
            _ => return Err(PorticoError::NotFound(format!("user {}", id))),
        };
        let now = Utc::now();
        user.deleted_at = Some(now);
        user.updated_at = now;

        // Unique index entries stay: deleted rows keep their keys reserved.
        let mut batch = WriteBatch::default();
        batch.put(Self::user_key(id), serde_json::to_vec(&user)?);
        self.write(batch)
    }
}
