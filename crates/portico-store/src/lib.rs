// crates/portico-store/src/lib.rs
//
// portico-store: Persistence layer for the Portico front door.
//
// Provides an in-memory user repository (default backend, used by tests and
// local development) and, behind the `rocksdb` feature, a RocksDB-backed
// repository with secondary unique indices on username and email.

pub mod memory;
#[cfg(feature = "rocksdb")]
pub mod rocks;

// Re-export key types for ergonomic access from downstream crates.
pub use memory::InMemoryUserStore;
#[cfg(feature = "rocksdb")]
pub use rocks::RocksUserStore;
