// crates/portico-daemon/src/config.rs
//
// Runtime configuration for the Portico daemon.
//
// Layers, later wins:
//   1. built-in defaults
//   2. `{config_dir}/config.toml`
//   3. `{config_dir}/config.{ENV}.toml` when ENV is set
//   4. PORTICO_* environment variables
//   5. command-line flags (applied by main)

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Base configuration file name inside the config directory.
pub const CONFIG_FILE: &str = "config.toml";

/// Environment variables recognised by `apply_env`.
pub const ENV_GRPC_ADDR: &str = "PORTICO_SERVER_GRPC_ADDR";
pub const ENV_HTTP_ADDR: &str = "PORTICO_SERVER_HTTP_ADDR";
pub const ENV_STORAGE_BACKEND: &str = "PORTICO_STORAGE_BACKEND";
pub const ENV_STORAGE_PATH: &str = "PORTICO_STORAGE_PATH";
pub const ENV_LOG_LEVEL: &str = "PORTICO_LOG_LEVEL";
pub const ENV_LOG_FORMAT: &str = "PORTICO_LOG_FORMAT";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Runtime configuration for the daemon.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DaemonConfig {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub shutdown: ShutdownConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub log: LogConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default)]
    pub grpc: GrpcConfig,

    #[serde(default)]
    pub http: HttpConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GrpcConfig {
    /// Listen address of the RPC server.
    #[serde(default = "default_grpc_addr")]
    pub addr: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpConfig {
    /// Listen address of the REST gateway.
    #[serde(default = "default_http_addr")]
    pub addr: String,

    /// Prefix transcoded routes are mounted under.
    #[serde(default = "default_prefix")]
    pub prefix: String,

    /// Connect timeout when the gateway dials the RPC server.
    #[serde(default = "default_dial_timeout_ms")]
    pub dial_timeout_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShutdownConfig {
    /// Overall deadline for draining both listeners.
    #[serde(default = "default_shutdown_timeout_ms")]
    pub timeout_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: StorageBackend,

    /// Database directory for the rocksdb backend. `~/` is expanded.
    #[serde(default = "default_storage_path")]
    pub path: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogConfig {
    /// Default filter directive; `RUST_LOG` takes precedence.
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default)]
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    Memory,
    Rocksdb,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

fn default_grpc_addr() -> String {
    "127.0.0.1:9090".to_string()
}

fn default_http_addr() -> String {
    "127.0.0.1:8080".to_string()
}

fn default_prefix() -> String {
    "/api/v1".to_string()
}

fn default_dial_timeout_ms() -> u64 {
    5_000
}

fn default_shutdown_timeout_ms() -> u64 {
    10_000
}

fn default_storage_path() -> String {
    "~/.portico/data".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for GrpcConfig {
    fn default() -> Self {
        Self {
            addr: default_grpc_addr(),
        }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            addr: default_http_addr(),
            prefix: default_prefix(),
            dial_timeout_ms: default_dial_timeout_ms(),
        }
    }
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_shutdown_timeout_ms(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::default(),
            path: default_storage_path(),
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

impl FromStr for StorageBackend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" => Ok(StorageBackend::Memory),
            "rocksdb" => Ok(StorageBackend::Rocksdb),
            other => Err(ConfigError::Invalid(format!(
                "unknown storage backend '{}' (expected memory or rocksdb)",
                other
            ))),
        }
    }
}

impl fmt::Display for StorageBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageBackend::Memory => write!(f, "memory"),
            StorageBackend::Rocksdb => write!(f, "rocksdb"),
        }
    }
}

impl FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pretty" => Ok(LogFormat::Pretty),
            "json" => Ok(LogFormat::Json),
            other => Err(ConfigError::Invalid(format!(
                "unknown log format '{}' (expected pretty or json)",
                other
            ))),
        }
    }
}

impl DaemonConfig {
    /// Load `config.toml` and, when `env` is given, merge
    /// `config.{env}.toml` over it. Both files are optional; the returned
    /// list names the files that were read.
    pub fn load(dir: &Path, env: Option<&str>) -> Result<(Self, Vec<PathBuf>), ConfigError> {
        let mut merged = toml::Table::new();
        let mut sources = Vec::new();

        let mut candidates = vec![dir.join(CONFIG_FILE)];
        if let Some(env) = env.map(str::trim).filter(|e| !e.is_empty()) {
            candidates.push(dir.join(format!("config.{}.toml", env)));
        }

        for path in candidates {
            if let Some(table) = read_table(&path)? {
                merge_tables(&mut merged, table);
                sources.push(path);
            }
        }

        let config = toml::Value::Table(merged)
            .try_into::<DaemonConfig>()
            .map_err(|source| ConfigError::Parse {
                path: dir.to_path_buf(),
                source,
            })?;
        Ok((config, sources))
    }

    /// Apply `PORTICO_*` overrides. `lookup` is `std::env::var(..).ok()` in
    /// the binary and a map in tests.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(addr) = lookup(ENV_GRPC_ADDR) {
            self.server.grpc.addr = addr;
        }
        if let Some(addr) = lookup(ENV_HTTP_ADDR) {
            self.server.http.addr = addr;
        }
        if let Some(backend) = lookup(ENV_STORAGE_BACKEND) {
            self.storage.backend = backend.parse()?;
        }
        if let Some(path) = lookup(ENV_STORAGE_PATH) {
            self.storage.path = path;
        }
        if let Some(level) = lookup(ENV_LOG_LEVEL) {
            self.log.level = level;
        }
        if let Some(format) = lookup(ENV_LOG_FORMAT) {
            self.log.format = format.parse()?;
        }
        Ok(())
    }

    /// Reject values that would only fail later, at bind or dial time.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.grpc.addr.trim().is_empty() {
            return Err(ConfigError::Invalid("server.grpc.addr is empty".to_string()));
        }
        if self.server.http.addr.trim().is_empty() {
            return Err(ConfigError::Invalid("server.http.addr is empty".to_string()));
        }
        if !self.server.http.prefix.starts_with('/') {
            return Err(ConfigError::Invalid(format!(
                "server.http.prefix '{}' must start with '/'",
                self.server.http.prefix
            )));
        }
        if self.server.http.dial_timeout_ms == 0 {
            return Err(ConfigError::Invalid("server.http.dial_timeout_ms must be positive".to_string()));
        }
        if self.shutdown.timeout_ms == 0 {
            return Err(ConfigError::Invalid("shutdown.timeout_ms must be positive".to_string()));
        }
        Ok(())
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown.timeout_ms)
    }

    pub fn dial_timeout(&self) -> Duration {
        Duration::from_millis(self.server.http.dial_timeout_ms)
    }
}

fn read_table(path: &Path) -> Result<Option<toml::Table>, ConfigError> {
    let contents = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(source) => {
            return Err(ConfigError::Io {
                path: path.to_path_buf(),
                source,
            })
        }
    };
    toml::from_str(&contents)
        .map(Some)
        .map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
}

/// Deep-merge `overlay` into `base`; nested tables merge key by key.
fn merge_tables(base: &mut toml::Table, overlay: toml::Table) {
    for (key, value) in overlay {
        match value {
            toml::Value::Table(incoming) => match base.get_mut(&key) {
                Some(toml::Value::Table(existing)) => merge_tables(existing, incoming),
                _ => {
                    base.insert(key, toml::Value::Table(incoming));
                }
            },
            other => {
                base.insert(key, other);
            }
        }
    }
}
