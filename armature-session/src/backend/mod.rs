//! Object database clients used to persist session records.
//!
//! Every backend speaks the same minimal key/value API ([`ObjdbClient`]).
//! Backends are looked up by name in a [`BackendRegistry`] once, when the
//! store is built.
//!
//! # Features
//!
//! - `memory` - in-process map (always available)
//! - `etcd` - etcd v3 JSON gateway (enabled by default)
//! - `consul` - Consul KV HTTP API
//! - `redis` - Redis

pub mod memory;
pub mod registry;

#[cfg(feature = "etcd")]
pub mod etcd;

#[cfg(feature = "consul")]
pub mod consul;

#[cfg(feature = "redis")]
pub mod redis;

pub use memory::MemoryClient;
pub use registry::{BackendFactory, BackendRegistry};

#[cfg(feature = "etcd")]
pub use etcd::EtcdClient;

#[cfg(feature = "consul")]
pub use consul::ConsulClient;

#[cfg(feature = "redis")]
pub use self::redis::RedisClient;

use async_trait::async_trait;
use thiserror::Error;

/// Result type for backend operations.
pub type BackendResult<T> = Result<T, BackendError>;

/// Object database errors.
#[derive(Debug, Error)]
pub enum BackendError {
    /// Key is not present
    #[error("Key not found: {0}")]
    NotFound(String),

    /// No endpoint could be reached
    #[error("Connection error: {0}")]
    Connection(String),

    /// The backend answered with an error
    #[error("Request failed: {0}")]
    Request(String),

    /// HTTP transport error (etcd, Consul)
    #[cfg(any(feature = "etcd", feature = "consul"))]
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Redis-specific error
    #[cfg(feature = "redis")]
    #[error("Redis error: {0}")]
    Redis(#[from] ::redis::RedisError),

    /// Generic error
    #[error("Backend error: {0}")]
    Other(String),
}

/// Connection settings handed to a backend factory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendSettings {
    /// Endpoints, tried in order
    pub endpoints: Vec<String>,
    /// Namespace the backend stores keys under
    pub bucket: String,
}

impl BackendSettings {
    pub fn new(endpoints: Vec<String>, bucket: impl Into<String>) -> Self {
        Self {
            endpoints,
            bucket: bucket.into(),
        }
    }
}

/// Minimal object database API.
///
/// Values are opaque bytes; the session store handles serialization. A
/// missing key is reported as [`BackendError::NotFound`] by `get_obj`, while
/// deleting a missing key succeeds.
#[async_trait]
pub trait ObjdbClient: Send + Sync {
    /// Backend name, for logging.
    fn name(&self) -> &str;

    /// Store `value` under `key`, replacing any previous value.
    async fn set_obj(&self, key: &str, value: &[u8]) -> BackendResult<()>;

    /// Fetch the value stored under `key`.
    async fn get_obj(&self, key: &str) -> BackendResult<Vec<u8>>;

    /// Remove `key`.
    async fn del_obj(&self, key: &str) -> BackendResult<()>;
}

/// Trim trailing slashes so paths can be appended with `format!`.
#[cfg(any(feature = "etcd", feature = "consul"))]
pub(crate) fn normalize_endpoints(endpoints: &[String]) -> BackendResult<Vec<String>> {
    let endpoints: Vec<String> = endpoints
        .iter()
        .map(|e| e.trim().trim_end_matches('/').to_string())
        .filter(|e| !e.is_empty())
        .collect();

    if endpoints.is_empty() {
        return Err(BackendError::Connection("no endpoints configured".to_string()));
    }
    for endpoint in &endpoints {
        if !endpoint.starts_with("http://") && !endpoint.starts_with("https://") {
            return Err(BackendError::Connection(format!(
                "endpoint must start with http:// or https://: {}",
                endpoint
            )));
        }
    }
    Ok(endpoints)
}
