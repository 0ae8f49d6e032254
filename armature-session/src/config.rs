//! Session store configuration.

use crate::backend::BackendSettings;
use crate::codec::{DEFAULT_MAX_LENGTH, KeyPair};
use crate::error::{SessionError, SessionResult};
use crate::guard::LockStrategy;
use crate::session::SessionOptions;
use base64::{Engine, engine::general_purpose::STANDARD};
use serde::{Deserialize, Serialize};
use std::env;

/// What a lookup does when the cookie is valid but the record cannot be
/// loaded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadErrorPolicy {
    /// Return a new, empty session and no error.
    ///
    /// Compatible with deployments where stale cookies are common.
    #[default]
    Swallow,
    /// Report backend and record-decode failures to the caller. A missing
    /// record still yields a new session without error.
    Surface,
}

/// Session store configuration.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Backend name, resolved through the backend registry
    pub backend: String,
    /// Backend endpoints, tried in order
    pub endpoints: Vec<String>,
    /// Bucket/namespace the backend stores sessions under
    pub bucket: String,
    /// Codec key pairs, current key first
    pub key_pairs: Vec<KeyPair>,
    /// Default cookie options for new sessions
    pub options: SessionOptions,
    /// Maximum length of an encoded cookie value; 0 disables the check
    pub max_length: usize,
    /// Backend call serialization
    pub lock_strategy: LockStrategy,
    /// Lookup behavior on load failures
    pub load_error_policy: LoadErrorPolicy,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            backend: "etcd".to_string(),
            endpoints: vec!["http://127.0.0.1:2379".to_string()],
            bucket: "sessions".to_string(),
            key_pairs: Vec::new(),
            options: SessionOptions::default(),
            max_length: DEFAULT_MAX_LENGTH,
            lock_strategy: LockStrategy::Global,
            load_error_policy: LoadErrorPolicy::Swallow,
        }
    }
}

impl SessionConfig {
    /// Create a configuration for a named backend.
    ///
    /// # Examples
    ///
    /// ```
    /// use armature_session::SessionConfig;
    ///
    /// let config = SessionConfig::new("etcd", vec!["http://10.0.0.1:2379".to_string()], "sessions")
    ///     .with_hash_key(b"a-very-secret-hash-key-of-32-byt".to_vec());
    /// assert!(config.validate().is_ok());
    /// ```
    pub fn new(backend: &str, endpoints: Vec<String>, bucket: &str) -> Self {
        Self {
            backend: backend.to_string(),
            endpoints,
            bucket: bucket.to_string(),
            ..Default::default()
        }
    }

    /// In-process configuration, useful for tests.
    pub fn memory() -> Self {
        Self::new("memory", Vec::new(), "sessions")
    }

    /// Build a configuration from `ARMATURE_SESSION_*` environment variables.
    ///
    /// - `ARMATURE_SESSION_BACKEND` - backend name (default `etcd`)
    /// - `ARMATURE_SESSION_ENDPOINTS` - comma-separated endpoints
    /// - `ARMATURE_SESSION_BUCKET` - bucket name (default `sessions`)
    /// - `ARMATURE_SESSION_KEYS` - comma-separated base64 keys: hash, block, hash, block, ...
    /// - `ARMATURE_SESSION_MAX_AGE` - cookie max age in seconds
    /// - `ARMATURE_SESSION_MAX_LENGTH` - maximum encoded cookie length, 0 for none
    /// - `ARMATURE_SESSION_SECURE` - `1`/`true` for secure cookies
    /// - `ARMATURE_SESSION_LOCK` - `global` or `per_key`
    pub fn from_env() -> SessionResult<Self> {
        let mut config = Self::default();

        if let Ok(backend) = env::var("ARMATURE_SESSION_BACKEND") {
            config.backend = backend;
        }

        if let Ok(endpoints) = env::var("ARMATURE_SESSION_ENDPOINTS") {
            config.endpoints = split_list(&endpoints);
        }

        if let Ok(bucket) = env::var("ARMATURE_SESSION_BUCKET") {
            config.bucket = bucket;
        }

        if let Ok(keys) = env::var("ARMATURE_SESSION_KEYS") {
            let keys = split_list(&keys)
                .iter()
                .map(|key| {
                    STANDARD
                        .decode(key)
                        .map_err(|e| SessionError::Config(format!("invalid session key: {}", e)))
                })
                .collect::<SessionResult<Vec<_>>>()?;
            config.key_pairs = KeyPair::from_flat(&keys);
        }

        if let Ok(max_age) = env::var("ARMATURE_SESSION_MAX_AGE") {
            config.options.max_age = max_age.trim().parse().map_err(|_| {
                SessionError::Config(format!("invalid ARMATURE_SESSION_MAX_AGE: {}", max_age))
            })?;
        }

        if let Ok(max_length) = env::var("ARMATURE_SESSION_MAX_LENGTH") {
            config.max_length = max_length.trim().parse().map_err(|_| {
                SessionError::Config(format!(
                    "invalid ARMATURE_SESSION_MAX_LENGTH: {}",
                    max_length
                ))
            })?;
        }

        if let Ok(secure) = env::var("ARMATURE_SESSION_SECURE") {
            config.options.secure = secure == "1" || secure.to_lowercase() == "true";
        }

        if let Ok(lock) = env::var("ARMATURE_SESSION_LOCK") {
            config.lock_strategy = match lock.to_lowercase().as_str() {
                "global" => LockStrategy::Global,
                "per_key" | "per-key" => LockStrategy::PerKey,
                other => {
                    return Err(SessionError::Config(format!(
                        "invalid ARMATURE_SESSION_LOCK: {}",
                        other
                    )));
                }
            };
        }

        Ok(config)
    }

    /// Add a signing-only key pair.
    pub fn with_hash_key(mut self, hash_key: Vec<u8>) -> Self {
        self.key_pairs.push(KeyPair::new(hash_key));
        self
    }

    /// Add a key pair. The first pair added encodes new cookies.
    pub fn with_key_pair(mut self, pair: KeyPair) -> Self {
        self.key_pairs.push(pair);
        self
    }

    /// Set the default cookie options.
    pub fn with_options(mut self, options: SessionOptions) -> Self {
        self.options = options;
        self
    }

    /// Set the default cookie max age in seconds.
    pub fn with_max_age(mut self, max_age: i64) -> Self {
        self.options.max_age = max_age;
        self
    }

    /// Set the maximum encoded cookie length; 0 disables the check.
    ///
    /// Stored records are not subject to this limit.
    pub fn with_max_length(mut self, max_length: usize) -> Self {
        self.max_length = max_length;
        self
    }

    /// Set the bucket name.
    pub fn with_bucket(mut self, bucket: &str) -> Self {
        self.bucket = bucket.to_string();
        self
    }

    /// Set how backend calls are serialized.
    pub fn with_lock_strategy(mut self, strategy: LockStrategy) -> Self {
        self.lock_strategy = strategy;
        self
    }

    /// Set lookup behavior on load failures.
    pub fn with_load_error_policy(mut self, policy: LoadErrorPolicy) -> Self {
        self.load_error_policy = policy;
        self
    }

    /// Settings passed to the backend factory.
    pub fn backend_settings(&self) -> BackendSettings {
        BackendSettings::new(self.endpoints.clone(), self.bucket.clone())
    }

    /// Check that the configuration can build a store.
    pub fn validate(&self) -> SessionResult<()> {
        if self.backend.is_empty() {
            return Err(SessionError::Config("backend name is required".to_string()));
        }
        if self.key_pairs.is_empty() {
            return Err(SessionError::Config(
                "at least one key pair is required".to_string(),
            ));
        }
        if self.key_pairs.iter().any(|pair| pair.hash_key.is_empty()) {
            return Err(SessionError::Config("hash key must not be empty".to_string()));
        }
        Ok(())
    }
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ToString::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = SessionConfig::default();
        assert_eq!(config.backend, "etcd");
        assert_eq!(config.bucket, "sessions");
        assert_eq!(config.options.max_age, 86400 * 30);
        assert_eq!(config.max_length, 4096);
        assert_eq!(config.lock_strategy, LockStrategy::Global);
        assert_eq!(config.load_error_policy, LoadErrorPolicy::Swallow);
    }

    #[test]
    fn test_config_builder() {
        let config = SessionConfig::new("consul", vec!["http://c:8500".to_string()], "app")
            .with_hash_key(vec![1; 32])
            .with_key_pair(KeyPair::with_block_key(vec![2; 32], vec![3; 32]))
            .with_max_age(600)
            .with_max_length(8192)
            .with_lock_strategy(LockStrategy::PerKey)
            .with_load_error_policy(LoadErrorPolicy::Surface);

        assert_eq!(config.key_pairs.len(), 2);
        assert_eq!(config.options.max_age, 600);
        assert_eq!(config.max_length, 8192);
        assert_eq!(config.lock_strategy, LockStrategy::PerKey);
        assert_eq!(config.load_error_policy, LoadErrorPolicy::Surface);

        let settings = config.backend_settings();
        assert_eq!(settings.endpoints, vec!["http://c:8500"]);
        assert_eq!(settings.bucket, "app");
    }

    #[test]
    fn test_validate() {
        assert!(SessionConfig::memory().validate().is_err());
        assert!(SessionConfig::memory().with_hash_key(vec![]).validate().is_err());
        assert!(SessionConfig::memory().with_hash_key(vec![1; 32]).validate().is_ok());
    }

    #[test]
    fn test_split_list() {
        assert_eq!(split_list(" a, b ,,c "), vec!["a", "b", "c"]);
        assert!(split_list("").is_empty());
    }

    #[test]
    fn test_lock_strategy_serde() {
        let strategy: LockStrategy = serde_json::from_str("\"per_key\"").unwrap();
        assert_eq!(strategy, LockStrategy::PerKey);
        let policy: LoadErrorPolicy = serde_json::from_str("\"surface\"").unwrap();
        assert_eq!(policy, LoadErrorPolicy::Surface);
    }
}
