//! In-process object store.

use super::{BackendError, BackendResult, ObjdbClient};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// In-memory backend, mainly for tests and single-process deployments.
///
/// Clones share the same map.
#[derive(Debug, Clone, Default)]
pub struct MemoryClient {
    data: Arc<RwLock<HashMap<String, Vec<u8>>>>,
    bucket: String,
}

impl MemoryClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keep keys under a bucket prefix.
    pub fn with_bucket(bucket: impl Into<String>) -> Self {
        Self {
            data: Arc::default(),
            bucket: bucket.into(),
        }
    }

    fn full_key(&self, key: &str) -> String {
        if self.bucket.is_empty() {
            key.to_string()
        } else {
            format!("{}/{}", self.bucket, key)
        }
    }

    /// Number of stored objects.
    pub async fn len(&self) -> usize {
        self.data.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.data.read().await.is_empty()
    }

    /// Whether `key` is present.
    pub async fn contains(&self, key: &str) -> bool {
        self.data.read().await.contains_key(&self.full_key(key))
    }
}

#[async_trait]
impl ObjdbClient for MemoryClient {
    fn name(&self) -> &str {
        "memory"
    }

    async fn set_obj(&self, key: &str, value: &[u8]) -> BackendResult<()> {
        self.data
            .write()
            .await
            .insert(self.full_key(key), value.to_vec());
        Ok(())
    }

    async fn get_obj(&self, key: &str) -> BackendResult<Vec<u8>> {
        self.data
            .read()
            .await
            .get(&self.full_key(key))
            .cloned()
            .ok_or_else(|| BackendError::NotFound(key.to_string()))
    }

    async fn del_obj(&self, key: &str) -> BackendResult<()> {
        self.data.write().await.remove(&self.full_key(key));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_set_get_delete() {
        let client = MemoryClient::new();
        client.set_obj("k", b"v").await.unwrap();
        assert_eq!(client.get_obj("k").await.unwrap(), b"v");
        assert_eq!(client.len().await, 1);

        client.del_obj("k").await.unwrap();
        assert!(matches!(
            client.get_obj("k").await,
            Err(BackendError::NotFound(_))
        ));

        // deleting twice is fine
        client.del_obj("k").await.unwrap();
        assert!(client.is_empty().await);
    }

    #[tokio::test]
    async fn test_bucket_prefix() {
        let client = MemoryClient::with_bucket("sessions");
        client.set_obj("session_a", b"1").await.unwrap();
        assert!(client.contains("session_a").await);
        assert!(client.data.read().await.contains_key("sessions/session_a"));
    }

    #[tokio::test]
    async fn test_clones_share_state() {
        let client = MemoryClient::new();
        let other = client.clone();
        client.set_obj("k", b"v").await.unwrap();
        assert_eq!(other.get_obj("k").await.unwrap(), b"v");
    }
}
