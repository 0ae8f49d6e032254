//! Redis object store.

use super::{BackendError, BackendResult, BackendSettings, ObjdbClient};
use async_trait::async_trait;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use tracing::{debug, warn};

/// Redis-backed object client.
///
/// Keys are stored as `<bucket>:<key>`. The first endpoint that accepts a
/// connection is used for the lifetime of the client.
pub struct RedisClient {
    conn: ConnectionManager,
    bucket: String,
}

impl RedisClient {
    /// Connect to the first reachable endpoint.
    pub async fn connect(settings: BackendSettings) -> BackendResult<Self> {
        let mut last_error = None;

        for url in &settings.endpoints {
            if !url.starts_with("redis://") && !url.starts_with("rediss://") {
                last_error = Some(format!("Redis URL must start with redis:// or rediss://: {}", url));
                continue;
            }

            let client = match redis::Client::open(url.as_str()) {
                Ok(client) => client,
                Err(e) => {
                    last_error = Some(format!("{}: {}", url, e));
                    continue;
                }
            };

            match ConnectionManager::new(client).await {
                Ok(conn) => {
                    debug!(endpoint = %url, "Redis endpoint connected");
                    return Ok(Self {
                        conn,
                        bucket: settings.bucket.clone(),
                    });
                }
                Err(e) => {
                    warn!(endpoint = %url, error = %e, "Redis endpoint unreachable");
                    last_error = Some(format!("{}: {}", url, e));
                }
            }
        }

        Err(BackendError::Connection(
            last_error.unwrap_or_else(|| "no endpoints configured".to_string()),
        ))
    }

    fn full_key(&self, key: &str) -> String {
        full_key(&self.bucket, key)
    }
}

fn full_key(bucket: &str, key: &str) -> String {
    if bucket.is_empty() {
        key.to_string()
    } else {
        format!("{}:{}", bucket, key)
    }
}

#[async_trait]
impl ObjdbClient for RedisClient {
    fn name(&self) -> &str {
        "redis"
    }

    async fn set_obj(&self, key: &str, value: &[u8]) -> BackendResult<()> {
        let mut conn = self.conn.clone();
        let _: () = conn.set(self.full_key(key), value).await?;
        Ok(())
    }

    async fn get_obj(&self, key: &str) -> BackendResult<Vec<u8>> {
        let mut conn = self.conn.clone();
        let data: Option<Vec<u8>> = conn.get(self.full_key(key)).await?;
        data.ok_or_else(|| BackendError::NotFound(key.to_string()))
    }

    async fn del_obj(&self, key: &str) -> BackendResult<()> {
        let mut conn = self.conn.clone();
        let _: () = conn.del(self.full_key(key)).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_layout() {
        assert_eq!(full_key("sessions", "session_a"), "sessions:session_a");
        assert_eq!(full_key("", "session_a"), "session_a");
    }

    #[tokio::test]
    async fn test_rejects_non_redis_url() {
        let settings = BackendSettings::new(vec!["http://localhost:6379".to_string()], "s");
        assert!(matches!(
            RedisClient::connect(settings).await,
            Err(BackendError::Connection(msg)) if msg.contains("redis://")
        ));
    }

    #[tokio::test]
    #[ignore]
    async fn test_redis_round_trip() {
        let settings = BackendSettings::new(vec!["redis://localhost:6379".to_string()], "test");
        let client = RedisClient::connect(settings).await.unwrap();

        client.set_obj("session_test", b"payload").await.unwrap();
        assert_eq!(client.get_obj("session_test").await.unwrap(), b"payload");

        client.del_obj("session_test").await.unwrap();
        assert!(matches!(
            client.get_obj("session_test").await,
            Err(BackendError::NotFound(_))
        ));
    }
}
