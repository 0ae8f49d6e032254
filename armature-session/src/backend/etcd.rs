//! etcd object store (v3 JSON gateway).
//!
//! This module requires the `etcd` feature flag.

use super::{BackendError, BackendResult, BackendSettings, ObjdbClient, normalize_endpoints};
use async_trait::async_trait;
use base64::{Engine, engine::general_purpose::STANDARD};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::{debug, warn};

#[derive(Debug, Serialize)]
struct PutRequest {
    key: String,
    value: String,
}

#[derive(Debug, Serialize)]
struct KeyRequest {
    key: String,
}

#[derive(Debug, Default, Deserialize)]
struct RangeResponse {
    #[serde(default)]
    kvs: Vec<KeyValue>,
}

#[derive(Debug, Deserialize)]
struct KeyValue {
    #[serde(default)]
    value: String,
}

/// etcd-backed object client.
///
/// Keys are stored as `/<bucket>/<key>`. Requests go to the last endpoint
/// that answered; on a connection failure the next endpoint is tried.
///
/// # Examples
///
/// ```no_run
/// use armature_session::backend::{BackendSettings, EtcdClient};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let settings = BackendSettings::new(vec!["http://127.0.0.1:2379".to_string()], "sessions");
/// let client = EtcdClient::connect(settings).await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct EtcdClient {
    client: Client,
    endpoints: Vec<String>,
    active: AtomicUsize,
    bucket: String,
}

impl EtcdClient {
    /// Create a client and verify that at least one endpoint answers.
    pub async fn connect(settings: BackendSettings) -> BackendResult<Self> {
        let client = Self::new(settings)?;

        let mut last_error = None;
        let mut reachable = None;
        for (idx, endpoint) in client.endpoints.iter().enumerate() {
            match client.client.get(format!("{}/version", endpoint)).send().await {
                Ok(response) if response.status().is_success() => {
                    debug!(endpoint = %endpoint, "etcd endpoint reachable");
                    reachable = Some(idx);
                    break;
                }
                Ok(response) => {
                    last_error = Some(format!("{} answered {}", endpoint, response.status()));
                }
                Err(e) => {
                    warn!(endpoint = %endpoint, error = %e, "etcd endpoint unreachable");
                    last_error = Some(format!("{}: {}", endpoint, e));
                }
            }
        }

        if let Some(idx) = reachable {
            client.active.store(idx, Ordering::Relaxed);
            return Ok(client);
        }

        Err(BackendError::Connection(
            last_error.unwrap_or_else(|| "no endpoints configured".to_string()),
        ))
    }

    /// Create a client without probing the endpoints.
    pub fn new(settings: BackendSettings) -> BackendResult<Self> {
        let endpoints = normalize_endpoints(&settings.endpoints)?;
        let client = Client::builder()
            .build()
            .map_err(|e| BackendError::Connection(e.to_string()))?;

        Ok(Self {
            client,
            endpoints,
            active: AtomicUsize::new(0),
            bucket: settings.bucket.trim_matches('/').to_string(),
        })
    }

    /// Full etcd key for an object key.
    fn full_key(&self, key: &str) -> String {
        if self.bucket.is_empty() {
            format!("/{}", key)
        } else {
            format!("/{}/{}", self.bucket, key)
        }
    }

    fn encoded_key(&self, key: &str) -> String {
        STANDARD.encode(self.full_key(key))
    }

    /// POST a JSON body to `path`, failing over across endpoints.
    async fn post<B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> BackendResult<reqwest::Response> {
        let count = self.endpoints.len();
        let start = self.active.load(Ordering::Relaxed);
        let mut last_error = None;

        for attempt in 0..count {
            let idx = (start + attempt) % count;
            let url = format!("{}{}", self.endpoints[idx], path);

            match self.client.post(&url).json(body).send().await {
                Ok(response) => {
                    self.active.store(idx, Ordering::Relaxed);
                    if !response.status().is_success() {
                        return Err(BackendError::Request(format!(
                            "etcd {} answered {}",
                            path,
                            response.status()
                        )));
                    }
                    return Ok(response);
                }
                Err(e) if e.is_connect() || e.is_timeout() => {
                    warn!(endpoint = %self.endpoints[idx], error = %e, "etcd request failed, trying next endpoint");
                    last_error = Some(e);
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(last_error
            .map(BackendError::from)
            .unwrap_or_else(|| BackendError::Connection("no endpoints configured".to_string())))
    }
}

#[async_trait]
impl ObjdbClient for EtcdClient {
    fn name(&self) -> &str {
        "etcd"
    }

    async fn set_obj(&self, key: &str, value: &[u8]) -> BackendResult<()> {
        let request = PutRequest {
            key: self.encoded_key(key),
            value: STANDARD.encode(value),
        };
        self.post("/v3/kv/put", &request).await?;
        Ok(())
    }

    async fn get_obj(&self, key: &str) -> BackendResult<Vec<u8>> {
        let request = KeyRequest {
            key: self.encoded_key(key),
        };
        let response: RangeResponse = self.post("/v3/kv/range", &request).await?.json().await?;

        let kv = response
            .kvs
            .into_iter()
            .next()
            .ok_or_else(|| BackendError::NotFound(key.to_string()))?;

        STANDARD
            .decode(kv.value)
            .map_err(|e| BackendError::Other(format!("invalid etcd value for {}: {}", key, e)))
    }

    async fn del_obj(&self, key: &str) -> BackendResult<()> {
        let request = KeyRequest {
            key: self.encoded_key(key),
        };
        self.post("/v3/kv/deleterange", &request).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(bucket: &str) -> EtcdClient {
        EtcdClient::new(BackendSettings::new(
            vec!["http://127.0.0.1:2379/".to_string()],
            bucket,
        ))
        .unwrap()
    }

    #[test]
    fn test_key_layout() {
        assert_eq!(client("sessions").full_key("session_a"), "/sessions/session_a");
        assert_eq!(client("/sessions/").full_key("session_a"), "/sessions/session_a");
        assert_eq!(client("").full_key("session_a"), "/session_a");
    }

    #[test]
    fn test_encoded_key() {
        let client = client("s");
        assert_eq!(
            STANDARD.decode(client.encoded_key("k")).unwrap(),
            b"/s/k".to_vec()
        );
    }

    #[test]
    fn test_range_response_without_kvs() {
        let response: RangeResponse =
            serde_json::from_str(r#"{"header":{"revision":"7"}}"#).unwrap();
        assert!(response.kvs.is_empty());

        let response: RangeResponse =
            serde_json::from_str(r#"{"kvs":[{"key":"L3Mvaw==","value":"dg=="}],"count":"1"}"#)
                .unwrap();
        assert_eq!(response.kvs[0].value, "dg==");
    }

    #[test]
    fn test_rejects_missing_endpoints() {
        assert!(EtcdClient::new(BackendSettings::new(vec![], "s")).is_err());
    }

    #[tokio::test]
    #[ignore]
    async fn test_etcd_round_trip() {
        let settings = BackendSettings::new(vec!["http://127.0.0.1:2379".to_string()], "test");
        let client = EtcdClient::connect(settings).await.unwrap();

        client.set_obj("session_test", b"payload").await.unwrap();
        assert_eq!(client.get_obj("session_test").await.unwrap(), b"payload");

        client.del_obj("session_test").await.unwrap();
        assert!(matches!(
            client.get_obj("session_test").await,
            Err(BackendError::NotFound(_))
        ));
    }
}
