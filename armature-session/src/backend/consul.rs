//! Consul KV object store.
//!
//! This module requires the `consul` feature flag.

use super::{BackendError, BackendResult, BackendSettings, ObjdbClient, normalize_endpoints};
use async_trait::async_trait;
use reqwest::{Client, Method, StatusCode};
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::{debug, warn};

/// Consul-backed object client.
///
/// Objects live at `<bucket>/<key>` in the KV store.
#[derive(Debug)]
pub struct ConsulClient {
    client: Client,
    endpoints: Vec<String>,
    active: AtomicUsize,
    bucket: String,
}

impl ConsulClient {
    /// Create a client and verify that at least one agent answers.
    pub async fn connect(settings: BackendSettings) -> BackendResult<Self> {
        let client = Self::new(settings)?;

        let mut last_error = None;
        let mut reachable = None;
        for (idx, endpoint) in client.endpoints.iter().enumerate() {
            let url = format!("{}/v1/status/leader", endpoint);
            match client.client.get(&url).send().await {
                Ok(response) if response.status().is_success() => {
                    debug!(endpoint = %endpoint, "Consul agent reachable");
                    reachable = Some(idx);
                    break;
                }
                Ok(response) => {
                    last_error = Some(format!("{} answered {}", endpoint, response.status()));
                }
                Err(e) => {
                    warn!(endpoint = %endpoint, error = %e, "Consul agent unreachable");
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

    /// Create a client without probing the agents.
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

    fn kv_path(&self, key: &str) -> String {
        if self.bucket.is_empty() {
            format!("/v1/kv/{}", key)
        } else {
            format!("/v1/kv/{}/{}", self.bucket, key)
        }
    }

    async fn send(
        &self,
        method: Method,
        path: &str,
        body: Option<&[u8]>,
    ) -> BackendResult<reqwest::Response> {
        let count = self.endpoints.len();
        let start = self.active.load(Ordering::Relaxed);
        let mut last_error = None;

        for attempt in 0..count {
            let idx = (start + attempt) % count;
            let url = format!("{}{}", self.endpoints[idx], path);

            let mut request = self.client.request(method.clone(), &url);
            if let Some(body) = body {
                request = request.body(body.to_vec());
            }

            match request.send().await {
                Ok(response) => {
                    self.active.store(idx, Ordering::Relaxed);
                    return Ok(response);
                }
                Err(e) if e.is_connect() || e.is_timeout() => {
                    warn!(endpoint = %self.endpoints[idx], error = %e, "Consul request failed, trying next agent");
                    last_error = Some(e);
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(last_error
            .map(BackendError::from)
            .unwrap_or_else(|| BackendError::Connection("no endpoints configured".to_string())))
    }

    fn check(response: &reqwest::Response, op: &str, key: &str) -> BackendResult<()> {
        if response.status().is_success() {
            Ok(())
        } else {
            Err(BackendError::Request(format!(
                "Consul {} {} answered {}",
                op,
                key,
                response.status()
            )))
        }
    }
}

#[async_trait]
impl ObjdbClient for ConsulClient {
    fn name(&self) -> &str {
        "consul"
    }

    async fn set_obj(&self, key: &str, value: &[u8]) -> BackendResult<()> {
        let response = self.send(Method::PUT, &self.kv_path(key), Some(value)).await?;
        Self::check(&response, "put", key)?;

        // Consul answers `true` or `false` for the write
        let accepted: bool = response.json().await?;
        if !accepted {
            return Err(BackendError::Request(format!("Consul rejected write for {}", key)));
        }
        Ok(())
    }

    async fn get_obj(&self, key: &str) -> BackendResult<Vec<u8>> {
        let path = format!("{}?raw", self.kv_path(key));
        let response = self.send(Method::GET, &path, None).await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(BackendError::NotFound(key.to_string()));
        }
        Self::check(&response, "get", key)?;

        Ok(response.bytes().await?.to_vec())
    }

    async fn del_obj(&self, key: &str) -> BackendResult<()> {
        let response = self.send(Method::DELETE, &self.kv_path(key), None).await?;
        Self::check(&response, "delete", key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kv_path() {
        let client = ConsulClient::new(BackendSettings::new(
            vec!["http://127.0.0.1:8500".to_string()],
            "/sessions/",
        ))
        .unwrap();
        assert_eq!(client.kv_path("session_a"), "/v1/kv/sessions/session_a");

        let client = ConsulClient::new(BackendSettings::new(
            vec!["http://127.0.0.1:8500".to_string()],
            "",
        ))
        .unwrap();
        assert_eq!(client.kv_path("session_a"), "/v1/kv/session_a");
    }

    #[tokio::test]
    #[ignore]
    async fn test_consul_round_trip() {
        let settings = BackendSettings::new(vec!["http://127.0.0.1:8500".to_string()], "test");
        let client = ConsulClient::connect(settings).await.unwrap();

        client.set_obj("session_test", b"payload").await.unwrap();
        assert_eq!(client.get_obj("session_test").await.unwrap(), b"payload");

        client.del_obj("session_test").await.unwrap();
        assert!(matches!(
            client.get_obj("session_test").await,
            Err(BackendError::NotFound(_))
        ));
    }
}
