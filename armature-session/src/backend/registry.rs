//! Named backend factories.

use super::{BackendResult, BackendSettings, MemoryClient, ObjdbClient};
use crate::error::{SessionError, SessionResult};
use futures::FutureExt;
use futures::future::BoxFuture;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use tracing::{info, warn};

/// Builds a connected client from settings.
pub type BackendFactory = Arc<
    dyn Fn(BackendSettings) -> BoxFuture<'static, BackendResult<Arc<dyn ObjdbClient>>>
        + Send
        + Sync,
>;

/// Registry of backends by name (`"etcd"`, `"consul"`, ...).
///
/// The name is resolved once when a store is created; the resulting client
/// is used directly afterwards.
///
/// ```
/// use armature_session::backend::{BackendRegistry, MemoryClient, ObjdbClient};
/// use std::sync::Arc;
///
/// let mut registry = BackendRegistry::with_defaults();
/// registry.register("shared", |_settings| async {
///     Ok(Arc::new(MemoryClient::new()) as Arc<dyn ObjdbClient>)
/// });
/// assert!(registry.contains("shared"));
/// assert!(registry.contains("memory"));
/// ```
#[derive(Clone, Default)]
pub struct BackendRegistry {
    factories: HashMap<String, BackendFactory>,
}

impl fmt::Debug for BackendRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackendRegistry")
            .field("backends", &self.names())
            .finish()
    }
}

impl BackendRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every backend compiled into this build.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();

        registry.register("memory", |settings: BackendSettings| async move {
            Ok(Arc::new(MemoryClient::with_bucket(settings.bucket)) as Arc<dyn ObjdbClient>)
        });

        #[cfg(feature = "etcd")]
        registry.register("etcd", |settings: BackendSettings| async move {
            let client = super::EtcdClient::connect(settings).await?;
            Ok(Arc::new(client) as Arc<dyn ObjdbClient>)
        });

        #[cfg(feature = "consul")]
        registry.register("consul", |settings: BackendSettings| async move {
            let client = super::ConsulClient::connect(settings).await?;
            Ok(Arc::new(client) as Arc<dyn ObjdbClient>)
        });

        #[cfg(feature = "redis")]
        registry.register("redis", |settings: BackendSettings| async move {
            let client = super::RedisClient::connect(settings).await?;
            Ok(Arc::new(client) as Arc<dyn ObjdbClient>)
        });

        registry
    }

    /// Register (or replace) a backend factory.
    pub fn register<F, Fut>(&mut self, name: impl Into<String>, factory: F)
    where
        F: Fn(BackendSettings) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = BackendResult<Arc<dyn ObjdbClient>>> + Send + 'static,
    {
        let factory: BackendFactory = Arc::new(move |settings| factory(settings).boxed());
        self.factories.insert(name.into(), factory);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// Registered backend names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Resolve `name` and connect.
    ///
    /// Unknown names and failed connections both yield
    /// [`SessionError::NoBackend`].
    pub async fn connect(
        &self,
        name: &str,
        settings: BackendSettings,
    ) -> SessionResult<Arc<dyn ObjdbClient>> {
        let factory = self.factories.get(name).ok_or_else(|| {
            SessionError::NoBackend(format!(
                "unknown backend '{}' (available: {})",
                name,
                self.names().join(", ")
            ))
        })?;

        match factory(settings).await {
            Ok(client) => {
                info!(backend = name, "Session backend connected");
                Ok(client)
            }
            Err(e) => {
                warn!(backend = name, error = %e, "Session backend unavailable");
                Err(SessionError::NoBackend(format!("{}: {}", name, e)))
            }
        }
    }
}
