//! Object database backed session store.

use crate::backend::{BackendRegistry, ObjdbClient};
use crate::codec::CodecChain;
use crate::config::{LoadErrorPolicy, SessionConfig};
use crate::cookie;
use crate::error::{LookupError, SessionError, SessionResult};
use crate::guard::ConcurrencyGuard;
use crate::session::{DEFAULT_MAX_AGE, Session, SessionOptions};
use crate::traits::{SessionStore, generate_session_id};
use async_trait::async_trait;
use http::HeaderMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

/// Prefix of every record key in the backend.
pub const KEY_PREFIX: &str = "session_";

/// Persisted wrapper around the codec-encoded session values.
#[derive(Debug, Serialize, Deserialize)]
struct SessionRecord {
    value: String,
}

fn record_key(id: &str) -> String {
    format!("{}{}", KEY_PREFIX, id)
}

/// Timestamp limit applied to the codecs for a cookie `max_age`.
///
/// Browser-session (0) and deletion (negative) ages keep the default limit.
fn codec_max_age(max_age: i64) -> i64 {
    if max_age > 0 { max_age } else { DEFAULT_MAX_AGE }
}

/// Session store keeping values in an object database.
///
/// The cookie only carries the authenticated session ID. Values are encoded
/// with the same keys and written under `session_<id>`; the cookie length
/// limit does not apply to stored records.
///
/// # Examples
///
/// ```
/// use armature_session::*;
/// use http::HeaderMap;
///
/// # async fn example() -> SessionResult<()> {
/// let config = SessionConfig::memory().with_key_pair(KeyPair::generate());
/// let store = ObjdbStore::new(config).await?;
///
/// let mut session = store.new_session(&HeaderMap::new(), "sid").await.map_err(|e| e.into_parts().1)?;
/// session.set("user_id", 42)?;
///
/// let mut response = HeaderMap::new();
/// store.save(&mut response, &mut session).await?;
/// assert!(response.contains_key(http::header::SET_COOKIE));
/// # Ok(())
/// # }
/// ```
pub struct ObjdbStore {
    client: Arc<dyn ObjdbClient>,
    codecs: CodecChain,
    records: CodecChain,
    options: SessionOptions,
    guard: ConcurrencyGuard,
    load_error_policy: LoadErrorPolicy,
}

impl fmt::Debug for ObjdbStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjdbStore")
            .field("backend", &self.client.name())
            .field("codecs", &self.codecs.len())
            .field("options", &self.options)
            .field("lock_strategy", &self.guard.strategy())
            .field("load_error_policy", &self.load_error_policy)
            .finish()
    }
}

impl ObjdbStore {
    /// Build a store, resolving the backend from the default registry.
    pub async fn new(config: SessionConfig) -> SessionResult<Self> {
        Self::with_registry(config, &BackendRegistry::with_defaults()).await
    }

    /// Build a store, resolving the backend from `registry`.
    pub async fn with_registry(
        config: SessionConfig,
        registry: &BackendRegistry,
    ) -> SessionResult<Self> {
        config.validate()?;
        let client = registry
            .connect(&config.backend, config.backend_settings())
            .await?;
        Self::from_client(client, config)
    }

    /// Build a store around an already connected client.
    ///
    /// `config.backend`, `endpoints` and `bucket` are ignored.
    pub fn from_client(client: Arc<dyn ObjdbClient>, config: SessionConfig) -> SessionResult<Self> {
        config.validate()?;

        let mut codecs = CodecChain::from_pairs(&config.key_pairs)
            .map_err(|e| SessionError::Config(format!("invalid key pair: {}", e)))?;
        codecs.set_max_age(codec_max_age(config.options.max_age));

        let mut records = codecs.clone();
        records.set_max_length(0);
        codecs.set_max_length(config.max_length);

        Ok(Self {
            client,
            codecs,
            records,
            options: config.options,
            guard: ConcurrencyGuard::new(config.lock_strategy),
            load_error_policy: config.load_error_policy,
        })
    }

    /// Default options copied into each new session.
    pub fn options(&self) -> &SessionOptions {
        &self.options
    }

    /// Set the default cookie max age and the codecs' timestamp limit.
    ///
    /// Only sessions created afterwards see the new default. A zero or
    /// negative age leaves the codecs at the 30 day default.
    pub fn set_max_age(&mut self, max_age: i64) {
        self.options.max_age = max_age;
        self.codecs.set_max_age(codec_max_age(max_age));
        self.records.set_max_age(codec_max_age(max_age));
    }

    /// Set the maximum encoded cookie length; 0 disables the check.
    pub fn set_max_length(&mut self, max_length: usize) {
        self.codecs.set_max_length(max_length);
    }

    /// The backend client.
    pub fn client(&self) -> &Arc<dyn ObjdbClient> {
        &self.client
    }

    /// Encode the session values and write them under `session_<id>`.
    async fn save_record(&self, session: &Session) -> SessionResult<()> {
        let value = self
            .records
            .encode(session.name(), session.values())
            .map_err(SessionError::Encode)?;
        let data = serde_json::to_vec(&SessionRecord { value })
            .map_err(|e| SessionError::Serialization(e.to_string()))?;

        let key = record_key(session.id());
        let _guard = self.guard.lock(&key).await;
        self.client.set_obj(&key, &data).await.map_err(|e| {
            warn!(backend = self.client.name(), key = %key, error = %e, "Failed to write session");
            e
        })?;
        debug!(key = %key, bytes = data.len(), "Session saved");
        Ok(())
    }

    /// Read `session_<id>` and decode the stored values.
    async fn load_record(
        &self,
        name: &str,
        id: &str,
    ) -> SessionResult<HashMap<String, serde_json::Value>> {
        let key = record_key(id);
        let data = {
            let _guard = self.guard.lock(&key).await;
            self.client.get_obj(&key).await?
        };

        let record: SessionRecord = serde_json::from_slice(&data)
            .map_err(|e| SessionError::Deserialization(e.to_string()))?;
        self.records
            .decode(name, &record.value)
            .map_err(SessionError::RecordDecode)
    }

    /// Remove `session_<id>` from the backend.
    async fn delete_record(&self, session: &Session) -> SessionResult<()> {
        let key = record_key(session.id());
        let _guard = self.guard.lock(&key).await;
        self.client.del_obj(&key).await.map_err(|e| {
            warn!(backend = self.client.name(), key = %key, error = %e, "Failed to delete session");
            e
        })?;
        debug!(key = %key, "Session deleted");
        Ok(())
    }
}

#[async_trait]
impl SessionStore for ObjdbStore {
    async fn new_session(&self, headers: &HeaderMap, name: &str) -> Result<Session, LookupError> {
        let mut session = Session::new(name, self.options.clone());

        let Some(value) = cookie::find_cookie(headers, name) else {
            return Ok(session);
        };

        let id: String = match self.codecs.decode(name, &value) {
            Ok(id) => id,
            Err(e) => {
                debug!(cookie = name, error = %e, "Rejected session cookie");
                return Err(LookupError::new(session, SessionError::CookieDecode(e)));
            }
        };

        // adopt the ID only once its record loads
        match self.load_record(name, &id).await {
            Ok(values) => {
                session.assign_id(id);
                session.replace_values(values);
                session.set_is_new(false);
                Ok(session)
            }
            Err(e) if e.is_not_found() => {
                debug!(cookie = name, "No stored session for cookie");
                Ok(session)
            }
            Err(e) => match self.load_error_policy {
                LoadErrorPolicy::Swallow => {
                    debug!(cookie = name, error = %e, "Ignoring session load failure");
                    Ok(session)
                }
                LoadErrorPolicy::Surface => Err(LookupError::new(session, e)),
            },
        }
    }

    async fn save(&self, headers: &mut HeaderMap, session: &mut Session) -> SessionResult<()> {
        if session.options.max_age < 0 {
            if !session.id().is_empty() {
                self.delete_record(session).await?;
            }
            return cookie::set_cookie(headers, session.name(), "", &session.options);
        }

        if session.id().is_empty() {
            session.assign_id(generate_session_id());
        }
        self.save_record(session).await?;

        let encoded = self
            .codecs
            .encode(session.name(), session.id())
            .map_err(SessionError::Encode)?;
        cookie::set_cookie(headers, session.name(), &encoded, &session.options)
    }
}
