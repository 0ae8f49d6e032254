//! Cookie-keyed session storage for the Armature framework.
//!
//! The browser holds only an authenticated session ID. Session values are
//! encoded with the same key material and kept in an object database
//! (etcd, Consul, Redis, or an in-process map), under `session_<id>`.
//!
//! # Features
//!
//! - `etcd` - etcd v3 JSON gateway backend (enabled by default)
//! - `consul` - Consul KV backend
//! - `redis` - Redis backend
//! - `full` - all backends
//!
//! The `memory` backend is always available.
//!
//! # Examples
//!
//! ```no_run
//! use armature_session::*;
//! use http::HeaderMap;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), SessionError> {
//!     let config = SessionConfig::new(
//!         "etcd",
//!         vec!["http://127.0.0.1:2379".to_string()],
//!         "myapp",
//!     )
//!     .with_key_pair(KeyPair::generate());
//!
//!     let store = ObjdbStore::new(config).await?;
//!
//!     // request headers from the incoming request
//!     let request = HeaderMap::new();
//!     let mut session = match store.new_session(&request, "sid").await {
//!         Ok(session) => session,
//!         Err(e) => e.into_session(),
//!     };
//!
//!     session.set("user_id", 123)?;
//!
//!     // appends a Set-Cookie header carrying the encoded ID
//!     let mut response = HeaderMap::new();
//!     store.save(&mut response, &mut session).await?;
//!
//!     // logout: delete the record and expire the cookie
//!     session.destroy();
//!     store.save(&mut response, &mut session).await?;
//!
//!     Ok(())
//! }
//! ```
//!
//! # Key rotation
//!
//! Configure key pairs newest first. New cookies and records are encoded with
//! the first pair; older pairs are still accepted when decoding.
//!
//! ```
//! use armature_session::*;
//!
//! let config = SessionConfig::memory()
//!     .with_key_pair(KeyPair::generate()) // current
//!     .with_key_pair(KeyPair::generate()); // retiring
//! assert_eq!(config.key_pairs.len(), 2);
//! ```

pub mod backend;
pub mod codec;
pub mod config;
pub mod cookie;
pub mod error;
pub mod guard;
pub mod session;
pub mod store;
pub mod traits;

pub use backend::{BackendError, BackendRegistry, BackendSettings, MemoryClient, ObjdbClient};
pub use codec::{CodecChain, CodecError, KeyPair, SecureCookie, generate_random_key};
pub use config::{LoadErrorPolicy, SessionConfig};
pub use error::{LookupError, SessionError, SessionResult};
pub use guard::LockStrategy;
pub use session::{DEFAULT_MAX_AGE, SameSite, Session, SessionOptions};
pub use store::ObjdbStore;
pub use traits::{SessionStore, generate_session_id};

#[cfg(feature = "etcd")]
pub use backend::EtcdClient;

#[cfg(feature = "consul")]
pub use backend::ConsulClient;

#[cfg(feature = "redis")]
pub use backend::RedisClient;

/// Prelude for common imports.
///
/// ```
/// use armature_session::prelude::*;
/// ```
pub mod prelude {
    pub use crate::config::{LoadErrorPolicy, SessionConfig};
    pub use crate::codec::KeyPair;
    pub use crate::error::{LookupError, SessionError, SessionResult};
    pub use crate::session::{SameSite, Session, SessionOptions};
    pub use crate::store::ObjdbStore;
    pub use crate::traits::SessionStore;
}
