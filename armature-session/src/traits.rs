//! Session store trait definition.

use crate::error::{LookupError, SessionResult};
use crate::session::Session;
use async_trait::async_trait;
use data_encoding::BASE32_NOPAD;
use http::HeaderMap;
use rand::RngCore;

/// Number of random bytes in a session ID.
pub const SESSION_ID_BYTES: usize = 32;

/// Cookie-keyed session store.
///
/// The cookie carries only an authenticated session ID; values live in the
/// store's backend.
///
/// # Examples
///
/// ```
/// use armature_session::*;
/// use http::HeaderMap;
///
/// # async fn handle(store: &impl SessionStore, request: &HeaderMap) -> SessionResult<HeaderMap> {
/// // a bad cookie still yields a fresh session
/// let mut session = match store.new_session(request, "sid").await {
///     Ok(session) => session,
///     Err(e) => e.into_session(),
/// };
///
/// session.set("user_id", 123)?;
///
/// let mut response = HeaderMap::new();
/// store.save(&mut response, &mut session).await?;
/// # Ok(response)
/// # }
/// ```
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Look up the session named `name` from the request's `Cookie` headers.
    ///
    /// Returns a new, empty session when no cookie is present or the record
    /// is missing. On failure the error still carries an empty session.
    async fn new_session(&self, headers: &HeaderMap, name: &str) -> Result<Session, LookupError>;

    /// Persist the session and append its `Set-Cookie` header.
    ///
    /// A negative `max_age` deletes the session instead.
    async fn save(&self, headers: &mut HeaderMap, session: &mut Session) -> SessionResult<()>;
}

/// Generate a new session ID: 32 random bytes, base-32 without padding.
pub fn generate_session_id() -> String {
    let mut bytes = [0u8; SESSION_ID_BYTES];
    rand::rng().fill_bytes(&mut bytes);
    BASE32_NOPAD.encode(&bytes)
}
