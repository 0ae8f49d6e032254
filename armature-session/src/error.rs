//! Error types for session operations.

use crate::backend::BackendError;
use crate::codec::CodecError;
use crate::session::Session;
use thiserror::Error;

/// Result type for session operations.
pub type SessionResult<T> = Result<T, SessionError>;

/// Session-specific errors.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The session cookie could not be authenticated or decoded
    #[error("Cookie decode error: {0}")]
    CookieDecode(CodecError),

    /// The persisted record could not be authenticated or decoded
    #[error("Record decode error: {0}")]
    RecordDecode(CodecError),

    /// Encoding session values or the session ID failed
    #[error("Encode error: {0}")]
    Encode(CodecError),

    /// Object database error
    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Deserialization error
    #[error("Deserialization error: {0}")]
    Deserialization(String),

    /// No usable object database
    #[error("No backend available: {0}")]
    NoBackend(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl SessionError {
    /// Whether this error means the backend had no record for the key.
    pub fn is_not_found(&self) -> bool {
        matches!(self, SessionError::Backend(BackendError::NotFound(_)))
    }
}

/// Failed session lookup.
///
/// A failed lookup still yields a usable, empty session (marked new) so the
/// caller can carry on and issue a fresh cookie on save.
#[derive(Debug, Error)]
#[error("{source}")]
pub struct LookupError {
    session: Session,
    #[source]
    source: SessionError,
}

impl LookupError {
    pub(crate) fn new(session: Session, source: SessionError) -> Self {
        Self { session, source }
    }

    /// The underlying error.
    pub fn error(&self) -> &SessionError {
        &self.source
    }

    /// The empty session produced by the failed lookup.
    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Take the empty session, discarding the error.
    pub fn into_session(self) -> Session {
        self.session
    }

    /// Split into the empty session and the error.
    pub fn into_parts(self) -> (Session, SessionError) {
        (self.session, self.source)
    }
}
