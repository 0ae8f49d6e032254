//! Session data and cookie options.

use crate::error::{SessionError, SessionResult};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Default cookie lifetime: 30 days.
pub const DEFAULT_MAX_AGE: i64 = 86400 * 30;

/// Cookie SameSite attribute
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SameSite {
    Strict,
    Lax,
    None,
}

impl SameSite {
    pub fn as_str(&self) -> &'static str {
        match self {
            SameSite::Strict => "Strict",
            SameSite::Lax => "Lax",
            SameSite::None => "None",
        }
    }
}

/// Cookie attributes attached to a session.
///
/// `max_age` is in seconds. Zero produces a browser-session cookie, a
/// negative value marks the session for deletion on the next save.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionOptions {
    /// Cookie path
    pub path: String,
    /// Cookie domain
    pub domain: Option<String>,
    /// Cookie lifetime in seconds
    pub max_age: i64,
    /// Cookie secure flag (HTTPS only)
    pub secure: bool,
    /// Cookie HttpOnly flag
    pub http_only: bool,
    /// Cookie SameSite policy
    pub same_site: Option<SameSite>,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            path: "/".to_string(),
            domain: None,
            max_age: DEFAULT_MAX_AGE,
            secure: false,
            http_only: false,
            same_site: None,
        }
    }
}

impl SessionOptions {
    /// Set cookie path
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    /// Set cookie domain
    pub fn with_domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = Some(domain.into());
        self
    }

    /// Set cookie lifetime in seconds
    pub fn with_max_age(mut self, max_age: i64) -> Self {
        self.max_age = max_age;
        self
    }

    /// Set cookie secure flag
    pub fn with_secure(mut self, secure: bool) -> Self {
        self.secure = secure;
        self
    }

    /// Set cookie HttpOnly flag
    pub fn with_http_only(mut self, http_only: bool) -> Self {
        self.http_only = http_only;
        self
    }

    /// Set cookie SameSite policy
    pub fn with_same_site(mut self, same_site: SameSite) -> Self {
        self.same_site = Some(same_site);
        self
    }
}

/// A named session.
///
/// The ID is empty until the session is first saved or recovered from a
/// cookie, and never changes afterwards.
#[derive(Debug, Clone)]
pub struct Session {
    id: String,
    name: String,
    values: HashMap<String, serde_json::Value>,
    /// Cookie options; set `max_age` negative to destroy the session
    pub options: SessionOptions,
    is_new: bool,
}

impl Session {
    /// Create an empty, new session.
    pub fn new(name: impl Into<String>, options: SessionOptions) -> Self {
        Self {
            id: String::new(),
            name: name.into(),
            values: HashMap::new(),
            options,
            is_new: true,
        }
    }

    /// Session identifier, empty for a session that was never saved.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Session name, also the cookie name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether no persisted state was recovered for this session.
    pub fn is_new(&self) -> bool {
        self.is_new
    }

    /// All session values.
    pub fn values(&self) -> &HashMap<String, serde_json::Value> {
        &self.values
    }

    /// Get a value from the session data.
    pub fn get<T: for<'de> Deserialize<'de>>(&self, key: &str) -> Option<T> {
        self.values
            .get(key)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    /// Set a value in the session data.
    pub fn set<T: Serialize>(&mut self, key: &str, value: T) -> SessionResult<()> {
        let json_value =
            serde_json::to_value(value).map_err(|e| SessionError::Serialization(e.to_string()))?;
        self.values.insert(key.to_string(), json_value);
        Ok(())
    }

    /// Remove a value from the session data.
    pub fn remove(&mut self, key: &str) -> Option<serde_json::Value> {
        self.values.remove(key)
    }

    /// Check if a key exists in the session data.
    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// Clear all session data.
    pub fn clear(&mut self) {
        self.values.clear();
    }

    /// Mark the session for deletion on the next save.
    pub fn destroy(&mut self) {
        self.options.max_age = -1;
    }

    pub(crate) fn assign_id(&mut self, id: String) {
        debug_assert!(self.id.is_empty(), "session ID is immutable once set");
        self.id = id;
    }

    pub(crate) fn set_is_new(&mut self, is_new: bool) {
        self.is_new = is_new;
    }

    pub(crate) fn replace_values(&mut self, values: HashMap<String, serde_json::Value>) {
        self.values = values;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_options() {
        let options = SessionOptions::default();
        assert_eq!(options.path, "/");
        assert_eq!(options.max_age, 86400 * 30);
        assert!(options.domain.is_none());
    }

    #[test]
    fn test_new_session_is_empty() {
        let session = Session::new("app", SessionOptions::default());
        assert!(session.is_new());
        assert!(session.id().is_empty());
        assert!(session.values().is_empty());
        assert_eq!(session.name(), "app");
    }

    #[test]
    fn test_typed_values() {
        let mut session = Session::new("app", SessionOptions::default());
        session.set("user_id", 123).unwrap();
        session.set("roles", vec!["admin", "ops"]).unwrap();

        assert_eq!(session.get::<i32>("user_id"), Some(123));
        assert_eq!(
            session.get::<Vec<String>>("roles"),
            Some(vec!["admin".to_string(), "ops".to_string()])
        );
        assert_eq!(session.get::<String>("user_id"), None);
        assert!(session.contains("roles"));

        session.remove("roles");
        assert!(!session.contains("roles"));

        session.clear();
        assert!(session.values().is_empty());
    }

    #[test]
    fn test_destroy_marks_negative_max_age() {
        let mut session = Session::new("app", SessionOptions::default());
        session.destroy();
        assert!(session.options.max_age < 0);
    }

    #[test]
    fn test_options_builder() {
        let options = SessionOptions::default()
            .with_path("/app")
            .with_domain("example.com")
            .with_max_age(60)
            .with_secure(true)
            .with_http_only(true)
            .with_same_site(SameSite::Lax);

        assert_eq!(options.path, "/app");
        assert_eq!(options.domain.as_deref(), Some("example.com"));
        assert_eq!(options.max_age, 60);
        assert!(options.secure && options.http_only);
        assert_eq!(options.same_site, Some(SameSite::Lax));
    }
}
