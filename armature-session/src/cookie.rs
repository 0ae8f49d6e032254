//! `Cookie` / `Set-Cookie` header handling.

use crate::error::{SessionError, SessionResult};
use crate::session::SessionOptions;
use chrono::{DateTime, Duration, Utc};
use http::header::{COOKIE, HeaderMap, HeaderValue, SET_COOKIE};

/// Find the value of cookie `name` in the request headers.
///
/// All `Cookie` headers are searched; the first match wins.
pub fn find_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| key.trim() == name)
        .map(|(_, value)| value.trim().trim_matches('"').to_string())
}

/// Render a `Set-Cookie` header value.
///
/// A positive `max_age` also sets `Expires`; a negative one expires the
/// cookie immediately.
pub fn build_cookie(name: &str, value: &str, options: &SessionOptions) -> String {
    build_cookie_at(name, value, options, Utc::now())
}

fn build_cookie_at(name: &str, value: &str, options: &SessionOptions, now: DateTime<Utc>) -> String {
    let mut cookie = format!("{}={}", name, value);

    if !options.path.is_empty() {
        cookie.push_str(&format!("; Path={}", options.path));
    }

    if let Some(ref domain) = options.domain {
        cookie.push_str(&format!("; Domain={}", domain));
    }

    if options.max_age > 0 {
        let expires = now + Duration::seconds(options.max_age);
        cookie.push_str(&format!("; Expires={}", http_date(expires)));
        cookie.push_str(&format!("; Max-Age={}", options.max_age));
    } else if options.max_age < 0 {
        let epoch = DateTime::<Utc>::from_timestamp(1, 0).unwrap_or_default();
        cookie.push_str(&format!("; Expires={}", http_date(epoch)));
        cookie.push_str("; Max-Age=0");
    }

    if options.secure {
        cookie.push_str("; Secure");
    }

    if options.http_only {
        cookie.push_str("; HttpOnly");
    }

    if let Some(same_site) = options.same_site {
        cookie.push_str(&format!("; SameSite={}", same_site.as_str()));
    }

    cookie
}

fn http_date(at: DateTime<Utc>) -> String {
    at.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

/// Append a `Set-Cookie` header.
pub fn set_cookie(
    headers: &mut HeaderMap,
    name: &str,
    value: &str,
    options: &SessionOptions,
) -> SessionResult<()> {
    let header = HeaderValue::from_str(&build_cookie(name, value, options))
        .map_err(|e| SessionError::Serialization(format!("invalid cookie header: {}", e)))?;
    headers.append(SET_COOKIE, header);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::SameSite;

    #[test]
    fn test_find_cookie() {
        let mut headers = HeaderMap::new();
        headers.insert(COOKIE, HeaderValue::from_static("theme=dark; sid=abc123; lang=en"));

        assert_eq!(find_cookie(&headers, "sid"), Some("abc123".to_string()));
        assert_eq!(find_cookie(&headers, "lang"), Some("en".to_string()));
        assert_eq!(find_cookie(&headers, "missing"), None);
    }

    #[test]
    fn test_find_cookie_across_headers() {
        let mut headers = HeaderMap::new();
        headers.append(COOKIE, HeaderValue::from_static("a=1"));
        headers.append(COOKIE, HeaderValue::from_static("sid=\"quoted\""));

        assert_eq!(find_cookie(&headers, "sid"), Some("quoted".to_string()));
        assert_eq!(find_cookie(&HeaderMap::new(), "sid"), None);
    }

    #[test]
    fn test_find_cookie_exact_name() {
        let mut headers = HeaderMap::new();
        headers.insert(COOKIE, HeaderValue::from_static("sid_old=1; sid=2"));
        assert_eq!(find_cookie(&headers, "sid"), Some("2".to_string()));
    }

    #[test]
    fn test_build_cookie_with_max_age() {
        let now = DateTime::<Utc>::from_timestamp(1_700_000_000, 0).unwrap();
        let options = SessionOptions::default()
            .with_max_age(3600)
            .with_domain("example.com")
            .with_secure(true)
            .with_http_only(true)
            .with_same_site(SameSite::Lax);

        let cookie = build_cookie_at("sid", "value", &options, now);
        assert_eq!(
            cookie,
            "sid=value; Path=/; Domain=example.com; Expires=Tue, 14 Nov 2023 23:13:20 GMT; \
             Max-Age=3600; Secure; HttpOnly; SameSite=Lax"
        );
    }

    #[test]
    fn test_build_cookie_deletion() {
        let options = SessionOptions::default().with_max_age(-1);
        let cookie = build_cookie("sid", "", &options);
        assert_eq!(
            cookie,
            "sid=; Path=/; Expires=Thu, 01 Jan 1970 00:00:01 GMT; Max-Age=0"
        );
    }

    #[test]
    fn test_build_session_cookie() {
        let options = SessionOptions::default().with_max_age(0);
        assert_eq!(build_cookie("sid", "v", &options), "sid=v; Path=/");
    }

    #[test]
    fn test_set_cookie_appends() {
        let mut headers = HeaderMap::new();
        set_cookie(&mut headers, "a", "1", &SessionOptions::default()).unwrap();
        set_cookie(&mut headers, "b", "2", &SessionOptions::default()).unwrap();
        assert_eq!(headers.get_all(SET_COOKIE).iter().count(), 2);
    }
}
