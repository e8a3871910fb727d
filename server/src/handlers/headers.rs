use anyhow::{Result, anyhow};
use hyper::header::{HeaderMap, HeaderValue};
use std::time::Duration;
use tracing::{debug, warn};

/// Extract a header value as a string.
pub fn get_header_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
}

/// Extract a cookie value by name.
pub fn get_cookie(headers: &HeaderMap, cookie_name: &str) -> Option<String> {
    headers
        .get("cookie")
        .and_then(|v| v.to_str().ok())
        .and_then(|cookies| {
            cookies.split(';').find_map(|cookie| {
                let mut parts = cookie.trim().splitn(2, '=');
                let name = parts.next()?.trim();
                let value = parts.next()?.trim();
                if name == cookie_name {
                    debug!("Cookie found: {}", cookie_name);
                    Some(value.to_string())
                } else {
                    None
                }
            })
        })
}

/// The bearer session id for a request: the `Authorization: Bearer` header
/// wins, the `session_id` cookie is the browser fallback.
pub fn get_bearer_session(headers: &HeaderMap) -> Option<String> {
    if let Some(auth) = get_header_value(headers, "authorization") {
        if let Some(token) = auth.strip_prefix("Bearer ").or_else(|| auth.strip_prefix("bearer ")) {
            let token = token.trim();
            if !token.is_empty() {
                return Some(token.to_string());
            }
        }
    }
    get_cookie(headers, "session_id")
}

/// Set a cookie with options.
pub fn set_cookie(
    name: &str,
    value: &str,
    max_age: Option<Duration>,
    path: Option<&str>,
    http_only: bool,
) -> Result<HeaderValue> {
    let mut cookie = format!("{}={}", name, value);

    if let Some(age) = max_age {
        cookie.push_str(&format!("; Max-Age={}", age.as_secs()));
    }

    if let Some(p) = path {
        cookie.push_str(&format!("; Path={}", p));
    }

    if http_only {
        cookie.push_str("; HttpOnly");
    }

    cookie.push_str("; SameSite=Lax");

    HeaderValue::from_str(&cookie).map_err(|e| {
        warn!("Failed to create cookie header for {}: {}", name, e);
        anyhow!("Invalid cookie value: {}", e)
    })
}

/// The session cookie set after login / a completed OAuth flow.
pub fn session_cookie(session_id: &str, lifetime_secs: i64) -> Result<HeaderValue> {
    let max_age = if lifetime_secs == 0 {
        None
    } else {
        Some(Duration::from_secs(lifetime_secs as u64))
    };
    set_cookie("session_id", session_id, max_age, Some("/"), true)
}

/// An immediately expiring session cookie, set on logout.
pub fn clear_session_cookie() -> Result<HeaderValue> {
    set_cookie("session_id", "", Some(Duration::ZERO), Some("/"), true)
}

/// The short-lived nonce cookie set alongside the OAuth redirect.
pub fn nonce_cookie(nonce: &str) -> Result<HeaderValue> {
    set_cookie("oauth_nonce", nonce, Some(Duration::from_secs(600)), Some("/auth"), true)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers_with(name: &str, value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            hyper::header::HeaderName::from_bytes(name.as_bytes()).unwrap(),
            HeaderValue::from_str(value).unwrap(),
        );
        headers
    }

    #[test]
    fn bearer_header_wins_over_cookie() {
        let mut headers = headers_with("authorization", "Bearer abc-123");
        headers.insert("cookie", HeaderValue::from_static("session_id=from-cookie"));
        assert_eq!(get_bearer_session(&headers).as_deref(), Some("abc-123"));
    }

    #[test]
    fn cookie_is_the_fallback() {
        let headers = headers_with("cookie", "theme=dark; session_id=from-cookie; lang=en");
        assert_eq!(get_bearer_session(&headers).as_deref(), Some("from-cookie"));
    }

    #[test]
    fn empty_bearer_falls_through() {
        let mut headers = headers_with("authorization", "Bearer ");
        headers.insert("cookie", HeaderValue::from_static("session_id=s1"));
        assert_eq!(get_bearer_session(&headers).as_deref(), Some("s1"));
    }

    #[test]
    fn no_credentials_is_none() {
        assert_eq!(get_bearer_session(&HeaderMap::new()), None);
    }

    #[test]
    fn session_cookie_formats_max_age() {
        let cookie = session_cookie("sid", 3600).unwrap();
        let text = cookie.to_str().unwrap();
        assert!(text.starts_with("session_id=sid"));
        assert!(text.contains("Max-Age=3600"));
        assert!(text.contains("HttpOnly"));

        // Never-expiring sessions get a browser-session cookie.
        let cookie = session_cookie("sid", 0).unwrap();
        assert!(!cookie.to_str().unwrap().contains("Max-Age"));
    }
}
