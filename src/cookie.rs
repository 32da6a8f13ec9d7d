//! Reading `Cookie` request headers and writing `Set-Cookie` response headers.

use std::fmt::Write as _;

use http::header::COOKIE;
use http::{HeaderMap, HeaderValue};

/// Looks up cookie `name` across every `Cookie` header of a request.
pub(crate) fn find<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|line| line.split(';'))
        .find_map(|pair| {
            let (k, v) = pair.trim().split_once('=')?;
            (k == name).then(|| v.trim_matches('"'))
        })
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SameSite {
    Lax,
    Strict,
    None,
}

impl SameSite {
    fn as_str(self) -> &'static str {
        match self {
            Self::Lax    => "Lax",
            Self::Strict => "Strict",
            Self::None   => "None",
        }
    }
}

/// Attributes shared by every cookie a middleware issues under one name.
#[derive(Clone, Debug)]
pub struct CookieSettings {
    pub name: String,
    pub path: String,
    pub http_only: bool,
    pub secure: bool,
    pub same_site: SameSite,
}

impl CookieSettings {
    /// `HttpOnly; Secure; Path=/; SameSite=Lax`, the baseline for every
    /// cookie this application sets.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            path: "/".to_owned(),
            http_only: true,
            secure: true,
            same_site: SameSite::Lax,
        }
    }

    pub fn secure(mut self, secure: bool) -> Self {
        self.secure = secure;
        self
    }

    /// Renders a `Set-Cookie` value. `max_age` of `Some(0)` deletes the cookie;
    /// `None` makes it a browser-session cookie.
    pub fn header_value(&self, value: &str, max_age: Option<i64>) -> Option<HeaderValue> {
        let mut line = format!("{}={}; Path={}", self.name, value, self.path);
        if let Some(secs) = max_age {
            let _ = write!(line, "; Max-Age={}", secs.max(0));
        }
        if self.http_only {
            line.push_str("; HttpOnly");
        }
        if self.secure {
            line.push_str("; Secure");
        }
        let _ = write!(line, "; SameSite={}", self.same_site.as_str());
        HeaderValue::from_str(&line).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_cookies_across_headers() {
        let mut headers = HeaderMap::new();
        headers.append(COOKIE, HeaderValue::from_static("theme=dark"));
        headers.append(COOKIE, HeaderValue::from_static("session=abc; csrf_token=\"xyz\""));
        assert_eq!(find(&headers, "session"), Some("abc"));
        assert_eq!(find(&headers, "csrf_token"), Some("xyz"));
        assert_eq!(find(&headers, "sess"), None);
    }

    #[test]
    fn renders_all_attributes() {
        let value = CookieSettings::new("session").header_value("abc", Some(60)).unwrap();
        assert_eq!(
            value.to_str().unwrap(),
            "session=abc; Path=/; Max-Age=60; HttpOnly; Secure; SameSite=Lax"
        );
    }

    #[test]
    fn insecure_cookies_omit_the_secure_flag() {
        let value = CookieSettings::new("s").secure(false).header_value("", Some(0)).unwrap();
        assert_eq!(value.to_str().unwrap(), "s=; Path=/; Max-Age=0; HttpOnly; SameSite=Lax");
    }
}
