//! Incoming HTTP request type and its per-request [`Context`].

use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::Duration;

use bytes::Bytes;
use http::{HeaderMap, HeaderName, HeaderValue, Method, Uri, Version};
use tokio::time::Instant;

use crate::cookie;
use crate::session::Session;

/// Session key under which the flash message is stored.
pub const FLASH_KEY: &str = "flash";

/// Deadline given to requests built outside the server (tests, embedding).
const DEFAULT_BUDGET: Duration = Duration::from_secs(10);

/// Request-scoped state filled in by middleware and read by handlers.
///
/// Every request starts with a fresh, anonymous context; it is never shared
/// between requests.
#[derive(Clone, Debug, Default)]
pub struct Context {
    pub(crate) authenticated: bool,
    pub(crate) user_id: Option<i64>,
    pub(crate) csrf_token: Option<String>,
    flash_taken: bool,
}

impl Context {
    /// `true` once the authentication middleware confirmed the session's user.
    pub fn is_authenticated(&self) -> bool {
        self.authenticated
    }

    /// The confirmed user id; `None` for anonymous requests.
    pub fn user_id(&self) -> Option<i64> {
        self.user_id
    }

    /// The masked CSRF token to embed in forms. Empty when the CSRF guard is
    /// not part of the route's chain.
    pub fn csrf_token(&self) -> &str {
        self.csrf_token.as_deref().unwrap_or("")
    }
}

/// An incoming HTTP request with its body fully buffered.
pub struct Request {
    method: Method,
    uri: Uri,
    version: Version,
    headers: HeaderMap,
    body: Bytes,
    params: HashMap<String, String>,
    remote_addr: Option<SocketAddr>,
    deadline: Instant,
    context: Context,
    session: Option<Session>,
}

impl Request {
    /// Builds a request with an empty body and a default deadline.
    pub fn new(method: Method, uri: Uri) -> Self {
        Self {
            method,
            uri,
            version: Version::HTTP_11,
            headers: HeaderMap::new(),
            body: Bytes::new(),
            params: HashMap::new(),
            remote_addr: None,
            deadline: Instant::now() + DEFAULT_BUDGET,
            context: Context::default(),
            session: None,
        }
    }

    pub(crate) fn from_parts(
        parts: http::request::Parts,
        body: Bytes,
        remote_addr: SocketAddr,
        deadline: Instant,
    ) -> Self {
        Self {
            method: parts.method,
            uri: parts.uri,
            version: parts.version,
            headers: parts.headers,
            body,
            params: HashMap::new(),
            remote_addr: Some(remote_addr),
            deadline,
            context: Context::default(),
            session: None,
        }
    }

    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.append(name, value);
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    pub fn with_remote_addr(mut self, addr: SocketAddr) -> Self {
        self.remote_addr = Some(addr);
        self
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = deadline;
        self
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    pub fn path(&self) -> &str {
        self.uri.path()
    }

    pub fn version(&self) -> Version {
        self.version
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    pub fn remote_addr(&self) -> Option<SocketAddr> {
        self.remote_addr
    }

    /// Point in time by which every collaborator call made on behalf of this
    /// request must have completed.
    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    /// Path and query string, e.g. `/snippet/view/3?x=1`.
    pub fn request_uri(&self) -> &str {
        self.uri.path_and_query().map_or("/", |pq| pq.as_str())
    }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Value of the cookie `name`, if the client sent one.
    pub fn cookie(&self, name: &str) -> Option<&str> {
        cookie::find(&self.headers, name)
    }

    /// Returns a named path parameter.
    ///
    /// For a route `/snippet/view/{id}`, `req.param("id")` on
    /// `/snippet/view/42` returns `Some("42")`.
    pub fn param(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }

    pub fn context(&self) -> &Context {
        &self.context
    }

    pub fn context_mut(&mut self) -> &mut Context {
        &mut self.context
    }

    /// The session attached by the session middleware.
    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    /// Pops the flash message out of the session. Only the first call per
    /// request reads the session; later calls return `None`.
    pub fn take_flash(&mut self) -> Option<String> {
        if self.context.flash_taken {
            return None;
        }
        self.context.flash_taken = true;
        self.session.as_ref().and_then(|s| s.pop_string(FLASH_KEY))
    }

    pub(crate) fn set_params(&mut self, params: HashMap<String, String>) {
        self.params = params;
    }

    pub(crate) fn set_session(&mut self, session: Session) {
        self.session = Some(session);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_uri_keeps_the_query_string() {
        let req = Request::new(Method::GET, "/snippet/view/3?debug=1".parse().unwrap());
        assert_eq!(req.path(), "/snippet/view/3");
        assert_eq!(req.request_uri(), "/snippet/view/3?debug=1");
    }

    #[test]
    fn fresh_context_is_anonymous() {
        let req = Request::new(Method::GET, "/".parse().unwrap());
        assert!(!req.context().is_authenticated());
        assert_eq!(req.context().user_id(), None);
        assert_eq!(req.context().csrf_token(), "");
    }

    #[test]
    fn cookies_are_read_from_the_cookie_header() {
        let req = Request::new(Method::GET, "/".parse().unwrap())
            .with_header(http::header::COOKIE, HeaderValue::from_static("a=1; session=abc"));
        assert_eq!(req.cookie("session"), Some("abc"));
        assert_eq!(req.cookie("missing"), None);
    }
}
