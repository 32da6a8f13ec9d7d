//! Security response headers.

use http::header::{
    CONTENT_SECURITY_POLICY, REFERRER_POLICY, X_CONTENT_TYPE_OPTIONS, X_FRAME_OPTIONS,
    X_XSS_PROTECTION,
};
use http::{HeaderMap, HeaderValue};

use super::{Middleware, Next};
use crate::handler::BoxFuture;
use crate::request::Request;

const DEFAULT_CSP: &str =
    "default-src 'self'; style-src 'self' fonts.googleapis.com; font-src fonts.gstatic.com";

/// Sets a fixed set of security headers on every response that passes
/// through it, overriding whatever the handler set.
///
/// | Header | Value |
/// |---|---|
/// | `content-security-policy` | configurable, self-only by default |
/// | `referrer-policy` | `origin-when-cross-origin` |
/// | `x-content-type-options` | `nosniff` |
/// | `x-frame-options` | `deny` |
/// | `x-xss-protection` | `0` (legacy auditor disabled) |
#[derive(Clone, Debug)]
pub struct SecureHeaders {
    content_security_policy: HeaderValue,
}

impl SecureHeaders {
    pub fn new() -> Self {
        Self { content_security_policy: HeaderValue::from_static(DEFAULT_CSP) }
    }

    pub fn content_security_policy(mut self, policy: HeaderValue) -> Self {
        self.content_security_policy = policy;
        self
    }

    fn apply(&self, headers: &mut HeaderMap) {
        headers.insert(CONTENT_SECURITY_POLICY, self.content_security_policy.clone());
        headers.insert(REFERRER_POLICY, HeaderValue::from_static("origin-when-cross-origin"));
        headers.insert(X_CONTENT_TYPE_OPTIONS, HeaderValue::from_static("nosniff"));
        headers.insert(X_FRAME_OPTIONS, HeaderValue::from_static("deny"));
        headers.insert(X_XSS_PROTECTION, HeaderValue::from_static("0"));
    }
}

impl Default for SecureHeaders {
    fn default() -> Self {
        Self::new()
    }
}

impl Middleware for SecureHeaders {
    fn handle(&self, req: Request, next: Next) -> BoxFuture {
        let this = self.clone();
        Box::pin(async move {
            let mut res = next.run(req).await;
            this.apply(res.headers_mut());
            res
        })
    }
}
