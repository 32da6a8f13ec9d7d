//! Cross-site request forgery protection.
//!
//! The real token is 32 random bytes kept in an `HttpOnly` cookie. Pages
//! never see it directly: each request gets a freshly masked copy
//! (`pad ‖ pad XOR token`, base64) in [`Context::csrf_token`], so the value
//! embedded in HTML changes on every render.
//!
//! State-changing requests (`POST`, `PUT`, `PATCH`, `DELETE`) must echo a
//! masked token in the `csrf_token` form field or the `X-CSRF-Token` header.
//! Anything else is rejected with `400 Bad Request` before the downstream
//! chain runs.
//!
//! [`Context::csrf_token`]: crate::request::Context::csrf_token

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use http::header::{SET_COOKIE, VARY};
use http::{HeaderValue, Method, StatusCode};
use rand::RngCore;
use rand::rngs::OsRng;
use subtle::ConstantTimeEq;
use tracing::warn;

use super::{Middleware, Next};
use crate::cookie::CookieSettings;
use crate::form;
use crate::handler::BoxFuture;
use crate::request::Request;
use crate::response::Response;

/// Form field carrying the masked token.
pub const CSRF_FIELD: &str = "csrf_token";
/// Header carrying the masked token, for scripted clients.
pub const CSRF_HEADER: &str = "x-csrf-token";

const TOKEN_LEN: usize = 32;
/// One year, matching the usual lifetime of anti-forgery cookies.
const COOKIE_MAX_AGE: i64 = 365 * 24 * 60 * 60;

type Token = [u8; TOKEN_LEN];

fn generate() -> Token {
    let mut token = [0u8; TOKEN_LEN];
    OsRng.fill_bytes(&mut token);
    token
}

fn decode_real(cookie: &str) -> Option<Token> {
    STANDARD.decode(cookie).ok()?.try_into().ok()
}

fn mask(token: &Token) -> String {
    let pad = generate();
    let mut out = Vec::with_capacity(TOKEN_LEN * 2);
    out.extend_from_slice(&pad);
    out.extend(pad.iter().zip(token).map(|(p, t)| p ^ t));
    STANDARD.encode(out)
}

fn unmask(sent: &str) -> Option<Token> {
    let raw = STANDARD.decode(sent.trim()).ok()?;
    if raw.len() != TOKEN_LEN * 2 {
        return None;
    }
    let (pad, masked) = raw.split_at(TOKEN_LEN);
    let mut token = [0u8; TOKEN_LEN];
    for (slot, (p, m)) in token.iter_mut().zip(pad.iter().zip(masked)) {
        *slot = p ^ m;
    }
    Some(token)
}

fn verify(real: &Token, sent: Option<&str>) -> bool {
    sent.and_then(unmask)
        .is_some_and(|candidate| bool::from(candidate[..].ct_eq(&real[..])))
}

fn is_state_changing(method: &Method) -> bool {
    matches!(*method, Method::POST | Method::PUT | Method::PATCH | Method::DELETE)
}

/// Issues and verifies anti-forgery tokens.
///
/// Place it after the session middleware: when the session token is renewed
/// during a request (login, logout) the guard rotates its own token too.
#[derive(Clone, Debug)]
pub struct CsrfGuard {
    cookie: CookieSettings,
}

impl CsrfGuard {
    pub fn new(secure: bool) -> Self {
        Self { cookie: CookieSettings::new("csrf_token").secure(secure) }
    }

    fn set_cookie(&self, res: &mut Response, token: &Token) {
        if let Some(value) = self.cookie.header_value(&STANDARD.encode(token), Some(COOKIE_MAX_AGE)) {
            res.headers_mut().append(SET_COOKIE, value);
            res.headers_mut().append(VARY, HeaderValue::from_static("Cookie"));
        }
    }

    fn submitted(req: &Request) -> Option<String> {
        if let Some(header) = req.header(CSRF_HEADER) {
            return Some(header.to_owned());
        }
        let pairs = form::parse_pairs(req.body()).ok()?;
        form::first(&pairs, CSRF_FIELD).map(str::to_owned)
    }
}

impl Middleware for CsrfGuard {
    fn handle(&self, mut req: Request, next: Next) -> BoxFuture {
        let this = self.clone();
        Box::pin(async move {
            let existing = req.cookie(&this.cookie.name).and_then(decode_real);
            let issue = existing.is_none();
            let real = existing.unwrap_or_else(generate);

            if is_state_changing(req.method()) && !verify(&real, Self::submitted(&req).as_deref()) {
                warn!(method = %req.method(), uri = %req.uri(), "csrf token missing or invalid");
                let mut res = Response::error(StatusCode::BAD_REQUEST);
                if issue {
                    this.set_cookie(&mut res, &real);
                }
                return res;
            }

            req.context_mut().csrf_token = Some(mask(&real));
            let session = req.session().cloned();

            let mut res = next.run(req).await;

            if session.is_some_and(|s| s.was_renewed()) {
                this.set_cookie(&mut res, &generate());
            } else if issue {
                this.set_cookie(&mut res, &real);
            }
            res
        })
    }
}
