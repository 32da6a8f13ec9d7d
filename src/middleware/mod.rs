//! Middleware layer.
//!
//! Middleware intercepts requests on the way in and responses on the way
//! out. Each one receives the request plus a [`Next`] handle for the rest of
//! the chain; code before `next.run(req).await` runs on the way down, code
//! after it runs on the way back up, and returning without calling `next`
//! short-circuits everything downstream.
//!
//! ```text
//! Chain [recover, log, headers] .then(router)
//!
//!   recover ─▶ log ─▶ headers ─▶ router ─▶ handler
//!   recover ◀─ log ◀─ headers ◀─ router ◀──┘
//! ```
//!
//! [`Chain::then`] folds the list right-to-left into nested
//! [`BoxedHandler`]s. The result is a snapshot: appending to the chain later
//! never changes handlers already built from it, so route groups can share a
//! common prefix and branch off.
//!
//! Built-in middleware:
//! - [`Recover`]: converts panics anywhere downstream into a 500
//! - [`LogRequest`]: one structured log line per request
//! - [`SecureHeaders`]: fixed set of security response headers
//! - [`CsrfGuard`]: anti-forgery token issue and verification
//!
//! Session and authentication middleware live in [`crate::session`] and
//! [`crate::auth`].

mod csrf;
mod headers;
mod log;
mod recover;

use std::future::Future;
use std::sync::Arc;

use crate::handler::{BoxFuture, BoxedHandler, ErasedHandler, Handler};
use crate::request::Request;
use crate::response::Response;

pub use csrf::{CsrfGuard, CSRF_FIELD, CSRF_HEADER};
pub use headers::SecureHeaders;
pub use log::LogRequest;
pub use recover::Recover;

/// A request/response interceptor.
///
/// Implementations clone whatever state they need into the returned future;
/// `&self` is shared by every request running through the chain.
pub trait Middleware: Send + Sync + 'static {
    fn handle(&self, req: Request, next: Next) -> BoxFuture;
}

/// The remainder of the chain, as seen from one middleware.
#[derive(Clone, Debug)]
pub struct Next {
    inner: BoxedHandler,
}

impl Next {
    /// Runs every later middleware and finally the endpoint.
    pub fn run(self, req: Request) -> BoxFuture {
        self.inner.call(req)
    }
}

/// One middleware wrapped around the handler that follows it.
struct Layer {
    middleware: Arc<dyn Middleware>,
    next: BoxedHandler,
}

impl ErasedHandler for Layer {
    fn call(&self, req: Request) -> BoxFuture {
        self.middleware.handle(req, Next { inner: self.next.clone() })
    }
}

/// An ordered list of middleware.
///
/// Order matters: the first middleware appended is the outermost, so it runs
/// first on the way in and last on the way out.
#[derive(Clone, Default)]
pub struct Chain {
    layers: Vec<Arc<dyn Middleware>>,
}

impl Chain {
    pub fn new() -> Self {
        Self { layers: Vec::new() }
    }

    /// Adds `middleware` after every middleware already in the chain.
    pub fn append(mut self, middleware: impl Middleware) -> Self {
        self.layers.push(Arc::new(middleware));
        self
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    /// Wraps `endpoint` in every middleware of the chain.
    ///
    /// An empty chain returns the endpoint itself, unwrapped.
    pub fn then(&self, endpoint: impl Handler) -> BoxedHandler {
        self.layers
            .iter()
            .rev()
            .fold(endpoint.into_boxed_handler(), |next, middleware| {
                BoxedHandler::new(Layer { middleware: Arc::clone(middleware), next })
            })
    }
}

// ── Closure middleware ────────────────────────────────────────────────────────

/// Middleware built from an async closure. See [`from_fn`].
pub struct FromFn<F>(F);

/// Turns `async fn(Request, Next) -> Response` into a [`Middleware`].
///
/// ```rust
/// use http::{header, HeaderValue};
/// use snippetbox::middleware::{from_fn, Chain, Next};
/// use snippetbox::{Request, Response};
///
/// async fn powered_by(req: Request, next: Next) -> Response {
///     let mut res = next.run(req).await;
///     res.headers_mut().insert(header::SERVER, HeaderValue::from_static("snippetbox"));
///     res
/// }
///
/// let chain = Chain::new().append(from_fn(powered_by));
/// # let _ = chain;
/// ```
pub fn from_fn<F, Fut>(f: F) -> FromFn<F>
where
    F: Fn(Request, Next) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Response> + Send + 'static,
{
    FromFn(f)
}

impl<F, Fut> Middleware for FromFn<F>
where
    F: Fn(Request, Next) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Response> + Send + 'static,
{
    fn handle(&self, req: Request, next: Next) -> BoxFuture {
        Box::pin((self.0)(req, next))
    }
}
