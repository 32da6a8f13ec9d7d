//! Radix-tree request router.
//!
//! One tree per HTTP method. O(path-length) lookup. You register a path, you
//! get a handler; the router itself is a [`Handler`], so it slots in as the
//! endpoint of a middleware chain.

use std::collections::HashMap;

use http::header::ALLOW;
use http::{HeaderValue, Method, StatusCode};
use matchit::Router as MatchitRouter;
use percent_encoding::percent_decode_str;

use crate::handler::{private, BoxFuture, BoxedHandler, ErasedHandler, Handler};
use crate::request::Request;
use crate::response::Response;

/// The application router.
///
/// Build it once at startup, then hand it to [`Chain::then`] or straight to
/// [`Server::serve`]. Each [`Router::on`] call returns `self` so
/// registrations chain naturally.
///
/// Unmatched paths get `404 Not Found`; a path registered only under other
/// methods gets `405 Method Not Allowed` with an `Allow` header. `HEAD`
/// falls back to the `GET` route.
///
/// [`Chain::then`]: crate::middleware::Chain::then
/// [`Server::serve`]: crate::Server::serve
#[derive(Default)]
pub struct Router {
    routes: HashMap<Method, MatchitRouter<BoxedHandler>>,
}

impl Router {
    pub fn new() -> Self {
        Self { routes: HashMap::new() }
    }

    /// Register a handler for a method + path pair. Returns `self` for chaining.
    ///
    /// Path parameters use `{name}` syntax and `req.param("name")` retrieves
    /// them; `{*rest}` captures the remainder of the path:
    ///
    /// ```rust,no_run
    /// # use http::Method;
    /// # use snippetbox::{Request, Response, Router};
    /// # async fn view(_: Request) -> Response { Response::text("") }
    /// # async fn create(_: Request) -> Response { Response::text("") }
    /// # async fn asset(_: Request) -> Response { Response::text("") }
    /// Router::new()
    ///     .on(Method::GET,  "/snippet/view/{id}", view)
    ///     .on(Method::POST, "/snippet/create",    create)
    ///     .on(Method::GET,  "/static/{*path}",    asset);
    /// ```
    ///
    /// # Panics
    ///
    /// Panics if `path` is malformed or conflicts with a route already
    /// registered for `method`. Routes are fixed at startup, so this is a
    /// programming error.
    pub fn on(mut self, method: Method, path: &str, handler: impl Handler) -> Self {
        self.routes
            .entry(method)
            .or_default()
            .insert(path, handler.into_boxed_handler())
            .unwrap_or_else(|e| panic!("invalid route `{path}`: {e}"));
        self
    }

    pub(crate) fn lookup(
        &self,
        method: &Method,
        path: &str,
    ) -> Option<(BoxedHandler, HashMap<String, String>)> {
        let matched = self.routes.get(method)?.at(path).ok()?;
        let params = matched
            .params
            .iter()
            .map(|(k, v)| (k.to_owned(), percent_decode_str(v).decode_utf8_lossy().into_owned()))
            .collect();
        Some((matched.value.clone(), params))
    }

    /// Methods under which `path` is registered, sorted for a stable `Allow`.
    fn allowed(&self, path: &str) -> Vec<&str> {
        let mut methods: Vec<&str> = self
            .routes
            .iter()
            .filter(|(_, tree)| tree.at(path).is_ok())
            .map(|(method, _)| method.as_str())
            .collect();
        methods.sort_unstable();
        methods
    }

    fn not_matched(&self, path: &str) -> Response {
        let allowed = self.allowed(path);
        if allowed.is_empty() {
            return Response::error(StatusCode::NOT_FOUND);
        }
        let mut res = Response::error(StatusCode::METHOD_NOT_ALLOWED);
        if let Ok(value) = HeaderValue::from_str(&allowed.join(", ")) {
            res.headers_mut().insert(ALLOW, value);
        }
        res
    }
}

impl ErasedHandler for Router {
    fn call(&self, mut req: Request) -> BoxFuture {
        let found = self.lookup(req.method(), req.path()).or_else(|| {
            (req.method() == Method::HEAD)
                .then(|| self.lookup(&Method::GET, req.path()))
                .flatten()
        });

        match found {
            Some((handler, params)) => {
                req.set_params(params);
                handler.call(req)
            }
            None => {
                let res = self.not_matched(req.path());
                Box::pin(async move { res })
            }
        }
    }
}

impl private::Sealed for Router {}

impl Handler for Router {
    fn into_boxed_handler(self) -> BoxedHandler {
        BoxedHandler::new(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn echo_id(req: Request) -> String {
        req.param("id").unwrap_or("none").to_owned()
    }

    fn router() -> BoxedHandler {
        Router::new()
            .on(Method::GET, "/", |_req: Request| async { "home" })
            .on(Method::GET, "/snippet/view/{id}", echo_id)
            .on(Method::GET, "/snippet/create", |_req: Request| async { "form" })
            .on(Method::POST, "/snippet/create", |_req: Request| async { "created" })
            .on(Method::GET, "/static/{*path}", |req: Request| async move {
                req.param("path").unwrap_or("").to_owned()
            })
            .into_boxed_handler()
    }

    async fn call(method: Method, uri: &str) -> Response {
        router().call(Request::new(method, uri.parse().unwrap())).await
    }

    #[tokio::test]
    async fn dispatches_by_method_and_path() {
        assert_eq!(call(Method::GET, "/").await.body_text(), "home");
        assert_eq!(call(Method::GET, "/snippet/create").await.body_text(), "form");
        assert_eq!(call(Method::POST, "/snippet/create").await.body_text(), "created");
    }

    #[tokio::test]
    async fn path_parameters_are_decoded() {
        assert_eq!(call(Method::GET, "/snippet/view/42").await.body_text(), "42");
        assert_eq!(call(Method::GET, "/snippet/view/a%20b").await.body_text(), "a b");
        assert_eq!(call(Method::GET, "/static/css/main.css").await.body_text(), "css/main.css");
    }

    #[tokio::test]
    async fn root_matches_exactly() {
        assert_eq!(call(Method::GET, "/missing").await.status_code(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn wrong_method_lists_the_allowed_ones() {
        let res = call(Method::DELETE, "/snippet/create").await;
        assert_eq!(res.status_code(), StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(res.header("allow"), Some("GET, POST"));

        let res = call(Method::POST, "/snippet/view/1").await;
        assert_eq!(res.header("allow"), Some("GET"));
    }

    #[tokio::test]
    async fn head_falls_back_to_get() {
        let res = call(Method::HEAD, "/snippet/view/7").await;
        assert_eq!(res.status_code(), StatusCode::OK);
        assert_eq!(res.body_text(), "7");
    }
}
