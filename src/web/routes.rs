use std::future::Future;
use std::sync::Arc;

use http::Method;

use super::{handlers, static_files, App};
use crate::auth::{Authenticate, RequireAuthentication};
use crate::handler::{BoxedHandler, Handler};
use crate::middleware::{Chain, CsrfGuard, LogRequest, Recover, SecureHeaders};
use crate::request::Request;
use crate::response::Response;
use crate::router::Router;
use crate::session::SessionManager;

/// Adapts `async fn(Arc<App>, Request)` to a route handler.
fn with_app<F, Fut>(app: Arc<App>, f: F) -> impl Handler
where
    F: Fn(Arc<App>, Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Response> + Send + 'static,
{
    move |req: Request| f(Arc::clone(&app), req)
}

/// Builds the complete request pipeline.
///
/// ```text
/// recover ─▶ log ─▶ secure headers ─▶ router
///                                       ├─ /static/{*path}          static files
///                                       ├─ public pages             session ─▶ csrf ─▶ authenticate
///                                       └─ protected pages          session ─▶ csrf ─▶ authenticate ─▶ require auth
/// ```
pub fn routes(app: Arc<App>) -> BoxedHandler {
    let sessions = SessionManager::new(Arc::clone(&app.sessions))
        .lifetime(app.session_lifetime)
        .cookie_secure(app.cookie_secure);

    let dynamic = Chain::new()
        .append(sessions)
        .append(CsrfGuard::new(app.cookie_secure))
        .append(Authenticate::new(Arc::clone(&app.users)));
    let protected = dynamic.clone().append(RequireAuthentication);

    let router = Router::new()
        .on(Method::GET, "/static/{*path}", with_app(app.clone(), static_files::serve))
        .on(Method::GET, "/", dynamic.then(with_app(app.clone(), handlers::home)))
        .on(Method::GET, "/snippet/view/{id}", dynamic.then(with_app(app.clone(), handlers::snippet_view)))
        .on(Method::GET, "/user/signup", dynamic.then(with_app(app.clone(), handlers::user_signup)))
        .on(Method::POST, "/user/signup", dynamic.then(with_app(app.clone(), handlers::user_signup_post)))
        .on(Method::GET, "/user/login", dynamic.then(with_app(app.clone(), handlers::user_login)))
        .on(Method::POST, "/user/login", dynamic.then(with_app(app.clone(), handlers::user_login_post)))
        .on(Method::GET, "/snippet/create", protected.then(with_app(app.clone(), handlers::snippet_create)))
        .on(Method::POST, "/snippet/create", protected.then(with_app(app.clone(), handlers::snippet_create_post)))
        .on(Method::POST, "/user/logout", protected.then(with_app(app, handlers::user_logout_post)));

    Chain::new()
        .append(Recover::new())
        .append(LogRequest)
        .append(SecureHeaders::new())
        .then(router)
}
