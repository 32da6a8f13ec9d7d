//! Session-backed authentication.
//!
//! The session stores only the user id. [`Authenticate`] turns that id into
//! the request's [`Context`](crate::request::Context) after confirming the
//! user still exists; [`RequireAuthentication`] gates protected routes on it.

use std::sync::Arc;

use http::header::{CACHE_CONTROL, LOCATION};
use http::{HeaderValue, StatusCode};
use tokio::time::Instant;
use tracing::debug;

use crate::error::{server_error, within, Error};
use crate::handler::BoxFuture;
use crate::middleware::{Middleware, Next};
use crate::models::UserStore;
use crate::request::Request;
use crate::response::Response;
use crate::session::{Renewal, Session};

/// Session key holding the id of the logged-in user.
pub const AUTH_USER_ID_KEY: &str = "authenticatedUserId";

/// Where unauthenticated requests to protected routes are sent.
pub const LOGIN_PATH: &str = "/user/login";

/// Marks the request authenticated when its session names an existing user.
///
/// Runs after the session middleware. A failing existence check is a 500,
/// never a silent downgrade to anonymous.
#[derive(Clone)]
pub struct Authenticate {
    users: Arc<dyn UserStore>,
}

impl Authenticate {
    pub fn new(users: Arc<dyn UserStore>) -> Self {
        Self { users }
    }
}

impl Middleware for Authenticate {
    fn handle(&self, mut req: Request, next: Next) -> BoxFuture {
        let users = Arc::clone(&self.users);
        Box::pin(async move {
            let id = req.session().map_or(0, |s| s.get_int(AUTH_USER_ID_KEY));
            if id == 0 {
                return next.run(req).await;
            }

            match within(req.deadline(), users.exists(id)).await {
                Ok(true) => {
                    let ctx = req.context_mut();
                    ctx.authenticated = true;
                    ctx.user_id = Some(id);
                }
                Ok(false) => debug!(user_id = id, "session names a user that no longer exists"),
                Err(err) => return server_error(req.method(), req.uri(), &err),
            }
            next.run(req).await
        })
    }
}

/// Redirects anonymous requests to the login page and keeps authenticated
/// pages out of shared caches.
#[derive(Clone, Copy, Debug, Default)]
pub struct RequireAuthentication;

impl Middleware for RequireAuthentication {
    fn handle(&self, req: Request, next: Next) -> BoxFuture {
        Box::pin(async move {
            if !req.context().is_authenticated() {
                return Response::builder()
                    .status(StatusCode::SEE_OTHER)
                    .header(LOCATION, HeaderValue::from_static(LOGIN_PATH))
                    .header(CACHE_CONTROL, HeaderValue::from_static("no-store"))
                    .no_body();
            }

            let mut res = next.run(req).await;
            res.headers_mut().insert(CACHE_CONTROL, HeaderValue::from_static("no-store"));
            res
        })
    }
}

/// Elevates the session to `user_id`, on a fresh token.
pub async fn login(session: &Session, user_id: i64, deadline: Instant) -> Result<(), Error> {
    session.renew_token(Renewal::Elevate, deadline).await?;
    session.put(AUTH_USER_ID_KEY, user_id);
    Ok(())
}

/// Drops the user id and moves the session to a fresh token.
pub async fn logout(session: &Session, deadline: Instant) -> Result<(), Error> {
    session.remove(AUTH_USER_ID_KEY);
    session.renew_token(Renewal::Demote, deadline).await
}
