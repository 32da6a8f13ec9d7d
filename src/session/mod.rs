//! Cookie-identified server-side sessions.
//!
//! [`SessionManager`] is a middleware that loads the record named by the
//! `session` cookie, attaches a [`Session`] handle to the request and, once
//! the downstream chain has produced a response, persists whatever the
//! handlers changed:
//!
//! | status after the handler | store call      | `Set-Cookie`            |
//! |--------------------------|-----------------|-------------------------|
//! | unmodified               | none            | none                    |
//! | modified                 | `commit`        | token, `Max-Age` = TTL  |
//! | destroyed                | `delete`        | empty, `Max-Age=0`      |
//!
//! Renewal ([`Session::renew_token`]) happens immediately and atomically in
//! the store, so a request that still carries the old token can never load
//! the session again.

mod store;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, TimeZone, Utc};
use http::header::{CACHE_CONTROL, SET_COOKIE, VARY};
use http::HeaderValue;
use parking_lot::Mutex;
use rand::RngCore;
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::time::Instant;

use crate::cookie::CookieSettings;
use crate::error::{server_error, within, Error};
use crate::handler::BoxFuture;
use crate::middleware::{Middleware, Next};
use crate::request::Request;
use crate::response::Response;

pub use store::{MemoryStore, SessionStore, RENEWAL_GRACE_SECS};

pub const COOKIE_NAME: &str = "session";

/// What has happened to a session during the current request.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Status {
    Unmodified,
    Modified,
    Destroyed,
}

/// The privilege change a token renewal accompanies.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Renewal {
    /// Login. The session always moves to a token of its own.
    Elevate,
    /// Logout. Concurrent demotions of one token share a single successor.
    Demote,
}

/// The serialized form handed to the store.
#[derive(Debug, Serialize, Deserialize)]
struct Record {
    deadline: i64,
    values: BTreeMap<String, Value>,
}

#[derive(Debug)]
struct State {
    token: Option<String>,
    values: BTreeMap<String, Value>,
    expiry: DateTime<Utc>,
    status: Status,
    renewed: bool,
}

/// Handle to the session of one request.
///
/// Clones share the same state; reads and writes are synchronous and only
/// touch memory. Nothing reaches the store until the response is on its way
/// out, except for [`renew_token`](Self::renew_token) and
/// [`destroy`](Self::destroy).
#[derive(Clone)]
pub struct Session {
    state: Arc<Mutex<State>>,
    store: Arc<dyn SessionStore>,
    lifetime: chrono::Duration,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("Session")
            .field("status", &state.status)
            .field("keys", &state.values.keys().collect::<Vec<_>>())
            .field("expiry", &state.expiry)
            .finish_non_exhaustive()
    }
}

fn new_token() -> String {
    let mut raw = [0u8; 32];
    OsRng.fill_bytes(&mut raw);
    URL_SAFE_NO_PAD.encode(raw)
}

impl Session {
    fn fresh(store: Arc<dyn SessionStore>, lifetime: chrono::Duration) -> Self {
        Self::from_state(store, lifetime, State {
            token: None,
            values: BTreeMap::new(),
            expiry: Utc::now() + lifetime,
            status: Status::Unmodified,
            renewed: false,
        })
    }

    fn from_state(store: Arc<dyn SessionStore>, lifetime: chrono::Duration, state: State) -> Self {
        Self { state: Arc::new(Mutex::new(state)), store, lifetime }
    }

    /// Integer stored under `key`; `0` when absent or not an integer.
    pub fn get_int(&self, key: &str) -> i64 {
        self.state.lock().values.get(key).and_then(Value::as_i64).unwrap_or(0)
    }

    pub fn get_string(&self, key: &str) -> Option<String> {
        self.state.lock().values.get(key).and_then(Value::as_str).map(str::to_owned)
    }

    pub fn put(&self, key: &str, value: impl Into<Value>) {
        let mut state = self.state.lock();
        state.values.insert(key.to_owned(), value.into());
        state.status = Status::Modified;
    }

    pub fn remove(&self, key: &str) {
        let mut state = self.state.lock();
        if state.values.remove(key).is_some() {
            state.status = Status::Modified;
        }
    }

    /// Reads and deletes a string value in one step.
    pub fn pop_string(&self, key: &str) -> Option<String> {
        let mut state = self.state.lock();
        let value = match state.values.remove(key)? {
            Value::String(s) => s,
            _ => return None,
        };
        state.status = Status::Modified;
        Some(value)
    }

    /// Moves the session to a new token and invalidates the old one.
    ///
    /// Call this on every privilege change. A [`Renewal::Demote`] that races
    /// another demotion of the same token converges on that request's token;
    /// a [`Renewal::Elevate`] always gets a token nobody else holds.
    pub async fn renew_token(&self, renewal: Renewal, deadline: Instant) -> Result<(), Error> {
        let fresh = new_token();
        let (old, payload, expiry) = {
            let mut state = self.state.lock();
            state.expiry = Utc::now() + self.lifetime;
            (state.token.clone(), encode(&state)?, state.expiry)
        };

        let token = match old {
            Some(old) => {
                let converge = renewal == Renewal::Demote;
                within(deadline, self.store.renew(&old, &fresh, payload, expiry, converge)).await?
            }
            None => fresh,
        };

        let mut state = self.state.lock();
        state.token = Some(token);
        state.status = Status::Modified;
        state.renewed = true;
        Ok(())
    }

    /// Deletes the record from the store and expires the cookie.
    pub async fn destroy(&self, deadline: Instant) -> Result<(), Error> {
        let old = {
            let mut state = self.state.lock();
            state.values.clear();
            state.status = Status::Destroyed;
            state.token.take()
        };
        if let Some(old) = old {
            within(deadline, self.store.delete(&old)).await?;
        }
        Ok(())
    }

    /// The token identifying this session, once one has been issued.
    pub fn token(&self) -> Option<String> {
        self.state.lock().token.clone()
    }

    pub fn status(&self) -> Status {
        self.state.lock().status
    }

    /// `true` if [`renew_token`](Self::renew_token) ran during this request.
    pub fn was_renewed(&self) -> bool {
        self.state.lock().renewed
    }
}

fn encode(state: &State) -> Result<Vec<u8>, Error> {
    let record = Record { deadline: state.expiry.timestamp(), values: state.values.clone() };
    Ok(serde_json::to_vec(&record)?)
}

fn decode(payload: &[u8]) -> Result<(BTreeMap<String, Value>, DateTime<Utc>), Error> {
    let record: Record = serde_json::from_slice(payload)?;
    let expiry = Utc.timestamp_opt(record.deadline, 0).single().unwrap_or_else(Utc::now);
    Ok((record.values, expiry))
}

/// Loads and saves the [`Session`] of every request passing through it.
#[derive(Clone)]
pub struct SessionManager {
    store: Arc<dyn SessionStore>,
    lifetime: chrono::Duration,
    cookie: CookieSettings,
}

impl SessionManager {
    /// Twelve-hour sessions with a secure `session` cookie.
    pub fn new(store: Arc<dyn SessionStore>) -> Self {
        Self {
            store,
            lifetime: chrono::Duration::hours(12),
            cookie: CookieSettings::new(COOKIE_NAME),
        }
    }

    pub fn lifetime(mut self, lifetime: Duration) -> Self {
        self.lifetime = chrono::Duration::from_std(lifetime).unwrap_or(self.lifetime);
        self
    }

    pub fn cookie_secure(mut self, secure: bool) -> Self {
        self.cookie = self.cookie.secure(secure);
        self
    }

    async fn load(&self, req: &Request) -> Result<Session, Error> {
        let Some(token) = req.cookie(&self.cookie.name).map(str::to_owned) else {
            return Ok(Session::fresh(Arc::clone(&self.store), self.lifetime));
        };

        let Some(payload) = within(req.deadline(), self.store.find(&token)).await? else {
            return Ok(Session::fresh(Arc::clone(&self.store), self.lifetime));
        };

        let (values, expiry) = decode(&payload)?;
        Ok(Session::from_state(Arc::clone(&self.store), self.lifetime, State {
            token: Some(token),
            values,
            expiry,
            status: Status::Unmodified,
            renewed: false,
        }))
    }

    async fn save(&self, session: &Session, deadline: Instant, res: &mut Response) -> Result<(), Error> {
        let (token, payload, expiry) = {
            let mut state = session.state.lock();
            let status = state.status;
            match status {
                Status::Unmodified => return Ok(()),
                Status::Destroyed => {
                    self.write_cookie(res, "", 0);
                    return Ok(());
                }
                Status::Modified => {}
            }
            let token = state.token.get_or_insert_with(new_token).clone();
            (token, encode(&state)?, state.expiry)
        };

        within(deadline, self.store.commit(&token, payload, expiry)).await?;
        self.write_cookie(res, &token, (expiry - Utc::now()).num_seconds());
        Ok(())
    }

    fn write_cookie(&self, res: &mut Response, token: &str, max_age: i64) {
        if let Some(value) = self.cookie.header_value(token, Some(max_age)) {
            let headers = res.headers_mut();
            headers.append(SET_COOKIE, value);
            headers.append(VARY, HeaderValue::from_static("Cookie"));
            headers.insert(CACHE_CONTROL, HeaderValue::from_static(r#"no-cache="Set-Cookie""#));
        }
    }
}

impl Middleware for SessionManager {
    fn handle(&self, mut req: Request, next: Next) -> BoxFuture {
        let this = self.clone();
        Box::pin(async move {
            let session = match this.load(&req).await {
                Ok(session) => session,
                Err(err) => return server_error(req.method(), req.uri(), &err),
            };

            let method = req.method().clone();
            let uri = req.uri().clone();
            let deadline = req.deadline();
            req.set_session(session.clone());

            let mut res = next.run(req).await;

            match this.save(&session, deadline, &mut res).await {
                Ok(()) => res,
                Err(err) => server_error(&method, &uri, &err),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use http::header::COOKIE;
    use http::{Method, StatusCode};

    use super::*;
    use crate::handler::BoxedHandler;
    use crate::middleware::Chain;

    fn deadline() -> Instant {
        Instant::now() + Duration::from_secs(5)
    }

    fn managed(store: &Arc<MemoryStore>, handler: impl crate::handler::Handler) -> BoxedHandler {
        let store: Arc<dyn SessionStore> = store.clone();
        Chain::new().append(SessionManager::new(store)).then(handler)
    }

    fn session_cookie(res: &Response) -> Option<String> {
        res.headers()
            .get_all(SET_COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .find_map(|line| line.strip_prefix("session="))
            .map(|rest| rest.split(';').next().unwrap_or("").to_owned())
    }

    fn with_cookie(path: &str, token: &str) -> Request {
        Request::new(Method::GET, path.parse().unwrap())
            .with_header(COOKIE, HeaderValue::from_str(&format!("session={token}")).unwrap())
    }

    #[tokio::test]
    async fn untouched_sessions_set_no_cookie() {
        let store = Arc::new(MemoryStore::new());
        let app = managed(&store, |_req: Request| async { "ok" });

        let res = app.call(Request::new(Method::GET, "/".parse().unwrap())).await;
        assert_eq!(res.status_code(), StatusCode::OK);
        assert!(session_cookie(&res).is_none());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn values_survive_between_requests() {
        let store = Arc::new(MemoryStore::new());
        let app = managed(&store, |req: Request| async move {
            let session = req.session().unwrap();
            if req.path() == "/put" {
                session.put("flash", "saved");
                session.put("count", 3);
                return String::new();
            }
            format!("{}/{}", session.get_string("flash").unwrap_or_default(), session.get_int("count"))
        });

        let res = app.call(Request::new(Method::GET, "/put".parse().unwrap())).await;
        let token = session_cookie(&res).unwrap();
        let cookie = res.header("set-cookie").unwrap();
        assert!(cookie.contains("HttpOnly") && cookie.contains("Secure") && cookie.contains("Max-Age="));
        assert_eq!(res.header("vary"), Some("Cookie"));

        let res = app.call(with_cookie("/get", &token)).await;
        assert_eq!(res.body_text(), "saved/3");
    }

    #[tokio::test]
    async fn pop_string_reads_once() {
        let store = Arc::new(MemoryStore::new());
        let session = Session::fresh(store.clone(), chrono::Duration::hours(1));
        session.put("flash", "hello");
        assert_eq!(session.pop_string("flash").as_deref(), Some("hello"));
        assert_eq!(session.pop_string("flash"), None);
    }

    #[tokio::test]
    async fn renewal_moves_values_to_a_new_token() {
        let store = Arc::new(MemoryStore::new());
        let dyn_store: Arc<dyn SessionStore> = store.clone();
        let session = Session::fresh(dyn_store, chrono::Duration::hours(1));
        session.put("authenticatedUserId", 7);
        let manager = SessionManager::new(store.clone());
        let mut res = Response::text("");
        manager.save(&session, deadline(), &mut res).await.unwrap();
        let before = session.token().unwrap();

        session.renew_token(Renewal::Elevate, deadline()).await.unwrap();
        let after = session.token().unwrap();

        assert_ne!(before, after);
        assert!(session.was_renewed());
        assert!(store.find(&before).await.unwrap().is_none());
        assert!(store.find(&after).await.unwrap().is_some());
        assert_eq!(session.get_int("authenticatedUserId"), 7);
    }

    #[tokio::test]
    async fn destroy_expires_the_cookie() {
        let store = Arc::new(MemoryStore::new());
        let app = managed(&store, |req: Request| async move {
            let session = req.session().unwrap();
            if req.path() == "/login" {
                session.put("authenticatedUserId", 1);
            } else {
                session.destroy(req.deadline()).await.unwrap();
            }
            "ok"
        });

        let token = session_cookie(&app.call(Request::new(Method::GET, "/login".parse().unwrap())).await).unwrap();
        let res = app.call(with_cookie("/logout", &token)).await;

        assert_eq!(session_cookie(&res).as_deref(), Some(""));
        assert!(res.header("set-cookie").unwrap().contains("Max-Age=0"));
        assert!(store.find(&token).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn unknown_tokens_start_a_fresh_session() {
        let store = Arc::new(MemoryStore::new());
        let app = managed(&store, |req: Request| async move {
            let session = req.session().unwrap();
            session.put("seen", true);
            session.token().unwrap_or_default()
        });

        let res = app.call(with_cookie("/", "forged-token")).await;
        let issued = session_cookie(&res).unwrap();
        assert_ne!(issued, "forged-token");
        assert!(store.find("forged-token").await.unwrap().is_none());
    }

    /// Two requests that both loaded the pre-login token `anon`.
    async fn loaded_twice(store: &Arc<MemoryStore>) -> (SessionManager, Session, Session) {
        let manager = SessionManager::new(store.clone());
        let seed = Session::fresh(store.clone(), chrono::Duration::hours(1));
        seed.put("visited", true);
        manager.save(&seed, deadline(), &mut Response::text("")).await.unwrap();
        let anon = seed.token().unwrap();

        let a = manager.load(&with_cookie("/", &anon)).await.unwrap();
        let b = manager.load(&with_cookie("/", &anon)).await.unwrap();
        assert_eq!(a.token(), b.token());
        (manager, a, b)
    }

    #[tokio::test]
    async fn racing_logins_from_one_token_get_separate_sessions() {
        let store = Arc::new(MemoryStore::new());
        let (manager, a, b) = loaded_twice(&store).await;
        let anon = a.token().unwrap();

        crate::auth::login(&a, 1, deadline()).await.unwrap();
        crate::auth::login(&b, 2, deadline()).await.unwrap();
        manager.save(&a, deadline(), &mut Response::text("")).await.unwrap();
        manager.save(&b, deadline(), &mut Response::text("")).await.unwrap();

        let (token_a, token_b) = (a.token().unwrap(), b.token().unwrap());
        assert_ne!(token_a, token_b);
        assert_ne!(token_a, anon);
        assert_ne!(token_b, anon);
        assert!(store.find(&anon).await.unwrap().is_none());

        let first = manager.load(&with_cookie("/", &token_a)).await.unwrap();
        let second = manager.load(&with_cookie("/", &token_b)).await.unwrap();
        assert_eq!(first.get_int(crate::auth::AUTH_USER_ID_KEY), 1);
        assert_eq!(second.get_int(crate::auth::AUTH_USER_ID_KEY), 2);
    }

    #[tokio::test]
    async fn racing_logouts_from_one_token_share_a_successor() {
        let store = Arc::new(MemoryStore::new());
        let (_manager, a, b) = loaded_twice(&store).await;

        crate::auth::logout(&a, deadline()).await.unwrap();
        crate::auth::logout(&b, deadline()).await.unwrap();
        assert_eq!(a.token(), b.token());
        assert_eq!(store.len(), 1);
    }
}
