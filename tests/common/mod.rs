#![allow(dead_code)]

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use argon2::Params;
use http::header::{COOKIE, SET_COOKIE};
use http::{HeaderValue, Method};
use parking_lot::Mutex;
use percent_encoding::{utf8_percent_encode, NON_ALPHANUMERIC};
use snippetbox::models::{MemorySnippets, MemoryUsers};
use snippetbox::session::MemoryStore;
use snippetbox::web::{routes, App};
use snippetbox::{BoxedHandler, Request, Response};

/// The fully composed application plus a browser-like cookie jar.
pub struct TestApp {
    pub handler: BoxedHandler,
    pub snippets: Arc<MemorySnippets>,
    pub users: Arc<MemoryUsers>,
    pub sessions: Arc<MemoryStore>,
    pub static_dir: PathBuf,
    jar: Mutex<BTreeMap<String, String>>,
}

impl TestApp {
    pub fn new() -> Self {
        let snippets = Arc::new(MemorySnippets::new());
        let users = Arc::new(MemoryUsers::with_params(Params::new(8, 1, 1, None).unwrap()));
        let sessions = Arc::new(MemoryStore::new());
        let static_dir = static_fixture();

        let app = App::new(snippets.clone(), users.clone(), sessions.clone()).static_dir(&static_dir);
        Self {
            handler: routes(Arc::new(app)),
            snippets,
            users,
            sessions,
            static_dir,
            jar: Mutex::new(BTreeMap::new()),
        }
    }

    pub fn cookie(&self, name: &str) -> Option<String> {
        self.jar.lock().get(name).cloned()
    }

    pub fn cookie_header(&self) -> String {
        self.jar
            .lock()
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join("; ")
    }

    /// Sends `req` with the jar's cookies and stores whatever comes back.
    pub async fn send(&self, req: Request) -> Response {
        let cookies = self.cookie_header();
        let req = if cookies.is_empty() {
            req
        } else {
            req.with_header(COOKIE, HeaderValue::from_str(&cookies).unwrap())
        };
        let res = self.handler.call(req).await;
        self.absorb(&res);
        res
    }

    pub async fn get(&self, path: &str) -> Response {
        self.send(Request::new(Method::GET, path.parse().unwrap())).await
    }

    pub async fn post_form(&self, path: &str, fields: &[(&str, &str)]) -> Response {
        self.send(Request::new(Method::POST, path.parse().unwrap()).with_body(encode(fields)))
            .await
    }

    /// Fetches `page`, then posts `fields` plus the page's CSRF token to `path`.
    pub async fn submit(&self, page: &str, path: &str, fields: &[(&str, &str)]) -> Response {
        let token = csrf_token(&self.get(page).await.body_text());
        let mut all = fields.to_vec();
        all.push(("csrf_token", &token));
        self.post_form(path, &all).await
    }

    pub async fn signup(&self, name: &str, email: &str, password: &str) -> Response {
        self.submit("/user/signup", "/user/signup", &[("name", name), ("email", email), ("password", password)])
            .await
    }

    pub async fn login(&self, email: &str, password: &str) -> Response {
        self.submit("/user/login", "/user/login", &[("email", email), ("password", password)]).await
    }

    fn absorb(&self, res: &Response) {
        let mut jar = self.jar.lock();
        for line in res.headers().get_all(SET_COOKIE).iter().filter_map(|v| v.to_str().ok()) {
            let mut attrs = line.split(';').map(str::trim);
            let Some((name, value)) = attrs.next().and_then(|kv| kv.split_once('=')) else { continue };
            if attrs.any(|a| a == "Max-Age=0") {
                jar.remove(name);
            } else {
                jar.insert(name.to_owned(), value.to_owned());
            }
        }
    }
}

pub fn encode(fields: &[(&str, &str)]) -> String {
    fields
        .iter()
        .map(|(k, v)| format!("{}={}", utf8_percent_encode(k, NON_ALPHANUMERIC), utf8_percent_encode(v, NON_ALPHANUMERIC)))
        .collect::<Vec<_>>()
        .join("&")
}

/// The masked token of the first CSRF hidden input in `html`.
pub fn csrf_token(html: &str) -> String {
    let marker = "name='csrf_token' value='";
    let start = html.find(marker).unwrap_or_else(|| panic!("no csrf token in page:\n{html}")) + marker.len();
    let end = html[start..].find('\'').unwrap() + start;
    html[start..end].to_owned()
}

/// A throwaway static directory with one stylesheet.
fn static_fixture() -> PathBuf {
    let dir = std::env::temp_dir().join(format!(
        "snippetbox-static-{}-{}",
        std::process::id(),
        rand::random::<u64>()
    ));
    std::fs::create_dir_all(dir.join("css")).unwrap();
    std::fs::write(dir.join("css/main.css"), "body { color: #333; }").unwrap();
    dir
}
