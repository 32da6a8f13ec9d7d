//! The snippetbox application: shared state, pages, handlers and routes.

mod forms;
mod handlers;
mod routes;
mod static_files;
mod templates;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::{Datelike, Utc};
use http::StatusCode;

use crate::error::{server_error, Error};
use crate::form::{self, FormTarget};
use crate::models::{SnippetStore, UserStore};
use crate::request::Request;
use crate::response::Response;
use crate::session::SessionStore;

pub use forms::{LoginForm, SignupForm, SnippetForm, PERMITTED_EXPIRES};
pub use routes::routes;
pub use templates::{escape, Page, Renderer, TemplateCache, TemplateData};

/// Dependencies shared by every handler.
pub struct App {
    pub(crate) snippets: Arc<dyn SnippetStore>,
    pub(crate) users: Arc<dyn UserStore>,
    pub(crate) sessions: Arc<dyn SessionStore>,
    pub(crate) templates: Box<dyn Renderer>,
    pub(crate) static_dir: PathBuf,
    pub(crate) cookie_secure: bool,
    pub(crate) session_lifetime: Duration,
}

impl App {
    /// An application with the built-in pages, secure cookies, twelve-hour
    /// sessions and assets under `./ui/static`.
    pub fn new(
        snippets: Arc<dyn SnippetStore>,
        users: Arc<dyn UserStore>,
        sessions: Arc<dyn SessionStore>,
    ) -> Self {
        Self {
            snippets,
            users,
            sessions,
            templates: Box::new(TemplateCache::new()),
            static_dir: PathBuf::from("./ui/static"),
            cookie_secure: true,
            session_lifetime: Duration::from_secs(12 * 60 * 60),
        }
    }

    pub fn templates(mut self, templates: impl Renderer) -> Self {
        self.templates = Box::new(templates);
        self
    }

    pub fn static_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.static_dir = dir.into();
        self
    }

    pub fn cookie_secure(mut self, secure: bool) -> Self {
        self.cookie_secure = secure;
        self
    }

    pub fn session_lifetime(mut self, lifetime: Duration) -> Self {
        self.session_lifetime = lifetime;
        self
    }

    /// Data every page shows. Pops the flash message out of the session.
    fn template_data(req: &mut Request, page: Page) -> TemplateData {
        TemplateData {
            current_year: Utc::now().year(),
            flash: req.take_flash(),
            is_authenticated: req.context().is_authenticated(),
            csrf_token: req.context().csrf_token().to_owned(),
            page,
        }
    }

    /// Renders `name` with `status`, or a 500 if rendering fails. The page is
    /// rendered fully before anything is returned, so a failure never leaves
    /// a half-written body.
    fn render(&self, req: &mut Request, status: StatusCode, name: &str, page: Page) -> Response {
        let data = Self::template_data(req, page);
        match self.templates.render(name, &data) {
            Ok(body) => Response::builder().status(status).html(body),
            Err(err) => server_error(req.method(), req.uri(), &err),
        }
    }
}

/// A generic error page for `status`; no internal detail is included.
fn client_error(status: StatusCode) -> Response {
    Response::error(status)
}

/// Decodes the urlencoded body of `req` into `target`.
fn decode_post_form<T: FormTarget>(req: &Request, target: &mut T) -> Result<(), Error> {
    let pairs = form::parse_pairs(req.body())?;
    form::decode(&pairs, target)?;
    Ok(())
}

/// Maps a form decoding failure to a response: a bad body is the client's
/// fault, a bad destination is ours.
fn form_failure(req: &Request, err: &Error) -> Response {
    if err.is_fatal() {
        server_error(req.method(), req.uri(), err)
    } else {
        client_error(StatusCode::BAD_REQUEST)
    }
}
