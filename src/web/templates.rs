//! HTML pages.
//!
//! The [`TemplateCache`] maps template names to page functions. It is built
//! once at startup and only read afterwards, so it is shared without locks.

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use super::forms::{LoginForm, SignupForm, SnippetForm};
use crate::error::Error;
use crate::middleware::CSRF_FIELD;
use crate::models::Snippet;
use crate::validator::Validator;

/// Turns a named template plus page data into bytes.
pub trait Renderer: Send + Sync + 'static {
    fn render(&self, name: &str, data: &TemplateData) -> Result<Vec<u8>, Error>;
}

/// Page-specific payload.
#[derive(Clone, Debug)]
pub enum Page {
    Home { snippets: Vec<Snippet> },
    View { snippet: Snippet },
    Create { form: SnippetForm },
    Signup { form: SignupForm },
    Login { form: LoginForm },
}

/// Everything a page can show.
#[derive(Clone, Debug)]
pub struct TemplateData {
    pub current_year: i32,
    pub flash: Option<String>,
    pub is_authenticated: bool,
    pub csrf_token: String,
    pub page: Page,
}

/// Renders the page body; `None` when handed data for another page.
type PageFn = fn(&TemplateData) -> Option<(&'static str, String)>;

pub struct TemplateCache {
    pages: HashMap<&'static str, PageFn>,
}

impl TemplateCache {
    pub fn new() -> Self {
        let mut pages: HashMap<&'static str, PageFn> = HashMap::new();
        pages.insert("home.html", home);
        pages.insert("view.html", view);
        pages.insert("create.html", create);
        pages.insert("signup.html", signup);
        pages.insert("login.html", login);
        Self { pages }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.pages.contains_key(name)
    }
}

impl Default for TemplateCache {
    fn default() -> Self {
        Self::new()
    }
}

impl Renderer for TemplateCache {
    fn render(&self, name: &str, data: &TemplateData) -> Result<Vec<u8>, Error> {
        let page = self
            .pages
            .get(name)
            .ok_or_else(|| Error::MissingTemplate(name.to_owned()))?;
        let (title, body) = page(data).ok_or_else(|| Error::Render { template: name.to_owned() })?;
        Ok(layout(data, title, &body).into_bytes())
    }
}

/// Escapes text for use in HTML bodies and single- or double-quoted
/// attributes.
pub fn escape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&#34;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

fn human_date(t: &DateTime<Utc>) -> String {
    t.format("%d %b %Y at %H:%M").to_string()
}

fn csrf_input(data: &TemplateData) -> String {
    format!("<input type='hidden' name='{CSRF_FIELD}' value='{}'>", escape(&data.csrf_token))
}

fn field_error(v: &Validator, field: &str) -> String {
    v.field_error(field)
        .map(|msg| format!("<label class='error'>{}</label>", escape(msg)))
        .unwrap_or_default()
}

fn layout(data: &TemplateData, title: &str, body: &str) -> String {
    let nav_left = if data.is_authenticated {
        "<a href='/'>Home</a> <a href='/snippet/create'>Create snippet</a>"
    } else {
        "<a href='/'>Home</a>"
    };
    let nav_right = if data.is_authenticated {
        format!(
            "<form action='/user/logout' method='POST'>{}<button>Logout</button></form>",
            csrf_input(data)
        )
    } else {
        "<a href='/user/signup'>Signup</a> <a href='/user/login'>Login</a>".to_owned()
    };
    let flash = data
        .flash
        .as_deref()
        .map(|f| format!("<div class='flash'>{}</div>", escape(f)))
        .unwrap_or_default();

    format!(
        "<!doctype html>\n\
         <html lang='en'>\n\
         <head>\n\
         <meta charset='utf-8'>\n\
         <title>{title} - Snippetbox</title>\n\
         <link rel='stylesheet' href='/static/css/main.css'>\n\
         <link rel='shortcut icon' href='/static/img/favicon.ico' type='image/x-icon'>\n\
         <link rel='stylesheet' href='https://fonts.googleapis.com/css?family=Ubuntu+Mono:400,700'>\n\
         </head>\n\
         <body>\n\
         <header><h1><a href='/'>Snippetbox</a></h1></header>\n\
         <nav><div>{nav_left}</div><div>{nav_right}</div></nav>\n\
         <main>\n{flash}{body}</main>\n\
         <footer>Powered by <a href='https://www.rust-lang.org/'>Rust</a> in {year}</footer>\n\
         <script src='/static/js/main.js' type='text/javascript'></script>\n\
         </body>\n\
         </html>\n",
        title = escape(title),
        year = data.current_year,
    )
}

fn home(data: &TemplateData) -> Option<(&'static str, String)> {
    let Page::Home { snippets } = &data.page else { return None };
    if snippets.is_empty() {
        return Some(("Home", "<h2>Latest Snippets</h2>\n<p>There's nothing to see here... yet!</p>\n".to_owned()));
    }

    let rows: String = snippets
        .iter()
        .map(|s| {
            format!(
                "<tr><td><a href='/snippet/view/{id}'>{title}</a></td><td>{created}</td><td>#{id}</td></tr>\n",
                id = s.id,
                title = escape(&s.title),
                created = human_date(&s.created),
            )
        })
        .collect();
    Some((
        "Home",
        format!("<h2>Latest Snippets</h2>\n<table>\n<tr><th>Title</th><th>Created</th><th>ID</th></tr>\n{rows}</table>\n"),
    ))
}

fn view(data: &TemplateData) -> Option<(&'static str, String)> {
    let Page::View { snippet } = &data.page else { return None };
    Some((
        "Snippet",
        format!(
            "<div class='snippet'>\n\
             <div class='metadata'><strong>{title}</strong><span>#{id}</span></div>\n\
             <pre><code>{content}</code></pre>\n\
             <div class='metadata'><time>Created: {created}</time><time>Expires: {expires}</time></div>\n\
             </div>\n",
            title = escape(&snippet.title),
            id = snippet.id,
            content = escape(&snippet.content),
            created = human_date(&snippet.created),
            expires = human_date(&snippet.expires),
        ),
    ))
}

fn create(data: &TemplateData) -> Option<(&'static str, String)> {
    let Page::Create { form } = &data.page else { return None };
    let v = &form.validator;
    let radios: String = [(365, "One Year"), (7, "One Week"), (1, "One Day")]
        .iter()
        .map(|(days, label)| {
            let checked = if form.expires == *days { " checked" } else { "" };
            format!("<input type='radio' name='expires' value='{days}'{checked}> {label}\n")
        })
        .collect();

    Some((
        "Create a New Snippet",
        format!(
            "<form action='/snippet/create' method='POST'>\n\
             {csrf}\n\
             <div>\n<label>Title:</label>\n{title_err}<input type='text' name='title' value='{title}'>\n</div>\n\
             <div>\n<label>Content:</label>\n{content_err}<textarea name='content'>{content}</textarea>\n</div>\n\
             <div>\n<label>Delete in:</label>\n{expires_err}{radios}</div>\n\
             <div>\n<input type='submit' value='Publish snippet'>\n</div>\n\
             </form>\n",
            csrf = csrf_input(data),
            title_err = field_error(v, "title"),
            title = escape(&form.title),
            content_err = field_error(v, "content"),
            content = escape(&form.content),
            expires_err = field_error(v, "expires"),
        ),
    ))
}

fn signup(data: &TemplateData) -> Option<(&'static str, String)> {
    let Page::Signup { form } = &data.page else { return None };
    let v = &form.validator;
    Some((
        "Signup",
        format!(
            "<form action='/user/signup' method='POST' novalidate>\n\
             {csrf}\n\
             <div>\n<label>Name:</label>\n{name_err}<input type='text' name='name' value='{name}'>\n</div>\n\
             <div>\n<label>Email:</label>\n{email_err}<input type='email' name='email' value='{email}'>\n</div>\n\
             <div>\n<label>Password:</label>\n{password_err}<input type='password' name='password'>\n</div>\n\
             <div>\n<input type='submit' value='Signup'>\n</div>\n\
             </form>\n",
            csrf = csrf_input(data),
            name_err = field_error(v, "name"),
            name = escape(&form.name),
            email_err = field_error(v, "email"),
            email = escape(&form.email),
            password_err = field_error(v, "password"),
        ),
    ))
}

fn login(data: &TemplateData) -> Option<(&'static str, String)> {
    let Page::Login { form } = &data.page else { return None };
    let v = &form.validator;
    let non_field: String = v
        .non_field_errors()
        .iter()
        .map(|msg| format!("<div class='error'>{}</div>\n", escape(msg)))
        .collect();
    Some((
        "Login",
        format!(
            "<form action='/user/login' method='POST' novalidate>\n\
             {csrf}\n\
             {non_field}\
             <div>\n<label>Email:</label>\n{email_err}<input type='email' name='email' value='{email}'>\n</div>\n\
             <div>\n<label>Password:</label>\n{password_err}<input type='password' name='password'>\n</div>\n\
             <div>\n<input type='submit' value='Login'>\n</div>\n\
             </form>\n",
            csrf = csrf_input(data),
            email_err = field_error(v, "email"),
            email = escape(&form.email),
            password_err = field_error(v, "password"),
        ),
    ))
}
