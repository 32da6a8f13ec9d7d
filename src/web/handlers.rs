use std::sync::Arc;

use http::StatusCode;

use super::{client_error, decode_post_form, form_failure, App, LoginForm, Page, SignupForm, SnippetForm};
use crate::auth;
use crate::error::{server_error, within, Error};
use crate::models::StoreError;
use crate::request::{Request, FLASH_KEY};
use crate::response::Response;
use crate::session::Session;

fn see_other(location: &str) -> Response {
    Response::redirect(location, StatusCode::SEE_OTHER)
}

fn session(req: &Request) -> Result<&Session, Error> {
    req.session().ok_or(Error::MissingSession)
}

pub(super) async fn home(app: Arc<App>, mut req: Request) -> Response {
    match within(req.deadline(), app.snippets.latest()).await {
        Ok(snippets) => app.render(&mut req, StatusCode::OK, "home.html", Page::Home { snippets }),
        Err(err) => server_error(req.method(), req.uri(), &err),
    }
}

pub(super) async fn snippet_view(app: Arc<App>, mut req: Request) -> Response {
    let Ok(id) = req.param("id").unwrap_or("").parse::<i64>() else {
        return client_error(StatusCode::BAD_REQUEST);
    };
    if id < 1 {
        return client_error(StatusCode::NOT_FOUND);
    }

    match within(req.deadline(), app.snippets.get(id)).await {
        Ok(snippet) => app.render(&mut req, StatusCode::OK, "view.html", Page::View { snippet }),
        Err(err) if err.is_no_record() => client_error(StatusCode::NOT_FOUND),
        Err(err) => server_error(req.method(), req.uri(), &err),
    }
}

pub(super) async fn snippet_create(app: Arc<App>, mut req: Request) -> Response {
    let form = SnippetForm::initial();
    app.render(&mut req, StatusCode::OK, "create.html", Page::Create { form })
}

pub(super) async fn snippet_create_post(app: Arc<App>, mut req: Request) -> Response {
    let mut form = SnippetForm::default();
    if let Err(err) = decode_post_form(&req, &mut form) {
        return form_failure(&req, &err);
    }

    form.validate();
    if !form.validator.valid() {
        return app.render(&mut req, StatusCode::UNPROCESSABLE_ENTITY, "create.html", Page::Create { form });
    }

    let inserted = within(req.deadline(), app.snippets.insert(&form.title, &form.content, form.expires)).await;
    let result = inserted.and_then(|id| {
        session(&req)?.put(FLASH_KEY, "Snippet successfully created!");
        Ok(id)
    });
    match result {
        Ok(id) => see_other(&format!("/snippet/view/{id}")),
        Err(err) => server_error(req.method(), req.uri(), &err),
    }
}

pub(super) async fn user_signup(app: Arc<App>, mut req: Request) -> Response {
    let form = SignupForm::default();
    app.render(&mut req, StatusCode::OK, "signup.html", Page::Signup { form })
}

pub(super) async fn user_signup_post(app: Arc<App>, mut req: Request) -> Response {
    let mut form = SignupForm::default();
    if let Err(err) = decode_post_form(&req, &mut form) {
        return form_failure(&req, &err);
    }

    form.validate();
    if !form.validator.valid() {
        return app.render(&mut req, StatusCode::UNPROCESSABLE_ENTITY, "signup.html", Page::Signup { form });
    }

    match within(req.deadline(), app.users.insert(&form.name, &form.email, &form.password)).await {
        Ok(_) => {}
        Err(Error::Store(StoreError::DuplicateEmail)) => {
            form.validator.add_field_error("email", "Email address is already in use");
            return app.render(&mut req, StatusCode::UNPROCESSABLE_ENTITY, "signup.html", Page::Signup { form });
        }
        Err(err) => return server_error(req.method(), req.uri(), &err),
    }

    match session(&req) {
        Ok(session) => {
            session.put(FLASH_KEY, "Your signup was successful. Please log in.");
            see_other(auth::LOGIN_PATH)
        }
        Err(err) => server_error(req.method(), req.uri(), &err),
    }
}

pub(super) async fn user_login(app: Arc<App>, mut req: Request) -> Response {
    let form = LoginForm::default();
    app.render(&mut req, StatusCode::OK, "login.html", Page::Login { form })
}

pub(super) async fn user_login_post(app: Arc<App>, mut req: Request) -> Response {
    let mut form = LoginForm::default();
    if let Err(err) = decode_post_form(&req, &mut form) {
        return form_failure(&req, &err);
    }

    form.validate();
    if !form.validator.valid() {
        return app.render(&mut req, StatusCode::UNPROCESSABLE_ENTITY, "login.html", Page::Login { form });
    }

    let id = match within(req.deadline(), app.users.authenticate(&form.email, &form.password)).await {
        Ok(id) => id,
        Err(Error::Store(StoreError::InvalidCredentials)) => {
            form.validator.add_non_field_error("Email or password is incorrect");
            return app.render(&mut req, StatusCode::UNPROCESSABLE_ENTITY, "login.html", Page::Login { form });
        }
        Err(err) => return server_error(req.method(), req.uri(), &err),
    };

    let logged_in = match session(&req) {
        Ok(session) => auth::login(session, id, req.deadline()).await,
        Err(err) => Err(err),
    };
    match logged_in {
        Ok(()) => see_other("/snippet/create"),
        Err(err) => server_error(req.method(), req.uri(), &err),
    }
}

pub(super) async fn user_logout_post(_app: Arc<App>, req: Request) -> Response {
    let logged_out = match session(&req) {
        Ok(session) => auth::logout(session, req.deadline()).await.map(|()| {
            session.put(FLASH_KEY, "You've been logged out successfully!");
        }),
        Err(err) => Err(err),
    };
    match logged_out {
        Ok(()) => see_other("/"),
        Err(err) => server_error(req.method(), req.uri(), &err),
    }
}
