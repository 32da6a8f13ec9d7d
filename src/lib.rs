//! # snippetbox
//!
//! A snippet-sharing web application built around a small hyper-based HTTP
//! core and an explicit, ordered middleware pipeline.
//!
//! ## The pipeline
//!
//! Every request passes through the same outer chain, then through a
//! route-specific inner chain:
//!
//! ```text
//! Recover ─▶ LogRequest ─▶ SecureHeaders ─▶ Router
//!                                             │
//!              SessionManager ─▶ CsrfGuard ─▶ Authenticate [─▶ RequireAuthentication] ─▶ handler
//! ```
//!
//! - [`middleware::Recover`] turns a panic anywhere downstream into one 500
//!   response with `Connection: close`, and logs the captured stack.
//! - [`middleware::LogRequest`] logs method, URI, peer, protocol, status and
//!   latency for every request, including the ones that panicked.
//! - [`middleware::SecureHeaders`] stamps a fixed set of security headers.
//! - [`session::SessionManager`] loads and saves the cookie-identified
//!   session; [`middleware::CsrfGuard`] rejects state-changing requests
//!   without a valid anti-forgery token; [`auth::Authenticate`] confirms the
//!   session's user still exists.
//!
//! Chains are built with [`middleware::Chain`]: `append` adds a layer,
//! `then` folds the list around an endpoint. A built handler is a snapshot,
//! so public and protected route groups share one prefix safely.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use snippetbox::models::{MemorySnippets, MemoryUsers};
//! use snippetbox::session::MemoryStore;
//! use snippetbox::web::{routes, App};
//! use snippetbox::Server;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), snippetbox::Error> {
//!     let app = App::new(
//!         Arc::new(MemorySnippets::new()),
//!         Arc::new(MemoryUsers::new()),
//!         Arc::new(MemoryStore::new()),
//!     );
//!     Server::bind("127.0.0.1:4000")?.serve(routes(Arc::new(app))).await
//! }
//! ```

mod cookie;
mod error;
mod handler;
mod request;
mod response;
mod router;
mod server;
mod settings;

pub mod auth;
pub mod form;
pub mod middleware;
pub mod models;
pub mod session;
pub mod validator;
pub mod web;

pub use cookie::{CookieSettings, SameSite};
pub use error::{server_error, within, Error};
pub use handler::{BoxFuture, BoxedHandler, Handler};
pub use request::{Context, Request, FLASH_KEY};
pub use response::{ContentType, IntoResponse, Response, ResponseBuilder};
pub use router::Router;
pub use server::{shutdown_signal, Server};
pub use settings::Settings;
