//! Unified error type.
//!
//! Application-level outcomes (400, 404, 422, redirects) are expressed as
//! [`Response`] values, not as `Error`s. This type surfaces failures that end
//! in a 500 (storage, rendering, deadlines, misconfiguration) and the
//! infrastructure failures of binding and serving.

use std::backtrace::Backtrace;
use std::future::Future;

use http::{Method, StatusCode, Uri};
use tokio::time::Instant;
use tracing::error;

use crate::form::FormError;
use crate::models::StoreError;
use crate::response::Response;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("config: {0}")]
    Config(#[from] config::ConfigError),

    #[error("invalid socket address `{0}`")]
    Address(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Form(#[from] FormError),

    #[error("the template `{0}` does not exist")]
    MissingTemplate(String),

    #[error("template `{template}` cannot render this page data")]
    Render { template: String },

    #[error("deadline exceeded")]
    DeadlineExceeded,

    #[error("session codec: {0}")]
    Codec(#[from] serde_json::Error),

    #[error("no session attached to the request; is the session middleware installed?")]
    MissingSession,
}

impl Error {
    /// `true` for programming errors (e.g. a form decoded into a structurally
    /// invalid target). These are never reported to the client as request
    /// errors.
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::Form(e) => e.is_fatal(),
            Self::MissingSession => true,
            _ => false,
        }
    }

    /// `true` when the store reported that no matching record exists.
    pub fn is_no_record(&self) -> bool {
        matches!(self, Self::Store(StoreError::NoRecord))
    }
}

/// Awaits a collaborator call, giving up at `deadline`.
pub async fn within<T, E, F>(deadline: Instant, fut: F) -> Result<T, Error>
where
    F: Future<Output = Result<T, E>>,
    Error: From<E>,
{
    match tokio::time::timeout_at(deadline, fut).await {
        Ok(res) => res.map_err(Error::from),
        Err(_) => Err(Error::DeadlineExceeded),
    }
}

/// Logs `err` with the request's method, URI and a stack capture, then
/// returns a generic 500. The client never sees the error text.
pub fn server_error(method: &Method, uri: &Uri, err: &Error) -> Response {
    let trace = Backtrace::force_capture();
    error!(%method, %uri, fatal = err.is_fatal(), trace = %trace, "{err}");
    Response::error(StatusCode::INTERNAL_SERVER_ERROR)
}
