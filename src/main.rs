//! snippetbox server.
//!
//! Run with:
//!   SNIPPETBOX_COOKIE_SECURE=false cargo run
//!
//! Settings come from `snippetbox.toml` and `SNIPPETBOX_*` variables; see
//! [`snippetbox::Settings`]. `RUST_LOG` overrides the log filter.

use std::sync::Arc;

use snippetbox::models::{MemorySnippets, MemoryUsers};
use snippetbox::session::MemoryStore;
use snippetbox::web::{routes, App};
use snippetbox::{Error, Server, Settings};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Error> {
    let settings = Settings::load()?;

    let default_level = if settings.debug { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
        .init();

    let sessions = Arc::new(MemoryStore::new());
    let cleanup = sessions.spawn_cleanup(settings.session_cleanup());

    let app = App::new(Arc::new(MemorySnippets::new()), Arc::new(MemoryUsers::new()), sessions)
        .static_dir(&settings.static_dir)
        .cookie_secure(settings.cookie_secure)
        .session_lifetime(settings.session_lifetime());

    let served = Server::bind(&settings.addr)?
        .request_timeout(settings.request_timeout())
        .serve(routes(Arc::new(app)))
        .await;

    cleanup.abort();
    served
}
