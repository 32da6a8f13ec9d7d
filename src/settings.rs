//! Runtime settings.
//!
//! Layered lowest to highest: compiled-in defaults, an optional
//! `snippetbox.toml` in the working directory, then `SNIPPETBOX_*`
//! environment variables (`SNIPPETBOX_ADDR`, `SNIPPETBOX_DEBUG`, ...).

use std::path::PathBuf;
use std::time::Duration;

use config::{Config, ConfigBuilder, ConfigError, Environment, File, FileFormat};
use config::builder::DefaultState;
use serde::Deserialize;

#[derive(Clone, Debug, Deserialize)]
pub struct Settings {
    /// `host:port` to listen on.
    pub addr: String,
    /// Verbose logging.
    pub debug: bool,
    pub static_dir: PathBuf,
    pub session_lifetime_secs: u64,
    pub session_cleanup_secs: u64,
    /// Adds `Secure` to every cookie. Turn off only for plain-HTTP development.
    pub cookie_secure: bool,
    pub request_timeout_secs: u64,
}

impl Settings {
    /// Reads `snippetbox.toml` (if present) and the environment.
    pub fn load() -> Result<Self, ConfigError> {
        defaults()?
            .add_source(File::with_name("snippetbox").format(FileFormat::Toml).required(false))
            .add_source(Environment::with_prefix("SNIPPETBOX").try_parsing(true))
            .build()?
            .try_deserialize()
    }

    /// Defaults overridden by a TOML document.
    pub fn from_toml_str(toml: &str) -> Result<Self, ConfigError> {
        defaults()?
            .add_source(File::from_str(toml, FileFormat::Toml))
            .build()?
            .try_deserialize()
    }

    pub fn session_lifetime(&self) -> Duration {
        Duration::from_secs(self.session_lifetime_secs)
    }

    pub fn session_cleanup(&self) -> Duration {
        Duration::from_secs(self.session_cleanup_secs.max(1))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            addr: "127.0.0.1:4000".into(),
            debug: false,
            static_dir: PathBuf::from("./ui/static"),
            session_lifetime_secs: 12 * 60 * 60,
            session_cleanup_secs: 5 * 60,
            cookie_secure: true,
            request_timeout_secs: 10,
        }
    }
}

fn defaults() -> Result<ConfigBuilder<DefaultState>, ConfigError> {
    let d = Settings::default();
    Config::builder()
        .set_default("addr", d.addr)?
        .set_default("debug", d.debug)?
        .set_default("static_dir", d.static_dir.to_string_lossy().into_owned())?
        .set_default("session_lifetime_secs", d.session_lifetime_secs as i64)?
        .set_default("session_cleanup_secs", d.session_cleanup_secs as i64)?
        .set_default("cookie_secure", d.cookie_secure)?
        .set_default("request_timeout_secs", d.request_timeout_secs as i64)
}
