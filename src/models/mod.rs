//! Storage collaborators for snippets and users.
//!
//! Handlers only see the [`SnippetStore`] and [`UserStore`] traits. The
//! in-memory implementations guard their maps with a read/write lock:
//! lookups run concurrently, inserts take the lock exclusively.

mod snippets;
mod users;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

pub use snippets::MemorySnippets;
pub use users::MemoryUsers;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("no matching record found")]
    NoRecord,

    #[error("duplicate email")]
    DuplicateEmail,

    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("password hashing failed: {0}")]
    Hash(String),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Snippet {
    pub id: i64,
    pub title: String,
    pub content: String,
    pub created: DateTime<Utc>,
    pub expires: DateTime<Utc>,
}

#[derive(Clone, Debug)]
pub struct User {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub hashed_password: String,
    pub created: DateTime<Utc>,
}

#[async_trait]
pub trait SnippetStore: Send + Sync + 'static {
    /// Stores a snippet that expires `expires_days` from now; returns its id.
    async fn insert(&self, title: &str, content: &str, expires_days: i64) -> Result<i64, StoreError>;

    /// An unexpired snippet, or [`StoreError::NoRecord`].
    async fn get(&self, id: i64) -> Result<Snippet, StoreError>;

    /// The ten most recently created unexpired snippets, newest first.
    async fn latest(&self) -> Result<Vec<Snippet>, StoreError>;
}

#[async_trait]
pub trait UserStore: Send + Sync + 'static {
    /// Creates a user; [`StoreError::DuplicateEmail`] if the email is taken.
    async fn insert(&self, name: &str, email: &str, password: &str) -> Result<i64, StoreError>;

    /// The id of the user with these credentials, or
    /// [`StoreError::InvalidCredentials`] whether the email or the password
    /// was wrong.
    async fn authenticate(&self, email: &str, password: &str) -> Result<i64, StoreError>;

    async fn exists(&self, id: i64) -> Result<bool, StoreError>;
}
