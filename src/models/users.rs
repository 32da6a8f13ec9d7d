use std::collections::{BTreeMap, HashMap};

use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::{Algorithm, Argon2, Params, Version};
use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;

use super::{StoreError, User, UserStore};

/// In-memory user records with argon2id password hashes.
///
/// Hashing and verification run on the blocking pool so a login never stalls
/// an async worker.
pub struct MemoryUsers {
    hasher: Argon2<'static>,
    inner: RwLock<Inner>,
}

#[derive(Default)]
struct Inner {
    last_id: i64,
    rows: BTreeMap<i64, User>,
    by_email: HashMap<String, i64>,
}

impl MemoryUsers {
    /// Argon2id with the crate's recommended default cost.
    pub fn new() -> Self {
        Self::with_params(Params::default())
    }

    /// Argon2id with explicit cost parameters (cheap ones keep tests fast).
    pub fn with_params(params: Params) -> Self {
        Self {
            hasher: Argon2::new(Algorithm::Argon2id, Version::V0x13, params),
            inner: RwLock::new(Inner::default()),
        }
    }

    async fn hash(&self, password: &str) -> Result<String, StoreError> {
        let hasher = self.hasher.clone();
        let password = password.to_owned();
        tokio::task::spawn_blocking(move || {
            let salt = SaltString::generate(&mut OsRng);
            hasher
                .hash_password(password.as_bytes(), &salt)
                .map(|h| h.to_string())
                .map_err(|e| StoreError::Hash(e.to_string()))
        })
        .await
        .map_err(|e| StoreError::Unavailable(e.to_string()))?
    }

    async fn verify(&self, password: &str, hash: String) -> Result<bool, StoreError> {
        let hasher = self.hasher.clone();
        let password = password.to_owned();
        tokio::task::spawn_blocking(move || {
            let parsed = PasswordHash::new(&hash).map_err(|e| StoreError::Hash(e.to_string()))?;
            match hasher.verify_password(password.as_bytes(), &parsed) {
                Ok(()) => Ok(true),
                Err(argon2::password_hash::Error::Password) => Ok(false),
                Err(e) => Err(StoreError::Hash(e.to_string())),
            }
        })
        .await
        .map_err(|e| StoreError::Unavailable(e.to_string()))?
    }
}

impl Default for MemoryUsers {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl UserStore for MemoryUsers {
    async fn insert(&self, name: &str, email: &str, password: &str) -> Result<i64, StoreError> {
        if self.inner.read().by_email.contains_key(email) {
            return Err(StoreError::DuplicateEmail);
        }

        let hashed_password = self.hash(password).await?;

        let mut inner = self.inner.write();
        // Re-checked under the write lock: another signup may have won the race.
        if inner.by_email.contains_key(email) {
            return Err(StoreError::DuplicateEmail);
        }
        inner.last_id += 1;
        let id = inner.last_id;
        inner.by_email.insert(email.to_owned(), id);
        inner.rows.insert(id, User {
            id,
            name: name.to_owned(),
            email: email.to_owned(),
            hashed_password,
            created: Utc::now(),
        });
        Ok(id)
    }

    async fn authenticate(&self, email: &str, password: &str) -> Result<i64, StoreError> {
        let found = {
            let inner = self.inner.read();
            inner
                .by_email
                .get(email)
                .and_then(|id| inner.rows.get(id))
                .map(|u| (u.id, u.hashed_password.clone()))
        };
        let Some((id, hash)) = found else {
            return Err(StoreError::InvalidCredentials);
        };

        if self.verify(password, hash).await? {
            Ok(id)
        } else {
            Err(StoreError::InvalidCredentials)
        }
    }

    async fn exists(&self, id: i64) -> Result<bool, StoreError> {
        Ok(self.inner.read().rows.contains_key(&id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> MemoryUsers {
        MemoryUsers::with_params(Params::new(8, 1, 1, None).unwrap())
    }

    #[tokio::test]
    async fn signup_then_authenticate() {
        let users = store();
        let id = users.insert("Alice", "alice@example.com", "pa55word!").await.unwrap();
        assert_eq!(users.authenticate("alice@example.com", "pa55word!").await.unwrap(), id);
        assert!(users.exists(id).await.unwrap());
        assert!(!users.exists(id + 1).await.unwrap());
    }

    #[tokio::test]
    async fn passwords_are_not_stored_in_clear() {
        let users = store();
        let id = users.insert("Bob", "bob@example.com", "hunter2hunter2").await.unwrap();
        let stored = users.inner.read().rows[&id].hashed_password.clone();
        assert!(stored.starts_with("$argon2id$"));
        assert!(!stored.contains("hunter2"));
    }

    #[tokio::test]
    async fn duplicate_emails_are_rejected() {
        let users = store();
        users.insert("Alice", "alice@example.com", "pa55word!").await.unwrap();
        let err = users.insert("Alice II", "alice@example.com", "different1").await.unwrap_err();
        assert!(matches!(err, StoreError::DuplicateEmail));
    }

    #[tokio::test]
    async fn unknown_email_and_wrong_password_look_the_same() {
        let users = store();
        users.insert("Alice", "alice@example.com", "pa55word!").await.unwrap();
        let wrong = users.authenticate("alice@example.com", "nope-nope").await.unwrap_err();
        let unknown = users.authenticate("mallory@example.com", "pa55word!").await.unwrap_err();
        assert_eq!(wrong.to_string(), unknown.to_string());
        assert!(matches!(unknown, StoreError::InvalidCredentials));
    }
}
