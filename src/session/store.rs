//! Session persistence.

use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::models::StoreError;

/// Seconds a token renewed on a privilege drop keeps pointing at its
/// successor. Requests that raced the renewal and drop privilege on the same
/// token inside this window converge on the successor instead of minting a
/// third token.
pub const RENEWAL_GRACE_SECS: i64 = 5;

/// Persists opaque session payloads keyed by token.
#[async_trait]
pub trait SessionStore: Send + Sync + 'static {
    /// The payload stored under `token`, unless missing or expired.
    async fn find(&self, token: &str) -> Result<Option<Vec<u8>>, StoreError>;

    /// Inserts or replaces the payload stored under `token`.
    async fn commit(&self, token: &str, payload: Vec<u8>, expiry: DateTime<Utc>) -> Result<(), StoreError>;

    async fn delete(&self, token: &str) -> Result<(), StoreError>;

    /// Atomically moves a session from `old` to `fresh`: once this returns,
    /// `old` no longer finds anything. Returns the token the session now
    /// lives under.
    ///
    /// With `converge` set, a renewal of an `old` that was already renewed
    /// the same way within [`RENEWAL_GRACE_SECS`] returns that earlier
    /// successor instead of `fresh`. Without it, `fresh` is always stored and
    /// returned, and no successor link is recorded for `old`.
    async fn renew(
        &self,
        old: &str,
        fresh: &str,
        payload: Vec<u8>,
        expiry: DateTime<Utc>,
        converge: bool,
    ) -> Result<String, StoreError>;
}

#[derive(Debug)]
struct Entry {
    payload: Vec<u8>,
    expiry: DateTime<Utc>,
}

#[derive(Debug)]
struct Successor {
    token: String,
    until: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct Inner {
    records: HashMap<String, Entry>,
    successors: HashMap<String, Successor>,
}

/// Process-local session store.
///
/// All state sits behind one read/write lock: lookups share it, every
/// mutation (including the two-step move of a renewal) holds it exclusively,
/// so a concurrent reader sees either the old token or the new one, never
/// both and never neither.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drops expired records and stale renewal links.
    pub fn cleanup(&self) -> usize {
        let now = Utc::now();
        let mut inner = self.inner.write();
        let before = inner.records.len();
        inner.records.retain(|_, e| e.expiry > now);
        inner.successors.retain(|_, s| s.until > now);
        before - inner.records.len()
    }

    /// Runs [`cleanup`](Self::cleanup) every `every` until the store is dropped.
    pub fn spawn_cleanup(self: &Arc<Self>, every: Duration) -> JoinHandle<()> {
        let store: Weak<Self> = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(store) = store.upgrade() else { break };
                let removed = store.cleanup();
                if removed > 0 {
                    debug!(removed, "expired sessions removed");
                }
            }
        })
    }

    pub fn len(&self) -> usize {
        self.inner.read().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn find(&self, token: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let now = Utc::now();
        Ok(self.inner
            .read()
            .records
            .get(token)
            .filter(|e| e.expiry > now)
            .map(|e| e.payload.clone()))
    }

    async fn commit(&self, token: &str, payload: Vec<u8>, expiry: DateTime<Utc>) -> Result<(), StoreError> {
        self.inner.write().records.insert(token.to_owned(), Entry { payload, expiry });
        Ok(())
    }

    async fn delete(&self, token: &str) -> Result<(), StoreError> {
        self.inner.write().records.remove(token);
        Ok(())
    }

    async fn renew(
        &self,
        old: &str,
        fresh: &str,
        payload: Vec<u8>,
        expiry: DateTime<Utc>,
        converge: bool,
    ) -> Result<String, StoreError> {
        let now = Utc::now();
        let mut inner = self.inner.write();

        let removed = inner.records.remove(old).is_some();
        if !converge {
            inner.records.insert(fresh.to_owned(), Entry { payload, expiry });
            return Ok(fresh.to_owned());
        }

        if !removed {
            if let Some(next) = inner.successors.get(old).filter(|s| s.until > now) {
                return Ok(next.token.clone());
            }
        }

        inner.records.insert(fresh.to_owned(), Entry { payload, expiry });
        inner.successors.insert(old.to_owned(), Successor {
            token: fresh.to_owned(),
            until: now + chrono::Duration::seconds(RENEWAL_GRACE_SECS),
        });
        Ok(fresh.to_owned())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    fn later() -> DateTime<Utc> {
        Utc::now() + chrono::Duration::hours(1)
    }

    #[tokio::test]
    async fn expired_records_are_invisible_and_cleaned_up() {
        let store = MemoryStore::new();
        store.commit("live", b"a".to_vec(), later()).await.unwrap();
        store.commit("dead", b"b".to_vec(), Utc::now() - chrono::Duration::seconds(1)).await.unwrap();

        assert_eq!(store.find("live").await.unwrap(), Some(b"a".to_vec()));
        assert_eq!(store.find("dead").await.unwrap(), None);
        assert_eq!(store.cleanup(), 1);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn renewal_invalidates_the_old_token() {
        let store = MemoryStore::new();
        store.commit("old", b"data".to_vec(), later()).await.unwrap();

        let token = store.renew("old", "new", b"data".to_vec(), later(), true).await.unwrap();
        assert_eq!(token, "new");
        assert_eq!(store.find("old").await.unwrap(), None);
        assert_eq!(store.find("new").await.unwrap(), Some(b"data".to_vec()));
    }

    #[tokio::test]
    async fn repeated_renewal_converges_on_the_first_successor() {
        let store = MemoryStore::new();
        store.commit("old", b"data".to_vec(), later()).await.unwrap();

        let first = store.renew("old", "one", b"data".to_vec(), later(), true).await.unwrap();
        let second = store.renew("old", "two", b"data".to_vec(), later(), true).await.unwrap();
        assert_eq!(first, "one");
        assert_eq!(second, "one");
        assert_eq!(store.len(), 1);
        assert_eq!(store.find("two").await.unwrap(), None);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_renewals_have_exactly_one_winner() {
        let store = Arc::new(MemoryStore::new());
        store.commit("shared", b"data".to_vec(), later()).await.unwrap();

        let tasks: Vec<_> = (0..8)
            .map(|i| {
                let store = Arc::clone(&store);
                tokio::spawn(async move {
                    store.renew("shared", &format!("fresh-{i}"), b"data".to_vec(), later(), true).await.unwrap()
                })
            })
            .collect();

        let mut tokens = HashSet::new();
        for task in tasks {
            tokens.insert(task.await.unwrap());
        }

        assert_eq!(tokens.len(), 1);
        let winner = tokens.into_iter().next().unwrap();
        assert_eq!(store.len(), 1);
        assert!(store.find(&winner).await.unwrap().is_some());
        assert!(store.find("shared").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn renewing_an_unknown_token_stores_the_fresh_one() {
        let store = MemoryStore::new();
        let token = store.renew("never-saved", "fresh", b"x".to_vec(), later(), true).await.unwrap();
        assert_eq!(token, "fresh");
        assert!(store.find("fresh").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn non_converging_renewals_never_share_a_successor() {
        let store = MemoryStore::new();
        store.commit("anon", b"data".to_vec(), later()).await.unwrap();

        let first = store.renew("anon", "first", b"one".to_vec(), later(), false).await.unwrap();
        let second = store.renew("anon", "second", b"two".to_vec(), later(), false).await.unwrap();
        assert_eq!(first, "first");
        assert_eq!(second, "second");
        assert_eq!(store.find("first").await.unwrap(), Some(b"one".to_vec()));
        assert_eq!(store.find("second").await.unwrap(), Some(b"two".to_vec()));
        assert_eq!(store.find("anon").await.unwrap(), None);

        let third = store.renew("anon", "third", b"three".to_vec(), later(), true).await.unwrap();
        assert_eq!(third, "third");
    }
}
