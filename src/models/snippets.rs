use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use parking_lot::RwLock;

use super::{Snippet, SnippetStore, StoreError};

const LATEST_LIMIT: usize = 10;

#[derive(Debug, Default)]
pub struct MemorySnippets {
    inner: RwLock<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    last_id: i64,
    rows: BTreeMap<i64, Snippet>,
}

impl MemorySnippets {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SnippetStore for MemorySnippets {
    async fn insert(&self, title: &str, content: &str, expires_days: i64) -> Result<i64, StoreError> {
        let now = Utc::now();
        let expires = Duration::try_days(expires_days)
            .and_then(|d| now.checked_add_signed(d))
            .ok_or_else(|| StoreError::Unavailable(format!("expiry of {expires_days} days is out of range")))?;

        let mut inner = self.inner.write();
        inner.last_id += 1;
        let id = inner.last_id;
        inner.rows.insert(id, Snippet {
            id,
            title: title.to_owned(),
            content: content.to_owned(),
            created: now,
            expires,
        });
        Ok(id)
    }

    async fn get(&self, id: i64) -> Result<Snippet, StoreError> {
        let now = Utc::now();
        self.inner
            .read()
            .rows
            .get(&id)
            .filter(|s| s.expires > now)
            .cloned()
            .ok_or(StoreError::NoRecord)
    }

    async fn latest(&self) -> Result<Vec<Snippet>, StoreError> {
        let now = Utc::now();
        Ok(self.inner
            .read()
            .rows
            .values()
            .rev()
            .filter(|s| s.expires > now)
            .take(LATEST_LIMIT)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn inserted_snippets_can_be_fetched() {
        let store = MemorySnippets::new();
        let id = store.insert("An old silent pond", "A frog jumps into the pond", 7).await.unwrap();
        let snippet = store.get(id).await.unwrap();
        assert_eq!(snippet.title, "An old silent pond");
        assert!(snippet.expires > snippet.created);
    }

    #[tokio::test]
    async fn expired_and_missing_snippets_are_no_record() {
        let store = MemorySnippets::new();
        let id = store.insert("gone", "already expired", -1).await.unwrap();
        assert!(matches!(store.get(id).await, Err(StoreError::NoRecord)));
        assert!(matches!(store.get(999).await, Err(StoreError::NoRecord)));
    }

    #[tokio::test]
    async fn latest_returns_ten_newest_unexpired() {
        let store = MemorySnippets::new();
        for i in 0..12 {
            store.insert(&format!("s{i}"), "body", 1).await.unwrap();
        }
        store.insert("expired", "body", -1).await.unwrap();

        let latest = store.latest().await.unwrap();
        assert_eq!(latest.len(), 10);
        assert_eq!(latest[0].title, "s11");
        assert_eq!(latest[9].title, "s2");
    }
}
