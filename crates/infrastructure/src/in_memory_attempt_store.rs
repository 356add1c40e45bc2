//! In-memory attempt store.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tokio::sync::RwLock;
use tracing::debug;

use attemptguard_application::AttemptStore;
use attemptguard_core::AppResult;

/// In-memory adapter for the attempt store port.
///
/// Histories live for the lifetime of the process; there is no eviction
/// thread. Stale timestamps are dropped as a side effect of `append` and by
/// explicit `prune` sweeps. Every read-filter-write sequence runs under a
/// single write-lock acquisition, so concurrent calls for the same key
/// cannot lose updates.
#[derive(Default)]
pub struct InMemoryAttemptStore {
    histories: RwLock<HashMap<String, Vec<DateTime<Utc>>>>,
}

impl InMemoryAttemptStore {
    /// Creates an empty in-memory attempt store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AttemptStore for InMemoryAttemptStore {
    async fn load(&self, key: &str) -> AppResult<Vec<DateTime<Utc>>> {
        Ok(self
            .histories
            .read()
            .await
            .get(key)
            .cloned()
            .unwrap_or_default())
    }

    async fn append(&self, key: &str, at: DateTime<Utc>, window: Duration) -> AppResult<()> {
        let mut histories = self.histories.write().await;
        let history = histories.entry(key.to_owned()).or_default();
        history.retain(|recorded| at - *recorded < window);
        history.push(at);

        Ok(())
    }

    async fn remove(&self, key: &str) -> AppResult<()> {
        self.histories.write().await.remove(key);
        Ok(())
    }

    async fn clear(&self) -> AppResult<()> {
        self.histories.write().await.clear();
        Ok(())
    }

    async fn prune(&self, before: DateTime<Utc>) -> AppResult<u64> {
        let mut histories = self.histories.write().await;
        let tracked = histories.len();

        histories.retain(|_, history| {
            history.retain(|recorded| *recorded > before);
            !history.is_empty()
        });

        let removed = (tracked - histories.len()) as u64;
        if removed > 0 {
            debug!(removed, "pruned stale attempt keys");
        }

        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn load_returns_empty_history_for_unknown_keys() {
        let store = InMemoryAttemptStore::new();

        let history = store
            .load("login:user@example.com")
            .await
            .unwrap_or_else(|_| panic!("test"));
        assert!(history.is_empty());
    }

    #[tokio::test]
    async fn append_keeps_timestamps_in_arrival_order() {
        let store = InMemoryAttemptStore::new();
        let window = Duration::minutes(15);
        let base = Utc::now();

        for offset in 0..3 {
            let result = store
                .append("login:user@example.com", base + Duration::seconds(offset), window)
                .await;
            assert!(result.is_ok());
        }

        let history = store
            .load("login:user@example.com")
            .await
            .unwrap_or_else(|_| panic!("test"));
        assert_eq!(history.len(), 3);
        assert!(history.windows(2).all(|pair| pair[0] <= pair[1]));
    }

    #[tokio::test]
    async fn append_discards_entries_that_aged_out_of_the_window() {
        let store = InMemoryAttemptStore::new();
        let window = Duration::minutes(15);
        let stale = Utc::now() - Duration::minutes(30);
        let now = Utc::now();

        let result = store.append("login:user@example.com", stale, window).await;
        assert!(result.is_ok());
        let result = store.append("login:user@example.com", now, window).await;
        assert!(result.is_ok());

        let history = store
            .load("login:user@example.com")
            .await
            .unwrap_or_else(|_| panic!("test"));
        assert_eq!(history, vec![now]);
    }

    #[tokio::test]
    async fn remove_forgets_a_single_key() {
        let store = InMemoryAttemptStore::new();
        let window = Duration::minutes(15);
        let now = Utc::now();

        let result = store.append("login:first@example.com", now, window).await;
        assert!(result.is_ok());
        let result = store.append("login:second@example.com", now, window).await;
        assert!(result.is_ok());

        let result = store.remove("login:first@example.com").await;
        assert!(result.is_ok());

        let first = store
            .load("login:first@example.com")
            .await
            .unwrap_or_else(|_| panic!("test"));
        assert!(first.is_empty());

        let second = store
            .load("login:second@example.com")
            .await
            .unwrap_or_else(|_| panic!("test"));
        assert_eq!(second.len(), 1);
    }

    #[tokio::test]
    async fn clear_wipes_every_key() {
        let store = InMemoryAttemptStore::new();
        let window = Duration::minutes(15);
        let now = Utc::now();

        let result = store.append("login:user@example.com", now, window).await;
        assert!(result.is_ok());

        let result = store.clear().await;
        assert!(result.is_ok());

        let history = store
            .load("login:user@example.com")
            .await
            .unwrap_or_else(|_| panic!("test"));
        assert!(history.is_empty());
    }

    #[tokio::test]
    async fn prune_drops_emptied_keys_and_reports_the_count() {
        let store = InMemoryAttemptStore::new();
        let window = Duration::minutes(15);
        let stale = Utc::now() - Duration::minutes(30);
        let recent = Utc::now();

        let result = store.append("login:stale@example.com", stale, window).await;
        assert!(result.is_ok());
        let result = store
            .append("login:active@example.com", recent, window)
            .await;
        assert!(result.is_ok());

        let removed = store
            .prune(Utc::now() - window)
            .await
            .unwrap_or_else(|_| panic!("test"));
        assert_eq!(removed, 1);

        let stale_history = store
            .load("login:stale@example.com")
            .await
            .unwrap_or_else(|_| panic!("test"));
        assert!(stale_history.is_empty());

        let active_history = store
            .load("login:active@example.com")
            .await
            .unwrap_or_else(|_| panic!("test"));
        assert_eq!(active_history.len(), 1);
    }
}
