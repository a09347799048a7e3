use async_trait::async_trait;
use dashmap::DashMap;
use std::time::Duration;
use tokio::time::Instant;

/// Key-value store with per-entry expiry, used to share access tokens.
///
/// Writes are last-writer-wins; callers treat every operation as best-effort.
#[async_trait]
pub trait TokenCache: Send + Sync + std::fmt::Debug {
    /// # Errors
    /// Returns an error if the backing store is unreachable.
    async fn get(&self, key: &str) -> anyhow::Result<Option<String>>;

    /// # Errors
    /// Returns an error if the backing store is unreachable.
    async fn put(&self, key: &str, value: &str, ttl: Duration) -> anyhow::Result<()>;
}

/// Process-local cache.
#[derive(Debug, Default)]
pub struct InMemoryTokenCache {
    entries: DashMap<String, (String, Instant)>,
}

impl InMemoryTokenCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TokenCache for InMemoryTokenCache {
    async fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
        let now = Instant::now();
        if let Some(entry) = self.entries.get(key) {
            let (value, expires_at) = entry.value();
            if *expires_at > now {
                return Ok(Some(value.clone()));
            }
        }
        // Expired: evict, unless a fresher entry raced in.
        self.entries.remove_if(key, |_, (_, expires_at)| *expires_at <= now);
        Ok(None)
    }

    async fn put(&self, key: &str, value: &str, ttl: Duration) -> anyhow::Result<()> {
        self.entries.insert(key.to_string(), (value.to_string(), Instant::now() + ttl));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_entry_expires_after_ttl() {
        let cache = InMemoryTokenCache::new();
        cache.put("k", "v", Duration::from_secs(10)).await.unwrap();

        assert_eq!(cache.get("k").await.unwrap().as_deref(), Some("v"));

        tokio::time::advance(Duration::from_secs(11)).await;
        assert_eq!(cache.get("k").await.unwrap(), None);
        assert!(cache.entries.is_empty());
    }

    #[tokio::test]
    async fn test_last_writer_wins() {
        let cache = InMemoryTokenCache::new();
        cache.put("k", "first", Duration::from_secs(60)).await.unwrap();
        cache.put("k", "second", Duration::from_secs(60)).await.unwrap();
        assert_eq!(cache.get("k").await.unwrap().as_deref(), Some("second"));
        assert_eq!(cache.get("missing").await.unwrap(), None);
    }
}
