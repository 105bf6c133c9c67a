//! Process-local session cache with absolute expiry.
//!
//! Suitable for tests and single-instance development runs; sessions are
//! not shared between service instances.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::{CacheError, SessionCache, session_key, user_key};
use crate::domain::{User, UserId};

#[derive(Debug, Clone)]
enum Entry {
    Session(UserId),
    User(User),
}

/// `None` when the TTL is too large to represent; such entries never expire.
type Expiry = Option<Instant>;

fn is_live(expires_at: Expiry, now: Instant) -> bool {
    expires_at.is_none_or(|at| at > now)
}

/// In-memory [`SessionCache`] keyed exactly like the Redis adapter.
#[derive(Debug, Default)]
pub struct InMemoryCache {
    entries: Mutex<HashMap<String, (Entry, Expiry)>>,
}

impl InMemoryCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    async fn put(&self, key: String, entry: Entry, ttl: Duration) {
        let now = Instant::now();
        let mut entries = self.entries.lock().await;
        entries.retain(|_, (_, expires_at)| is_live(*expires_at, now));
        entries.insert(key, (entry, now.checked_add(ttl)));
    }

    async fn live(&self, key: &str) -> Option<Entry> {
        let mut entries = self.entries.lock().await;
        match entries.get(key) {
            Some((entry, expires_at)) if is_live(*expires_at, Instant::now()) => {
                Some(entry.clone())
            }
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }
}

#[async_trait]
impl SessionCache for InMemoryCache {
    async fn set_session(
        &self,
        token: &str,
        user_id: UserId,
        ttl: Duration,
    ) -> Result<(), CacheError> {
        self.put(session_key(token), Entry::Session(user_id), ttl).await;
        Ok(())
    }

    async fn get_session(&self, token: &str) -> Result<Option<UserId>, CacheError> {
        Ok(match self.live(&session_key(token)).await {
            Some(Entry::Session(user_id)) => Some(user_id),
            _ => None,
        })
    }

    async fn delete_session(&self, token: &str) -> Result<(), CacheError> {
        self.entries.lock().await.remove(&session_key(token));
        Ok(())
    }

    async fn cache_user(&self, user: &User, ttl: Duration) -> Result<(), CacheError> {
        self.put(user_key(user.id), Entry::User(user.clone()), ttl)
            .await;
        Ok(())
    }

    async fn get_cached_user(&self, user_id: UserId) -> Result<Option<User>, CacheError> {
        Ok(match self.live(&user_key(user_id)).await {
            Some(Entry::User(user)) => Some(user),
            _ => None,
        })
    }

    async fn evict_user(&self, user_id: UserId) -> Result<(), CacheError> {
        self.entries.lock().await.remove(&user_key(user_id));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn session_round_trip_and_delete() {
        let cache = InMemoryCache::new();
        let _ = cache
            .set_session("tok", UserId::new(3), Duration::from_secs(60))
            .await;
        assert_eq!(cache.get_session("tok").await, Ok(Some(UserId::new(3))));

        let _ = cache.delete_session("tok").await;
        assert_eq!(cache.get_session("tok").await, Ok(None));
        // Idempotent.
        assert_eq!(cache.delete_session("tok").await, Ok(()));
    }

    #[tokio::test]
    async fn session_expires_absolutely() {
        let cache = InMemoryCache::new();
        let _ = cache
            .set_session("tok", UserId::new(3), Duration::from_millis(30))
            .await;
        assert!(matches!(cache.get_session("tok").await, Ok(Some(_))));
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(cache.get_session("tok").await, Ok(None));
    }

    #[tokio::test]
    async fn user_entries_do_not_collide_with_sessions() {
        let cache = InMemoryCache::new();
        let user = User {
            id: UserId::new(1),
            username: "ann".to_string(),
            password_hash: String::new(),
            is_moderator: false,
        };
        let _ = cache.cache_user(&user, Duration::from_secs(60)).await;
        assert_eq!(cache.get_cached_user(UserId::new(1)).await, Ok(Some(user)));
        assert_eq!(cache.get_session("1").await, Ok(None));

        let _ = cache.evict_user(UserId::new(1)).await;
        assert_eq!(cache.get_cached_user(UserId::new(1)).await, Ok(None));
    }

    #[tokio::test]
    async fn huge_ttl_never_expires() {
        let cache = InMemoryCache::new();
        let _ = cache
            .set_session("tok", UserId::new(3), Duration::MAX)
            .await;
        assert_eq!(cache.get_session("tok").await, Ok(Some(UserId::new(3))));
    }

    #[tokio::test]
    async fn writes_prune_expired_entries() {
        let cache = InMemoryCache::new();
        for token in ["a", "b", "c"] {
            let _ = cache
                .set_session(token, UserId::new(1), Duration::from_millis(10))
                .await;
        }
        tokio::time::sleep(Duration::from_millis(30)).await;
        let _ = cache
            .set_session("fresh", UserId::new(2), Duration::from_secs(60))
            .await;
        assert_eq!(cache.entries.lock().await.len(), 1);
    }
}
