//! Redis-backed session cache.
//!
//! Values are written with `SETEX`, so expiry is enforced by Redis and is
//! absolute: reading a session does not extend it.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client};

use super::{CacheError, SessionCache, session_key, user_key};
use crate::domain::{User, UserId};

/// Session cache shared by every service instance through Redis.
#[derive(Clone)]
pub struct RedisCache {
    conn_manager: ConnectionManager,
}

impl fmt::Debug for RedisCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisCache").finish_non_exhaustive()
    }
}

impl RedisCache {
    /// Connects to Redis at `redis_url` (e.g. `redis://127.0.0.1:6379`).
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Backend`] if the client cannot be created or
    /// the first connection fails.
    pub async fn connect(redis_url: &str) -> Result<Self, CacheError> {
        let client = Client::open(redis_url)
            .map_err(|e| CacheError::Backend(format!("failed to create Redis client: {e}")))?;
        let conn_manager = ConnectionManager::new(client).await.map_err(|e| {
            CacheError::Backend(format!("failed to create Redis connection manager: {e}"))
        })?;
        Ok(Self { conn_manager })
    }
}

/// Converts a TTL to whole seconds, never less than one.
fn ttl_seconds(ttl: Duration) -> u64 {
    ttl.as_secs().max(1)
}

fn backend(e: redis::RedisError) -> CacheError {
    CacheError::Backend(e.to_string())
}

#[async_trait]
impl SessionCache for RedisCache {
    async fn set_session(
        &self,
        token: &str,
        user_id: UserId,
        ttl: Duration,
    ) -> Result<(), CacheError> {
        let mut conn = self.conn_manager.clone();
        conn.set_ex::<_, _, ()>(session_key(token), user_id.get(), ttl_seconds(ttl))
            .await
            .map_err(backend)
    }

    async fn get_session(&self, token: &str) -> Result<Option<UserId>, CacheError> {
        let mut conn = self.conn_manager.clone();
        let raw: Option<i64> = conn.get(session_key(token)).await.map_err(backend)?;
        Ok(raw.map(UserId::new))
    }

    async fn delete_session(&self, token: &str) -> Result<(), CacheError> {
        let mut conn = self.conn_manager.clone();
        conn.del::<_, ()>(session_key(token)).await.map_err(backend)
    }

    async fn cache_user(&self, user: &User, ttl: Duration) -> Result<(), CacheError> {
        let payload =
            serde_json::to_string(user).map_err(|e| CacheError::Serialization(e.to_string()))?;
        let mut conn = self.conn_manager.clone();
        conn.set_ex::<_, _, ()>(user_key(user.id), payload, ttl_seconds(ttl))
            .await
            .map_err(backend)
    }

    async fn get_cached_user(&self, user_id: UserId) -> Result<Option<User>, CacheError> {
        let mut conn = self.conn_manager.clone();
        let raw: Option<String> = conn.get(user_key(user_id)).await.map_err(backend)?;
        raw.map(|json| {
            serde_json::from_str(&json).map_err(|e| CacheError::Serialization(e.to_string()))
        })
        .transpose()
    }

    async fn evict_user(&self, user_id: UserId) -> Result<(), CacheError> {
        let mut conn = self.conn_manager.clone();
        conn.del::<_, ()>(user_key(user_id)).await.map_err(backend)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ttl_rounds_up_to_one_second() {
        assert_eq!(ttl_seconds(Duration::from_millis(10)), 1);
        assert_eq!(ttl_seconds(Duration::from_secs(600)), 600);
    }

    #[test]
    fn keys_are_namespaced() {
        assert_eq!(session_key("abc"), "session:abc");
        assert_eq!(user_key(UserId::new(4)), "user:4");
    }
}
