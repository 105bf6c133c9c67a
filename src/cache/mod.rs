//! Session and user cache port with Redis and in-memory adapters.
//!
//! The cache holds two kinds of entries, both with an absolute TTL:
//!
//! - `session:{token}` → user id
//! - `user:{id}` → JSON copy of the [`User`] row
//!
//! Sessions live only here. User entries are a derivative of the durable
//! store and may be evicted at any time.

pub mod memory;
pub mod redis_cache;

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;

use crate::domain::{User, UserId};

pub use memory::InMemoryCache;
pub use redis_cache::RedisCache;

/// Errors surfaced by cache adapters.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CacheError {
    /// Cache backend is unavailable or timing out.
    #[error("cache backend failure: {0}")]
    Backend(String),
    /// A cached value could not be encoded or decoded.
    #[error("cache serialisation failed: {0}")]
    Serialization(String),
}

/// Key for a session entry.
#[must_use]
pub fn session_key(token: &str) -> String {
    format!("session:{token}")
}

/// Key for a cached user entry.
#[must_use]
pub fn user_key(user_id: UserId) -> String {
    format!("user:{user_id}")
}

/// Token-keyed session storage plus a short-lived user cache.
#[async_trait]
pub trait SessionCache: Send + Sync + fmt::Debug {
    /// Stores `token → user_id`, expiring after `ttl`.
    ///
    /// # Errors
    ///
    /// [`CacheError::Backend`] when the cache is unreachable.
    async fn set_session(&self, token: &str, user_id: UserId, ttl: Duration)
    -> Result<(), CacheError>;

    /// Returns the user bound to `token`, or `None` if missing or expired.
    ///
    /// # Errors
    ///
    /// [`CacheError::Backend`] when the cache is unreachable.
    async fn get_session(&self, token: &str) -> Result<Option<UserId>, CacheError>;

    /// Removes a session. Removing an unknown token succeeds.
    ///
    /// # Errors
    ///
    /// [`CacheError::Backend`] when the cache is unreachable.
    async fn delete_session(&self, token: &str) -> Result<(), CacheError>;

    /// Stores a copy of `user`, expiring after `ttl`.
    ///
    /// # Errors
    ///
    /// [`CacheError::Backend`] when the cache is unreachable,
    /// [`CacheError::Serialization`] when the entry cannot be encoded or decoded.
    async fn cache_user(&self, user: &User, ttl: Duration) -> Result<(), CacheError>;

    /// Returns the cached copy of a user, if present.
    ///
    /// # Errors
    ///
    /// [`CacheError::Backend`] when the cache is unreachable,
    /// [`CacheError::Serialization`] when the entry cannot be encoded or decoded.
    async fn get_cached_user(&self, user_id: UserId) -> Result<Option<User>, CacheError>;

    /// Drops the cached copy of a user.
    ///
    /// # Errors
    ///
    /// [`CacheError::Backend`] when the cache is unreachable.
    async fn evict_user(&self, user_id: UserId) -> Result<(), CacheError>;
}
