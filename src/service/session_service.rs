//! Session and access-control service.
//!
//! Resolves bearer/cookie tokens to a [`Principal`] through the
//! [`SessionCache`], and serves user records through a best-effort
//! read-through cache in front of the [`UserStore`]. User-cache failures
//! are logged and fall back to the durable store; they never fail the
//! caller.

use std::sync::Arc;
use std::time::Duration;

use base64::Engine;
use rand::RngCore;

use crate::cache::SessionCache;
use crate::domain::{Principal, User, UserId, UserStore};
use crate::error::ServiceError;

/// Random bytes per session token (256 bits).
const TOKEN_BYTES: usize = 32;

/// Generates an unguessable session token encoded as base64url
/// (43 characters).
#[must_use]
pub fn generate_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes)
}

/// Session/cache layer and identity resolution for every other component.
#[derive(Debug, Clone)]
pub struct SessionService {
    cache: Arc<dyn SessionCache>,
    users: Arc<dyn UserStore>,
    session_ttl: Duration,
    user_cache_ttl: Duration,
}

impl SessionService {
    /// Creates a new `SessionService`.
    #[must_use]
    pub fn new(
        cache: Arc<dyn SessionCache>,
        users: Arc<dyn UserStore>,
        session_ttl: Duration,
        user_cache_ttl: Duration,
    ) -> Self {
        Self {
            cache,
            users,
            session_ttl,
            user_cache_ttl,
        }
    }

    /// Configured lifetime of new sessions.
    #[must_use]
    pub const fn session_ttl(&self) -> Duration {
        self.session_ttl
    }

    /// Starts a session for `user_id` and returns its token.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Internal`] if the session cannot be stored.
    pub async fn create_session(
        &self,
        user_id: UserId,
        ttl: Duration,
    ) -> Result<String, ServiceError> {
        let token = generate_token();
        self.cache.set_session(&token, user_id, ttl).await?;
        tracing::info!(%user_id, ttl_secs = ttl.as_secs(), "session created");
        Ok(token)
    }

    /// Resolves a token to the user it was issued for.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Unauthenticated`] if the token is unknown or
    /// expired, or if the session cache cannot be reached.
    pub async fn resolve_session(&self, token: &str) -> Result<UserId, ServiceError> {
        match self.cache.get_session(token).await {
            Ok(Some(user_id)) => Ok(user_id),
            Ok(None) => Err(ServiceError::Unauthenticated(
                "session missing or expired".to_string(),
            )),
            Err(e) => {
                tracing::error!(error = %e, "session lookup failed");
                Err(ServiceError::Unauthenticated(
                    "session could not be verified".to_string(),
                ))
            }
        }
    }

    /// Ends a session. Unknown tokens are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Internal`] if the cache rejects the delete.
    pub async fn invalidate_session(&self, token: &str) -> Result<(), ServiceError> {
        self.cache.delete_session(token).await?;
        tracing::info!("session invalidated");
        Ok(())
    }

    /// Loads a user, preferring the cached copy.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::NotFound`] for an unknown id and
    /// [`ServiceError::StorageFailure`] if the durable store fails.
    pub async fn get_user(&self, user_id: UserId) -> Result<User, ServiceError> {
        match self.cache.get_cached_user(user_id).await {
            Ok(Some(user)) => return Ok(user),
            Ok(None) => {}
            Err(e) => tracing::warn!(%user_id, error = %e, "user cache read failed"),
        }

        let user = self
            .users
            .find_user(user_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("user {user_id}")))?;

        self.cache_user(&user).await;
        Ok(user)
    }

    /// Stores a copy of `user` in the cache, logging failures.
    pub async fn cache_user(&self, user: &User) {
        if let Err(e) = self.cache.cache_user(user, self.user_cache_ttl).await {
            tracing::warn!(user_id = %user.id, error = %e, "user cache write failed");
        }
    }

    /// Drops the cached copy of a user after its row changed.
    pub async fn invalidate_user(&self, user_id: UserId) {
        if let Err(e) = self.cache.evict_user(user_id).await {
            tracing::warn!(%user_id, error = %e, "user cache eviction failed");
        }
    }

    /// Resolves a token to the caller's identity and role.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Unauthenticated`] for a bad token or a
    /// session whose user no longer exists.
    pub async fn authenticate(&self, token: &str) -> Result<Principal, ServiceError> {
        let user_id = self.resolve_session(token).await?;
        match self.get_user(user_id).await {
            Ok(user) => Ok(Principal::from(&user)),
            Err(ServiceError::NotFound(_)) => Err(ServiceError::Unauthenticated(
                "user not found".to_string(),
            )),
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use async_trait::async_trait;

    use super::*;
    use crate::cache::{CacheError, InMemoryCache};
    use crate::persistence::InMemoryStore;

    /// Cache whose every call fails, standing in for a Redis outage.
    #[derive(Debug)]
    struct BrokenCache;

    #[async_trait]
    impl SessionCache for BrokenCache {
        async fn set_session(&self, _: &str, _: UserId, _: Duration) -> Result<(), CacheError> {
            Err(CacheError::Backend("down".to_string()))
        }
        async fn get_session(&self, _: &str) -> Result<Option<UserId>, CacheError> {
            Err(CacheError::Backend("down".to_string()))
        }
        async fn delete_session(&self, _: &str) -> Result<(), CacheError> {
            Err(CacheError::Backend("down".to_string()))
        }
        async fn cache_user(&self, _: &User, _: Duration) -> Result<(), CacheError> {
            Err(CacheError::Backend("down".to_string()))
        }
        async fn get_cached_user(&self, _: UserId) -> Result<Option<User>, CacheError> {
            Err(CacheError::Backend("down".to_string()))
        }
        async fn evict_user(&self, _: UserId) -> Result<(), CacheError> {
            Err(CacheError::Backend("down".to_string()))
        }
    }

    fn service(cache: Arc<dyn SessionCache>, users: Arc<InMemoryStore>) -> SessionService {
        SessionService::new(
            cache,
            users,
            Duration::from_secs(60),
            Duration::from_secs(60),
        )
    }

    #[test]
    fn tokens_are_long_and_unique() {
        let a = generate_token();
        let b = generate_token();
        assert_eq!(a.len(), 43);
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn create_resolve_invalidate() {
        let store = Arc::new(InMemoryStore::new());
        let svc = service(Arc::new(InMemoryCache::new()), store);
        let ttl = svc.session_ttl();

        let Ok(token) = svc.create_session(UserId::new(9), ttl).await else {
            panic!("session creation failed");
        };
        let Ok(user_id) = svc.resolve_session(&token).await else {
            panic!("session should resolve");
        };
        assert_eq!(user_id, UserId::new(9));

        assert!(svc.invalidate_session(&token).await.is_ok());
        assert!(svc.invalidate_session(&token).await.is_ok());
        assert!(matches!(
            svc.resolve_session(&token).await,
            Err(ServiceError::Unauthenticated(_))
        ));
    }

    #[tokio::test]
    async fn user_lookup_survives_cache_outage() {
        let store = Arc::new(InMemoryStore::new());
        let Ok(user) = store.create_user("ann", "hash", true).await else {
            panic!("user creation failed");
        };
        let svc = service(Arc::new(BrokenCache), Arc::clone(&store));

        let Ok(loaded) = svc.get_user(user.id).await else {
            panic!("lookup should fall back to the store");
        };
        assert_eq!(loaded, user);
    }

    #[tokio::test]
    async fn authenticate_reads_role_from_user_record() {
        let store = Arc::new(InMemoryStore::new());
        let Ok(user) = store.create_user("mod", "hash", true).await else {
            panic!("user creation failed");
        };
        let svc = service(Arc::new(InMemoryCache::new()), Arc::clone(&store));
        let Ok(token) = svc.create_session(user.id, svc.session_ttl()).await else {
            panic!("session creation failed");
        };
        let Ok(principal) = svc.authenticate(&token).await else {
            panic!("authentication failed");
        };
        assert!(principal.is_moderator);
        assert_eq!(principal.user_id, user.id);
    }

    #[tokio::test]
    async fn session_for_unknown_user_is_unauthenticated() {
        let store = Arc::new(InMemoryStore::new());
        let svc = service(Arc::new(InMemoryCache::new()), store);
        let Ok(token) = svc.create_session(UserId::new(77), svc.session_ttl()).await else {
            panic!("session creation failed");
        };
        assert!(matches!(
            svc.authenticate(&token).await,
            Err(ServiceError::Unauthenticated(_))
        ));
    }
}
