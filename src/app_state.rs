//! Shared application state injected into all Axum handlers.

use std::sync::Arc;

use crate::cache::SessionCache;
use crate::config::ServiceConfig;
use crate::domain::{RequestStore, StarCatalog, UserStore};
use crate::service::{
    CallbackReceiver, CatalogService, ComputeDispatcher, LifecycleEngine, RequestService,
    SessionService, UserService,
};

/// Adapters the services are wired to.
#[derive(Debug, Clone)]
pub struct Backends {
    /// Durable request/association store.
    pub requests: Arc<dyn RequestStore>,
    /// Durable account store.
    pub users: Arc<dyn UserStore>,
    /// Star catalog.
    pub catalog: Arc<dyn StarCatalog>,
    /// Session and user cache.
    pub cache: Arc<dyn SessionCache>,
    /// Outbound computation dispatcher.
    pub dispatcher: Arc<dyn ComputeDispatcher>,
}

/// Shared application state available to all handlers via Axum's
/// `State` extractor.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Token resolution and the user cache.
    pub sessions: Arc<SessionService>,
    /// Accounts.
    pub users: Arc<UserService>,
    /// Draft cart and associations.
    pub requests: Arc<RequestService>,
    /// Request state machine.
    pub lifecycle: Arc<LifecycleEngine>,
    /// Computation callback entry point.
    pub callbacks: Arc<CallbackReceiver>,
    /// Star catalog.
    pub catalog: Arc<CatalogService>,
}

impl AppState {
    /// Wires every service to `backends` using the settings in `config`.
    #[must_use]
    pub fn new(backends: Backends, config: &ServiceConfig) -> Self {
        let sessions = SessionService::new(
            backends.cache,
            Arc::clone(&backends.users),
            config.session_ttl,
            config.user_cache_ttl,
        );
        let lifecycle = LifecycleEngine::new(
            Arc::clone(&backends.requests),
            backends.dispatcher,
            config.system_moderator_id,
        );
        let callbacks = CallbackReceiver::new(lifecycle.clone(), config.async_shared_secret.clone());

        Self {
            users: Arc::new(UserService::new(backends.users, sessions.clone())),
            sessions: Arc::new(sessions),
            requests: Arc::new(RequestService::new(
                backends.requests,
                Arc::clone(&backends.catalog),
            )),
            lifecycle: Arc::new(lifecycle),
            callbacks: Arc::new(callbacks),
            catalog: Arc::new(CatalogService::new(backends.catalog)),
        }
    }
}
