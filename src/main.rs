//! skywatch-gateway server entry point.
//!
//! Loads configuration, wires the storage/cache/dispatcher adapters into the
//! services, and starts the Axum HTTP server.

use std::sync::Arc;

use anyhow::Context;
use tower_http::cors::CorsLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use skywatch_gateway::api;
use skywatch_gateway::app_state::{AppState, Backends};
use skywatch_gateway::cache::{InMemoryCache, RedisCache, SessionCache};
use skywatch_gateway::config::{LogFormat, ServiceConfig};
use skywatch_gateway::domain::{RequestStore, UserStore};
use skywatch_gateway::persistence::{InMemoryStore, PostgresStore};
use skywatch_gateway::service::HttpComputeDispatcher;

/// Stars available when running without a database.
const DEMO_CATALOG: [(&str, f64, f64); 5] = [
    ("Sirius", 101.287, -16.716),
    ("Vega", 279.235, 38.784),
    ("Arcturus", 213.915, 19.182),
    ("Betelgeuse", 88.793, 7.407),
    ("Polaris", 37.955, 89.264),
];

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    match format {
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init(),
        LogFormat::Text => tracing_subscriber::fmt().with_env_filter(filter).init(),
    }
}

async fn build_backends(config: &ServiceConfig) -> anyhow::Result<Backends> {
    let dispatcher = Arc::new(
        HttpComputeDispatcher::new(
            config.compute_service_url.clone(),
            config.compute_timeout,
            config.async_shared_secret.clone(),
        )
        .context("building compute dispatcher")?,
    );

    let cache: Arc<dyn SessionCache> = match &config.redis_url {
        Some(url) => {
            tracing::info!("using redis session cache");
            Arc::new(RedisCache::connect(url).await.context("connecting to redis")?)
        }
        None => {
            tracing::warn!("REDIS_URL not set, sessions are local to this process");
            Arc::new(InMemoryCache::new())
        }
    };

    if config.persistence_enabled {
        let store = PostgresStore::connect(config)
            .await
            .context("connecting to postgres")?;
        store.migrate().await.context("running migrations")?;
        tracing::info!("postgres store ready");
        let store = Arc::new(store);
        Ok(Backends {
            requests: Arc::clone(&store) as Arc<dyn RequestStore>,
            users: Arc::clone(&store) as Arc<dyn UserStore>,
            catalog: store,
            cache,
            dispatcher,
        })
    } else {
        tracing::warn!("persistence disabled, using in-memory store");
        let store = Arc::new(InMemoryStore::new());
        store
            .seed_user(config.system_moderator_id, "system", true)
            .await;
        for (name, ra, dec) in DEMO_CATALOG {
            store.insert_star(name, ra, dec).await;
        }
        Ok(Backends {
            requests: Arc::clone(&store) as Arc<dyn RequestStore>,
            users: Arc::clone(&store) as Arc<dyn UserStore>,
            catalog: store,
            cache,
            dispatcher,
        })
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
    }
    tracing::info!("shutdown signal received");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config =
        ServiceConfig::from_env().map_err(|e| anyhow::anyhow!("invalid configuration: {e}"))?;
    init_tracing(config.log_format);
    tracing::info!(addr = %config.listen_addr, "starting skywatch-gateway");

    let backends = build_backends(&config).await?;
    let app_state = AppState::new(backends, &config);
    app_state
        .users
        .ensure_system_moderator(config.system_moderator_id)
        .await
        .context("checking the system moderator account")?;

    let app = api::build_router()
        .layer(TimeoutLayer::new(config.request_timeout))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(app_state);

    let listener = tokio::net::TcpListener::bind(config.listen_addr)
        .await
        .with_context(|| format!("binding {}", config.listen_addr))?;
    tracing::info!(addr = %config.listen_addr, "server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}
