use iap_reconciler::api::{self, AppState};
use iap_reconciler::config::{AppConfig, StoreBackend};
use iap_reconciler::health::HealthChecker;
use iap_reconciler::logging::init_tracing;
use iap_reconciler::payments::appstore::HttpReceiptAuthority;
use iap_reconciler::payments::playstore::RemotePublisherService;
use iap_reconciler::payments::{
    AttachService, InMemoryAttachStore, InMemoryLocker, Locker, NoopAttachService, NoopLocker,
    ReceiptVerifier, RemoteOrderService,
};
use iap_reconciler::services::{
    AppStoreService, AttachRecovery, PlayStoreService, ReconciliationEngine,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info};

#[cfg(feature = "cache")]
use iap_reconciler::cache::{self, RedisAttachStore, RedisLocker, RedisPool};

#[cfg(not(feature = "cache"))]
type RedisPool = ();

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received, starting graceful shutdown");
}

#[cfg(feature = "cache")]
async fn init_redis(config: &AppConfig) -> anyhow::Result<Option<RedisPool>> {
    if !config.reconcile.uses_redis() {
        info!("⏭️  Skipping Redis initialization (no redis-backed stores configured)");
        return Ok(None);
    }

    info!("🔄 Initializing Redis connection pool...");
    let pool_config = cache::CacheConfig {
        redis_url: config.cache.redis_url.clone(),
        max_connections: config.cache.max_connections,
        ..Default::default()
    };
    let pool = cache::init_cache_pool(pool_config).await.map_err(|e| {
        error!("Failed to initialize cache pool: {}", e);
        e
    })?;
    info!("✅ Redis connection pool initialized");
    Ok(Some(pool))
}

#[cfg(not(feature = "cache"))]
async fn init_redis(_config: &AppConfig) -> anyhow::Result<Option<RedisPool>> {
    Ok(None)
}

#[cfg_attr(not(feature = "cache"), allow(unused_variables))]
fn build_locker(
    backend: StoreBackend,
    pool: Option<&RedisPool>,
    config: &AppConfig,
) -> anyhow::Result<Arc<dyn Locker>> {
    Ok(match backend {
        #[cfg(feature = "cache")]
        StoreBackend::Redis => {
            let pool = pool.ok_or_else(|| anyhow::anyhow!("redis pool not initialized"))?;
            Arc::new(RedisLocker::new(pool.clone(), config.cache.lock_ttl()))
        }
        #[cfg(not(feature = "cache"))]
        StoreBackend::Redis => anyhow::bail!("redis locker requires the `cache` feature"),
        StoreBackend::Memory => Arc::new(InMemoryLocker::new()),
        StoreBackend::Noop => Arc::new(NoopLocker),
    })
}

#[cfg_attr(not(feature = "cache"), allow(unused_variables))]
fn build_attach_store(
    backend: StoreBackend,
    pool: Option<&RedisPool>,
    config: &AppConfig,
) -> anyhow::Result<Arc<dyn AttachService>> {
    Ok(match backend {
        #[cfg(feature = "cache")]
        StoreBackend::Redis => {
            let pool = pool.ok_or_else(|| anyhow::anyhow!("redis pool not initialized"))?;
            Arc::new(RedisAttachStore::new(pool.clone(), config.cache.attach_ttl()))
        }
        #[cfg(not(feature = "cache"))]
        StoreBackend::Redis => anyhow::bail!("redis attach store requires the `cache` feature"),
        StoreBackend::Memory => Arc::new(InMemoryAttachStore::new()),
        StoreBackend::Noop => Arc::new(NoopAttachService),
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::from_env()?;
    init_tracing(&config.logging);
    config.validate().map_err(|e| {
        error!("Invalid configuration: {}", e);
        e
    })?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        host = %config.server.host,
        port = config.server.port,
        locker = ?config.reconcile.locker,
        attach_store = ?config.reconcile.attach_store,
        "🚀 Starting IAP reconciliation service"
    );

    let redis_pool = init_redis(&config).await?;
    let locker = build_locker(config.reconcile.locker, redis_pool.as_ref(), &config)?;
    let attach_store =
        build_attach_store(config.reconcile.attach_store, redis_pool.as_ref(), &config)?;

    let orders = Arc::new(RemoteOrderService::new(&config.ledger, &config.gateway)?);
    let engine = Arc::new(ReconciliationEngine::new(orders, locker));
    info!(ledger = %config.ledger.base_url, "✅ Reconciliation engine ready");

    let authority = Arc::new(HttpReceiptAuthority::new(
        &config.app_store,
        &config.gateway,
    )?);
    let app_store = Arc::new(AppStoreService::new(
        engine.clone(),
        ReceiptVerifier::new(authority, config.app_store.bundle_id.clone()),
        AttachRecovery::new(attach_store.clone()),
        &config.app_store,
        &config.gateway,
    ));

    let publisher = Arc::new(RemotePublisherService::new(
        &config.play_store,
        &config.gateway,
    )?);
    let play_store = Arc::new(PlayStoreService::new(
        engine,
        publisher,
        AttachRecovery::new(attach_store),
        &config.play_store,
        &config.gateway,
    ));
    info!(
        bundle_id = %config.app_store.bundle_id,
        package_name = %config.play_store.package_name,
        "✅ Gateway adapters initialized"
    );

    #[cfg(feature = "cache")]
    let health = HealthChecker::new(redis_pool);
    #[cfg(not(feature = "cache"))]
    let health = HealthChecker::new();

    let app = api::router(AppState {
        app_store,
        play_store,
        health,
    });

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(address = %addr, "🌐 Server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("👋 Server shut down cleanly");
    Ok(())
}
