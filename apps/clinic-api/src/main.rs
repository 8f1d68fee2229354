use clinic_api::{
    AppState,
    application::{
        commands::BootstrapSuperAdminHandler, session::SessionKeys, trial_sweeper,
    },
    config::AppConfig,
    create_app,
};
use core_lib::{
    Cache, CommandHandler, CoreError, InventoryRepository, PaymentGateway, TenantRepository,
    adapters::{InMemoryCache, InMemoryStore, MercadoPagoGateway, PostgresStore, RedisCache},
    domain::user::BootstrapSuperAdmin,
};
use dotenvy::dotenv;
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{Level, error, info, warn};
use tracing_subscriber::FmtSubscriber;

/// Default TTL for cache entries written without one.
const CACHE_DEFAULT_TTL_SECS: u64 = 3600;

type Stores = (Arc<dyn TenantRepository>, Arc<dyn InventoryRepository>);

async fn build_store(config: &AppConfig) -> Result<Stores, CoreError> {
    match &config.database_url {
        Some(url) => {
            let pool = PgPoolOptions::new()
                .max_connections(10)
                .connect(url)
                .await
                .map_err(|e| CoreError::Configuration(format!("Postgres connection: {}", e)))?;
            let store = PostgresStore::new(pool);
            info!("Applying database migrations...");
            store.migrate().await?;
            info!("Connected to Postgres");
            let store = Arc::new(store);
            let tenants: Arc<dyn TenantRepository> = store.clone();
            let inventory: Arc<dyn InventoryRepository> = store;
            Ok((tenants, inventory))
        }
        None => {
            warn!("DATABASE_URL not set; using in-memory store (data is lost on restart)");
            let store = Arc::new(InMemoryStore::new());
            let tenants: Arc<dyn TenantRepository> = store.clone();
            let inventory: Arc<dyn InventoryRepository> = store;
            Ok((tenants, inventory))
        }
    }
}

async fn build_cache(config: &AppConfig) -> Result<Arc<dyn Cache>, CoreError> {
    match &config.redis_url {
        Some(url) => {
            let cache = RedisCache::new(url, CACHE_DEFAULT_TTL_SECS).await?;
            info!("Connected to Redis");
            Ok(Arc::new(cache))
        }
        None => {
            warn!("REDIS_URL not set; using in-process cache");
            Ok(Arc::new(InMemoryCache::new(CACHE_DEFAULT_TTL_SECS)))
        }
    }
}

async fn run(config: AppConfig) -> Result<(), CoreError> {
    let (tenants, inventory) = build_store(&config).await?;
    let cache = build_cache(&config).await?;

    if config.mp_access_token.is_none() {
        warn!("MP_ACCESS_TOKEN not set; checkout and webhook lookups will fail");
    }
    if config.mp_webhook_secret.is_none() {
        warn!("MP_WEBHOOK_SECRET not set; webhook signatures are NOT verified");
    }
    let payments: Arc<dyn PaymentGateway> = Arc::new(MercadoPagoGateway::new(
        &config.mp_api_base_url,
        config.mp_access_token.as_deref().unwrap_or_default(),
    )?);

    // --- Super admin seed ---
    if let Some(seed) = &config.super_admin {
        BootstrapSuperAdminHandler::new(tenants.clone())
            .handle(BootstrapSuperAdmin {
                email: seed.email.clone(),
                password: seed.password.clone(),
            })
            .await?;
    }

    trial_sweeper::spawn(tenants.clone(), config.trial_sweep_interval_secs);

    let bind_addr = config.bind_addr;
    let app_state = AppState {
        tenants,
        inventory,
        cache,
        payments,
        sessions: Arc::new(SessionKeys::new(&config.session_secret, config.session_ttl_secs)),
        config: Arc::new(config),
    };
    let app = create_app(app_state);

    let listener = TcpListener::bind(bind_addr)
        .await
        .map_err(|e| CoreError::Configuration(format!("Failed to bind to {}: {}", bind_addr, e)))?;
    info!("Clinic API listening on {}", bind_addr);

    axum::serve(listener, app.into_make_service())
        .await
        .map_err(|e| CoreError::Internal(format!("Server failed: {}", e)))
}

#[tokio::main]
async fn main() {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .finish();
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    info!("Starting Clinic API v{}...", env!("CARGO_PKG_VERSION"));
    dotenv().ok();

    let config = match AppConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("Invalid configuration: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = run(config).await {
        error!("Clinic API stopped: {}", e);
        std::process::exit(1);
    }
}
