use std::sync::Arc;

use idempotency_gateway::api::{create_router, AppState};
use idempotency_gateway::config::{Settings, StoreBackend};
use idempotency_gateway::coordinator::IdempotencyCoordinator;
use idempotency_gateway::observability::{init_logging, init_metrics, LogConfig, LogFormat};
use idempotency_gateway::payments::PaymentProcessor;
use idempotency_gateway::store::{
    InMemoryLockStore, InMemoryResponseStore, LockStore, RedisLockStore, RedisResponseStore,
    ResponseStore,
};
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    // Load configuration
    let settings = Settings::new()?;

    // Initialize logging
    init_logging(&LogConfig {
        level: settings.application.log_level.clone(),
        format: LogFormat::from(settings.application.log_format.as_str()),
        ..LogConfig::default()
    });
    info!("Configuration loaded");

    // Initialize metrics
    let metrics_handle = init_metrics();

    // Build the backing stores
    let (response_store, lock_store, redis_client): (
        Arc<dyn ResponseStore>,
        Arc<dyn LockStore>,
        Option<redis::Client>,
    ) = match settings.store.backend {
        StoreBackend::Memory => {
            info!("Using in-memory store backend");
            (
                Arc::new(InMemoryResponseStore::new()),
                Arc::new(InMemoryLockStore::new()),
                None,
            )
        }
        StoreBackend::Redis => {
            info!("Connecting to Redis at {}...", settings.redis.url);
            let client = redis::Client::open(settings.redis.url.clone())?;
            let mut con = client.get_multiplexed_async_connection().await?;
            let _: () = redis::cmd("PING").query_async(&mut con).await?;
            info!("Redis connection established");

            (
                Arc::new(RedisResponseStore::new(
                    client.clone(),
                    settings.idempotency.key_prefix.clone(),
                )),
                Arc::new(RedisLockStore::new(
                    client.clone(),
                    settings.idempotency.key_prefix.clone(),
                )),
                Some(client),
            )
        }
    };

    // Wire the coordinator around the stub payment processor
    let coordinator = Arc::new(IdempotencyCoordinator::new(
        response_store,
        lock_store,
        Arc::new(PaymentProcessor::new()),
        settings.coordinator_config(),
    ));

    let mut state = AppState::new(coordinator, settings.idempotency.header_name.clone())
        .with_metrics(metrics_handle);
    if let Some(client) = redis_client {
        state = state.with_redis_client(client);
    }

    let app = create_router(state);

    let addr = format!("0.0.0.0:{}", settings.application.port);
    info!("Listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
