use std::sync::Arc;

use anyhow::Result;
use common::cache::{KvStore, RedisConfig};
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use timers::{
    build_state,
    clock::SystemClock,
    config::{Settings, StoreBackend},
    maintenance::StorePurger,
    routes,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("Starting timer service");

    let settings = Settings::load()?;

    let store = match settings.store.backend {
        StoreBackend::Redis => {
            KvStore::redis(&RedisConfig::new(settings.store.redis_url.clone())).await?
        }
        StoreBackend::Memory => {
            warn!("Using the in-memory store, timers are lost on restart");
            KvStore::memory()
        }
    };

    // Check store connectivity
    if store.health_check().await? {
        info!("{} store connection successful", store.backend_name());
    } else {
        anyhow::bail!("Failed to connect to {} store", store.backend_name());
    }

    let purge_job = match settings.store.backend {
        StoreBackend::Memory => Some(
            StorePurger::new(store.clone())
                .start(&settings.maintenance.purge_schedule)
                .await?,
        ),
        StoreBackend::Redis => None,
    };

    let (state, scheduler) = build_state(&settings, store, Arc::new(SystemClock));
    tokio::spawn(scheduler.run());

    // Start the web server
    let app = routes::create_router(state);

    let address = settings.bind_address()?;
    let listener = TcpListener::bind(address).await?;
    info!("Timer service listening on {}", address);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Some(mut purge_job) = purge_job {
        purge_job.shutdown().await?;
    }

    info!("Timer service stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
