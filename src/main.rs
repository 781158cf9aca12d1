use std::sync::Arc;

use prop_adapters::{DatasetSource, PropertyDataSource, RateCeiling, UpstreamSource};
use prop_core::{EventStore, InMemoryEventStore};
use prop_domain::{InMemoryResultHistory, ResultHistoryStore};
use prop_persistence::{build_pool, PgEventStore, PgResultHistory, PoolProvider};
use propflow::{AppConfig, ServiceSettings, ValuationService};
use tokio::net::TcpListener;
use tokio::runtime::Handle;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "failed to install Ctrl+C handler");
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received");
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt().with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
                             .init();

    let config = AppConfig::from_env()?;

    let pool = match &config.database {
        Some(db) => {
            let pool = build_pool(&db.url, db.min_connections, db.max_connections)?;
            info!(max_connections = db.max_connections, "using postgres journal");
            Some(pool)
        }
        None => {
            warn!("DATABASE_URL not set; runs and results will not survive a restart");
            None
        }
    };
    let (event_store, history): (Arc<dyn EventStore>, Arc<dyn ResultHistoryStore>) = match &pool {
        Some(pool) => (Arc::new(PgEventStore::new(PoolProvider::new(pool.clone()))),
                       Arc::new(PgResultHistory::new(PoolProvider::new(pool.clone())))),
        None => (Arc::new(InMemoryEventStore::new()), Arc::new(InMemoryResultHistory::new())),
    };

    let dataset = Arc::new(DatasetSource::from_path(&config.dataset_path)?);
    let source: Arc<dyn PropertyDataSource> = match &config.upstream.url {
        Some(url) => {
            let limiter = Arc::new(RateCeiling::per_second(u64::from(config.upstream.rate_limit)));
            info!(%url, rate_limit = config.upstream.rate_limit, "using upstream source");
            let upstream: Arc<dyn PropertyDataSource> =
                Arc::new(UpstreamSource::new(url, config.upstream.timeout, limiter, dataset)?);
            upstream
        }
        None => dataset as Arc<dyn PropertyDataSource>,
    };

    let settings = ServiceSettings { retry: config.retry,
                                     pipeline: config.pipeline };
    let service = ValuationService::new(event_store, history, source, settings, Handle::current());
    let resumed = service.recover()?;
    if resumed > 0 {
        info!(resumed, "resumed unfinished runs");
    }

    let listener = TcpListener::bind(config.bind).await?;
    propflow::http::serve(listener, service, shutdown_signal()).await?;

    if let Some(pool) = pool {
        drop(pool);
        info!("database pool closed");
    }
    info!("propflow stopped");
    Ok(())
}
