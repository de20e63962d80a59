use minirisk::api;
use minirisk::config::Config;
use minirisk::services::{
    AlertBroadcaster, MarginSweepJob, MarketDataRefresher, PeriodicTask, SqliteStore,
};
use minirisk::sources::MarketDataClient;
use minirisk::AppState;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "minirisk=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Missing market data settings are fatal
    let config = Config::from_env()?;
    info!("Starting minirisk on {}:{}", config.host, config.port);

    let store = Arc::new(SqliteStore::new(&config.database_path)?);
    info!("Opened database at {}", config.database_path);

    let client = Arc::new(MarketDataClient::new(
        config.market.api_url.clone(),
        config.market.api_key.clone(),
        config.market.request_timeout,
    )?);

    let alerts = AlertBroadcaster::new(256);
    alerts.spawn_log_subscriber();

    let state = AppState::new(config, store.clone());
    let config = state.config.clone();

    // Background jobs
    let refresher = PeriodicTask::new(
        Arc::new(MarketDataRefresher::new(
            store.clone(),
            store.clone(),
            client,
            config.market.request_timeout,
            config.market.max_concurrent_fetches,
        )),
        config.market.update_interval,
    );
    let sweep = PeriodicTask::new(
        Arc::new(MarginSweepJob::new(
            store.clone(),
            state.margin.clone(),
            alerts.clone(),
            config.margin.max_concurrent_evaluations,
        )),
        config.margin.update_interval,
    );
    let handles = vec![refresher.start(), sweep.start()];

    // Drop rate limiter entries for idle clients
    {
        let rate_limiter = state.rate_limiter.clone();
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(Duration::from_secs(60)).await;
                rate_limiter.cleanup();
                debug!("Rate limiter tracking {} clients", rate_limiter.len());
            }
        });
    }

    let app = api::app(state);

    // Start the server
    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("minirisk listening on {}", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    for handle in handles {
        let name = handle.name();
        handle.stop().await;
        info!("Stopped {}", name);
    }

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
