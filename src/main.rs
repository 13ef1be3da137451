//! Convene binary entry point

use convene::{AppState, config};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Application entry point
///
/// # Setup
/// 1. Initialize tracing/logging
/// 2. Load configuration from file and environment
/// 3. Initialize AppState
/// 4. Build Axum router
/// 5. Start HTTP server
/// 6. Start background tasks (expiry sweep, cache pruning)
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 1. Initialize tracing/logging
    let log_format =
        std::env::var("CONVENE__LOGGING__FORMAT").unwrap_or_else(|_| "pretty".to_string());

    if log_format == "json" {
        tracing_subscriber::registry()
            .with(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| "convene=info,tower_http=debug".into()),
            )
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| "convene=info,tower_http=debug".into()),
            )
            .with(tracing_subscriber::fmt::layer().pretty())
            .init();
    }

    tracing::info!("Starting Convene...");

    // 2. Initialize metrics
    convene::metrics::init_metrics();

    // 3. Load configuration
    let config = config::AppConfig::load()?;
    tracing::info!(
        domain = %config.server.domain,
        protocol = %config.server.protocol,
        "Configuration loaded"
    );

    // 4. Initialize application state
    let state = AppState::new(config.clone()).await?;

    // 5. Build Axum router
    let app = convene::build_router(state.clone());

    // 6. Start HTTP server
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("Server listening on {}", addr);
    tracing::info!("Public URL: {}", config.server.base_url());

    // 7. Start background tasks
    spawn_expiry_task(state.clone());
    spawn_cache_prune_task(state.clone());

    // Start server
    axum::serve(listener, app).await?;

    Ok(())
}

/// Spawn the background expiry sweep
///
/// Each tick removes expired actors through the service layer, so every
/// removal broadcasts its Delete before the row is deleted.
fn spawn_expiry_task(state: AppState) {
    tokio::spawn(async move {
        let interval_secs = state
            .config
            .federation
            .expiry_sweep_interval_seconds
            .max(1);
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(interval_secs));

        // Consume the immediate first tick to delay the initial sweep.
        interval.tick().await;

        loop {
            interval.tick().await;

            tracing::info!("Running expiry sweep...");
            match state.actors.sweep_expired(chrono::Utc::now()).await {
                Ok(0) => tracing::debug!("Expiry sweep found nothing to remove"),
                Ok(removed) => tracing::info!(removed, "Expiry sweep completed"),
                Err(error) => tracing::error!(%error, "Expiry sweep failed"),
            }
        }
    });

    tracing::info!("Expiry sweep task spawned");
}

/// Spawn periodic pruning of the key cache and rate limiter tables.
fn spawn_cache_prune_task(state: AppState) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(600));
        interval.tick().await;

        loop {
            interval.tick().await;
            state.key_cache.prune_expired().await;
            state.rate_limiter.prune_old().await;
        }
    });

    tracing::info!("Cache prune task spawned");
}
