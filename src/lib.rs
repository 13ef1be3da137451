//! Convene - A lightweight federated event-hosting service
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      API Layer (Axum)                        │
//! │  - Actor documents (content-negotiated)                     │
//! │  - Shared inbox / WebFinger                                 │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     Service Layer                            │
//! │  - Actor lifecycle (create/update/comment/delete)           │
//! │  - Broadcast-then-delete sequencing                         │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//! ┌──────────────────────────┐ ┌──────────────────────────────┐
//! │     Federation Layer      │ │         Data Layer           │
//! │  - HTTP Signatures        │ │  - SQLite (sqlx)             │
//! │  - Delivery / Inbox       │ │  - Actors + Followers        │
//! └──────────────────────────┘ └──────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - `api`: HTTP handlers for ActivityPub and the human-readable pages
//! - `service`: Business logic layer
//! - `federation`: ActivityPub federation handling
//! - `data`: Database layer
//! - `config`: Configuration management
//! - `error`: Error types

pub mod api;
pub mod config;
pub mod data;
pub mod error;
pub mod federation;
pub mod metrics;
pub mod service;

use std::sync::Arc;
use std::time::Duration;

/// Application state shared across all handlers
///
/// This struct is cloned for each request and contains
/// shared resources like the store, caches, and HTTP client.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration
    pub config: Arc<config::AppConfig>,

    /// Database connection pool
    pub store: Arc<data::Store>,

    /// HTTP client for federation
    pub http_client: Arc<reqwest::Client>,

    /// Remote public key cache
    pub key_cache: Arc<federation::PublicKeyCache>,

    /// Per-domain inbox rate limiter
    pub rate_limiter: Arc<federation::RateLimiter>,

    /// Actor lifecycle service
    pub actors: service::ActorService,
}

impl AppState {
    /// Initialize application state
    ///
    /// # Steps
    /// 1. Connect to the SQLite database
    /// 2. Initialize the HTTP client
    /// 3. Initialize key cache and rate limiter
    ///
    /// # Errors
    /// Returns error if any initialization step fails
    pub async fn new(config: config::AppConfig) -> Result<Self, error::AppError> {
        tracing::info!("Initializing application state...");

        // 1. Connect to SQLite database
        let store = Arc::new(data::Store::connect(&config.database.path).await?);
        tracing::info!("Database connected");

        // 2. Initialize HTTP client
        let http_client = Arc::new(
            reqwest::Client::builder()
                .user_agent("Convene/0.1.0")
                .timeout(Duration::from_secs(30))
                .build()
                .map_err(|e| error::AppError::Internal(e.into()))?,
        );

        // 3. Initialize key cache and rate limiter
        let key_cache = Arc::new(
            federation::PublicKeyCache::new(
                http_client.clone(),
                Some(Duration::from_secs(config.federation.key_cache_ttl_seconds)),
            )
            .with_allow_private_destinations(config.federation.allow_private_destinations),
        );
        if config.federation.allow_private_destinations {
            tracing::warn!("Key fetches to private destinations are enabled");
        }
        let rate_limiter = Arc::new(federation::RateLimiter::new(
            config.federation.inbox_rate_limit,
            Duration::from_secs(config.federation.inbox_rate_window_seconds),
        ));

        let config = Arc::new(config);
        let keys = federation::KeyStore::new(store.clone(), config.server.base_url());
        let actors =
            service::ActorService::new(store.clone(), keys, http_client.clone(), config.clone());

        tracing::info!("Application state initialized successfully");

        Ok(Self {
            config,
            store,
            http_client,
            key_cache,
            rate_limiter,
            actors,
        })
    }
}

/// Build the Axum router with all routes.
///
/// This is shared by the binary and integration tests to keep route
/// composition consistent across environments.
pub fn build_router(state: AppState) -> axum::Router {
    use axum::Router;
    use tower_http::{compression::CompressionLayer, trace::TraceLayer};

    let cors_layer = build_cors_layer(&state.config.server);

    Router::new()
        .route("/health", axum::routing::get(health_check))
        .merge(api::wellknown_router())
        .merge(api::actors_router())
        .merge(api::inbox_router())
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer)
        .with_state(state)
        .merge(api::metrics_router())
}

fn build_cors_layer(server: &config::ServerConfig) -> tower_http::cors::CorsLayer {
    use axum::http::HeaderValue;
    use tower_http::cors::{Any, CorsLayer};

    if !server.protocol.eq_ignore_ascii_case("https") {
        return CorsLayer::permissive();
    }

    let allowed_origin = server.base_url();
    match HeaderValue::from_str(&allowed_origin) {
        Ok(origin) => CorsLayer::new()
            .allow_origin([origin])
            .allow_methods(Any)
            .allow_headers(Any),
        Err(error) => {
            tracing::error!(
                %error,
                origin = %allowed_origin,
                "Failed to parse CORS origin from server base URL; denying cross-origin requests"
            );
            CorsLayer::new().allow_methods(Any).allow_headers(Any)
        }
    }
}

async fn health_check() -> &'static str {
    "OK"
}
