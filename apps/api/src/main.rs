mod access;
mod config;
mod errors;
mod payments;
mod resume;
mod routes;
mod state;
mod storage;

use anyhow::{Context, Result};
use axum::http::{
    header::{AUTHORIZATION, CONTENT_TYPE},
    HeaderValue, Method,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::access::clock::SystemClock;
use crate::config::Config;
use crate::payments::stripe::StripeClient;
use crate::routes::build_router;
use crate::state::AppState;
use crate::storage::S3BlobStore;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (fails on missing required env vars)
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("{}={}", env!("CARGO_CRATE_NAME"), &config.rust_log))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Shortlist API v{}", env!("CARGO_PKG_VERSION"));

    if config.access_token_secret.is_none() {
        warn!("ACCESS_TOKEN_SECRET is not set; paid endpoints will answer 500");
    }

    // Initialize S3 / MinIO
    let blobs = Arc::new(S3BlobStore::from_config(&config).await);
    info!("S3 blob store initialized (bucket: {})", config.s3_bucket);

    // Initialize Stripe client
    let payments = Arc::new(
        StripeClient::new(config.stripe_secret_key.clone())
            .context("failed to build Stripe HTTP client")?,
    );
    info!("Stripe client initialized");

    let cors = CorsLayer::new()
        .allow_origin(
            config
                .public_base_url
                .trim_end_matches('/')
                .parse::<HeaderValue>()
                .context("PUBLIC_BASE_URL is not a valid origin")?,
        )
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([CONTENT_TYPE, AUTHORIZATION])
        .allow_credentials(true);

    let port = config.port;
    let state = AppState::new(config, payments, blobs, Arc::new(SystemClock));

    let app = build_router(state).layer(
        ServiceBuilder::new()
            .layer(TraceLayer::new_for_http())
            .layer(cors),
    );

    let addr: SocketAddr = format!("0.0.0.0:{port}").parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
