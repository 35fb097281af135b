//! Escrow project service: entry point.
//!
//! Wires the escrow lifecycle to SQLite persistence, the core-banking
//! account service and a JSON message catalog, then exposes it over a small
//! Axum REST API.

mod accounts;
mod api;
mod catalog;
mod config;
mod db;
mod errors;

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use escrow_lifecycle::storage::Stores;
use escrow_lifecycle::{EscrowLifecycle, SystemClock};
use reqwest::Client;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::EnvFilter;

use accounts::HttpAccountService;
use catalog::JsonCatalog;
use config::Config;
use db::SqliteStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialise structured logging (RUST_LOG controls verbosity).
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // Load optional .env file (ignored if missing).
    let _ = dotenvy::dotenv();

    let config = Config::from_env().map_err(|e| anyhow::anyhow!("{e}"))?;

    // Set up the SQLite connection pool and run migrations.
    let pool = db::init_pool(&config.database_url).await?;
    let store = Arc::new(SqliteStore::new(pool));

    let client = Client::builder()
        .timeout(std::time::Duration::from_secs(
            config.account_service_timeout_secs,
        ))
        .build()?;
    let accounts = Arc::new(HttpAccountService::new(
        client,
        &config.account_service_url,
    ));

    let catalog = JsonCatalog::load(config.messages_path.as_deref(), &config.default_locale)?;

    let stores = Stores {
        projects: store.clone(),
        clients: store.clone(),
        buckets: store.clone(),
        inclusions: store.clone(),
        ledger: store.clone(),
        documents: store.clone(),
    };
    let lifecycle = EscrowLifecycle::new(stores, accounts, store, Arc::new(SystemClock));

    // ─── REST API ─────────────────────────────────────────
    let api_state = Arc::new(api::ApiState {
        lifecycle,
        catalog: Arc::new(catalog),
        default_locale: config.default_locale.clone(),
    });

    let app = Router::new()
        .route("/health", get(api::health))
        .route("/projects", post(api::submit).get(api::search))
        .route("/projects/drafts", post(api::save_draft))
        .route("/projects/validate", post(api::validate))
        .route("/projects/:id", get(api::get_project).put(api::update))
        .route("/projects/:id/approve", post(api::approve))
        .route("/projects/:id/reject", post(api::reject))
        .route("/projects/:id/return", post(api::return_for_correction))
        .route("/projects/:id/distribution", post(api::set_distribution))
        .route("/projects/:id/closure", post(api::request_closure))
        .route("/projects/:id/inclusions", post(api::add_inclusion))
        .route("/projects/:id/documents", post(api::record_document))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(api_state);

    let addr = format!("0.0.0.0:{}", config.api_port);
    info!("API listening on http://{addr}");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
