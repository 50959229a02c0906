//! SessionSync Development Harness
//!
//! Runs the session store against the configured backend with an in-memory
//! credential provider, and exposes the session and route guard over HTTP.

mod api;

use std::net::SocketAddr;
use std::sync::Arc;

use ss_auth::{
    ApiClient, FileTokenStore, HttpTokenVerifier, MemoryCredentialProvider, MemoryTokenStore,
    Navigator, SessionStore, TokenStore,
};
use ss_config::AppConfig;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::api::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    ss_common::logging::init_logging("ss-dev");

    info!(version = env!("CARGO_PKG_VERSION"), "Starting SessionSync development harness");

    let config = AppConfig::load()?;
    info!(
        api = %config.api.base_url,
        storage = %config.storage.backend,
        dev_mode = config.dev_mode,
        "Configuration loaded"
    );

    if config.integrations.image_api_key.is_empty() {
        warn!("No image upload key configured");
    }
    if config.integrations.payment_public_key.is_empty() {
        warn!("No payment key configured");
    }

    let tokens: Arc<dyn TokenStore> = match config.storage.backend.as_str() {
        "file" => {
            info!(path = %config.storage.token_path, "Using file token store");
            Arc::new(FileTokenStore::new(config.storage.token_path.clone()))
        }
        _ => Arc::new(MemoryTokenStore::new()),
    };

    let api = ApiClient::new(&config.api)?;
    let store = Arc::new(SessionStore::new(
        Arc::new(MemoryCredentialProvider::new()),
        Arc::new(HttpTokenVerifier::new(api.clone())),
        Arc::new(api),
        tokens,
    ));
    let session = store.start();

    let navigator = Arc::new(Navigator::from_config(&config.routes)?);
    info!(routes = navigator.table().len(), "Route table loaded");

    let app = api::router(AppState {
        store,
        navigator,
        after_sign_in: config.routes.after_sign_in.clone(),
    })
    .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", config.http.host, config.http.port).parse()?;
    info!(?addr, "HTTP server starting");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    session.shutdown().await;
    info!("Development harness stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
