mod config;
mod documents;
mod docx;
mod errors;
mod llm_client;
mod models;
mod placeholders;
mod routes;
mod state;

use anyhow::Result;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::Config;
use crate::documents::store::InMemorySessionStore;
use crate::llm_client::{CompletionService, DisabledCompletion, LlmClient};
use crate::routes::build_router;
use crate::state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!(
                "{}={}",
                env!("CARGO_PKG_NAME").replace('-', "_"),
                &config.rust_log
            ))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting DocFill API v{}", env!("CARGO_PKG_VERSION"));

    // Initialize LLM client; without a key every LLM path uses its fallback
    let llm: Arc<dyn CompletionService> = match &config.anthropic_api_key {
        Some(key) => {
            let client = LlmClient::new(key.clone())?;
            info!("LLM client initialized (model: {})", llm_client::MODEL);
            Arc::new(client)
        }
        None => {
            warn!("ANTHROPIC_API_KEY not set; using regex discovery and static questions");
            Arc::new(DisabledCompletion)
        }
    };

    let store = Arc::new(InMemorySessionStore::new());
    info!(
        "Discovery mode: {:?}, upload limit: {} bytes",
        config.discovery_mode, config.max_upload_bytes
    );

    let state = AppState::new(config.clone(), llm, store);

    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
