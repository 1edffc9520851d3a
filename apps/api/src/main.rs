mod config;
mod errors;
mod form;
mod gap;
mod llm_client;
mod negotiation;
mod routes;
mod state;

use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::{Config, StorageBackend};
use crate::form::{FileStore, MemoryStore, RedisStore, SnapshotStore};
use crate::gap::IndexSeries;
use crate::llm_client::LlmClient;
use crate::negotiation::{LetterDrafter, LlmLetterDrafter};
use crate::routes::build_router;
use crate::state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (fails on missing required env vars)
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("{}={}", env!("CARGO_PKG_NAME"), &config.rust_log))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting PayGap API v{}", env!("CARGO_PKG_VERSION"));

    // Load inflation index
    let index = IndexSeries::from_json_file(&config.index_series_path)?;
    match index.latest() {
        Some(latest) => info!(
            "Inflation index loaded: {} points, latest {} = {}",
            index.len(),
            latest.date,
            latest.value
        ),
        None => info!("Inflation index loaded but empty; every gap lookup will fail"),
    }

    // Initialize snapshot store
    let store = build_store(&config).await?;
    info!(
        "Snapshot store: {} (max age {}h)",
        store.backend(),
        config.snapshot_max_age.as_secs() / 3600
    );

    // Initialize letter drafter (skipped without an API key)
    let drafter: Option<Arc<dyn LetterDrafter>> = match &config.anthropic_api_key {
        Some(key) => {
            let llm = LlmClient::new(key.clone());
            info!("LLM client initialized (model: {})", llm_client::MODEL);
            Some(Arc::new(LlmLetterDrafter::new(llm)))
        }
        None => {
            info!("ANTHROPIC_API_KEY not set; submissions will not include a letter");
            None
        }
    };

    // Build app state
    let state = AppState::new(config.clone(), Arc::new(index), store, drafter);

    // Build router
    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive()); // TODO: tighten CORS once the web client's origin is fixed

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Constructs the snapshot store selected by STORAGE_BACKEND.
async fn build_store(config: &Config) -> Result<Arc<dyn SnapshotStore>> {
    let store: Arc<dyn SnapshotStore> = match config.storage_backend {
        StorageBackend::File => Arc::new(
            FileStore::new(&config.storage_dir)
                .with_context(|| format!("Cannot use STORAGE_DIR {}", config.storage_dir.display()))?,
        ),
        StorageBackend::Redis => {
            let url = config
                .redis_url
                .as_deref()
                .context("REDIS_URL is required when STORAGE_BACKEND=redis")?;
            let client = redis::Client::open(url)?;
            Arc::new(
                RedisStore::connect(&client, config.snapshot_max_age)
                    .await
                    .context("Cannot connect to Redis")?,
            )
        }
        StorageBackend::Memory => Arc::new(MemoryStore::new()),
    };
    Ok(store)
}
