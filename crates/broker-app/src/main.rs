//! Broker application binary - composition root.
//!
//! 1. Load `.env`, parse the CLI and load the TOML configuration
//! 2. Initialize tracing
//! 3. Load the property catalog and build the search engine
//! 4. Wire the LLM, map services and mailer into the chat orchestrator
//! 5. Start the axum API server

mod cli;

use std::sync::Arc;

use clap::Parser;

use broker_api::routes;
use broker_api::state::AppState;
use broker_chat::{ChatOrchestrator, OpenAiChatModel};
use broker_core::catalog::Catalog;
use broker_core::config::BrokerConfig;
use broker_geo::{LocationService, NominatimGeocoder, OverpassPoiSource};
use broker_tour::mailer_from_config;
use broker_vector::{OpenAiEmbeddingService, PropertySearchEngine};

use cli::CliArgs;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // A missing .env file is normal in production.
    dotenvy::dotenv().ok();

    let args = CliArgs::parse();
    let config_file = args.resolve_config_path();
    let mut config = BrokerConfig::load_or_default(&config_file);

    let log_level = args.resolve_log_level(&config.general.log_level);
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&log_level)),
        )
        .init();

    tracing::info!("Starting Broker v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!(path = %config_file.display(), "Configuration resolved");

    config.general.port = args.resolve_port(config.general.port);
    let catalog_path = args.resolve_catalog_path(&config.general.catalog_path);
    config.general.catalog_path = catalog_path.to_string_lossy().to_string();

    // Catalog and search.
    let catalog = Arc::new(Catalog::load(&catalog_path)?);
    tracing::info!(
        path = %catalog_path.display(),
        properties = catalog.len(),
        "Property catalog loaded"
    );

    let embedding_key = std::env::var(&config.embedding.api_key_env).unwrap_or_default();
    let embedder = OpenAiEmbeddingService::new(embedding_key, &config.embedding)?;
    let engine = Arc::new(PropertySearchEngine::new(
        Arc::clone(&catalog),
        embedder,
        config.embedding.cache_capacity,
    ));

    // Dialogue collaborators.
    let llm_key = std::env::var(&config.llm.api_key_env).unwrap_or_default();
    let model = Arc::new(OpenAiChatModel::new(llm_key, &config.llm)?);

    let location = Arc::new(LocationService::new(
        Arc::new(NominatimGeocoder::new(&config.location)?),
        Arc::new(OverpassPoiSource::new(&config.location)?),
        &config.location,
    ));
    let mailer = mailer_from_config(&config.email);

    let orchestrator = ChatOrchestrator::new(
        model,
        engine,
        Arc::clone(&location),
        mailer,
        &config,
    );
    tracing::info!(
        session_mode = ?config.chat.session_mode,
        "Chat orchestrator ready"
    );

    let state = AppState::new(config.clone(), orchestrator, catalog, location);
    routes::start_server(&config, state).await?;

    Ok(())
}
