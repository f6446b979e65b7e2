//! Chat relay - conversation sessions streamed to model workers
//!
//! Renders conversation prompts, relays them to generation workers found
//! through a controller, and streams the answers back to callers.

mod api;
mod config;
mod conversation;
mod exchange_log;
mod runtime;
mod state_machine;
mod translate;
mod worker;

use api::{create_router, AppState};
use config::RelayConfig;
use conversation::TemplateRegistry;
use exchange_log::ExchangeLogger;
use runtime::ProductionOrchestrator;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use translate::{GoogleTranslator, IdentityTranslator, Translator};
use worker::{ControllerClient, HttpWorkerClient};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "chat_relay=info,tower_http=debug".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(false)
                .with_span_list(false),
        )
        .init();

    let config = RelayConfig::from_env();

    // Ensure exchange log directory exists
    std::fs::create_dir_all(&config.log_dir)?;
    tracing::info!(path = %config.log_dir.display(), "Writing exchange logs");

    let templates = match &config.templates_file {
        Some(path) => {
            tracing::info!(path = %path.display(), "Loading conversation templates");
            TemplateRegistry::from_file(path)?
        }
        None => TemplateRegistry::builtin(),
    };
    tracing::info!(templates = ?templates.template_ids(), "Template registry initialized");

    let translator: Arc<dyn Translator> = match &config.translate {
        Some(translate) => {
            tracing::info!(url = %translate.base_url, proxied = translate.proxy.is_some(), "Translation enabled");
            Arc::new(GoogleTranslator::new(translate)?)
        }
        None => {
            tracing::warn!("TRANSLATE_API_KEY not set, all text is treated as English");
            Arc::new(IdentityTranslator)
        }
    };

    let orchestrator: Arc<ProductionOrchestrator> = Arc::new(ProductionOrchestrator::new(
        Arc::new(templates),
        Arc::new(ControllerClient::new(&config.controller_url)?),
        Arc::new(HttpWorkerClient::new()?),
        translator,
        Arc::new(ExchangeLogger::new(&config.log_dir)),
        config.pacing,
    ));
    tracing::info!(controller = %config.controller_url, "Worker controller configured");

    let state = AppState::new(orchestrator);

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = create_router(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    // Start server
    tracing::info!("Chat relay listening on {}", config.bind);

    let listener = tokio::net::TcpListener::bind(config.bind).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
