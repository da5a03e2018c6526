use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use studio::config::Config;
use studio::llm_client::{self, LlmClient};
use studio::routes::build_router;
use studio::schema::Catalog;
use studio::state::{AppState, AuthSettings};
use studio::templates::DirTemplateStore;

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

    info!("Starting Prompt Studio v{}", env!("CARGO_PKG_VERSION"));

    // Generator catalog: external file when configured, else the built-in one
    let catalog = match &config.catalog_path {
        Some(path) => Catalog::load(path).await?,
        None => Catalog::builtin()?,
    };
    info!("Catalog ready: {} generators", catalog.generators().len());

    // Initialize LLM client
    let llm = LlmClient::new(config.anthropic_api_key.clone())?;
    info!("LLM client initialized (model: {})", llm_client::MODEL);

    let templates = DirTemplateStore::new(&config.templates_dir);
    info!("Serving templates from {}", templates.root().display());

    let state = AppState {
        catalog: Arc::new(catalog),
        templates,
        context_file: config.context_file.clone(),
        model: Arc::new(llm),
        auth: AuthSettings {
            password: config.auth_password.clone(),
            token: config.auth_secret_token.clone(),
            secure_cookie: config.session_cookie_secure,
        },
    };

    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive()); // TODO: restrict origins once the UI has a fixed host

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
