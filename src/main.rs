use axum::routing::{delete, get, post};
use axum::Router;
use tracing_subscriber::EnvFilter;

use coursemate::api;
use coursemate::config::Config;
use coursemate::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::from_env();
    config.validate()?;
    tracing::info!("Data directory: {}", config.data_dir.display());
    tracing::info!("LLM provider: {} ({})", config.llm.provider, config.llm.base_url);

    let state = AppState::new(config.clone())?;
    tracing::info!("Indexed passages: {}", state.store.len().await);

    let app = Router::new()
        .route("/health", get(api::health))
        .route("/chat", post(api::chat::chat))
        .route("/chat_stream", post(api::chat::chat_stream))
        .route("/sessions/{id}", delete(api::delete_session))
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    tracing::info!("Server listening on {}", config.bind_addr);

    axum::serve(listener, app).await?;
    Ok(())
}
