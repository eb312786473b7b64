use std::sync::Arc;

use feedwise_api::{
    config::Config,
    db::{create_pool, create_redis_client, PersistentContextSource, SessionStore},
    routes::{create_router, AppState},
    services::{Clock, ContextSource, GeminiClient, SystemClock, TextGenerator, UrlProbe},
};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::from_env()?;
    let pipeline = config.pipeline();

    let db_pool = create_pool(&config.database_url, config.database_max_connections).await?;
    let redis_client = create_redis_client(&config.redis_url)?;
    let (sessions, session_writer) = SessionStore::new(Arc::new(redis_client));
    let context_source: Arc<dyn ContextSource> =
        Arc::new(PersistentContextSource::new(db_pool, sessions));

    let generator = GeminiClient::new(
        config.gemini_api_key.clone(),
        config.gemini_api_url.clone(),
        config.gemini_model.clone(),
        pipeline.request_timeout,
    )?;
    if !generator.is_configured() {
        tracing::warn!("GEMINI_API_KEY is not set, serving fallback recommendations only");
    }

    let probe = if config.probe_urls {
        Some(UrlProbe::new()?)
    } else {
        None
    };

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let state = AppState::new(context_source, Arc::new(generator), clock, &pipeline, probe);
    let app = create_router(state);

    let address = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&address).await?;
    tracing::info!(
        address = %address,
        model = %config.gemini_model,
        max_attempts = pipeline.max_attempts,
        "Server listening"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    session_writer.shutdown().await;
    tracing::info!("Server stopped");

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
