use server::config;

use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = config::Config::from_env();

    // Jobs answer 503 until an engine is installed
    match config.worker.locate_engine() {
        Ok(path) => tracing::info!("Using engine at {}", path.display()),
        Err(e) => tracing::warn!("{e}"),
    }
    tracing::info!(
        max_concurrent_jobs = config.max_concurrent_jobs,
        "Analysis job limit"
    );

    let addr = format!("{}:{}", config.host, config.port);
    let app = server::app(config);

    tracing::info!("Starting server on {addr}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
