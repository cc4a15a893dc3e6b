//! Hype Cycle Analyzer — Binary Entrypoint
//! Boots the Axum HTTP server, wiring the classifier, cache, and middleware.

use std::sync::Arc;

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use hype_cycle_analyzer::cache::SqliteAnalysisCache;
use hype_cycle_analyzer::classify::HypeClassifier;
use hype_cycle_analyzer::collect::default_collectors;
use hype_cycle_analyzer::config::Settings;
use hype_cycle_analyzer::llm::DeepSeekClient;
use hype_cycle_analyzer::metrics::Metrics;
use hype_cycle_analyzer::{create_router, AppState};

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("hype_cycle_analyzer=info,warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().compact())
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env in local/dev; no-op in prod environments.
    let _ = dotenvy::dotenv();
    init_tracing();

    let settings = Settings::from_env()?;

    let cache = Arc::new(SqliteAnalysisCache::new(&settings.database_path)?);
    let llm = Arc::new(DeepSeekClient::new(settings.llm_config())?);
    let classifier = Arc::new(HypeClassifier::new(
        default_collectors(),
        llm,
        cache,
        settings.classifier_config(),
    ));

    let metrics = Metrics::init(settings.cache_ttl_hours);
    let router = create_router(AppState::new(classifier)).merge(metrics.router());

    let addr = format!("{}:{}", settings.host, settings.port);
    tracing::info!(%addr, "listening");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, router).await?;
    Ok(())
}
