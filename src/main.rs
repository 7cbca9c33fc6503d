use std::sync::Arc;

use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use econ_news::config::Config;
use econ_news::news::NewsAggregator;
use econ_news::prices::PriceAggregator;
use econ_news::routes::{self, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "econ_news=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config_path = std::env::var("CONFIG_PATH").unwrap_or_else(|_| "feeds.toml".to_string());
    let config = Config::load(&config_path)?;
    info!("Loaded {} feeds from {}", config.feeds.len(), config_path);

    let client = econ_news::http_client()?;

    let news = NewsAggregator::new(
        client.clone(),
        config.feeds.clone(),
        config.per_feed_limit,
        config.feed_timeout(),
    );
    let prices = PriceAggregator::new(client, &config.prices);

    let state = Arc::new(AppState {
        news,
        prices,
        news_limit: config.news_limit,
    });

    let app = routes::router(state);

    // Start server
    let addr = config.bind_addr();
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Server starting on http://{}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
