//! Vape storefront - catalog, checkout and back-office service

use anyhow::{Context, Result};
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use vape_storefront::{api, config::AppConfig, db, db::catalog, publisher::EventPublisher, AppState};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::registry().with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into())).with(tracing_subscriber::fmt::layer()).init();
    let config = AppConfig::from_env()?;
    let db = db::connect(&config.database_url, config.db_max_connections).await.context("connecting to postgres")?;

    let nats = match &config.nats_url {
        Some(url) => match async_nats::connect(url.as_str()).await {
            Ok(client) => Some(client),
            Err(e) => { tracing::warn!(error = %e, "NATS unavailable, domain events will only be logged"); None }
        },
        None => None,
    };
    let http = reqwest::Client::builder().timeout(Duration::from_secs(15)).user_agent("vape-storefront").build()?;
    let addr = config.bind_addr();
    let state = AppState::new(db, config, http, EventPublisher::new(nats))?;

    if let Err(e) = state.catalog_feed().await {
        tracing::warn!(error = %e, "initial catalog feed load failed");
    }
    let products = catalog::list_products(&state.db, None, true).await?;
    state.images.allow_urls(products.iter().flat_map(|p| p.images.iter().map(String::as_str)));

    let login = state.login.clone();
    let sweep_every = state.config.auth.login_lockout.max(Duration::from_secs(1));
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(sweep_every);
        loop {
            ticker.tick().await;
            login.sweep().await;
        }
    });

    let app = api::router(state);
    tracing::info!("vape storefront listening on {}", addr);
    axum::serve(tokio::net::TcpListener::bind(&addr).await?, app).await?;
    Ok(())
}
