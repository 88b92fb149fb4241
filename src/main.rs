//! Catering Orders - order and payment service

use anyhow::Result;
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use catering_orders::{
    api::{self, AppState},
    config::Config,
    gateway::ZohoGateway,
    orders::OrderService,
    sequence::OrderIdGenerator,
    store::PgStore,
};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;
    let db = PgPoolOptions::new().max_connections(10).connect(&config.database_url).await?;
    sqlx::migrate!("./migrations").run(&db).await?;

    let store = Arc::new(PgStore::new(db));
    let gateway = Arc::new(ZohoGateway::new(config.gateway.clone(), config.environment)?);
    let orders = OrderService::new(
        store.clone(),
        OrderIdGenerator::new(&config.order_prefix, store),
        gateway,
        config.environment,
        config.webhook_secret.clone(),
    );
    let app = api::router(AppState::new(orders, &config.jwt_secret));

    tracing::info!(environment = ?config.environment, "🚀 Catering orders listening on 0.0.0.0:{}", config.port);
    axum::serve(tokio::net::TcpListener::bind(format!("0.0.0.0:{}", config.port)).await?, app).await?;
    Ok(())
}
