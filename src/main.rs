use std::sync::Arc;

use ride_haggle::config::{Config, DEFAULT_LOG_FILTER};
use ride_haggle::db::{MemoryStore, PgStore, Store};
use ride_haggle::engine::Engine;
use ride_haggle::error::Error;
use ride_haggle::server::serve;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Error> {
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER)),
        )
        .init();

    let config = Config::from_env()?;

    let store: Arc<dyn Store> = match &config.database_url {
        Some(url) => Arc::new(PgStore::new(url, config.max_connections).await?),
        None => {
            tracing::warn!("DATABASE_URL is not set, rides are kept in memory");
            Arc::new(MemoryStore::new())
        }
    };

    let engine = Engine::new(store.clone());

    let result = serve(engine, config.bind_address).await;

    store.close().await;

    result
}
