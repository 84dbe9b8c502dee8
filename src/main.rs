use std::sync::Arc;

use anyhow::Result;
use tracing_subscriber::EnvFilter;

use portfolio_storage_server::{
    auth::JwtService,
    config::Config,
    database::Database,
    handlers::{router, AppState},
    services::FileStore,
    storage::LocalStorage,
};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("portfolio_storage_server=info,tower_http=info")),
        )
        .init();

    let config = Config::from_env()?;

    let database = Database::new(&config.database_url).await?;
    database.migrate().await?;
    tracing::info!("database connected and migrated");

    let storage = Arc::new(LocalStorage::new(&config.upload_dir)?);
    let jwt = Arc::new(JwtService::new(&config.jwt_secret, config.token_ttl_hours));
    let file_store = Arc::new(FileStore::new(
        database.clone(),
        storage,
        config.max_file_size,
    ));

    let state = AppState {
        database: database.clone(),
        jwt,
        file_store,
        config: config.clone(),
    };

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(%addr, "listening");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    database.close().await;
    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("shutdown signal received");
}
