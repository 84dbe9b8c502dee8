use axum::{
    extract::DefaultBodyLimit,
    routing::{delete, get, post},
    Router,
};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::{auth::JwtService, config::Config, database::Database, services::FileStore};

pub mod auth;
pub mod files;
pub mod health;

#[derive(Clone)]
pub struct AppState {
    pub database: Database,
    pub jwt: Arc<JwtService>,
    pub file_store: Arc<FileStore>,
    pub config: Config,
}

pub fn router(state: AppState) -> Router {
    // Body limit sits above the per-file ceiling to leave room for
    // multipart framing; the exact per-file check happens in FileStore.
    let body_limit = state.config.max_file_size + 1024 * 1024;

    Router::new()
        .route("/health", get(health::health))
        .route("/api/auth/register", post(auth::register))
        .route("/api/auth/login", post(auth::login))
        .route("/api/auth/logout", post(auth::logout))
        .route("/api/auth/me", get(auth::me))
        .route("/api/files/upload", post(files::upload))
        .route("/api/files", get(files::list))
        .route("/api/files/:id/download", get(files::download))
        .route("/api/files/:id", delete(files::delete))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
