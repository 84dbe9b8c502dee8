use axum::{extract::State, response::Json};
use serde_json::json;

use crate::{error::Result, handlers::AppState};

pub async fn health(State(state): State<AppState>) -> Result<Json<serde_json::Value>> {
    let db_status = match sqlx::query("SELECT 1").fetch_one(state.database.pool()).await {
        Ok(_) => "healthy",
        Err(_) => "unhealthy",
    };

    Ok(Json(json!({
        "status": if db_status == "healthy" { "ok" } else { "degraded" },
        "checks": {
            "database": db_status
        },
        "timestamp": chrono::Utc::now().to_rfc3339()
    })))
}
