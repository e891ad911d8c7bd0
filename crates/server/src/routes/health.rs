use axum::{Json, Router, extract::State, routing::get};
use utils::response::ApiResponse;

use crate::AppState;

/// Liveness probe; also verifies the database connection.
pub async fn health(State(state): State<AppState>) -> Json<ApiResponse<&'static str>> {
    match sqlx::query("SELECT 1").execute(&state.db().pool).await {
        Ok(_) => Json(ApiResponse::success("ok")),
        Err(e) => {
            tracing::error!("health check database error: {}", e);
            Json(ApiResponse::error("database unavailable"))
        }
    }
}

pub fn router() -> Router<AppState> {
    Router::new().route("/health", get(health))
}
