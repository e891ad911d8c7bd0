use axum::Router;

use crate::AppState;

pub mod editor;
pub mod health;

pub fn router() -> Router<AppState> {
    Router::new()
        .merge(editor::router())
        .merge(health::router())
}
