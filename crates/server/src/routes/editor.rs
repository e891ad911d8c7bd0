//! Routes for AI-assisted site editing.

use std::convert::Infallible;

use axum::{
    Json, Router,
    extract::{FromRequestParts, State},
    http::request::Parts,
    response::{
        IntoResponse, Response,
        sse::{Event, Sse},
    },
    routing::get,
};
use serde::Serialize;
use services::services::editor::{EditOutcome, EditRequest};
use ts_rs::TS;
use uuid::Uuid;

use crate::{AppState, error::ApiError};

/// Authenticated user, taken from the `X-User-Id` header set by the
/// session layer in front of this service.
pub struct UserId(pub Uuid);

impl<S> FromRequestParts<S> for UserId
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let id = parts
            .headers
            .get("x-user-id")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| Uuid::parse_str(v).ok())
            .ok_or(ApiError::Unauthorized)?;
        Ok(UserId(id))
    }
}

#[derive(Debug, Serialize, TS)]
#[serde(rename_all = "camelCase")]
pub struct UsageResponse {
    pub edits_remaining: i64,
}

#[derive(Debug, Serialize, TS)]
#[serde(rename_all = "camelCase")]
pub struct EditResponse {
    pub html: String,
    pub css: String,
    pub js: String,
    pub edits_remaining: i64,
}

impl From<EditOutcome> for EditResponse {
    fn from(outcome: EditOutcome) -> Self {
        // Styling and behavior live inline in the document, so the
        // dedicated css/js slots stay empty.
        Self {
            html: outcome.html,
            css: String::new(),
            js: String::new(),
            edits_remaining: outcome.edits_remaining,
        }
    }
}

/// Get how many AI edits the user has left this hour.
pub async fn get_usage(
    State(state): State<AppState>,
    user: UserId,
) -> Result<Json<UsageResponse>, ApiError> {
    let edits_remaining = state.editor().edits_remaining(user.0).await?;
    Ok(Json(UsageResponse { edits_remaining }))
}

/// Apply an AI edit to the user's site.
///
/// With `stream: true` the same payload goes out as a single SSE frame,
/// including error payloads, so the frontend can keep one code path for
/// both transports.
pub async fn ai_edit(
    State(state): State<AppState>,
    user: UserId,
    Json(request): Json<EditRequest>,
) -> Result<Response, ApiError> {
    if !request.stream {
        let outcome = state.editor().edit(user.0, &request).await?;
        return Ok(Json(EditResponse::from(outcome)).into_response());
    }

    let payload = match state.editor().edit(user.0, &request).await {
        Ok(outcome) => serde_json::to_string(&EditResponse::from(outcome))
            .unwrap_or_else(|_| "{}".to_string()),
        Err(e) => {
            let (_, body) = ApiError::from(e).status_and_body();
            serde_json::to_string(&body).unwrap_or_else(|_| "{}".to_string())
        }
    };

    let stream = futures_util::stream::once(async move {
        Ok::<_, Infallible>(Event::default().data(payload))
    });
    Ok(Sse::new(stream).into_response())
}

pub fn router() -> Router<AppState> {
    Router::new().route("/editor/ai", get(get_usage).post(ai_edit))
}
