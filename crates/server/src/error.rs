use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use services::services::{claude_api::ClaudeApiError, editor::EditorError};
use thiserror::Error;
use ts_rs::TS;

/// Machine-readable error codes surfaced to the editor frontend.
#[derive(Debug, Clone, Copy, Serialize, TS)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    RateLimit,
    ParseError,
    AiError,
}

/// Wire shape of every error response.
#[derive(Debug, Serialize, TS)]
#[serde(rename_all = "camelCase")]
pub struct ErrorBody {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<ErrorCode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after: Option<i64>,
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("unauthorized")]
    Unauthorized,
    #[error(transparent)]
    Editor(#[from] EditorError),
}

impl ApiError {
    /// Status code and body for this error. Apply failures are folded into
    /// the parse error shape; from the user's side both mean "rephrase".
    pub fn status_and_body(&self) -> (StatusCode, ErrorBody) {
        match self {
            Self::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                ErrorBody {
                    error: "Unauthorized".to_string(),
                    code: None,
                    retry_after: None,
                },
            ),
            Self::Editor(EditorError::InvalidPrompt) => (
                StatusCode::BAD_REQUEST,
                ErrorBody {
                    error: "Missing or invalid prompt".to_string(),
                    code: None,
                    retry_after: None,
                },
            ),
            Self::Editor(EditorError::QuotaExceeded { retry_after_minutes }) => (
                StatusCode::TOO_MANY_REQUESTS,
                ErrorBody {
                    error: "Hourly edit limit reached".to_string(),
                    code: Some(ErrorCode::RateLimit),
                    retry_after: Some(*retry_after_minutes),
                },
            ),
            Self::Editor(EditorError::UnappliedPatch) => (
                StatusCode::BAD_REQUEST,
                ErrorBody {
                    error: "AI did not return valid output. Try a simpler prompt (e.g. 'Change the primary color to #001B2E') or try again.".to_string(),
                    code: Some(ErrorCode::ParseError),
                    retry_after: None,
                },
            ),
            Self::Editor(EditorError::Timeout) => (
                StatusCode::BAD_GATEWAY,
                ErrorBody {
                    error: "The edit timed out. Try a smaller request or a single section.".to_string(),
                    code: Some(ErrorCode::AiError),
                    retry_after: None,
                },
            ),
            Self::Editor(EditorError::Upstream(
                ClaudeApiError::MissingApiKey | ClaudeApiError::InvalidApiKey,
            )) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorBody {
                    error: "AI service not configured".to_string(),
                    code: Some(ErrorCode::AiError),
                    retry_after: None,
                },
            ),
            Self::Editor(EditorError::Upstream(_)) => (
                StatusCode::BAD_GATEWAY,
                ErrorBody {
                    error: "Failed to process request".to_string(),
                    code: Some(ErrorCode::AiError),
                    retry_after: None,
                },
            ),
            Self::Editor(EditorError::Usage(_)) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorBody {
                    error: "Failed to fetch usage".to_string(),
                    code: None,
                    retry_after: None,
                },
            ),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = self.status_and_body();
        if status.is_server_error() {
            tracing::error!(error = %self, "API error");
        } else {
            tracing::debug!(error = %self, "API error");
        }
        (status, Json(body)).into_response()
    }
}
