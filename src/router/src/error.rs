use axum::{
    Json,
    http::{Method, StatusCode},
    response::{IntoResponse, Response},
};
use common::index::IndexError;
use querier::RenderError;
use serde_json::json;

/// Failure of an HTTP request, mapped to exactly one status and body.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Missing required parameter '{0}'")]
    MissingParameter(&'static str),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Unsupported method {0}")]
    UnsupportedMethod(Method),

    #[error(transparent)]
    Render(#[from] RenderError),

    #[error("Search failed: {0}")]
    Search(#[from] IndexError),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::MissingParameter(_)
            | ApiError::InvalidParameter(_)
            | ApiError::UnsupportedMethod(_) => StatusCode::BAD_REQUEST,
            ApiError::Render(RenderError::TimedOut) => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::Render(e) if e.is_client_error() => StatusCode::BAD_REQUEST,
            ApiError::Render(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Search(IndexError::InvalidPattern { .. }) => StatusCode::BAD_REQUEST,
            ApiError::Search(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status == StatusCode::PAYLOAD_TOO_LARGE {
            return status.into_response();
        }
        if status.is_server_error() {
            tracing::error!(error = %self, "Request failed");
            return (
                status,
                Json(json!({
                    "error": "Internal server error"
                })),
            )
                .into_response();
        }
        tracing::debug!(error = %self, "Rejected request");
        (
            status,
            Json(json!({
                "error": "Bad request",
                "message": self.to_string()
            })),
        )
            .into_response()
    }
}
