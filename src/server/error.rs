use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{FromRequest, FromRequestParts};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use crate::pipeline::PipelineError;
use crate::pr::PrError;

/// Error type for HTTP handlers; renders `{success: false, code, message}`.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Pr(#[from] PrError),

    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    #[error("Invalid request body: {}", .0.body_text())]
    Body(#[from] JsonRejection),

    #[error("Invalid query string: {}", .0.body_text())]
    Query(#[from] QueryRejection),
}

/// `Json` whose rejection renders as an [`ApiError`].
#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(ApiError))]
pub struct ApiJson<T>(pub T);

/// `Query` whose rejection renders as an [`ApiError`].
#[derive(FromRequestParts)]
#[from_request(via(axum::extract::Query), rejection(ApiError))]
pub struct ApiQuery<T>(pub T);

pub type ApiResult<T> = Result<T, ApiError>;

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let message = self.to_string();
        let body = match &self {
            ApiError::Pr(err) => {
                let (status, code) = match err {
                    PrError::Validation(_) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR"),
                    PrError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
                    PrError::Conflict { .. } => (StatusCode::BAD_REQUEST, "CONFLICT"),
                    PrError::Store(_) => {
                        tracing::error!(error = %err, "change request store failure");
                        (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR")
                    }
                };
                (status, json!({ "success": false, "code": code, "message": message }))
            }
            ApiError::Pipeline(err) => {
                let (status, code) = match err {
                    PipelineError::NotFound => (StatusCode::NOT_FOUND, "NOT_FOUND"),
                    PipelineError::Upstream { .. } => {
                        tracing::error!(error = %err, "upstream failure");
                        (StatusCode::BAD_GATEWAY, "UPSTREAM_ERROR")
                    }
                    PipelineError::Timeout { .. } => {
                        tracing::error!(error = %err, "upstream deadline exceeded");
                        (StatusCode::GATEWAY_TIMEOUT, "UPSTREAM_TIMEOUT")
                    }
                };
                (
                    status,
                    json!({
                        "success": false,
                        "code": code,
                        "message": message,
                        "step": err.step(),
                    }),
                )
            }
            ApiError::Body(_) | ApiError::Query(_) => (
                StatusCode::BAD_REQUEST,
                json!({ "success": false, "code": "VALIDATION_ERROR", "message": message }),
            ),
        };

        let (status, body) = body;
        (status, axum::Json(body)).into_response()
    }
}
