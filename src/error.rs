//! 统一的 API 错误类型与转换，响应体为 `{"error": ...}`。

use axum::http::{HeaderMap, HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Json, Response};
use serde_json::json;
use tracing::error;

use crate::library::LibraryError;
use crate::thumbnail::ThumbnailError;

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    NotFound(String),
    Internal(String),
    RangeNotSatisfiable(u64),
    Unauthorized(String),
    TooManyRequests(u64),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::BadRequest(msg) => error_body(StatusCode::BAD_REQUEST, &msg),
            ApiError::NotFound(msg) => error_body(StatusCode::NOT_FOUND, &msg),
            ApiError::Internal(msg) => {
                error!(error = %msg, "request failed");
                error_body(StatusCode::INTERNAL_SERVER_ERROR, &msg)
            }
            ApiError::RangeNotSatisfiable(size) => {
                let mut headers = HeaderMap::new();
                if let Ok(value) = HeaderValue::from_str(&format!("bytes */{size}")) {
                    headers.insert(header::CONTENT_RANGE, value);
                }
                (
                    headers,
                    error_body(StatusCode::RANGE_NOT_SATISFIABLE, "range not satisfiable"),
                )
                    .into_response()
            }
            ApiError::Unauthorized(msg) => error_body(StatusCode::UNAUTHORIZED, &msg),
            ApiError::TooManyRequests(retry_after) => {
                let mut headers = HeaderMap::new();
                if retry_after > 0
                    && let Ok(value) = HeaderValue::from_str(&retry_after.to_string())
                {
                    headers.insert(header::RETRY_AFTER, value);
                }
                (
                    headers,
                    error_body(StatusCode::TOO_MANY_REQUESTS, "too many requests"),
                )
                    .into_response()
            }
        }
    }
}

fn error_body(status: StatusCode, msg: &str) -> Response {
    (status, Json(json!({ "error": msg }))).into_response()
}

impl From<LibraryError> for ApiError {
    fn from(error: LibraryError) -> Self {
        match error {
            LibraryError::InvalidName | LibraryError::NotFound => {
                ApiError::NotFound("PDF not found".into())
            }
            LibraryError::Io(err) => ApiError::Internal(err.to_string()),
        }
    }
}

impl From<ThumbnailError> for ApiError {
    fn from(error: ThumbnailError) -> Self {
        match error {
            ThumbnailError::NotFound => ApiError::NotFound(error.to_string()),
            ThumbnailError::RenderFailure(_) => ApiError::Internal(error.to_string()),
        }
    }
}
