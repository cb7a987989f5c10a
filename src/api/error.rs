use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use crate::error::AppError;

/// [`AppError`] rendered as `{"error": ..., "message": ...}` for API clients.
#[derive(Debug)]
pub struct ApiError(pub AppError);

pub type ApiResult<T> = Result<T, ApiError>;

impl ApiError {
    pub fn unauthorized() -> Self {
        ApiError(AppError::Unauthorized)
    }

    pub fn forbidden(message: &str) -> Self {
        ApiError(AppError::Forbidden(message.to_string()))
    }

    pub fn bad_request(message: &str) -> Self {
        ApiError(AppError::BadRequest(message.to_string()))
    }
}

impl<E: Into<AppError>> From<E> for ApiError {
    fn from(err: E) -> Self {
        ApiError(err.into())
    }
}

fn short_name(status: StatusCode) -> &'static str {
    match status {
        StatusCode::BAD_REQUEST => "bad request",
        StatusCode::UNAUTHORIZED => "unauthorized",
        StatusCode::FORBIDDEN => "forbidden",
        StatusCode::NOT_FOUND => "not found",
        StatusCode::CONFLICT => "conflict",
        _ => "internal server error",
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            // No login page to redirect to here.
            AppError::LoginRequired(_) => StatusCode::UNAUTHORIZED,
            other => other.status(),
        };
        let message = match &self.0 {
            AppError::Unauthorized | AppError::LoginRequired(_) => "Invalid credentials".to_string(),
            other => other.public_message(),
        };

        let body = Json(json!({
            "error": short_name(status),
            "message": message,
        }));
        (status, body).into_response()
    }
}
