//! HTTP error envelope: `{error: true, code, message}` (§6, §7). Thin
//! `IntoResponse` wrapper over `maestro_domain::error::Error`, modeled on
//! the teacher's `sa_domain::error::Error` response mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use maestro_domain::error::Error;
use serde_json::json;

pub struct ApiError(pub Error);

impl From<Error> for ApiError {
    fn from(e: Error) -> Self {
        ApiError(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.0.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let body = json!({
            "error": true,
            "code": self.0.code(),
            "message": self.0.to_string(),
        });
        (status, Json(body)).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
