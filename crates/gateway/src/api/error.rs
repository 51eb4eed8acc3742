//! Maps [`sa_domain::error::Error`] to the stable `{error, reason}` JSON
//! body and HTTP status at the edge.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};

use sa_domain::error::Error;

pub struct ApiError(pub Error);

impl From<Error> for ApiError {
    fn from(e: Error) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.0.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let body = Json(serde_json::json!({
            "error": self.0.to_string(),
            "reason": self.0.reason().as_str(),
        }));
        (status, body).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
