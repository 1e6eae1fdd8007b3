use axum::{Json, http::StatusCode, response::IntoResponse};
use serde::{Serialize, Serializer};

pub type AppResult<T> = Result<T, AppError>;

/// Error response of the plain HTTP endpoints.
#[derive(Debug, Clone, Serialize)]
pub struct AppError {
    #[serde(serialize_with = "serialize_status_code")]
    status: StatusCode,
    detail: Option<String>,
}

impl AppError {
    /// Create a new [`AppError`].
    pub fn new(status: StatusCode, message: Option<impl ToString>) -> AppError {
        Self {
            status,
            detail: message.map(|m| m.to_string()),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let status = self.status;
        (status, Json(self)).into_response()
    }
}

/// Status codes are serialized as strings.
fn serialize_status_code<S: Serializer>(status: &StatusCode, ser: S) -> Result<S::Ok, S::Error> {
    ser.serialize_str(&status.as_u16().to_string())
}
