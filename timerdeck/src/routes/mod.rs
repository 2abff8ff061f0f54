pub mod timers;

use axum::{http::StatusCode, response::IntoResponse, Json};
use serde::Serialize;

use crate::coordinator::CoordinatorError;

#[derive(Debug, thiserror::Error, Serialize, strum::Display)]
pub enum ApiError {
    TimerNotFound,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    #[serde(skip)]
    pub status: StatusCode,
    pub error: ApiError,
    pub message: String,
}

impl From<CoordinatorError> for ErrorResponse {
    fn from(error: CoordinatorError) -> Self {
        match error {
            CoordinatorError::NotFound(_) => ErrorResponse {
                status: StatusCode::NOT_FOUND,
                error: ApiError::TimerNotFound,
                message: error.to_string(),
            },
        }
    }
}

impl IntoResponse for ErrorResponse {
    fn into_response(self) -> axum::response::Response {
        let body = Json(&self);
        (self.status, body).into_response()
    }
}
