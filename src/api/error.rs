use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::models::PageError;
use crate::store::StoreError;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error(transparent)]
    Pagination(#[from] PageError),
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_message) = match &self {
            ApiError::Pagination(_) => (StatusCode::BAD_REQUEST, "Invalid pagination"),
            ApiError::NotFound(_) => (StatusCode::NOT_FOUND, "Not found"),
            ApiError::Store(StoreError::Unavailable(_)) => {
                (StatusCode::SERVICE_UNAVAILABLE, "Data store unavailable")
            }
            ApiError::Store(StoreError::Query(_)) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "Query failed")
            }
            ApiError::Store(StoreError::DuplicateEmail(_)) => {
                (StatusCode::CONFLICT, "Email already in use")
            }
            ApiError::Store(StoreError::MissingUser(_))
            | ApiError::Store(StoreError::MissingRide(_)) => {
                (StatusCode::BAD_REQUEST, "Invalid reference")
            }
        };

        if status.is_server_error() {
            tracing::error!("request failed: {}", self);
        }

        let body = Json(json!({
            "error": error_message,
            "message": self.to_string(),
        }));

        (status, body).into_response()
    }
}
