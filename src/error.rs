use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};

use crate::store::StoreError;

/// Error response type
#[derive(Serialize, Deserialize, utoipa::ToSchema)]
pub struct ErrorResponse {
    pub error: String,
}

/// Custom error type for API endpoints
///
/// This error type provides consistent error handling across all endpoints,
/// mapping each failure to a status code and a JSON body. Store failures are
/// logged here and never echoed to the caller.
#[derive(Debug)]
pub enum ApiError {
    /// Required parameter missing or empty
    MalformedRequest(String),
    /// Request body is not the expected JSON
    JsonError(serde_json::Error),
    /// Record store operation failed
    Store(StoreError),
    /// No route for this method and path
    RouteNotFound,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            ApiError::MalformedRequest(msg) => {
                tracing::warn!("Rejected malformed request: {}", msg);
                (StatusCode::BAD_REQUEST, format!("Malformed request: {}", msg))
            }
            ApiError::JsonError(err) => {
                tracing::warn!("Rejected request body: {}", err);
                (StatusCode::BAD_REQUEST, format!("JSON parse error: {}", err))
            }
            ApiError::Store(StoreError::InvalidRecord(err)) => {
                tracing::warn!("Rejected record: {}", err);
                (StatusCode::BAD_REQUEST, format!("Invalid record: {}", err))
            }
            ApiError::Store(StoreError::InvalidFieldName(name)) => {
                tracing::warn!("Rejected update of field '{}'", name);
                (
                    StatusCode::BAD_REQUEST,
                    format!(
                        "Invalid field name: '{}' (expected letters, digits and underscores, not the key field)",
                        name
                    ),
                )
            }
            ApiError::Store(StoreError::RecordNotFound(key)) => {
                tracing::info!("Update targeted missing user: {}", key);
                (StatusCode::NOT_FOUND, format!("User not found: {}", key))
            }
            ApiError::Store(StoreError::Unavailable(err)) => {
                tracing::error!("Record store failure: {:#}", err);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal Server Error".to_string(),
                )
            }
            ApiError::RouteNotFound => (StatusCode::NOT_FOUND, "404 Not Found".to_string()),
        };

        let body = Json(ErrorResponse {
            error: error_message,
        });

        (status, body).into_response()
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        ApiError::Store(err)
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        ApiError::JsonError(err)
    }
}
