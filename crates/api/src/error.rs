//! API error types with HTTP response mapping.
//!
//! Each engine error maps to an HTTP status plus the canonical RPC code
//! carried in the JSON body, so callers behind any transport see the same
//! taxonomy.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use engine::EngineError;

/// API-level error type that maps to HTTP responses.
#[derive(Debug)]
pub enum ApiError {
    /// The engine refused or failed the operation.
    Engine(EngineError),
    /// The per-call deadline elapsed. The outcome at the store is unknown;
    /// a retry is safe under idempotency.
    DeadlineExceeded,
}

impl ApiError {
    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            ApiError::Engine(err) => match err {
                EngineError::InsufficientInventory { .. }
                | EngineError::SeatsUnavailable { .. }
                | EngineError::Conflict { .. } => (StatusCode::CONFLICT, "ABORTED"),
                EngineError::InventoryNotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
                EngineError::InvalidArgument(_) => (StatusCode::BAD_REQUEST, "INVALID_ARGUMENT"),
                EngineError::Corrupt(_) | EngineError::Store(_) => {
                    (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL")
                }
            },
            ApiError::DeadlineExceeded => (StatusCode::GATEWAY_TIMEOUT, "DEADLINE_EXCEEDED"),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();
        let message = match &self {
            ApiError::Engine(err) => err.to_string(),
            ApiError::DeadlineExceeded => "deadline exceeded".to_string(),
        };
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(error = %message, "internal server error");
        }

        let mut body = serde_json::json!({ "error": message, "code": code });
        if let ApiError::Engine(EngineError::SeatsUnavailable { seat_ids, .. }) = &self {
            body["unavailable_seats"] = serde_json::json!(seat_ids);
        }
        (status, Json(body)).into_response()
    }
}

impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        ApiError::Engine(err)
    }
}
