//! Error types for the OBEX server.
//!
//! The error taxonomy follows the failure modes of the ingestion
//! pipeline and its collaborators:
//!
//! - **Validation** - malformed input, rejected before persistence (HTTP 422)
//! - **Database** - transaction/statement failure, rolled back and surfaced (HTTP 500)
//! - **Serialization** - JSON encoding failure, surfaced (HTTP 500)
//! - **Mqtt** - connection-level broker failure, logged by the bus adapter
//! - **Config** - startup configuration failure
//!
//! Delivery failures (an individual WebSocket send failing) are never
//! represented here: the registry prunes the dead connection and the
//! broadcast continues.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

use crate::config::ConfigError;

/// Top-level error type for the OBEX server.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Input failed validation before reaching the pipeline.
    #[error("validation error: {0}")]
    Validation(String),

    /// Persistence store failure. The transaction has been rolled back.
    #[error("database error: {0}")]
    Database(#[from] tokio_rusqlite::Error),

    /// JSON encoding/decoding failure.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Broker connection failure reported by the bus adapter.
    #[error("mqtt error: {0}")]
    Mqtt(String),

    /// Configuration error during startup.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Unexpected internal failure.
    #[error("internal server error: {0}")]
    Internal(String),
}

impl ServerError {
    /// Creates a new validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Creates a new MQTT error.
    pub fn mqtt(message: impl Into<String>) -> Self {
        Self::Mqtt(message.into())
    }

    /// Creates a new internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Returns `true` if this error indicates a client-side problem.
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::Validation(_))
    }
}

/// JSON error response body.
#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = match &self {
            Self::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = ErrorBody {
            error: self.to_string(),
        };

        (status, Json(body)).into_response()
    }
}

/// A specialized Result type for server operations.
pub type Result<T> = std::result::Result<T, ServerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_error_displays_correctly() {
        let err = ServerError::validation("end_time must not precede start_time");
        assert_eq!(
            err.to_string(),
            "validation error: end_time must not precede start_time"
        );
    }

    #[test]
    fn mqtt_error_displays_correctly() {
        let err = ServerError::mqtt("broker unreachable");
        assert_eq!(err.to_string(), "mqtt error: broker unreachable");
    }

    #[test]
    fn internal_error_displays_correctly() {
        let err = ServerError::internal("registry poisoned");
        assert_eq!(err.to_string(), "internal server error: registry poisoned");
    }

    #[test]
    fn serde_json_error_converts_with_question_mark() {
        fn inner() -> Result<serde_json::Value> {
            let value = serde_json::from_str("not json")?;
            Ok(value)
        }

        assert!(matches!(
            inner().unwrap_err(),
            ServerError::Serialization(_)
        ));
    }

    #[test]
    fn is_client_error_only_for_validation() {
        assert!(ServerError::validation("bad input").is_client_error());
        assert!(!ServerError::internal("oops").is_client_error());
        assert!(!ServerError::mqtt("down").is_client_error());
    }

    #[test]
    fn validation_maps_to_422() {
        let response = ServerError::validation("bad coordinates").into_response();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[test]
    fn internal_maps_to_500() {
        let response = ServerError::internal("oops").into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
