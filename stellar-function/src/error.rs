//! Error types of a single chain invocation.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

use crate::hop::HopError;
use crate::storage::StoreError;

/// Errors that abort a hop.
///
/// Only the benchmarking harness sends requests, so invalid input is not retried. The caller sees
/// a failed request and counts it against its error budget.
#[derive(Debug, Error)]
pub enum ChainError {
    /// A required query parameter or field is absent.
    #[error("missing parameter {0}")]
    MissingParameter(&'static str),

    /// A parameter could not be parsed.
    #[error("invalid value {value:?} for parameter {name}")]
    InvalidParameter {
        /// The parameter name.
        name: &'static str,
        /// The raw value.
        value: String,
    },

    /// The chain would exceed the configured number of hops.
    #[error("chain of {hops} hops exceeds the maximum of {max}")]
    ChainTooLong {
        /// Hops of the requested chain, including this one.
        hops: usize,
        /// The configured maximum.
        max: usize,
    },

    /// The payload could not be written to object storage.
    #[error("failed to store payload")]
    Store(#[from] StoreError),

    /// Invoking the next hop failed.
    #[error("failed to invoke next hop {target}")]
    NextHop {
        /// The chain ID of the next hop.
        target: String,
        /// The underlying error.
        #[source]
        source: HopError,
    },
}

/// Result type of chain invocations.
pub type ChainResult<T> = Result<T, ChainError>;

impl ChainError {
    /// Returns the HTTP status this error is reported with.
    pub fn status(&self) -> StatusCode {
        match self {
            ChainError::MissingParameter(_)
            | ChainError::InvalidParameter { .. }
            | ChainError::ChainTooLong { .. } => StatusCode::BAD_REQUEST,
            ChainError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ChainError::NextHop { .. } => StatusCode::BAD_GATEWAY,
        }
    }

    /// Logs the error at a level matching its cause.
    pub fn log(&self) {
        match self {
            ChainError::Store(_) | ChainError::NextHop { .. } => {
                tracing::error!(error = self as &dyn std::error::Error, "Hop failed");
            }
            _ => tracing::debug!("bad request: {self}"),
        }
    }
}

impl IntoResponse for ChainError {
    fn into_response(self) -> Response {
        self.log();
        let body = serde_json::json!({ "error": self.to_string() });
        (self.status(), Json(body)).into_response()
    }
}

impl From<ChainError> for tonic::Status {
    fn from(error: ChainError) -> Self {
        error.log();
        let message = error.to_string();
        match error {
            ChainError::MissingParameter(_)
            | ChainError::InvalidParameter { .. }
            | ChainError::ChainTooLong { .. } => tonic::Status::invalid_argument(message),
            ChainError::Store(_) => tonic::Status::internal(message),
            ChainError::NextHop { .. } => tonic::Status::unavailable(message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_to_http_status() {
        assert_eq!(
            ChainError::MissingParameter("IncrementLimit").status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ChainError::Store(StoreError::Status(StatusCode::FORBIDDEN)).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            ChainError::NextHop {
                target: "hop-2".into(),
                source: HopError::Status(StatusCode::BAD_GATEWAY),
            }
            .status(),
            StatusCode::BAD_GATEWAY
        );
    }

    #[test]
    fn maps_to_grpc_status() {
        let status = tonic::Status::from(ChainError::InvalidParameter {
            name: "IncrementLimit",
            value: "ten".into(),
        });
        assert_eq!(status.code(), tonic::Code::InvalidArgument);
        assert!(status.message().contains("IncrementLimit"));

        let status = tonic::Status::from(ChainError::ChainTooLong { hops: 40, max: 32 });
        assert_eq!(status.code(), tonic::Code::InvalidArgument);
    }
}
