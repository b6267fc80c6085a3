use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use std::path::PathBuf;
use thiserror::Error;

use crate::models::ApiResponse;

/// Startup failure while reading the model artifact.
/// The service must not come up without a classifier.
#[derive(Error, Debug)]
pub enum ArtifactLoadError {
    #[error("Failed to read model artifact {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse model artifact {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Incompatible model artifact: {0}")]
    Incompatible(String),
}

/// Failure of a single prediction attempt.
/// Reported to the caller, never fatal to the process.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PredictionError {
    #[error("{field} is out of domain: {reason}")]
    OutOfDomain { field: String, reason: String },

    #[error("Feature row does not match the model schema: {0}")]
    SchemaMismatch(String),

    #[error("Classifier returned an invalid result: {0}")]
    InvalidOutput(String),
}

impl PredictionError {
    pub fn out_of_domain(field: impl Into<String>, reason: impl Into<String>) -> Self {
        PredictionError::OutOfDomain {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Whether the caller supplied bad input, as opposed to the
    /// row/model contract breaking on the server side.
    pub fn is_client_error(&self) -> bool {
        matches!(self, PredictionError::OutOfDomain { .. })
    }

    pub fn status_code(&self) -> StatusCode {
        if self.is_client_error() {
            StatusCode::UNPROCESSABLE_ENTITY
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

impl IntoResponse for PredictionError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        (status, Json(ApiResponse::<()>::error(self.to_string()))).into_response()
    }
}
