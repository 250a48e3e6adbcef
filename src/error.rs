//! Error taxonomy for the evaluator, the progress store, the exporter and the HTTP layer.

use std::path::PathBuf;

use axum::{
    extract::rejection::{JsonRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use tracing::{error, warn};

/// Failure talking to the generative model (network, auth, quota, bad status).
///
/// Malformed replies are not errors: the evaluator absorbs them with a fallback.
#[derive(Debug, thiserror::Error)]
pub enum EvaluatorError {
    #[error("evaluation service is not configured")]
    NotConfigured,
    #[error("evaluation service request failed: {0}")]
    Transport(String),
    #[error("could not authenticate with the evaluation service: {0}")]
    Auth(String),
    #[error("evaluation service returned HTTP {status}: {message}")]
    Status { status: u16, message: String },
    #[error("evaluation service returned no text")]
    EmptyReply,
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The progress file exists but is not a valid progress document.
    #[error("progress file {path} is corrupt: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to read progress file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// The durable write failed; memory already reflects the change.
    #[error("failed to persist progress to {path}: {reason}")]
    Persistence { path: PathBuf, reason: String },
}

#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("export I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("CSV encoding failed: {0}")]
    Csv(#[from] csv::Error),
}

/// Errors surfaced by HTTP handlers.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    NotFound(String),
    #[error(transparent)]
    Evaluator(#[from] EvaluatorError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Export(#[from] ExportError),
}

#[derive(Debug, Serialize)]
pub struct ErrorOut {
    pub code: &'static str,
    pub message: String,
}

impl AppError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        AppError::BadRequest(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        AppError::NotFound(msg.into())
    }

    fn status_code(&self) -> StatusCode {
        match self {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Evaluator(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Store(_) | AppError::Export(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn code(&self) -> &'static str {
        match self {
            AppError::BadRequest(_) => "bad_request",
            AppError::NotFound(_) => "not_found",
            AppError::Evaluator(_) => "evaluation_unavailable",
            AppError::Store(_) => "store_error",
            AppError::Export(_) => "export_error",
        }
    }

    fn public_message(&self) -> String {
        match self {
            AppError::Evaluator(EvaluatorError::NotConfigured) => {
                "The evaluation service is not configured. Check the model credentials in .env.".into()
            }
            AppError::Evaluator(_) => {
                "The evaluation service is unavailable right now. Please try again.".into()
            }
            other => other.to_string(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            error!(target: "promptquest", code = self.code(), error = %self, "Request failed");
        } else {
            warn!(target: "promptquest", code = self.code(), error = %self, "Request rejected");
        }
        let body = ErrorOut { code: self.code(), message: self.public_message() };
        (status, Json(body)).into_response()
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::BadRequest(format!("Invalid JSON body: {}", rejection.body_text()))
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        AppError::BadRequest(format!("Invalid query: {}", rejection.body_text()))
    }
}
