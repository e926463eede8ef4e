//! Error taxonomy for the HTTP surface and the import pipeline.
//!
//! Library code returns `anyhow::Result`; handlers convert failures into an
//! [`ApiError`] at the request boundary, which renders as
//! `{"error": "...", "details": "..."}`.
//!
//! | Variant | Status | Body |
//! |---------|--------|------|
//! | [`ApiError::Validation`] | 400 | message |
//! | [`ApiError::UnknownKind`] | 400 | message |
//! | [`ApiError::Import`] | 500 | message + details |
//! | [`ApiError::Query`] | 500 | fixed message; cause is logged only |

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::models::RecordKind;

/// Why a CSV import failed. Nothing is inserted in any of these cases.
#[derive(Debug, Error)]
pub enum ImportError {
    #[error("no file was uploaded")]
    MissingFile,

    #[error("could not read upload: {0}")]
    Unreadable(String),

    #[error("invalid CSV: {0}")]
    Csv(#[from] csv::Error),

    #[error("row {row}: {message}")]
    Rejected { row: usize, message: String },

    #[error("bulk insert rejected: {0}")]
    Store(String),
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    Validation(String),

    #[error("Unknown record kind: {0}")]
    UnknownKind(String),

    #[error("{message}")]
    Import { message: String, details: String },

    #[error("{message}")]
    Query {
        message: String,
        cause: anyhow::Error,
    },
}

impl ApiError {
    pub fn query(message: impl Into<String>, cause: anyhow::Error) -> Self {
        ApiError::Query {
            message: message.into(),
            cause,
        }
    }

    pub fn import(kind: RecordKind, err: ImportError) -> Self {
        ApiError::Import {
            message: format!("Failed to import {}.", kind.label()),
            details: err.to_string(),
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) | ApiError::UnknownKind(_) => StatusCode::BAD_REQUEST,
            ApiError::Import { .. } | ApiError::Query { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// JSON error response body.
#[derive(Serialize)]
struct ErrorBody {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match self {
            ApiError::Import { message, details } => {
                tracing::warn!(%details, "{}", message);
                ErrorBody {
                    error: message,
                    details: Some(details),
                }
            }
            ApiError::Query { message, cause } => {
                tracing::error!(error = %format!("{:#}", cause), "{}", message);
                ErrorBody {
                    error: message,
                    details: None,
                }
            }
            other => ErrorBody {
                error: other.to_string(),
                details: None,
            },
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_statuses() {
        assert_eq!(
            ApiError::Validation("bad".into()).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::UnknownKind("orders".into()).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::import(RecordKind::User, ImportError::MissingFile).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            ApiError::query("Aggregation failed.", anyhow::anyhow!("boom")).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_import_message_names_kind() {
        let err = ApiError::import(RecordKind::Product, ImportError::MissingFile);
        match err {
            ApiError::Import { message, details } => {
                assert_eq!(message, "Failed to import products.");
                assert_eq!(details, "no file was uploaded");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_query_error_hides_cause() {
        let err = ApiError::query("Aggregation failed.", anyhow::anyhow!("disk I/O error"));
        assert_eq!(err.to_string(), "Aggregation failed.");
    }
}
