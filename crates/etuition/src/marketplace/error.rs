use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

use super::domain::{InvalidField, TransitionError};
use super::repository::RepositoryError;
use crate::identity::IdentityError;
use crate::payments::GatewayError;

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

#[derive(Debug, Serialize)]
pub struct ErrorDetail {
    pub code: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

/// Service-level failure, one variant per client-visible error kind.
#[derive(Debug, Error)]
pub enum MarketplaceError {
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    #[error("forbidden: {0}")]
    Forbidden(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("validation error: {0}")]
    Validation(String),
    #[error("conflict: {0}")]
    Conflict(String),
    /// A multi-document workflow stopped after some of its writes succeeded.
    #[error("{operation} stopped at {failed} after {completed:?}: {cause}")]
    PartialFailure {
        operation: &'static str,
        completed: Vec<&'static str>,
        failed: &'static str,
        cause: String,
    },
    #[error("timed out: {0}")]
    Timeout(String),
    #[error("upstream error: {0}")]
    Upstream(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl MarketplaceError {
    pub fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            Self::Unauthorized(_) => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED"),
            Self::Forbidden(_) => (StatusCode::FORBIDDEN, "FORBIDDEN"),
            Self::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            Self::Validation(_) => (StatusCode::UNPROCESSABLE_ENTITY, "VALIDATION_ERROR"),
            Self::Conflict(_) => (StatusCode::CONFLICT, "CONFLICT"),
            Self::PartialFailure { .. } => (StatusCode::INTERNAL_SERVER_ERROR, "PARTIAL_FAILURE"),
            Self::Timeout(_) => (StatusCode::GATEWAY_TIMEOUT, "TIMEOUT"),
            Self::Upstream(_) => (StatusCode::BAD_GATEWAY, "UPSTREAM_ERROR"),
            Self::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        }
    }

    pub fn forbidden(message: &str) -> Self {
        Self::Forbidden(message.to_string())
    }

    pub fn not_found(message: &str) -> Self {
        Self::NotFound(message.to_string())
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Wraps a failed step of a workflow whose earlier steps already committed.
    pub fn partial(
        operation: &'static str,
        completed: &[&'static str],
        failed: &'static str,
        cause: MarketplaceError,
    ) -> Self {
        Self::PartialFailure {
            operation,
            completed: completed.to_vec(),
            failed,
            cause: cause.to_string(),
        }
    }
}

impl IntoResponse for MarketplaceError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();

        let (message, details) = match &self {
            Self::Internal(_) => ("An internal error occurred".to_string(), None),
            Self::Upstream(_) => ("An upstream service error occurred".to_string(), None),
            Self::Timeout(_) => ("The operation timed out".to_string(), None),
            Self::PartialFailure {
                operation,
                completed,
                failed,
                ..
            } => (
                format!("{operation} was only partially applied; retry to complete it"),
                Some(serde_json::json!({
                    "operation": operation,
                    "completed": completed,
                    "failed": failed,
                })),
            ),
            other => (other.to_string(), None),
        };

        match &self {
            Self::Internal(_) => tracing::error!(error = %self, "internal error"),
            Self::PartialFailure { .. } => tracing::error!(error = %self, "partial failure"),
            Self::Upstream(_) => tracing::error!(error = %self, "upstream error"),
            Self::Timeout(_) => tracing::warn!(error = %self, "operation timed out"),
            _ => {}
        }

        let body = ErrorBody {
            error: ErrorDetail {
                code,
                message,
                details,
            },
        };

        (status, Json(body)).into_response()
    }
}

impl From<RepositoryError> for MarketplaceError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::Conflict => Self::Conflict(err.to_string()),
            RepositoryError::NotFound => Self::NotFound("record not found".to_string()),
            RepositoryError::Timeout => Self::Timeout("document store".to_string()),
            RepositoryError::Unavailable(reason) => Self::Internal(reason),
        }
    }
}

impl From<TransitionError> for MarketplaceError {
    fn from(err: TransitionError) -> Self {
        match err {
            TransitionError::ListingTargetInvalid => Self::Validation(err.to_string()),
            TransitionError::NoApplicant | TransitionError::ApplicantMismatch => {
                Self::NotFound(err.to_string())
            }
            TransitionError::ListingAlreadyDecided { .. }
            | TransitionError::AlreadySettled
            | TransitionError::ApplicantPending
            | TransitionError::ApplicationDecided { .. } => Self::Conflict(err.to_string()),
        }
    }
}

impl From<InvalidField> for MarketplaceError {
    fn from(err: InvalidField) -> Self {
        Self::Validation(err.to_string())
    }
}

impl From<IdentityError> for MarketplaceError {
    fn from(err: IdentityError) -> Self {
        match err {
            IdentityError::Timeout => Self::Timeout("identity provider".to_string()),
            IdentityError::KeysUnavailable(reason) => Self::Upstream(reason),
            IdentityError::Configuration(reason) => Self::Internal(reason),
            credential => Self::Unauthorized(credential.to_string()),
        }
    }
}

impl From<GatewayError> for MarketplaceError {
    fn from(err: GatewayError) -> Self {
        match err {
            GatewayError::Timeout => Self::Timeout("payment provider".to_string()),
            GatewayError::SessionNotFound => Self::NotFound(err.to_string()),
            GatewayError::Configuration(reason) => Self::Internal(reason),
            other => Self::Upstream(other.to_string()),
        }
    }
}
