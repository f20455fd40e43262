use crate::analysis::AnalysisError;
use crate::db::errors::DbError;
use crate::intervals::IntervalError;
use crate::types::Operation;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde_json::json;
use thiserror::Error as ThisError;

/// Resource label used for sleep record lookups; its 404 carries the app's own wording.
pub const SLEEP_RECORD_RESOURCE: &str = "Sleep record";

pub const RECORD_NOT_FOUND_MESSAGE: &str = "기록을 찾을 수 없습니다.";
pub const INTERNAL_ERROR_MESSAGE: &str = "서버 오류가 발생했습니다.";
pub const ANALYSIS_FAILED_MESSAGE: &str = "수면 패턴 분석에 실패했습니다. 잠시 후 다시 시도해주세요.";

#[derive(ThisError, Debug)]
pub enum Error {
    /// Authentication required but not provided
    #[error("Not authenticated")]
    Unauthenticated { message: Option<String> },

    /// Caller tried to act on an account that is not theirs
    #[error("Insufficient permissions to {action} {resource}")]
    InsufficientPermissions { action: Operation, resource: String },

    /// Invalid request data or business rule violation
    #[error("{message}")]
    BadRequest { message: String },

    /// Requested resource not found (or not visible to the caller)
    #[error("{resource} with ID {id} not found")]
    NotFound { resource: String, id: String },

    /// An optional feature is not configured on this deployment
    #[error("Service unavailable: {message}")]
    ServiceUnavailable { message: String },

    /// The external analysis model could not produce a summary
    #[error("Sleep analysis failed: {0}")]
    AnalysisFailed(#[from] AnalysisError),

    /// Database operation error
    #[error(transparent)]
    Database(#[from] DbError),

    /// Unexpected error with full context chain
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl Error {
    pub fn record_not_found(id: impl ToString) -> Self {
        Error::NotFound {
            resource: SLEEP_RECORD_RESOURCE.to_string(),
            id: id.to_string(),
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::Unauthenticated { .. } => StatusCode::UNAUTHORIZED,
            Error::InsufficientPermissions { .. } => StatusCode::FORBIDDEN,
            Error::BadRequest { .. } => StatusCode::BAD_REQUEST,
            Error::NotFound { .. } => StatusCode::NOT_FOUND,
            Error::ServiceUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
            // Failures building the request are ours, not the upstream model's
            Error::AnalysisFailed(AnalysisError::Serialize(_) | AnalysisError::InvalidRecord(_)) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            Error::AnalysisFailed(_) => StatusCode::BAD_GATEWAY,
            Error::Database(db_err) => match db_err {
                DbError::NotFound => StatusCode::NOT_FOUND,
                DbError::UniqueViolation { .. } => StatusCode::CONFLICT,
                DbError::ForeignKeyViolation { .. } => StatusCode::BAD_REQUEST,
                DbError::CheckViolation { .. } => StatusCode::BAD_REQUEST,
                DbError::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            Error::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Returns a user-safe error message, without leaking internal implementation details
    pub fn user_message(&self) -> String {
        match self {
            Error::Unauthenticated { message } => message.clone().unwrap_or_else(|| "Authentication required".to_string()),
            Error::InsufficientPermissions { action, resource } => {
                format!("Insufficient permissions to {action} {resource}")
            }
            Error::BadRequest { message } => message.clone(),
            Error::NotFound { resource, .. } if resource == SLEEP_RECORD_RESOURCE => RECORD_NOT_FOUND_MESSAGE.to_string(),
            Error::NotFound { resource, id } => {
                format!("{resource} with ID {id} not found")
            }
            Error::ServiceUnavailable { message } => message.clone(),
            Error::AnalysisFailed(_) => ANALYSIS_FAILED_MESSAGE.to_string(),
            Error::Database(db_err) => match db_err {
                DbError::NotFound => "Resource not found".to_string(),
                DbError::UniqueViolation { .. } if db_err.mentions("users.email") => {
                    "An account with this email address already exists".to_string()
                }
                DbError::UniqueViolation { .. } => "Resource already exists".to_string(),
                DbError::ForeignKeyViolation { .. } => "Invalid reference to related resource".to_string(),
                DbError::CheckViolation { .. } => "Invalid data provided".to_string(),
                DbError::Other(_) => INTERNAL_ERROR_MESSAGE.to_string(),
            },
            Error::Other(_) => INTERNAL_ERROR_MESSAGE.to_string(),
        }
    }
}

impl From<IntervalError> for Error {
    fn from(err: IntervalError) -> Self {
        Error::BadRequest { message: err.to_string() }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        // Log full error details for debugging - different log levels based on severity
        match &self {
            Error::Database(DbError::Other(_)) | Error::Other(_) => {
                tracing::error!("Internal service error: {:#}", self);
            }
            Error::AnalysisFailed(_) => {
                tracing::error!("Upstream analysis error: {:#}", self);
            }
            Error::Database(_) => {
                tracing::warn!("Database constraint error: {}", self);
            }
            Error::ServiceUnavailable { .. } => {
                tracing::warn!("Unavailable feature requested: {}", self);
            }
            Error::Unauthenticated { .. } | Error::InsufficientPermissions { .. } => {
                tracing::info!("Authorization error: {}", self);
            }
            Error::BadRequest { .. } | Error::NotFound { .. } => {
                tracing::debug!("Client error: {}", self);
            }
        }

        let status = self.status_code();
        (status, Json(json!({ "error": self.user_message() }))).into_response()
    }
}

/// Type alias for service operation results
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_not_found_uses_app_wording() {
        let err = Error::record_not_found(42);
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(err.user_message(), RECORD_NOT_FOUND_MESSAGE);

        let other = Error::NotFound {
            resource: "User".to_string(),
            id: "7".to_string(),
        };
        assert_eq!(other.user_message(), "User with ID 7 not found");
    }

    #[test]
    fn test_internal_errors_do_not_leak_details() {
        let err = Error::Other(anyhow::anyhow!("connection string postgres://secret"));
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.user_message(), INTERNAL_ERROR_MESSAGE);
    }

    #[test]
    fn test_interval_errors_are_bad_requests() {
        let err: Error = "25:00".parse::<crate::intervals::ClockTime>().unwrap_err().into();
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        assert!(err.user_message().contains("25:00"));
    }

    #[test]
    fn test_analysis_failures_are_bad_gateway() {
        let err = Error::from(AnalysisError::EmptyResponse);
        assert_eq!(err.status_code(), StatusCode::BAD_GATEWAY);
        assert_eq!(err.user_message(), ANALYSIS_FAILED_MESSAGE);
    }

    #[test]
    fn test_prompt_serialization_failure_is_internal() {
        let json_err = serde_json::from_str::<u8>("not a number").unwrap_err();
        let analysis_err = AnalysisError::from(json_err);
        assert!(matches!(analysis_err, AnalysisError::Serialize(_)));
        assert!(analysis_err.to_string().starts_with("failed to serialize sleep records"));

        let err = Error::from(analysis_err);
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_duplicate_email_message() {
        let err = Error::Database(DbError::UniqueViolation {
            constraint: None,
            table: None,
            message: "UNIQUE constraint failed: users.email".to_string(),
        });
        assert_eq!(err.status_code(), StatusCode::CONFLICT);
        assert_eq!(err.user_message(), "An account with this email address already exists");
    }
}
