/// Unified error types for the moderation engine
use crate::moderation::ReportType;
use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Main error type for the moderation engine
#[derive(Error, Debug)]
pub enum ModerationError {
    /// Database errors
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Input failed validation; retry after fixing the input
    #[error("Validation error: {0}")]
    Validation(String),

    /// Reporter owns the reported content or profile
    #[error("You cannot report your own {}", .report_type.noun())]
    SelfReport { report_type: ReportType },

    /// Same reporter, type and target within the duplicate window
    #[error("You already reported this {} at {}", .report_type.noun(), .original_at.to_rfc3339())]
    DuplicateReport {
        report_type: ReportType,
        original_at: DateTime<Utc>,
    },

    /// Target profile belongs to an elevated account
    #[error("This {} cannot be reported", .report_type.noun())]
    AdminProtected { report_type: ReportType },

    /// Reporter hit the rolling report limit
    #[error("Report limit reached, try again in {} minutes", .retry_after.num_minutes().max(1))]
    RateLimitExceeded { retry_after: chrono::Duration },

    /// Request-level throttling from the HTTP limiter
    #[error("Too many requests")]
    TooManyRequests,

    /// Not found errors
    #[error("Not found: {0}")]
    NotFound(String),

    /// Action already carries a reversal
    #[error("Moderation action {0} has already been reversed")]
    AlreadyReversed(i64),

    /// Report already carries a moderator decision
    #[error("Report {0} has already been finalized")]
    ReportFinalized(i64),

    /// Conflict errors
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Authentication errors
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// Authorization errors
    #[error("Not authorized: {0}")]
    Authorization(String),

    /// Internal server errors
    #[error("Internal error: {0}")]
    Internal(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ModerationError {
    /// Whether the same request may succeed later without changing its input
    pub fn retryable(&self) -> bool {
        matches!(
            self,
            ModerationError::DuplicateReport { .. }
                | ModerationError::RateLimitExceeded { .. }
                | ModerationError::TooManyRequests
                | ModerationError::Database(_)
        )
    }

    /// Stable machine-readable code for API clients
    pub fn code(&self) -> &'static str {
        match self {
            ModerationError::Database(_) | ModerationError::Internal(_) | ModerationError::Io(_) => {
                "InternalServerError"
            }
            ModerationError::Validation(_) => "InvalidRequest",
            ModerationError::SelfReport { .. } => "SelfReport",
            ModerationError::DuplicateReport { .. } => "DuplicateReport",
            ModerationError::AdminProtected { .. } => "AdminProtected",
            ModerationError::RateLimitExceeded { .. } | ModerationError::TooManyRequests => {
                "RateLimitExceeded"
            }
            ModerationError::NotFound(_) => "NotFound",
            ModerationError::AlreadyReversed(_) => "AlreadyReversed",
            ModerationError::ReportFinalized(_) => "ReportFinalized",
            ModerationError::Conflict(_) => "Conflict",
            ModerationError::Authentication(_) => "AuthenticationRequired",
            ModerationError::Authorization(_) => "Forbidden",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            ModerationError::Validation(_) => StatusCode::BAD_REQUEST,
            ModerationError::SelfReport { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            ModerationError::DuplicateReport { .. }
            | ModerationError::AlreadyReversed(_)
            | ModerationError::ReportFinalized(_)
            | ModerationError::Conflict(_) => StatusCode::CONFLICT,
            ModerationError::AdminProtected { .. } | ModerationError::Authorization(_) => {
                StatusCode::FORBIDDEN
            }
            ModerationError::RateLimitExceeded { .. } | ModerationError::TooManyRequests => {
                StatusCode::TOO_MANY_REQUESTS
            }
            ModerationError::NotFound(_) => StatusCode::NOT_FOUND,
            ModerationError::Authentication(_) => StatusCode::UNAUTHORIZED,
            ModerationError::Database(_) | ModerationError::Internal(_) | ModerationError::Io(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl From<validator::ValidationErrors> for ModerationError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let mut messages: Vec<String> = errors
            .field_errors()
            .into_iter()
            .flat_map(|(field, errs)| {
                errs.iter().map(move |e| match &e.message {
                    Some(message) => message.to_string(),
                    None => format!("{} is invalid", field),
                })
            })
            .collect();
        messages.sort();
        ModerationError::Validation(messages.join("; "))
    }
}

/// JSON error body
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
    pub retryable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after_secs: Option<i64>,
}

impl IntoResponse for ModerationError {
    fn into_response(self) -> Response {
        let status = self.status();

        let message = match &self {
            ModerationError::Database(e) => {
                tracing::error!("Database error while serving request: {}", e);
                "Internal server error".to_string() // Don't leak details
            }
            ModerationError::Internal(_) | ModerationError::Io(_) => {
                tracing::error!("{}", self);
                "Internal server error".to_string()
            }
            _ => self.to_string(),
        };

        let original_at = match &self {
            ModerationError::DuplicateReport { original_at, .. } => Some(*original_at),
            _ => None,
        };
        let retry_after_secs = match &self {
            ModerationError::RateLimitExceeded { retry_after } => Some(retry_after.num_seconds().max(1)),
            ModerationError::TooManyRequests => Some(1),
            _ => None,
        };

        let body = Json(ErrorResponse {
            error: self.code().to_string(),
            message,
            retryable: self.retryable(),
            original_at,
            retry_after_secs,
        });

        let mut response = (status, body).into_response();
        if let Some(secs) = retry_after_secs {
            if let Ok(value) = HeaderValue::from_str(&secs.to_string()) {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
        }
        response
    }
}

/// Result type alias for moderation operations
pub type ModResult<T> = Result<T, ModerationError>;
