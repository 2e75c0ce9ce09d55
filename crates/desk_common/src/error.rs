//! Error taxonomy for the helpdesk service.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DeskError {
    #[error("{message}")]
    Validation { field: String, message: String },

    #[error("missing or invalid credentials")]
    Unauthorized,

    #[error("{0}")]
    Forbidden(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("ticket has been modified by another request")]
    VersionConflict,

    #[error("assignee must be an agent or admin")]
    InvalidAssignee,

    #[error("a request with this idempotency key is already in flight")]
    DuplicateRequest,

    #[error("storage operation timed out")]
    Timeout,

    #[error("storage unavailable: {0}")]
    StoreUnavailable(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl DeskError {
    /// Stable machine-readable code carried in error bodies
    pub fn code(&self) -> &'static str {
        match self {
            DeskError::Validation { .. } => "FIELD_VALIDATION",
            DeskError::Unauthorized => "UNAUTHORIZED",
            DeskError::Forbidden(_) => "FORBIDDEN",
            DeskError::NotFound(_) => "NOT_FOUND",
            DeskError::VersionConflict => "CONFLICT",
            DeskError::InvalidAssignee => "INVALID_ASSIGNEE",
            DeskError::DuplicateRequest => "CONFLICT",
            DeskError::Timeout => "TIMEOUT",
            DeskError::StoreUnavailable(_) => "STORE_UNAVAILABLE",
            DeskError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Field name for validation errors, if any
    pub fn field(&self) -> Option<&str> {
        match self {
            DeskError::Validation { field, .. } => Some(field),
            _ => None,
        }
    }

    /// Whether the caller may retry the same request unchanged.
    /// Version conflicts need a reload first; validation and permission
    /// errors are never retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(self, DeskError::Timeout | DeskError::StoreUnavailable(_))
    }

    pub fn forbidden() -> Self {
        DeskError::Forbidden("access denied".to_string())
    }
}

impl From<rusqlite::Error> for DeskError {
    fn from(err: rusqlite::Error) -> Self {
        use rusqlite::ffi::ErrorCode;
        match &err {
            rusqlite::Error::SqliteFailure(e, _)
                if matches!(e.code, ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked) =>
            {
                DeskError::Timeout
            }
            _ => DeskError::StoreUnavailable(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        let validation = DeskError::Validation {
            field: "title".into(),
            message: "title must not be empty".into(),
        };
        assert_eq!(validation.code(), "FIELD_VALIDATION");
        assert_eq!(validation.field(), Some("title"));

        assert_eq!(DeskError::VersionConflict.code(), "CONFLICT");
        assert_eq!(DeskError::DuplicateRequest.code(), "CONFLICT");
        assert_eq!(DeskError::InvalidAssignee.code(), "INVALID_ASSIGNEE");
        assert_eq!(DeskError::forbidden().code(), "FORBIDDEN");
        assert!(DeskError::forbidden().field().is_none());
    }

    #[test]
    fn test_retryability() {
        assert!(DeskError::Timeout.is_retryable());
        assert!(DeskError::StoreUnavailable("down".into()).is_retryable());
        assert!(!DeskError::VersionConflict.is_retryable());
        assert!(!DeskError::forbidden().is_retryable());
        assert!(!DeskError::Unauthorized.is_retryable());
    }
}
