//! Request/response boundary.
//!
//! An external handler (desktop shell, `clinicd`, FFI caller) hands a
//! [`Request`] to [`Handler::handle`] and gets back a [`Response`] carrying an
//! HTTP-style status and a JSON [`Envelope`]. Requests are parsed into a
//! [`Command`] and fully validated before any storage access.

mod handler;
mod request;
mod response;

pub use handler::*;
pub use request::*;
pub use response::*;

use thiserror::Error;

use crate::db::{DbError, ErrorKind};

/// Opaque message returned to callers for internal failures.
pub const INTERNAL_ERROR_MESSAGE: &str = "An unexpected error occurred";

/// Errors surfaced at the request boundary.
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Method {0} is not supported")]
    MethodNotAllowed(String),

    #[error("Unknown resource: {0}")]
    UnknownResource(String),

    #[error("{0}")]
    Invalid(String),

    #[error(transparent)]
    Db(#[from] DbError),
}

pub type ApiResult<T> = Result<T, ApiError>;

impl ApiError {
    pub fn status(&self) -> u16 {
        match self {
            ApiError::MethodNotAllowed(_) => 405,
            ApiError::UnknownResource(_) => 404,
            ApiError::Invalid(_) => 400,
            ApiError::Db(e) => e.kind().status(),
        }
    }

    /// Machine-readable error code for the envelope's `error` field.
    pub fn code(&self) -> &'static str {
        match self {
            ApiError::MethodNotAllowed(_) => "method_not_allowed",
            ApiError::UnknownResource(_) => "not_found",
            ApiError::Invalid(_) => "validation_error",
            ApiError::Db(e) => match e.kind() {
                ErrorKind::Validation => "validation_error",
                ErrorKind::NotFound => "not_found",
                ErrorKind::UsageConflict => "usage_conflict",
                ErrorKind::InsufficientStock => "insufficient_stock",
                ErrorKind::Internal => "internal_error",
            },
        }
    }

    pub fn is_internal(&self) -> bool {
        matches!(self, ApiError::Db(e) if e.kind() == ErrorKind::Internal)
    }

    /// Message safe to return to the caller.
    pub fn public_message(&self) -> String {
        if self.is_internal() {
            INTERNAL_ERROR_MESSAGE.to_string()
        } else {
            self.to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(ApiError::MethodNotAllowed("PATCH".into()).status(), 405);
        assert_eq!(ApiError::UnknownResource("pets".into()).status(), 404);
        assert_eq!(ApiError::Invalid("name is required".into()).status(), 400);
        assert_eq!(ApiError::Db(DbError::NotFound("visit #1".into())).status(), 404);
        assert_eq!(
            ApiError::Db(DbError::UsageConflict {
                entity: "category",
                id: 5,
                count: 1
            })
            .status(),
            400
        );
        assert_eq!(
            ApiError::Db(DbError::InsufficientStock {
                item: "Gauze".into(),
                available: 1,
                requested: 2
            })
            .status(),
            400
        );
        assert_eq!(ApiError::Db(DbError::Constraint("x".into())).status(), 500);
    }

    #[test]
    fn test_internal_message_is_opaque() {
        let err = ApiError::Db(DbError::Constraint("disk I/O error at page 7".into()));
        assert!(err.is_internal());
        assert_eq!(err.code(), "internal_error");
        assert_eq!(err.public_message(), INTERNAL_ERROR_MESSAGE);

        let err = ApiError::Invalid("name is required".into());
        assert_eq!(err.public_message(), "name is required");
    }
}
