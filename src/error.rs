//! Crate-wide error taxonomy.
//!
//! One `AppError` enum covers every failure class the acceptance path can
//! surface to an HTTP client (see spec §7). Worker-path failures never use
//! this type — they are absorbed into channel state and the attempts
//! journal instead (see `crate::worker`).

use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use derive_more::{Display, Error};

#[derive(Debug, Display, Error)]
pub enum AppError {
    #[display(fmt = "validation error: {_0}")]
    Validation(#[error(not(source))] String),

    #[display(fmt = "not found: {_0}")]
    NotFound(#[error(not(source))] String),

    #[display(fmt = "conflict: {_0}")]
    Conflict(#[error(not(source))] String),

    #[display(fmt = "unauthorized")]
    Unauthorized,

    #[display(fmt = "internal error: {_0}")]
    Internal(#[error(not(source))] String),
}

impl AppError {
    pub fn internal(err: impl std::fmt::Display) -> Self {
        Self::Internal(err.to_string())
    }
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::Unauthorized => StatusCode::UNAUTHORIZED,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let body = match self {
            AppError::Internal(e) => {
                tracing::error!(error = %e, "internal error");
                serde_json::json!({ "error": "internal server error" })
            }
            other => serde_json::json!({ "error": other.to_string() }),
        };
        HttpResponse::build(self.status_code()).json(body)
    }
}

/// Errors surfaced by the repository layer, kept separate from `AppError`
/// so services decide how a store failure maps onto the HTTP taxonomy.
#[derive(Debug, Display, Error)]
pub enum RepositoryError {
    #[display(fmt = "duplicate key")]
    DuplicateKey,
    #[display(fmt = "not found")]
    NotFound,
    #[display(fmt = "store error: {_0}")]
    Store(#[error(not(source))] String),
}

impl From<mongodb::error::Error> for RepositoryError {
    fn from(err: mongodb::error::Error) -> Self {
        if let Some(code) = err.code() {
            if code == 11000 {
                return RepositoryError::DuplicateKey;
            }
        }
        RepositoryError::Store(err.to_string())
    }
}

impl From<RepositoryError> for AppError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::DuplicateKey => AppError::Conflict("duplicate key".to_string()),
            RepositoryError::NotFound => AppError::NotFound("not found".to_string()),
            RepositoryError::Store(e) => AppError::internal(e),
        }
    }
}
