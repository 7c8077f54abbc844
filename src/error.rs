/// Unified error types for the rental pool
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Main error type for the rental engine and its API surface
#[derive(Error, Debug)]
pub enum RentalError {
    /// Database errors
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Migration errors
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// Input validation errors
    #[error("Validation error: {0}")]
    Validation(String),

    /// Unknown login, rental, binding or template
    #[error("Not found: {0}")]
    NotFound(String),

    /// An account with this login is already pooled
    #[error("Account {0} already exists")]
    DuplicateLogin(String),

    /// Removal refused while the account is rented
    #[error("Account {0} is rented and cannot be removed")]
    StillRented(String),

    /// Password reset or disable refused while the account is rented
    #[error("Account {0} is currently rented")]
    CurrentlyRented(String),

    /// A specific account was requested but is not available
    #[error("Account {0} is not available")]
    AccountUnavailable(String),

    /// Matching found no available account
    #[error("No available account of type {0}")]
    NoAccountAvailable(String),

    /// The rental was already returned or reclaimed
    #[error("Rental {0} is already closed")]
    AlreadyClosed(String),

    /// A rental points at an account that no longer exists
    #[error("Rental {rental_id} references missing account {login}")]
    OrphanedRental { rental_id: String, login: String },

    /// Other conflicts (already running, not rented, ...)
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Missing or wrong administrator credentials
    #[error("Not authorized: {0}")]
    Unauthorized(String),

    /// Rate limiting errors
    #[error("Rate limit exceeded")]
    RateLimitExceeded { retry_after: std::time::Duration },

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl RentalError {
    /// Short machine-readable code used in API responses and metrics labels
    pub fn code(&self) -> &'static str {
        match self {
            RentalError::Database(_) | RentalError::Migration(_) => "DatabaseError",
            RentalError::Validation(_) => "InvalidRequest",
            RentalError::NotFound(_) => "NotFound",
            RentalError::DuplicateLogin(_) => "DuplicateLogin",
            RentalError::StillRented(_) => "StillRented",
            RentalError::CurrentlyRented(_) => "CurrentlyRented",
            RentalError::AccountUnavailable(_) => "AccountUnavailable",
            RentalError::NoAccountAvailable(_) => "NoAccountAvailable",
            RentalError::AlreadyClosed(_) => "AlreadyClosed",
            RentalError::OrphanedRental { .. } => "OrphanedRental",
            RentalError::Conflict(_) => "Conflict",
            RentalError::Unauthorized(_) => "Unauthorized",
            RentalError::RateLimitExceeded { .. } => "RateLimitExceeded",
            RentalError::Io(_) => "IoError",
            RentalError::Internal(_) => "InternalServerError",
        }
    }
}

/// API error response format
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

/// Convert RentalError to HTTP response
impl IntoResponse for RentalError {
    fn into_response(self) -> Response {
        let status = match &self {
            RentalError::Validation(_) => StatusCode::BAD_REQUEST,
            RentalError::NotFound(_) => StatusCode::NOT_FOUND,
            RentalError::DuplicateLogin(_)
            | RentalError::StillRented(_)
            | RentalError::CurrentlyRented(_)
            | RentalError::AccountUnavailable(_)
            | RentalError::NoAccountAvailable(_)
            | RentalError::AlreadyClosed(_)
            | RentalError::OrphanedRental { .. }
            | RentalError::Conflict(_) => StatusCode::CONFLICT,
            RentalError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            RentalError::RateLimitExceeded { .. } => StatusCode::TOO_MANY_REQUESTS,
            RentalError::Database(_)
            | RentalError::Migration(_)
            | RentalError::Io(_)
            | RentalError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let message = match &self {
            RentalError::Database(_) | RentalError::Migration(_) | RentalError::Io(_) => {
                tracing::error!("Internal failure while serving request: {}", self);
                "Internal server error".to_string() // Don't leak details
            }
            _ => self.to_string(),
        };

        let body = Json(ErrorResponse {
            error: self.code().to_string(),
            message,
        });

        (status, body).into_response()
    }
}

/// Result type alias for rental operations
pub type RentalResult<T> = Result<T, RentalError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reason_is_relayed_verbatim() {
        let err = RentalError::NoAccountAvailable("csgo".to_string());
        assert_eq!(err.to_string(), "No available account of type csgo");
        assert_eq!(err.code(), "NoAccountAvailable");
    }

    #[test]
    fn test_status_mapping() {
        let resp = RentalError::AlreadyClosed("r1".to_string()).into_response();
        assert_eq!(resp.status(), StatusCode::CONFLICT);

        let resp = RentalError::NotFound("Rental r1".to_string()).into_response();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);

        let resp = RentalError::Validation("bad".to_string()).into_response();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let resp = RentalError::Internal("boom".to_string()).into_response();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
