/**
 * Routes Module
 * API route handlers
 */
use axum::{http::StatusCode, Json};
use serde::{Deserialize, Serialize};

pub mod auth;
pub mod contact;
pub mod health;
pub mod posts;
pub mod projects;
pub mod upload;
pub mod users;

/// Error body shared by every handler: `{ "message": "..." }`.
/// The HTTP status carries the category (400 validation, 401 unauthenticated,
/// 403 unauthorized, 404 not found, 409 conflict, 500 fallback).
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub message: String,
}

/// Success body for operations that return only a confirmation message.
#[derive(Debug, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

/// Shorthand for the rejection tuple handlers bubble up with `?`-style
/// early returns.
pub type ApiError = (StatusCode, Json<ErrorResponse>);

pub fn api_error(status: StatusCode, message: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            message: message.into(),
        }),
    )
}

/// Postgres surfaces unique-index conflicts (users.email, posts.slug) as
/// database errors; handlers map them to 409 instead of 500.
pub fn is_unique_violation(e: &sqlx::Error) -> bool {
    let msg = e.to_string();
    msg.contains("duplicate key") || msg.contains("unique constraint")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unique_violation_detected_from_error_text() {
        let conflict = sqlx::Error::Protocol(
            "duplicate key value violates unique constraint \"idx_users_email\"".into(),
        );
        assert!(is_unique_violation(&conflict));

        let other = sqlx::Error::Protocol("connection reset by peer".into());
        assert!(!is_unique_violation(&other));
    }
}
