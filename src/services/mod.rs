//! Domain services used by HTTP routes.
//!
//! ARCHITECTURE
//! ============
//! Service modules own business logic and persistence so route handlers stay
//! focused on request parsing and response shaping. Team-management services
//! share [`ServiceError`]; the payment parser pipeline never fails and always
//! answers with its own contract.

pub mod matches;
pub mod messages;
pub mod payment_date;
pub mod payment_parser;
pub mod payments;
pub mod players;
pub mod receipt;
pub mod screenshot;
pub mod settings;
pub mod squad;
pub mod users;

use axum::http::StatusCode;
use uuid::Uuid;

use crate::whatsapp::WhatsAppError;

// =============================================================================
// ERRORS
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: Uuid },
    #[error("invalid input: {0}")]
    Invalid(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("{0}")]
    WhatsApp(#[from] WhatsAppError),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl ServiceError {
    #[must_use]
    pub fn not_found(entity: &'static str, id: Uuid) -> Self {
        Self::NotFound { entity, id }
    }

    /// Map a unique-constraint violation to [`ServiceError::Conflict`].
    pub(crate) fn unique_violation(err: sqlx::Error, message: &str) -> Self {
        match &err {
            sqlx::Error::Database(db) if db.is_unique_violation() => Self::Conflict(message.to_string()),
            _ => Self::Database(err),
        }
    }
}

impl crate::error::ErrorCode for ServiceError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "E_NOT_FOUND",
            Self::Invalid(_) => "E_INVALID",
            Self::Conflict(_) => "E_CONFLICT",
            Self::WhatsApp(e) => e.error_code(),
            Self::Database(_) => "E_DATABASE",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            Self::NotFound { .. } => StatusCode::NOT_FOUND,
            Self::Invalid(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::WhatsApp(e) => e.status(),
            Self::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn retryable(&self) -> bool {
        match self {
            Self::WhatsApp(e) => e.retryable(),
            Self::Database(sqlx::Error::PoolTimedOut | sqlx::Error::Io(_)) => true,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;

    #[test]
    fn status_codes_follow_variant() {
        let id = Uuid::nil();
        assert_eq!(ServiceError::not_found("match", id).status(), StatusCode::NOT_FOUND);
        assert_eq!(ServiceError::Invalid("x".into()).status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(ServiceError::Conflict("x".into()).error_code(), "E_CONFLICT");
        assert_eq!(ServiceError::Database(sqlx::Error::RowNotFound).status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn pool_timeout_is_retryable() {
        assert!(ServiceError::Database(sqlx::Error::PoolTimedOut).retryable());
        assert!(!ServiceError::Invalid("x".into()).retryable());
    }

    #[test]
    fn whatsapp_errors_keep_their_code() {
        let err = ServiceError::from(WhatsAppError::NotConfigured);
        assert_eq!(err.error_code(), "E_WHATSAPP_NOT_CONFIGURED");
        assert_eq!(err.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn not_found_message_names_entity() {
        let err = ServiceError::not_found("player", Uuid::nil());
        assert!(err.to_string().starts_with("player not found"));
    }
}
