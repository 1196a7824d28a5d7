use service_core::error::AppError;
use thiserror::Error;

use super::authorizer::AuthzError;
use super::jwt::TokenError;
use crate::federation::StoreName;
use crate::repositories::RepositoryError;

/// Errors raised by the portal services.
///
/// Display strings are what clients see, so they never carry identifiers,
/// emails or token material.
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Account is temporarily locked")]
    AccountLocked,

    #[error("Account is inactive")]
    AccountInactive,

    #[error("Invalid token")]
    InvalidToken,

    #[error("Token expired")]
    TokenExpired,

    #[error("Invalid or expired reset token")]
    InvalidResetToken,

    #[error("Invalid or expired verification token")]
    InvalidVerificationToken,

    #[error("Email already registered")]
    EmailAlreadyRegistered,

    #[error("{0}")]
    Forbidden(String),

    #[error(transparent)]
    Authorization(#[from] AuthzError),

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("{0}")]
    Validation(String),

    #[error("{0} store unavailable")]
    StoreUnavailable(StoreName),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl From<RepositoryError> for ServiceError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::Duplicate => ServiceError::Database("unexpected duplicate key".into()),
            RepositoryError::Encode(e) => ServiceError::Internal(anyhow::anyhow!(e)),
            RepositoryError::Store(e) if e.is_configuration() => {
                ServiceError::Configuration(e.to_string())
            }
            RepositoryError::Store(crate::federation::FederationError::Timeout(store)) => {
                ServiceError::StoreUnavailable(store)
            }
            RepositoryError::Store(e) => {
                tracing::error!(store = %e.store(), error = %e, "Store operation failed");
                ServiceError::StoreUnavailable(e.store())
            }
        }
    }
}

impl From<TokenError> for ServiceError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::Expired => ServiceError::TokenExpired,
            TokenError::Invalid | TokenError::WrongKind => ServiceError::InvalidToken,
        }
    }
}

impl From<ServiceError> for AppError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::InvalidCredentials
            | ServiceError::InvalidToken
            | ServiceError::TokenExpired => AppError::AuthError(anyhow::anyhow!(err.to_string())),
            ServiceError::AccountLocked
            | ServiceError::AccountInactive
            | ServiceError::Forbidden(_)
            | ServiceError::Authorization(_) => AppError::Forbidden(anyhow::anyhow!(err.to_string())),
            ServiceError::InvalidResetToken
            | ServiceError::InvalidVerificationToken
            | ServiceError::Validation(_) => AppError::BadRequest(anyhow::anyhow!(err.to_string())),
            ServiceError::EmailAlreadyRegistered => {
                AppError::Conflict(anyhow::anyhow!(err.to_string()))
            }
            ServiceError::NotFound(_) => AppError::NotFound(anyhow::anyhow!(err.to_string())),
            ServiceError::StoreUnavailable(store) => {
                AppError::UpstreamUnavailable(store.to_string())
            }
            ServiceError::Configuration(e) => AppError::ConfigError(anyhow::anyhow!(e)),
            ServiceError::Database(e) => AppError::DatabaseError(anyhow::anyhow!(e)),
            ServiceError::Internal(e) => AppError::InternalError(e),
        }
    }
}
