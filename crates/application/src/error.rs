//! Application error types.

use domain::blog::BlogError;
use domain::catalog::CatalogError;
use domain::identity::IdentityError;
use domain::payments::PaymentError;
use domain::seo::SeoError;
use domain::shopping::ShoppingError;
use domain::{DomainError, ErrorKind as DomainErrorKind};
use store::StoreError;
use thiserror::Error;

/// Errors returned by the application services.
#[derive(Debug, Error)]
pub enum ApplicationError {
    /// A domain rule rejected the operation.
    #[error(transparent)]
    Domain(#[from] DomainError),

    /// The store failed or rejected a write.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The requested entity does not exist or is hidden from the caller.
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// Input was malformed.
    #[error("{0}")]
    Validation(String),

    /// The operation clashes with existing data.
    #[error("{0}")]
    Conflict(String),

    /// No valid credentials were presented.
    #[error("Authentication required")]
    Unauthenticated,

    /// The caller lacks a required role.
    #[error("{0}")]
    Forbidden(String),

    /// Password hashing failed.
    #[error("Password hashing failed: {0}")]
    PasswordHash(String),

    /// An access token could not be issued.
    #[error("Token error: {0}")]
    Token(#[from] jsonwebtoken::errors::Error),

    /// A response could not be serialized.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// How an outer layer should report an [`ApplicationError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    Unauthenticated,
    Forbidden,
    NotFound,
    Conflict,
    IdempotencyMismatch,
    Internal,
}

impl ApplicationError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        ApplicationError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        ApplicationError::Forbidden(message.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            ApplicationError::Domain(e) => match e.kind() {
                DomainErrorKind::Validation => ErrorKind::Validation,
                DomainErrorKind::Unauthenticated => ErrorKind::Unauthenticated,
                DomainErrorKind::Forbidden => ErrorKind::Forbidden,
                DomainErrorKind::Conflict => ErrorKind::Conflict,
                DomainErrorKind::IdempotencyMismatch => ErrorKind::IdempotencyMismatch,
            },
            ApplicationError::Store(e) => match e {
                StoreError::NotFound { .. } => ErrorKind::NotFound,
                StoreError::UniqueViolation { .. }
                | StoreError::ConcurrencyConflict { .. }
                | StoreError::CartLocked { .. } => ErrorKind::Conflict,
                _ => ErrorKind::Internal,
            },
            ApplicationError::NotFound { .. } => ErrorKind::NotFound,
            ApplicationError::Validation(_) => ErrorKind::Validation,
            ApplicationError::Conflict(_) => ErrorKind::Conflict,
            ApplicationError::Unauthenticated => ErrorKind::Unauthenticated,
            ApplicationError::Forbidden(_) => ErrorKind::Forbidden,
            ApplicationError::PasswordHash(_)
            | ApplicationError::Token(_)
            | ApplicationError::Serialization(_) => ErrorKind::Internal,
        }
    }
}

macro_rules! from_domain_error {
    ($($error:ty),+ $(,)?) => {
        $(
            impl From<$error> for ApplicationError {
                fn from(error: $error) -> Self {
                    ApplicationError::Domain(DomainError::from(error))
                }
            }
        )+
    };
}

from_domain_error!(
    IdentityError,
    CatalogError,
    ShoppingError,
    PaymentError,
    BlogError,
    SeoError,
);

/// Convenience type alias for application results.
pub type Result<T> = std::result::Result<T, ApplicationError>;

#[cfg(test)]
mod tests {
    use common::CartId;

    use super::*;

    #[test]
    fn store_errors_map_to_kinds() {
        let unique = ApplicationError::from(StoreError::unique("users_email_key"));
        assert_eq!(unique.kind(), ErrorKind::Conflict);

        let conflict = ApplicationError::from(StoreError::conflict("order", "1", "Processing"));
        assert_eq!(conflict.kind(), ErrorKind::Conflict);

        let locked = ApplicationError::from(StoreError::cart_locked(CartId::new()));
        assert_eq!(locked.kind(), ErrorKind::Conflict);

        let corrupt = ApplicationError::from(StoreError::Corrupt("bad".to_string()));
        assert_eq!(corrupt.kind(), ErrorKind::Internal);
    }

    #[test]
    fn domain_errors_keep_their_kind() {
        let locked = ApplicationError::from(ShoppingError::CartLocked(CartId::new()));
        assert_eq!(locked.kind(), ErrorKind::Conflict);

        let reused = ApplicationError::from(PaymentError::IdempotencyKeyReused);
        assert_eq!(reused.kind(), ErrorKind::IdempotencyMismatch);
    }
}
