//! Domain error types.

use thiserror::Error;

use crate::blog::BlogError;
use crate::catalog::CatalogError;
use crate::identity::IdentityError;
use crate::payments::PaymentError;
use crate::seo::SeoError;
use crate::shopping::ShoppingError;

/// Broad classification of a domain error, used by outer layers to pick a
/// response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Input failed validation.
    Validation,
    /// Credentials missing or wrong.
    Unauthenticated,
    /// Authenticated but not allowed.
    Forbidden,
    /// The operation does not fit the current state.
    Conflict,
    /// An idempotency key was reused with a different request.
    IdempotencyMismatch,
}

/// Errors that can occur during domain operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error(transparent)]
    Identity(#[from] IdentityError),

    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error(transparent)]
    Shopping(#[from] ShoppingError),

    #[error(transparent)]
    Payment(#[from] PaymentError),

    #[error(transparent)]
    Blog(#[from] BlogError),

    #[error(transparent)]
    Seo(#[from] SeoError),
}

impl DomainError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            DomainError::Identity(e) => match e {
                IdentityError::InvalidCredentials | IdentityError::Deactivated(_) => {
                    ErrorKind::Unauthenticated
                }
                IdentityError::CannotRevokeStudent => ErrorKind::Conflict,
                _ => ErrorKind::Validation,
            },
            DomainError::Catalog(e) => match e {
                CatalogError::NotCourseOwner(_) => ErrorKind::Forbidden,
                CatalogError::InvalidStatusTransition { .. }
                | CatalogError::NoContent
                | CatalogError::CategoryInUse(_)
                | CatalogError::CategoryCycle(_)
                | CatalogError::CourseDeleted(_)
                | CatalogError::CourseNotDeleted(_) => ErrorKind::Conflict,
                _ => ErrorKind::Validation,
            },
            DomainError::Shopping(e) => match e {
                ShoppingError::EmptyCart
                | ShoppingError::TotalOverflow
                | ShoppingError::ItemNotInCart(_) => ErrorKind::Validation,
                _ => ErrorKind::Conflict,
            },
            DomainError::Payment(e) => match e {
                PaymentError::NotAwaitingApproval { .. } => ErrorKind::Conflict,
                PaymentError::IdempotencyKeyReused => ErrorKind::IdempotencyMismatch,
                _ => ErrorKind::Validation,
            },
            DomainError::Blog(e) => match e {
                BlogError::InvalidStatusTransition { .. } | BlogError::PostDeleted(_) => {
                    ErrorKind::Conflict
                }
                _ => ErrorKind::Validation,
            },
            DomainError::Seo(e) => match e {
                SeoError::RedirectLoop(_) | SeoError::TooManyHops(_) => ErrorKind::Conflict,
                _ => ErrorKind::Validation,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use common::CourseId;

    use super::*;

    #[test]
    fn kinds_follow_the_error() {
        assert_eq!(
            DomainError::from(IdentityError::InvalidCredentials).kind(),
            ErrorKind::Unauthenticated
        );
        assert_eq!(
            DomainError::from(CatalogError::NotCourseOwner(CourseId::new())).kind(),
            ErrorKind::Forbidden
        );
        assert_eq!(
            DomainError::from(ShoppingError::EmptyCart).kind(),
            ErrorKind::Validation
        );
        assert_eq!(
            DomainError::from(ShoppingError::AlreadyEnrolled(CourseId::new())).kind(),
            ErrorKind::Conflict
        );
        assert_eq!(
            DomainError::from(PaymentError::IdempotencyKeyReused).kind(),
            ErrorKind::IdempotencyMismatch
        );
    }
}
