//! Application layer of the course marketplace.
//!
//! Services turn authenticated commands into domain operations and store
//! writes:
//! 1. Identity: registration, login, roles
//! 2. Catalog: categories, courses, curricula, enrollments
//! 3. Shopping: cart and checkout
//! 4. Payments: receipts, admin review, expiry
//! 5. Blog and SEO
//!
//! [`Services`] wires all of them to one store.

pub mod auth;
pub mod error;
pub mod idempotency;
pub mod services;
pub mod settings;
pub mod sweeper;

pub use auth::{AccessToken, Actor, Claims, PasswordHasher, TokenService};
pub use error::{ApplicationError, ErrorKind, Result};
pub use idempotency::{IdempotencyGuard, Replayable};
pub use services::{
    BlogService, CartService, CatalogService, CheckoutService, IdentityService, Lookup,
    PaymentService, RedirectTarget, SeoService,
};
pub use settings::{BankDetails, Settings};
pub use sweeper::{SweepReport, Sweeper};

use std::time::Duration;

use store::Store;

/// Every service, sharing one store.
#[derive(Clone)]
pub struct Services<S> {
    pub identity: IdentityService<S>,
    pub catalog: CatalogService<S>,
    pub cart: CartService<S>,
    pub checkout: CheckoutService<S>,
    pub payments: PaymentService<S>,
    pub blog: BlogService<S>,
    pub seo: SeoService<S>,
    store: S,
}

impl<S: Store> Services<S> {
    pub fn new(store: S, settings: Settings, hasher: PasswordHasher, tokens: TokenService) -> Self {
        Self {
            identity: IdentityService::new(store.clone(), hasher, tokens),
            catalog: CatalogService::new(store.clone()),
            cart: CartService::new(store.clone()),
            checkout: CheckoutService::new(store.clone(), settings.clone()),
            payments: PaymentService::new(store.clone(), settings.clone()),
            blog: BlogService::new(store.clone()),
            seo: SeoService::new(store.clone(), settings.site),
            store,
        }
    }

    /// A sweeper over the same store, running every `interval`.
    pub fn sweeper(&self, interval: Duration) -> Sweeper<S> {
        Sweeper::new(self.store.clone(), self.payments.clone(), interval)
    }
}
