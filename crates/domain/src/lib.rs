//! Domain layer of the course marketplace.
//!
//! This crate holds the entities and their rules, free of I/O:
//! - Identity: users, roles, password policy
//! - Catalog: categories, courses, curriculum, schedules, enrollments
//! - Shopping: carts, orders and payment attempts with their state machines
//! - Payments: manual payment requests, transactions, audit log, idempotency
//! - Blog: posts, categories, tags and slug history
//! - SEO: metadata resolution and slug redirects
//!
//! Operations take the current time as an argument so that callers control
//! the clock.

pub mod blog;
pub mod catalog;
pub mod error;
pub mod identity;
pub mod payments;
pub mod seo;
pub mod shopping;
pub mod slug;

pub use error::{DomainError, ErrorKind};
pub use slug::{Slug, slugify};
