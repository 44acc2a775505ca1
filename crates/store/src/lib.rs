//! Persistence for the course marketplace.
//!
//! Repository traits are implemented by [`InMemoryStore`] for tests and
//! local runs and by [`PostgresStore`] for production.

pub mod changes;
pub mod error;
pub mod memory;
pub mod postgres;
pub mod query;
pub mod repository;

pub use changes::{Guarded, OrderChange, OrderPlacement};
pub use error::{Result, StoreError, constraints};
pub use memory::InMemoryStore;
pub use postgres::PostgresStore;
pub use query::{CourseQuery, PostQuery};
pub use repository::{
    BlogRepository, CatalogRepository, IdempotencyRepository, PaymentRepository,
    RedirectRepository, ShoppingRepository, Store, UserRepository,
};
