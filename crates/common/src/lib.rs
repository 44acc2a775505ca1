//! Shared types for the course marketplace.
//!
//! - Strongly typed identifiers for every persisted entity
//! - [`Money`] in integer minor units
//! - [`PageRequest`] / [`Page`] for paginated queries

pub mod ids;
pub mod money;
pub mod page;

pub use ids::{
    AuditLogId, BlogCategoryId, CartId, CartItemId, CategoryId, CourseId, EnrollmentId,
    ManualPaymentRequestId, OrderId, PaymentAttemptId, PostId, RedirectId, ScheduleId, SectionId,
    SessionId, TagId, TransactionId, UserId,
};
pub use money::Money;
pub use page::{Page, PageRequest};
