//! Repository traits implemented by every back end.
//!
//! All implementations must be thread-safe (Send + Sync). Unique indexes
//! surface as [`StoreError::UniqueViolation`](crate::StoreError) carrying the
//! index name from [`constraints`](crate::constraints).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{
    CartId, CategoryId, CourseId, ManualPaymentRequestId, OrderId, Page, PageRequest,
    PaymentAttemptId, PostId, ScheduleId, SectionId, SessionId, UserId,
};
use domain::blog::{BlogCategory, Post, PostSlugHistory, Tag};
use domain::catalog::{Category, Course, CourseEnrollment, CourseSchedule, Curriculum};
use domain::identity::{Email, User};
use domain::payments::{
    IdempotencyKey, IdempotencyRecord, IdempotentOperation, ManualPaymentRequest,
    PaymentAuditEntry, Transaction,
};
use domain::seo::SlugRedirect;
use domain::shopping::{Cart, CartItem, Order, PaymentAttempt};
use domain::slug::Slug;

use crate::{CourseQuery, OrderChange, OrderPlacement, PostQuery, Result};

#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn insert_user(&self, user: &User) -> Result<()>;

    async fn update_user(&self, user: &User) -> Result<()>;

    async fn find_user(&self, id: UserId) -> Result<Option<User>>;

    async fn find_user_by_email(&self, email: &Email) -> Result<Option<User>>;
}

#[async_trait]
pub trait CatalogRepository: Send + Sync {
    async fn insert_category(&self, category: &Category) -> Result<()>;

    async fn update_category(&self, category: &Category) -> Result<()>;

    /// Finds a category whether or not it is deleted.
    async fn find_category(&self, id: CategoryId) -> Result<Option<Category>>;

    async fn find_category_by_slug(&self, slug: &str) -> Result<Option<Category>>;

    /// All non-deleted categories.
    async fn list_categories(&self) -> Result<Vec<Category>>;

    /// True while the category has non-deleted children or courses.
    async fn category_in_use(&self, id: CategoryId) -> Result<bool>;

    async fn insert_course(&self, course: &Course) -> Result<()>;

    async fn update_course(&self, course: &Course) -> Result<()>;

    /// Finds a course whether or not it is deleted.
    async fn find_course(&self, id: CourseId) -> Result<Option<Course>>;

    /// Finds a non-deleted course by its current slug.
    async fn find_course_by_slug(&self, slug: &str) -> Result<Option<Course>>;

    async fn find_courses(&self, ids: &[CourseId]) -> Result<Vec<Course>>;

    async fn list_courses(&self, query: &CourseQuery, page: PageRequest) -> Result<Page<Course>>;

    async fn load_curriculum(&self, course_id: CourseId) -> Result<Curriculum>;

    /// Replaces the stored curriculum of `curriculum.course_id`.
    async fn save_curriculum(&self, curriculum: &Curriculum) -> Result<()>;

    async fn course_of_section(&self, id: SectionId) -> Result<Option<CourseId>>;

    async fn course_of_session(&self, id: SessionId) -> Result<Option<CourseId>>;

    async fn insert_schedule(&self, schedule: &CourseSchedule) -> Result<()>;

    async fn find_schedule(&self, id: ScheduleId) -> Result<Option<CourseSchedule>>;

    async fn delete_schedule(&self, id: ScheduleId) -> Result<()>;

    /// Schedules of a course ordered by start date.
    async fn list_schedules(&self, course_id: CourseId) -> Result<Vec<CourseSchedule>>;

    async fn insert_enrollment(&self, enrollment: &CourseEnrollment) -> Result<()>;

    async fn find_enrollment(
        &self,
        course_id: CourseId,
        student_id: UserId,
    ) -> Result<Option<CourseEnrollment>>;

    /// Enrollments of a student, newest first.
    async fn list_enrollments(&self, student_id: UserId) -> Result<Vec<CourseEnrollment>>;
}

#[async_trait]
pub trait ShoppingRepository: Send + Sync {
    async fn find_active_cart(&self, user_id: UserId) -> Result<Option<Cart>>;

    async fn find_cart(&self, id: CartId) -> Result<Option<Cart>>;

    async fn insert_cart(&self, cart: &Cart) -> Result<()>;

    /// Cart writes fail with [`StoreError::CartLocked`](crate::StoreError::CartLocked)
    /// while an active order exists for the cart. The check and the write are
    /// one atomic step.
    async fn insert_cart_item(&self, item: &CartItem) -> Result<()>;

    /// Returns false when the course was not in the cart.
    async fn delete_cart_item(&self, cart_id: CartId, course_id: CourseId) -> Result<bool>;

    async fn clear_cart(&self, cart_id: CartId) -> Result<()>;

    /// Inserts an order with its attempt, audit rows and enrollments.
    async fn place_order(&self, placement: OrderPlacement) -> Result<()>;

    /// Applies a guarded change to an order and its payment rows.
    async fn apply_order_change(&self, change: OrderChange) -> Result<()>;

    async fn find_order(&self, id: OrderId) -> Result<Option<Order>>;

    /// The `PendingPayment` or `Processing` order of a user's cart.
    async fn find_active_order(&self, user_id: UserId, cart_id: CartId) -> Result<Option<Order>>;

    /// Orders of a user, newest first.
    async fn list_orders(&self, user_id: UserId, page: PageRequest) -> Result<Page<Order>>;

    async fn find_attempt(&self, id: PaymentAttemptId) -> Result<Option<PaymentAttempt>>;

    /// The non-terminal attempt of an order.
    async fn find_open_attempt(&self, order_id: OrderId) -> Result<Option<PaymentAttempt>>;

    /// Attempts still `PendingPayment` whose window closed at or before `now`.
    async fn list_expired_attempts(&self, now: DateTime<Utc>) -> Result<Vec<PaymentAttempt>>;
}

#[async_trait]
pub trait PaymentRepository: Send + Sync {
    async fn find_request(&self, id: ManualPaymentRequestId)
    -> Result<Option<ManualPaymentRequest>>;

    /// Requests awaiting review, oldest first.
    async fn list_pending_requests(&self, page: PageRequest)
    -> Result<Page<ManualPaymentRequest>>;

    async fn list_requests_for_order(&self, order_id: OrderId)
    -> Result<Vec<ManualPaymentRequest>>;

    /// Transactions, newest first.
    async fn list_transactions(&self, page: PageRequest) -> Result<Page<Transaction>>;

    /// Audit entries of an order in the order they were written.
    async fn audit_trail(&self, order_id: OrderId) -> Result<Vec<PaymentAuditEntry>>;
}

#[async_trait]
pub trait IdempotencyRepository: Send + Sync {
    async fn find_idempotency_record(
        &self,
        key: &IdempotencyKey,
        user_id: UserId,
        operation: IdempotentOperation,
    ) -> Result<Option<IdempotencyRecord>>;

    /// Inserts the record unless a live one exists for the same key, user and
    /// operation; an expired one is replaced. Returns the live record that
    /// won, or `None` when `record` was stored.
    async fn save_idempotency_record(
        &self,
        record: &IdempotencyRecord,
        now: DateTime<Utc>,
    ) -> Result<Option<IdempotencyRecord>>;

    /// Deletes records expired at `now`. Returns how many were removed.
    async fn purge_expired_idempotency_records(&self, now: DateTime<Utc>) -> Result<u64>;
}

#[async_trait]
pub trait BlogRepository: Send + Sync {
    async fn insert_blog_category(&self, category: &BlogCategory) -> Result<()>;

    async fn find_blog_category_by_slug(&self, slug: &str) -> Result<Option<BlogCategory>>;

    async fn list_blog_categories(&self) -> Result<Vec<BlogCategory>>;

    /// Returns the tags for the given `(slug, name)` pairs, creating missing
    /// ones.
    async fn find_or_create_tags(&self, tags: &[(Slug, String)]) -> Result<Vec<Tag>>;

    async fn find_tag_by_slug(&self, slug: &str) -> Result<Option<Tag>>;

    async fn list_tags(&self) -> Result<Vec<Tag>>;

    async fn insert_post(&self, post: &Post) -> Result<()>;

    /// Updates a post. A history row whose old slug equals the post's new
    /// slug is removed, and `history` (if any) is recorded.
    async fn update_post(&self, post: &Post, history: Option<&PostSlugHistory>) -> Result<()>;

    async fn find_post(&self, id: PostId) -> Result<Option<Post>>;

    /// Finds a non-deleted post by its current slug.
    async fn find_post_by_slug(&self, slug: &str) -> Result<Option<Post>>;

    /// Finds the non-deleted post that used to have `slug`.
    async fn find_post_by_old_slug(&self, slug: &str) -> Result<Option<Post>>;

    async fn list_posts(&self, query: &PostQuery, page: PageRequest) -> Result<Page<Post>>;
}

#[async_trait]
pub trait RedirectRepository: Send + Sync {
    async fn find_redirect(&self, from_path: &str) -> Result<Option<SlugRedirect>>;

    /// Stores a redirect. Redirects pointing at its source are re-pointed at
    /// its target, the reverse redirect is deleted, and an existing redirect
    /// from the same path is replaced.
    async fn save_redirect(&self, redirect: &SlugRedirect) -> Result<()>;

    async fn list_redirects(&self) -> Result<Vec<SlugRedirect>>;
}

/// Everything the application layer needs from a back end.
pub trait Store:
    UserRepository
    + CatalogRepository
    + ShoppingRepository
    + PaymentRepository
    + IdempotencyRepository
    + BlogRepository
    + RedirectRepository
    + Clone
    + 'static
{
}

impl<T> Store for T where
    T: UserRepository
        + CatalogRepository
        + ShoppingRepository
        + PaymentRepository
        + IdempotencyRepository
        + BlogRepository
        + RedirectRepository
        + Clone
        + 'static
{
}
