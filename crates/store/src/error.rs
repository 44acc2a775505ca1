use thiserror::Error;

/// Errors that can occur when interacting with the store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A row that was expected to exist is missing.
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// A unique index rejected the write. `constraint` is the index name.
    #[error("Unique constraint violated: {constraint}")]
    UniqueViolation { constraint: String },

    /// A guarded update found the row in a different state than expected.
    #[error("Concurrency conflict on {entity} {id}: expected {expected}")]
    ConcurrencyConflict {
        entity: &'static str,
        id: String,
        expected: String,
    },

    /// The cart has an order awaiting payment and cannot change.
    #[error("Cart {cart_id} is locked by an active order")]
    CartLocked { cart_id: String },

    /// A stored value could not be decoded into its domain type.
    #[error("Corrupt row: {0}")]
    Corrupt(String),

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A serialization/deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StoreError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        StoreError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub fn unique(constraint: &str) -> Self {
        StoreError::UniqueViolation {
            constraint: constraint.to_string(),
        }
    }

    pub fn conflict(entity: &'static str, id: impl ToString, expected: impl ToString) -> Self {
        StoreError::ConcurrencyConflict {
            entity,
            id: id.to_string(),
            expected: expected.to_string(),
        }
    }

    pub fn cart_locked(cart_id: impl ToString) -> Self {
        StoreError::CartLocked {
            cart_id: cart_id.to_string(),
        }
    }

    /// True when this is a violation of the named unique index.
    pub fn is_unique_violation(&self, name: &str) -> bool {
        matches!(self, StoreError::UniqueViolation { constraint } if constraint == name)
    }
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Names of the unique indexes and constraints in the schema.
pub mod constraints {
    pub const USERS_EMAIL: &str = "users_email_key";
    pub const CATEGORIES_SLUG_ACTIVE: &str = "categories_slug_active_key";
    pub const COURSES_SLUG_ACTIVE: &str = "courses_slug_active_key";
    pub const COURSE_ENROLLMENTS_COURSE_STUDENT: &str = "course_enrollments_course_student_key";
    pub const CARTS_USER_ACTIVE: &str = "carts_user_active_key";
    pub const CART_ITEMS_CART_COURSE: &str = "cart_items_cart_course_key";
    pub const ORDERS_USER_CART_ACTIVE: &str = "orders_user_cart_active_key";
    pub const ORDERS_ORDER_NUMBER: &str = "orders_order_number_key";
    pub const PAYMENT_ATTEMPTS_TRACKING_CODE: &str = "payment_attempts_tracking_code_key";
    pub const PAYMENT_ATTEMPTS_ORDER_OPEN: &str = "payment_attempts_order_open_key";
    pub const TRANSACTIONS_PAYMENT_ATTEMPT: &str = "transactions_payment_attempt_key";
    pub const IDEMPOTENCY_RECORDS: &str = "idempotency_records_key";
    pub const BLOG_CATEGORIES_SLUG_ACTIVE: &str = "blog_categories_slug_active_key";
    pub const TAGS_SLUG: &str = "tags_slug_key";
    pub const POSTS_SLUG_ACTIVE: &str = "posts_slug_active_key";
    pub const POST_SLUG_HISTORY_OLD_SLUG: &str = "post_slug_history_old_slug_key";
    pub const SLUG_REDIRECTS_FROM_PATH: &str = "slug_redirects_from_path_key";
}
