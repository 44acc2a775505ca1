//! Carts, orders and payment attempts.

mod attempt;
mod cart;
mod order;

pub use attempt::{PaymentAttempt, PaymentStatus, StatusChange, generate_tracking_code};
pub use cart::{Cart, CartItem, CartStatus, order_item_for};
pub use order::{Order, OrderItem, OrderStatus, generate_order_number};

use common::{CartId, CourseId, OrderId, PaymentAttemptId};
use thiserror::Error;

/// Errors that can occur during shopping operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ShoppingError {
    #[error("Cart is empty")]
    EmptyCart,

    #[error("Cart {0} is no longer active")]
    CartNotActive(CartId),

    #[error("Cart {0} is locked by an order awaiting payment")]
    CartLocked(CartId),

    #[error("Course {0} is not available for purchase")]
    CourseUnavailable(CourseId),

    #[error("Already enrolled in course {0}")]
    AlreadyEnrolled(CourseId),

    #[error("Course {0} is not in the cart")]
    ItemNotInCart(CourseId),

    #[error("Order total overflows")]
    TotalOverflow,

    #[error("Invalid state transition: cannot {action} an order in {current} state")]
    InvalidOrderTransition {
        current: OrderStatus,
        action: &'static str,
    },

    #[error("Invalid payment transition from {from} to {to}")]
    InvalidPaymentTransition {
        from: PaymentStatus,
        to: PaymentStatus,
    },

    #[error("Order {0} has no open payment attempt")]
    NoOpenAttempt(OrderId),

    #[error("Payment attempt {0} has expired")]
    AttemptExpired(PaymentAttemptId),
}
