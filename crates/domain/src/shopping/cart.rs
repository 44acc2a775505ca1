//! Shopping cart.

use chrono::{DateTime, Utc};
use common::{CartId, CartItemId, CourseId, Money, UserId};
use serde::{Deserialize, Serialize};

use super::{OrderItem, ShoppingError};
use crate::catalog::Course;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum CartStatus {
    #[default]
    Active,
    CheckedOut,
}

impl CartStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CartStatus::Active => "Active",
            CartStatus::CheckedOut => "CheckedOut",
        }
    }
}

impl std::str::FromStr for CartStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Active" => Ok(CartStatus::Active),
            "CheckedOut" => Ok(CartStatus::CheckedOut),
            other => Err(format!("unknown cart status '{other}'")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartItem {
    pub id: CartItemId,
    pub cart_id: CartId,
    pub course_id: CourseId,
    pub title: String,
    pub unit_price: Money,
    pub added_at: DateTime<Utc>,
}

/// A user's cart. Each user has at most one active cart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cart {
    pub id: CartId,
    pub user_id: UserId,
    pub status: CartStatus,
    pub items: Vec<CartItem>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Cart {
    pub fn new(user_id: UserId, now: DateTime<Utc>) -> Self {
        Self {
            id: CartId::new(),
            user_id,
            status: CartStatus::Active,
            items: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn contains(&self, course_id: CourseId) -> bool {
        self.items.iter().any(|i| i.course_id == course_id)
    }

    pub fn ensure_active(&self) -> Result<(), ShoppingError> {
        match self.status {
            CartStatus::Active => Ok(()),
            CartStatus::CheckedOut => Err(ShoppingError::CartNotActive(self.id)),
        }
    }

    /// Adds a course. Returns false when it was already in the cart.
    pub fn add_course(
        &mut self,
        course: &Course,
        already_enrolled: bool,
        now: DateTime<Utc>,
    ) -> Result<bool, ShoppingError> {
        self.ensure_active()?;
        if self.contains(course.id) {
            return Ok(false);
        }
        ensure_purchasable(course, already_enrolled)?;

        self.items.push(CartItem {
            id: CartItemId::new(),
            cart_id: self.id,
            course_id: course.id,
            title: course.title.clone(),
            unit_price: course.price,
            added_at: now,
        });
        self.updated_at = now;
        Ok(true)
    }

    pub fn remove_course(
        &mut self,
        course_id: CourseId,
        now: DateTime<Utc>,
    ) -> Result<CartItem, ShoppingError> {
        self.ensure_active()?;
        let index = self
            .items
            .iter()
            .position(|i| i.course_id == course_id)
            .ok_or(ShoppingError::ItemNotInCart(course_id))?;
        self.updated_at = now;
        Ok(self.items.remove(index))
    }

    pub fn clear(&mut self, now: DateTime<Utc>) -> Result<(), ShoppingError> {
        self.ensure_active()?;
        self.items.clear();
        self.updated_at = now;
        Ok(())
    }

    /// Refreshes item titles and prices from the current course rows.
    pub fn reprice<'a>(&mut self, courses: impl IntoIterator<Item = &'a Course>) {
        for course in courses {
            if let Some(item) = self.items.iter_mut().find(|i| i.course_id == course.id) {
                item.title = course.title.clone();
                item.unit_price = course.price;
            }
        }
    }

    pub fn total(&self) -> Result<Money, ShoppingError> {
        Money::checked_sum(self.items.iter().map(|i| i.unit_price)).ok_or(ShoppingError::TotalOverflow)
    }

    pub fn check_out(&mut self, now: DateTime<Utc>) -> Result<(), ShoppingError> {
        self.ensure_active()?;
        self.status = CartStatus::CheckedOut;
        self.updated_at = now;
        Ok(())
    }
}

/// Checks that a course may be bought by a user.
pub(crate) fn ensure_purchasable(course: &Course, already_enrolled: bool) -> Result<(), ShoppingError> {
    if !course.is_visible() {
        return Err(ShoppingError::CourseUnavailable(course.id));
    }
    if already_enrolled {
        return Err(ShoppingError::AlreadyEnrolled(course.id));
    }
    Ok(())
}

/// Snapshots a course into an order line after re-checking it is purchasable.
pub fn order_item_for(course: &Course, already_enrolled: bool) -> Result<OrderItem, ShoppingError> {
    ensure_purchasable(course, already_enrolled)?;
    Ok(OrderItem {
        course_id: course.id,
        title: course.title.clone(),
        unit_price: course.price,
    })
}

#[cfg(test)]
mod tests {
    use common::CategoryId;

    use super::*;
    use crate::catalog::{CourseDetails, CourseLevel};
    use crate::seo::SeoMetadata;

    fn published(title: &str, cents: i64) -> Course {
        let mut course = Course::create(
            UserId::new(),
            CourseDetails {
                category_id: CategoryId::new(),
                title: title.to_string(),
                slug: None,
                summary: String::new(),
                description: String::new(),
                level: CourseLevel::AllLevels,
                language: "en".to_string(),
                price: Money::from_cents(cents),
                seo: SeoMetadata::default(),
            },
            Utc::now(),
        )
        .unwrap();
        course.publish(true, Utc::now()).unwrap();
        course
    }

    #[test]
    fn add_is_idempotent() {
        let course = published("Rust Basics", 1000);
        let mut cart = Cart::new(UserId::new(), Utc::now());
        assert!(cart.add_course(&course, false, Utc::now()).unwrap());
        assert!(!cart.add_course(&course, false, Utc::now()).unwrap());
        assert_eq!(cart.items.len(), 1);
        assert_eq!(cart.total().unwrap(), Money::from_cents(1000));
    }

    #[test]
    fn unpublished_course_cannot_be_added() {
        let mut course = published("Rust Basics", 1000);
        course.archive(Utc::now()).unwrap();
        let mut cart = Cart::new(UserId::new(), Utc::now());
        assert_eq!(
            cart.add_course(&course, false, Utc::now()),
            Err(ShoppingError::CourseUnavailable(course.id))
        );
    }

    #[test]
    fn enrolled_course_cannot_be_added() {
        let course = published("Rust Basics", 1000);
        let mut cart = Cart::new(UserId::new(), Utc::now());
        assert_eq!(
            cart.add_course(&course, true, Utc::now()),
            Err(ShoppingError::AlreadyEnrolled(course.id))
        );
    }

    #[test]
    fn remove_missing_item_fails() {
        let mut cart = Cart::new(UserId::new(), Utc::now());
        let id = CourseId::new();
        assert_eq!(
            cart.remove_course(id, Utc::now()),
            Err(ShoppingError::ItemNotInCart(id))
        );
    }

    #[test]
    fn reprice_uses_current_price() {
        let mut course = published("Rust Basics", 1000);
        let mut cart = Cart::new(UserId::new(), Utc::now());
        cart.add_course(&course, false, Utc::now()).unwrap();

        course.price = Money::from_cents(1500);
        cart.reprice([&course]);
        assert_eq!(cart.total().unwrap(), Money::from_cents(1500));
    }

    #[test]
    fn checked_out_cart_is_frozen() {
        let course = published("Rust Basics", 1000);
        let mut cart = Cart::new(UserId::new(), Utc::now());
        cart.check_out(Utc::now()).unwrap();
        assert_eq!(
            cart.add_course(&course, false, Utc::now()),
            Err(ShoppingError::CartNotActive(cart.id))
        );
    }
}
