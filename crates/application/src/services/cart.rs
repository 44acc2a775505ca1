use chrono::Utc;
use common::{CourseId, Money, UserId};
use domain::shopping::{Cart, ShoppingError};
use serde::Serialize;
use store::{ShoppingRepository, Store, constraints};

use crate::auth::Actor;
use crate::error::{ApplicationError, Result};

/// A cart with its current total.
#[derive(Debug, Clone, Serialize)]
pub struct CartView {
    #[serde(flatten)]
    pub cart: Cart,
    pub total: Money,
    /// True while an order for this cart awaits payment.
    pub locked: bool,
}

/// Loads the user's active cart, creating it on first use.
pub(crate) async fn active_cart<S>(store: &S, user_id: UserId) -> Result<Cart>
where
    S: ShoppingRepository + ?Sized,
{
    if let Some(cart) = store.find_active_cart(user_id).await? {
        return Ok(cart);
    }
    let cart = Cart::new(user_id, Utc::now());
    match store.insert_cart(&cart).await {
        Ok(()) => Ok(cart),
        Err(e) if e.is_unique_violation(constraints::CARTS_USER_ACTIVE) => store
            .find_active_cart(user_id)
            .await?
            .ok_or_else(|| ApplicationError::not_found("cart", user_id)),
        Err(e) => Err(e.into()),
    }
}

#[derive(Clone)]
pub struct CartService<S> {
    store: S,
}

impl<S: Store> CartService<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    #[tracing::instrument(skip(self, actor), fields(user_id = %actor.user_id))]
    pub async fn get_cart(&self, actor: &Actor) -> Result<CartView> {
        let cart = active_cart(&self.store, actor.user_id).await?;
        self.view(cart).await
    }

    /// Adds a published course. Adding a course already in the cart changes
    /// nothing.
    #[tracing::instrument(skip(self, actor), fields(user_id = %actor.user_id))]
    pub async fn add_to_cart(&self, actor: &Actor, course_id: CourseId) -> Result<CartView> {
        let mut cart = self.unlocked_cart(actor.user_id).await?;
        let course = self
            .store
            .find_course(course_id)
            .await?
            .ok_or_else(|| ApplicationError::not_found("course", course_id))?;
        let enrolled = self
            .store
            .find_enrollment(course_id, actor.user_id)
            .await?
            .is_some();

        if cart.add_course(&course, enrolled, Utc::now())?
            && let Some(item) = cart.items.last()
        {
            match self.store.insert_cart_item(item).await {
                Ok(()) => {
                    tracing::debug!(cart_id = %cart.id, %course_id, "course added to cart");
                }
                Err(e) if e.is_unique_violation(constraints::CART_ITEMS_CART_COURSE) => {}
                Err(e) => return Err(e.into()),
            }
        }
        self.get_cart(actor).await
    }

    #[tracing::instrument(skip(self, actor), fields(user_id = %actor.user_id))]
    pub async fn remove_from_cart(&self, actor: &Actor, course_id: CourseId) -> Result<CartView> {
        let cart = self.unlocked_cart(actor.user_id).await?;
        if !self.store.delete_cart_item(cart.id, course_id).await? {
            return Err(ShoppingError::ItemNotInCart(course_id).into());
        }
        self.get_cart(actor).await
    }

    #[tracing::instrument(skip(self, actor), fields(user_id = %actor.user_id))]
    pub async fn clear_cart(&self, actor: &Actor) -> Result<CartView> {
        let cart = self.unlocked_cart(actor.user_id).await?;
        self.store.clear_cart(cart.id).await?;
        self.get_cart(actor).await
    }

    async fn unlocked_cart(&self, user_id: UserId) -> Result<Cart> {
        let cart = active_cart(&self.store, user_id).await?;
        if self
            .store
            .find_active_order(user_id, cart.id)
            .await?
            .is_some()
        {
            return Err(ShoppingError::CartLocked(cart.id).into());
        }
        Ok(cart)
    }

    /// Refreshes titles and prices from the catalog before totalling.
    async fn view(&self, mut cart: Cart) -> Result<CartView> {
        let ids: Vec<CourseId> = cart.items.iter().map(|i| i.course_id).collect();
        if !ids.is_empty() {
            let courses = self.store.find_courses(&ids).await?;
            cart.reprice(&courses);
        }
        let locked = self
            .store
            .find_active_order(cart.user_id, cart.id)
            .await?
            .is_some();
        Ok(CartView {
            total: cart.total()?,
            cart,
            locked,
        })
    }
}

#[cfg(test)]
mod tests {
    use common::CategoryId;
    use domain::catalog::{Course, CourseDetails, CourseLevel, Curriculum, SessionDetails};
    use domain::identity::Role;
    use store::{CatalogRepository, InMemoryStore};

    use super::*;

    async fn published_course(store: &InMemoryStore, title: &str, cents: i64) -> Course {
        let now = Utc::now();
        let mut course = Course::create(
            UserId::new(),
            CourseDetails {
                category_id: CategoryId::new(),
                title: title.to_string(),
                slug: None,
                summary: String::new(),
                description: String::new(),
                level: CourseLevel::Beginner,
                language: "en".to_string(),
                price: Money::from_cents(cents),
                seo: Default::default(),
            },
            now,
        )
        .unwrap();
        let mut curriculum = Curriculum::empty(course.id);
        let section = curriculum.add_section("Intro").unwrap();
        curriculum
            .add_session(
                section,
                SessionDetails {
                    title: "Welcome".to_string(),
                    duration_minutes: 5,
                    is_preview: true,
                    content_url: None,
                },
            )
            .unwrap();
        course.publish(curriculum.has_content(), now).unwrap();
        store.insert_course(&course).await.unwrap();
        course
    }

    fn student() -> Actor {
        Actor::new(UserId::new(), [Role::Student])
    }

    #[tokio::test]
    async fn cart_is_created_lazily_once() {
        let service = CartService::new(InMemoryStore::new());
        let actor = student();

        let first = service.get_cart(&actor).await.unwrap();
        let second = service.get_cart(&actor).await.unwrap();

        assert_eq!(first.cart.id, second.cart.id);
        assert!(first.cart.items.is_empty());
        assert!(!first.locked);
    }

    #[tokio::test]
    async fn adding_twice_keeps_one_item() {
        let store = InMemoryStore::new();
        let course = published_course(&store, "Rust Basics", 4900).await;
        let service = CartService::new(store);
        let actor = student();

        service.add_to_cart(&actor, course.id).await.unwrap();
        let view = service.add_to_cart(&actor, course.id).await.unwrap();

        assert_eq!(view.cart.items.len(), 1);
        assert_eq!(view.total, Money::from_cents(4900));
    }

    #[tokio::test]
    async fn total_follows_current_prices() {
        let store = InMemoryStore::new();
        let mut course = published_course(&store, "Rust Basics", 4900).await;
        let service = CartService::new(store.clone());
        let actor = student();
        service.add_to_cart(&actor, course.id).await.unwrap();

        course.price = Money::from_cents(2900);
        store.update_course(&course).await.unwrap();

        let view = service.get_cart(&actor).await.unwrap();
        assert_eq!(view.total, Money::from_cents(2900));
    }

    #[tokio::test]
    async fn draft_courses_cannot_be_added() {
        let store = InMemoryStore::new();
        let mut course = published_course(&store, "Rust Basics", 4900).await;
        course.archive(Utc::now()).unwrap();
        store.update_course(&course).await.unwrap();
        let service = CartService::new(store);

        let err = service.add_to_cart(&student(), course.id).await.unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::Conflict);
    }

    #[tokio::test]
    async fn removing_a_missing_item_fails() {
        let service = CartService::new(InMemoryStore::new());
        let err = service
            .remove_from_cart(&student(), CourseId::new())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::Validation);
    }
}
