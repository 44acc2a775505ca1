//! Use-case services. Each one is generic over the store so that the same
//! code runs against PostgreSQL and the in-memory store.

pub mod blog;
pub mod cart;
pub mod catalog;
pub mod checkout;
pub mod identity;
pub mod payments;
pub mod seo;

pub use blog::{BlogService, PostFilter, PostView};
pub use cart::{CartService, CartView};
pub use catalog::{CatalogService, CategoryPage, CourseDetail, CourseFilter};
pub use checkout::{CheckoutService, OrderView, PaymentInstructions};
pub use identity::{IdentityService, RegisterUser, Session, UserProfile};
pub use payments::{PaymentReview, PaymentService};
pub use seo::{Lookup, NewRedirect, RedirectTarget, SeoService, SitemapEntry, render_sitemap};
