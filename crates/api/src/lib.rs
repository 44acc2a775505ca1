//! HTTP API server for the course marketplace.
//!
//! JSON endpoints over the application services, with structured logging
//! (tracing), Prometheus metrics and idempotent checkout and receipt
//! submission.

pub mod config;
pub mod error;
pub mod extract;
pub mod response;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::routing::{delete, get, post, put};
use metrics_exporter_prometheus::PrometheusHandle;
use store::Store;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use routes::AppState;

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<S: Store>(state: Arc<AppState<S>>, metrics_handle: PrometheusHandle) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::render))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check::<S>))
        .merge(public_routes::<S>())
        .merge(account_routes::<S>())
        .merge(instructor_routes::<S>())
        .merge(admin_routes::<S>())
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

fn public_routes<S: Store>() -> Router<Arc<AppState<S>>> {
    use routes::{auth, blog, catalog, seo};

    Router::new()
        .route("/auth/register", post(auth::register::<S>))
        .route("/auth/login", post(auth::login::<S>))
        .route("/categories", get(catalog::tree::<S>))
        .route("/categories/{slug}", get(catalog::category::<S>))
        .route("/courses", get(catalog::list::<S>))
        .route("/courses/{slug}", get(catalog::course::<S>))
        .route("/blog/posts", get(blog::list::<S>))
        .route("/blog/posts/{slug}", get(blog::post::<S>))
        .route("/blog/categories", get(blog::categories::<S>))
        .route("/blog/tags", get(blog::tags::<S>))
        .route("/redirects/resolve", get(seo::resolve::<S>))
        .route("/seo", get(seo::metadata::<S>))
        .route("/sitemap.xml", get(seo::sitemap::<S>))
}

/// Routes acting on the caller's own account, cart and orders.
fn account_routes<S: Store>() -> Router<Arc<AppState<S>>> {
    use routes::{auth, cart, orders};

    Router::new()
        .route("/auth/me", get(auth::me::<S>))
        .route(
            "/me/enrollments",
            get(auth::enrollments::<S>).post(auth::enroll_free::<S>),
        )
        .route("/cart", get(cart::get::<S>).delete(cart::clear::<S>))
        .route("/cart/items", post(cart::add_item::<S>))
        .route("/cart/items/{course_id}", delete(cart::remove_item::<S>))
        .route("/checkout", post(orders::checkout::<S>))
        .route("/orders", get(orders::list::<S>))
        .route("/orders/{id}", get(orders::get::<S>))
        .route("/orders/{id}/cancel", post(orders::cancel::<S>))
        .route("/orders/{id}/receipt", post(orders::submit_receipt::<S>))
        .route(
            "/orders/{id}/payment-requests",
            get(orders::payment_requests::<S>),
        )
}

fn instructor_routes<S: Store>() -> Router<Arc<AppState<S>>> {
    use routes::instructor::*;

    Router::new()
        .route("/instructor/courses", post(create_course::<S>))
        .route(
            "/instructor/courses/{id}",
            get(get_course::<S>)
                .put(update_course::<S>)
                .delete(delete_course::<S>),
        )
        .route("/instructor/courses/{id}/publish", post(publish_course::<S>))
        .route("/instructor/courses/{id}/archive", post(archive_course::<S>))
        .route("/instructor/courses/{id}/curriculum", get(curriculum::<S>))
        .route("/instructor/courses/{id}/sections", post(add_section::<S>))
        .route("/instructor/courses/{id}/schedules", post(add_schedule::<S>))
        .route(
            "/instructor/sections/{id}",
            put(rename_section::<S>).delete(remove_section::<S>),
        )
        .route("/instructor/sections/{id}/move", post(move_section::<S>))
        .route("/instructor/sections/{id}/sessions", post(add_session::<S>))
        .route("/instructor/sessions/{id}", delete(remove_session::<S>))
        .route("/instructor/sessions/{id}/move", post(move_session::<S>))
        .route("/instructor/schedules/{id}", delete(remove_schedule::<S>))
}

fn admin_routes<S: Store>() -> Router<Arc<AppState<S>>> {
    use routes::{admin, blog, seo};

    Router::new()
        .route("/admin/categories", post(admin::create_category::<S>))
        .route(
            "/admin/categories/{id}",
            put(admin::update_category::<S>).delete(admin::delete_category::<S>),
        )
        .route("/admin/courses/{id}/restore", post(admin::restore_course::<S>))
        .route("/admin/payments/pending", get(admin::pending_payments::<S>))
        .route("/admin/payments/{id}", get(admin::payment_request::<S>))
        .route(
            "/admin/payments/{id}/approve",
            post(admin::approve_payment::<S>),
        )
        .route("/admin/payments/{id}/reject", post(admin::reject_payment::<S>))
        .route("/admin/orders/{id}/audit", get(admin::audit_trail::<S>))
        .route("/admin/transactions", get(admin::transactions::<S>))
        .route("/admin/users/{id}", get(admin::user::<S>))
        .route("/admin/users/{id}/roles", post(admin::grant_role::<S>))
        .route(
            "/admin/users/{id}/roles/{role}",
            delete(admin::revoke_role::<S>),
        )
        .route("/admin/users/{id}/deactivate", post(admin::deactivate_user::<S>))
        .route("/admin/enrollments", post(admin::enroll::<S>))
        .route("/admin/blog/categories", post(blog::create_category::<S>))
        .route("/admin/blog/posts", post(blog::create::<S>))
        .route(
            "/admin/blog/posts/{id}",
            get(blog::get::<S>)
                .put(blog::update::<S>)
                .delete(blog::delete::<S>),
        )
        .route("/admin/blog/posts/{id}/publish", post(blog::publish::<S>))
        .route("/admin/blog/posts/{id}/unpublish", post(blog::unpublish::<S>))
        .route(
            "/admin/redirects",
            get(seo::list_redirects::<S>).post(seo::add_redirect::<S>),
        )
}
