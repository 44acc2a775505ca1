//! Integration tests for the API server.

use std::sync::{Arc, OnceLock};

use api::routes::AppState;
use application::services::RegisterUser;
use application::{Actor, PasswordHasher, Services, Settings, TokenService};
use axum::Router;
use axum::body::Body;
use axum::http::{Request, Response, StatusCode, header};
use common::{CourseId, Money};
use domain::catalog::{CategoryDetails, CourseDetails, CourseLevel, SessionDetails};
use domain::identity::Role;
use metrics_exporter_prometheus::PrometheusHandle;
use serde_json::{Value, json};
use store::InMemoryStore;
use tower::ServiceExt;

static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

fn get_metrics_handle() -> PrometheusHandle {
    METRICS_HANDLE
        .get_or_init(|| {
            metrics_exporter_prometheus::PrometheusBuilder::new()
                .install_recorder()
                .expect("failed to install Prometheus recorder")
        })
        .clone()
}

struct TestHarness {
    app: Router,
    services: Services<InMemoryStore>,
    admin: Actor,
    instructor: Actor,
}

impl TestHarness {
    async fn new() -> Self {
        let services = Services::new(
            InMemoryStore::new(),
            Settings::default(),
            PasswordHasher::fast().unwrap(),
            TokenService::new("test-secret", chrono::Duration::hours(1)),
        );
        let admin = services
            .identity
            .bootstrap_admin("admin@example.com", "adminpass1")
            .await
            .unwrap()
            .unwrap();
        let admin = Actor::new(admin.id, admin.roles);

        let instructor = services
            .identity
            .register(RegisterUser {
                email: "instructor@example.com".to_string(),
                display_name: "Instructor".to_string(),
                password: "instructorpass1".to_string(),
            })
            .await
            .unwrap();
        let instructor = services
            .identity
            .grant_role(&admin, instructor.id, Role::Instructor)
            .await
            .unwrap();
        let instructor = Actor::new(instructor.id, instructor.roles);

        let state = Arc::new(AppState::new(services.clone()));
        let app = api::create_app(state, get_metrics_handle());
        Self {
            app,
            services,
            admin,
            instructor,
        }
    }

    async fn send(&self, request: Request<Body>) -> Response<Body> {
        self.app.clone().oneshot(request).await.unwrap()
    }

    /// Registers a student over HTTP and returns a bearer token.
    async fn student_token(&self, name: &str) -> String {
        let email = format!("{name}@example.com");
        let response = self
            .send(json_request(
                "POST",
                "/auth/register",
                None,
                json!({"email": email, "display_name": name, "password": "studentpass1"}),
            ))
            .await;
        assert_eq!(response.status(), StatusCode::CREATED);

        let response = self
            .send(json_request(
                "POST",
                "/auth/login",
                None,
                json!({"email": email, "password": "studentpass1"}),
            ))
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        body_json(response).await["token"]
            .as_str()
            .unwrap()
            .to_string()
    }

    async fn admin_token(&self) -> String {
        self.services
            .identity
            .authenticate("admin@example.com", "adminpass1")
            .await
            .unwrap()
            .token
            .token
    }

    /// Creates and publishes a course with one session.
    async fn published_course(&self, title: &str, cents: i64) -> CourseId {
        let catalog = &self.services.catalog;
        let category = catalog
            .create_category(
                &self.admin,
                CategoryDetails {
                    name: format!("{title} Topics"),
                    ..CategoryDetails::default()
                },
            )
            .await
            .unwrap();
        let course = catalog
            .create_course(&self.instructor, course_details(category.id, title, None, cents))
            .await
            .unwrap();
        let curriculum = catalog
            .add_section(&self.instructor, course.id, "Getting started")
            .await
            .unwrap();
        catalog
            .add_session(
                &self.instructor,
                curriculum.sections[0].id,
                SessionDetails {
                    title: "Welcome".to_string(),
                    duration_minutes: 10,
                    is_preview: true,
                    content_url: None,
                },
            )
            .await
            .unwrap();
        catalog
            .publish_course(&self.instructor, course.id)
            .await
            .unwrap();
        course.id
    }
}

fn course_details(
    category_id: common::CategoryId,
    title: &str,
    slug: Option<&str>,
    cents: i64,
) -> CourseDetails {
    CourseDetails {
        category_id,
        title: title.to_string(),
        slug: slug.map(str::to_string),
        summary: format!("All about {title}"),
        description: String::new(),
        level: CourseLevel::Beginner,
        language: "en".to_string(),
        price: Money::from_cents(cents),
        seo: Default::default(),
    }
}

fn request(method: &str, uri: &str, token: Option<&str>) -> axum::http::request::Builder {
    let builder = Request::builder().method(method).uri(uri);
    match token {
        Some(token) => builder.header(header::AUTHORIZATION, format!("Bearer {token}")),
        None => builder,
    }
}

fn json_request(method: &str, uri: &str, token: Option<&str>, body: Value) -> Request<Body> {
    request(method, uri, token)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn empty_request(method: &str, uri: &str, token: Option<&str>) -> Request<Body> {
    request(method, uri, token).body(Body::empty()).unwrap()
}

async fn body_bytes(response: Response<Body>) -> Vec<u8> {
    axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap()
        .to_vec()
}

async fn body_json(response: Response<Body>) -> Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}

#[tokio::test]
async fn test_health_check() {
    let h = TestHarness::new().await;

    let response = h.send(empty_request("GET", "/health", None)).await;

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["status"], "ok");
    assert_eq!(json["site"], "Academy");
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let h = TestHarness::new().await;

    let response = h.send(empty_request("GET", "/metrics", None)).await;

    assert_eq!(response.status(), StatusCode::OK);
    let content_type = response.headers()[header::CONTENT_TYPE].to_str().unwrap();
    assert!(content_type.starts_with("text/plain"));
}

#[tokio::test]
async fn test_register_login_and_me() {
    let h = TestHarness::new().await;
    let token = h.student_token("ada").await;

    let response = h.send(empty_request("GET", "/auth/me", Some(&token))).await;

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["email"], "ada@example.com");
    assert_eq!(json["roles"], json!(["Student"]));
    assert!(json.get("password_hash").is_none());
}

#[tokio::test]
async fn test_duplicate_registration_conflicts() {
    let h = TestHarness::new().await;
    h.student_token("ada").await;

    let response = h
        .send(json_request(
            "POST",
            "/auth/register",
            None,
            json!({"email": "ADA@example.com", "display_name": "Ada", "password": "studentpass1"}),
        ))
        .await;

    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_wrong_password_is_unauthorized() {
    let h = TestHarness::new().await;
    h.student_token("ada").await;

    let response = h
        .send(json_request(
            "POST",
            "/auth/login",
            None,
            json!({"email": "ada@example.com", "password": "not-the-password"}),
        ))
        .await;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_missing_token_is_unauthorized() {
    let h = TestHarness::new().await;

    let response = h.send(empty_request("GET", "/cart", None)).await;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let json = body_json(response).await;
    assert!(json["error"].is_string());
}

#[tokio::test]
async fn test_garbage_token_is_unauthorized() {
    let h = TestHarness::new().await;

    let response = h
        .send(empty_request("GET", "/auth/me", Some("not-a-jwt")))
        .await;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_student_cannot_reach_admin_routes() {
    let h = TestHarness::new().await;
    let token = h.student_token("ada").await;

    let response = h
        .send(empty_request("GET", "/admin/transactions", Some(&token)))
        .await;

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_malformed_json_is_bad_request() {
    let h = TestHarness::new().await;

    let response = h
        .send(
            Request::builder()
                .method("POST")
                .uri("/auth/register")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from("{not json"))
                .unwrap(),
        )
        .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_json(response).await;
    assert!(json["error"].is_string());
}

#[tokio::test]
async fn test_malformed_path_id_is_bad_request() {
    let h = TestHarness::new().await;
    let token = h.student_token("ada").await;
    let admin = h.admin_token().await;

    let response = h
        .send(empty_request("GET", "/orders/not-a-uuid", Some(&token)))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_json(response).await;
    assert!(json["error"].is_string());

    let response = h
        .send(empty_request("POST", "/admin/payments/12345/approve", Some(&admin)))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_json(response).await;
    assert!(json["error"].is_string());
}

#[tokio::test]
async fn test_public_course_listing_hides_drafts() {
    let h = TestHarness::new().await;
    h.published_course("Rust Basics", 4900).await;
    let category = h
        .services
        .catalog
        .create_category(
            &h.admin,
            CategoryDetails {
                name: "Drafts".to_string(),
                ..CategoryDetails::default()
            },
        )
        .await
        .unwrap();
    h.services
        .catalog
        .create_course(&h.instructor, course_details(category.id, "Unfinished", None, 100))
        .await
        .unwrap();

    let response = h.send(empty_request("GET", "/courses", None)).await;

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["total"], 1);
    assert_eq!(json["items"][0]["slug"], "rust-basics");

    let response = h
        .send(empty_request("GET", "/courses?include_unpublished=true", None))
        .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_course_slug_change_redirects() {
    let h = TestHarness::new().await;
    let id = h.published_course("Rust Basics", 4900).await;
    let course = h.services.catalog.get_course(&h.instructor, id).await.unwrap();
    h.services
        .catalog
        .update_course(
            &h.instructor,
            id,
            course_details(course.category_id, "Rust Basics", Some("rust-fundamentals"), 4900),
        )
        .await
        .unwrap();

    let response = h
        .send(empty_request("GET", "/courses/rust-basics", None))
        .await;

    assert_eq!(response.status(), StatusCode::MOVED_PERMANENTLY);
    assert_eq!(
        response.headers()[header::LOCATION],
        "/courses/rust-fundamentals"
    );

    let response = h
        .send(empty_request("GET", "/courses/rust-fundamentals", None))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["session_count"], 1);
}

#[tokio::test]
async fn test_checkout_replays_with_idempotency_key() {
    let h = TestHarness::new().await;
    let course = h.published_course("Rust Basics", 4900).await;
    let token = h.student_token("ada").await;

    let response = h
        .send(json_request(
            "POST",
            "/cart/items",
            Some(&token),
            json!({"course_id": course}),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["total"], 4900);

    let checkout = || {
        request("POST", "/checkout", Some(&token))
            .header("Idempotency-Key", "checkout-1")
            .body(Body::empty())
            .unwrap()
    };

    let first = h.send(checkout()).await;
    assert_eq!(first.status(), StatusCode::CREATED);
    assert!(first.headers().get("idempotent-replayed").is_none());
    let first = body_json(first).await;
    let tracking_code = first["payment"]["tracking_code"].as_str().unwrap();
    assert!(tracking_code.starts_with("PAY-"));

    let second = h.send(checkout()).await;
    assert_eq!(second.status(), StatusCode::CREATED);
    assert_eq!(second.headers()["idempotent-replayed"], "true");
    let second = body_json(second).await;
    assert_eq!(first["order_number"], second["order_number"]);

    // The cart stays locked while the order awaits payment.
    let response = h
        .send(empty_request("DELETE", "/cart", Some(&token)))
        .await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_receipt_key_reuse_with_other_payload_is_unprocessable() {
    let h = TestHarness::new().await;
    let course = h.published_course("Rust Basics", 4900).await;
    let token = h.student_token("ada").await;
    h.send(json_request(
        "POST",
        "/cart/items",
        Some(&token),
        json!({"course_id": course}),
    ))
    .await;
    let order = body_json(h.send(empty_request("POST", "/checkout", Some(&token))).await).await;
    let order_id = order["id"].as_str().unwrap().to_string();

    let receipt = |reference: &str| {
        request("POST", &format!("/orders/{order_id}/receipt"), Some(&token))
            .header("Idempotency-Key", "receipt-1")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(
                json!({"amount": 4900, "bank_reference": reference}).to_string(),
            ))
            .unwrap()
    };

    let response = h.send(receipt("TRX-1")).await;
    assert_eq!(response.status(), StatusCode::CREATED);
    assert_eq!(body_json(response).await["status"], "AwaitingAdminApproval");

    let response = h.send(receipt("TRX-2")).await;
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn test_admin_approval_enrolls_buyer() {
    let h = TestHarness::new().await;
    let course = h.published_course("Rust Basics", 4900).await;
    let token = h.student_token("ada").await;
    let admin = h.admin_token().await;
    h.send(json_request(
        "POST",
        "/cart/items",
        Some(&token),
        json!({"course_id": course}),
    ))
    .await;
    let order = body_json(h.send(empty_request("POST", "/checkout", Some(&token))).await).await;
    let order_id = order["id"].as_str().unwrap().to_string();
    let request_body = body_json(
        h.send(json_request(
            "POST",
            &format!("/orders/{order_id}/receipt"),
            Some(&token),
            json!({"amount": 4900, "bank_reference": "TRX-1"}),
        ))
        .await,
    )
    .await;
    let request_id = request_body["id"].as_str().unwrap().to_string();

    let pending = body_json(
        h.send(empty_request("GET", "/admin/payments/pending", Some(&admin)))
            .await,
    )
    .await;
    assert_eq!(pending["total"], 1);

    let response = h
        .send(json_request(
            "POST",
            &format!("/admin/payments/{request_id}/approve"),
            Some(&admin),
            json!({"note": "matched statement"}),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["order"]["status"], "Paid");

    let enrollments = body_json(
        h.send(empty_request("GET", "/me/enrollments", Some(&token)))
            .await,
    )
    .await;
    assert_eq!(enrollments.as_array().unwrap().len(), 1);
    assert_eq!(enrollments[0]["source"], "Purchase");

    let audit = body_json(
        h.send(empty_request(
            "GET",
            &format!("/admin/orders/{order_id}/audit"),
            Some(&admin),
        ))
        .await,
    )
    .await;
    assert_eq!(audit.as_array().unwrap().len(), 4);
}

#[tokio::test]
async fn test_sitemap_lists_published_courses() {
    let h = TestHarness::new().await;
    h.published_course("Rust Basics", 4900).await;

    let response = h.send(empty_request("GET", "/sitemap.xml", None)).await;

    assert_eq!(response.status(), StatusCode::OK);
    let content_type = response.headers()[header::CONTENT_TYPE].to_str().unwrap();
    assert!(content_type.starts_with("application/xml"));
    let xml = String::from_utf8(body_bytes(response).await).unwrap();
    assert!(xml.contains("/courses/rust-basics</loc>"));
}

#[tokio::test]
async fn test_unknown_redirect_is_not_found() {
    let h = TestHarness::new().await;

    let response = h
        .send(empty_request("GET", "/redirects/resolve?path=/nowhere", None))
        .await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
