use chrono::Utc;
use common::{CategoryId, Money, UserId};
use criterion::{Criterion, criterion_group, criterion_main};
use domain::catalog::{Course, CourseDetails, CourseLevel};
use domain::seo::{ResolvedSeo, SeoInput, SeoMetadata, SiteContext, StructuredData};
use domain::shopping::{Cart, Order, order_item_for};
use domain::slugify;
use std::hint::black_box;

fn published_course(n: i64) -> Course {
    let mut course = Course::create(
        UserId::new(),
        CourseDetails {
            category_id: CategoryId::new(),
            title: format!("Course number {n}"),
            slug: None,
            summary: "A short summary of the course".to_string(),
            description: String::new(),
            level: CourseLevel::AllLevels,
            language: "en".to_string(),
            price: Money::from_cents(1000 + n),
            seo: SeoMetadata::default(),
        },
        Utc::now(),
    )
    .unwrap();
    course.publish(true, Utc::now()).unwrap();
    course
}

fn bench_slugify(c: &mut Criterion) {
    let title = "Building Reliable Web Services in Rust: Async, Errors & Observability (2026 Edition)";

    c.bench_function("domain/slugify_title", |b| {
        b.iter(|| slugify(black_box(title)));
    });
}

fn bench_cart_total(c: &mut Criterion) {
    let courses: Vec<Course> = (0..50).map(published_course).collect();
    let mut cart = Cart::new(UserId::new(), Utc::now());
    for course in &courses {
        cart.add_course(course, false, Utc::now()).unwrap();
    }

    c.bench_function("domain/cart_reprice_and_total_50", |b| {
        b.iter(|| {
            let mut cart = cart.clone();
            cart.reprice(courses.iter());
            black_box(cart.total().unwrap());
        });
    });
}

fn bench_place_order(c: &mut Criterion) {
    let courses: Vec<Course> = (0..10).map(published_course).collect();
    let cart = Cart::new(UserId::new(), Utc::now());

    c.bench_function("domain/place_order_10_items", |b| {
        b.iter(|| {
            let items = courses
                .iter()
                .map(|course| order_item_for(course, false).unwrap())
                .collect();
            black_box(Order::place(cart.user_id, cart.id, items, Utc::now()).unwrap());
        });
    });
}

fn bench_resolve_seo(c: &mut Criterion) {
    let course = published_course(1);
    let site = SiteContext::new("Academy", "https://academy.test", "USD");

    c.bench_function("domain/resolve_course_seo", |b| {
        b.iter(|| {
            let input = SeoInput {
                title: &course.title,
                summary: &course.summary,
                path: course.path(),
                seo: &course.seo,
                structured: StructuredData::Course {
                    price: course.price,
                    instructor_name: Some("Ada".to_string()),
                },
            };
            black_box(ResolvedSeo::resolve(&input, &site));
        });
    });
}

criterion_group!(
    benches,
    bench_slugify,
    bench_cart_total,
    bench_place_order,
    bench_resolve_seo,
);
criterion_main!(benches);
