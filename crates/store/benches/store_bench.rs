use chrono::Utc;
use common::{CategoryId, Money, PageRequest, UserId};
use criterion::{Criterion, criterion_group, criterion_main};
use domain::catalog::{Course, CourseDetails};
use domain::shopping::{Order, OrderItem};
use store::{CatalogRepository, CourseQuery, InMemoryStore, OrderPlacement, ShoppingRepository};

fn make_course(category_id: CategoryId, n: usize) -> Course {
    let mut course = Course::create(
        UserId::new(),
        CourseDetails {
            category_id,
            title: format!("Course number {n}"),
            slug: None,
            summary: if n % 2 == 0 { "Rust".into() } else { "Go".into() },
            description: String::new(),
            level: Default::default(),
            language: "en".into(),
            price: Money::from_cents(1000),
            seo: Default::default(),
        },
        Utc::now(),
    )
    .unwrap();
    course.publish(true, Utc::now()).unwrap();
    course
}

fn bench_place_order(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();

    c.bench_function("store/place_order", |b| {
        b.iter(|| {
            rt.block_on(async {
                let store = InMemoryStore::new();
                let items = vec![OrderItem {
                    course_id: common::CourseId::new(),
                    title: "Rust".into(),
                    unit_price: Money::from_cents(1000),
                }];
                let order =
                    Order::place(UserId::new(), common::CartId::new(), items, Utc::now()).unwrap();
                store.place_order(OrderPlacement::new(order)).await.unwrap();
            });
        });
    });
}

fn bench_list_courses(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let store = InMemoryStore::new();
    let category_id = CategoryId::new();

    // Pre-populate with 500 courses
    rt.block_on(async {
        for n in 0..500 {
            store
                .insert_course(&make_course(category_id, n))
                .await
                .unwrap();
        }
    });

    c.bench_function("store/list_courses_search_500", |b| {
        b.iter(|| {
            rt.block_on(async {
                store
                    .list_courses(&CourseQuery::new().search("rust"), PageRequest::default())
                    .await
                    .unwrap();
            });
        });
    });
}

criterion_group!(benches, bench_place_order, bench_list_courses);
criterion_main!(benches);
