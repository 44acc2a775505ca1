use async_trait::async_trait;
use common::{CategoryId, CourseId, Page, PageRequest, ScheduleId, SectionId, SessionId, UserId};
use domain::catalog::{
    Category, Course, CourseEnrollment, CourseSchedule, CourseStatus, Curriculum,
};

use super::{InMemoryStore, Tables};
use crate::query::contains_ci;
use crate::{CatalogRepository, CourseQuery, Result, StoreError, constraints};

impl Tables {
    fn check_category_slug(&self, category: &Category) -> Result<()> {
        let taken = !category.is_deleted
            && self.categories.values().any(|c| {
                c.id != category.id && !c.is_deleted && c.slug == category.slug
            });
        if taken {
            return Err(StoreError::unique(constraints::CATEGORIES_SLUG_ACTIVE));
        }
        Ok(())
    }

    fn check_course_slug(&self, course: &Course) -> Result<()> {
        let taken = !course.is_deleted
            && self
                .courses
                .values()
                .any(|c| c.id != course.id && !c.is_deleted && c.slug == course.slug);
        if taken {
            return Err(StoreError::unique(constraints::COURSES_SLUG_ACTIVE));
        }
        Ok(())
    }

    pub(super) fn is_enrolled(&self, course_id: CourseId, student_id: UserId) -> bool {
        self.enrollments
            .iter()
            .any(|e| e.course_id == course_id && e.student_id == student_id)
    }
}

fn matches(course: &Course, query: &CourseQuery) -> bool {
    if course.is_deleted {
        return false;
    }
    if !query.include_unpublished && course.status != CourseStatus::Published {
        return false;
    }
    if let Some(ids) = &query.category_ids
        && !ids.contains(&course.category_id)
    {
        return false;
    }
    if let Some(level) = query.level
        && course.level != level
    {
        return false;
    }
    if let Some(instructor) = query.instructor_id
        && course.instructor_id != instructor
    {
        return false;
    }
    if let Some(text) = &query.search
        && !contains_ci(&course.title, text)
        && !contains_ci(&course.summary, text)
    {
        return false;
    }
    true
}

#[async_trait]
impl CatalogRepository for InMemoryStore {
    async fn insert_category(&self, category: &Category) -> Result<()> {
        let mut tables = self.tables.write().await;
        tables.check_category_slug(category)?;
        tables.categories.insert(category.id, category.clone());
        Ok(())
    }

    async fn update_category(&self, category: &Category) -> Result<()> {
        let mut tables = self.tables.write().await;
        tables.check_category_slug(category)?;
        match tables.categories.get_mut(&category.id) {
            Some(existing) => {
                *existing = category.clone();
                Ok(())
            }
            None => Err(StoreError::not_found("category", category.id)),
        }
    }

    async fn find_category(&self, id: CategoryId) -> Result<Option<Category>> {
        Ok(self.tables.read().await.categories.get(&id).cloned())
    }

    async fn find_category_by_slug(&self, slug: &str) -> Result<Option<Category>> {
        let tables = self.tables.read().await;
        Ok(tables
            .categories
            .values()
            .find(|c| !c.is_deleted && c.slug.as_str() == slug)
            .cloned())
    }

    async fn list_categories(&self) -> Result<Vec<Category>> {
        let tables = self.tables.read().await;
        let mut categories: Vec<_> = tables
            .categories
            .values()
            .filter(|c| !c.is_deleted)
            .cloned()
            .collect();
        categories.sort_by(|a, b| a.sort_order.cmp(&b.sort_order).then(a.name.cmp(&b.name)));
        Ok(categories)
    }

    async fn category_in_use(&self, id: CategoryId) -> Result<bool> {
        let tables = self.tables.read().await;
        let has_children = tables
            .categories
            .values()
            .any(|c| !c.is_deleted && c.parent_id == Some(id));
        let has_courses = tables
            .courses
            .values()
            .any(|c| !c.is_deleted && c.category_id == id);
        Ok(has_children || has_courses)
    }

    async fn insert_course(&self, course: &Course) -> Result<()> {
        let mut tables = self.tables.write().await;
        tables.check_course_slug(course)?;
        tables.courses.insert(course.id, course.clone());
        Ok(())
    }

    async fn update_course(&self, course: &Course) -> Result<()> {
        let mut tables = self.tables.write().await;
        tables.check_course_slug(course)?;
        match tables.courses.get_mut(&course.id) {
            Some(existing) => {
                *existing = course.clone();
                Ok(())
            }
            None => Err(StoreError::not_found("course", course.id)),
        }
    }

    async fn find_course(&self, id: CourseId) -> Result<Option<Course>> {
        Ok(self.tables.read().await.courses.get(&id).cloned())
    }

    async fn find_course_by_slug(&self, slug: &str) -> Result<Option<Course>> {
        let tables = self.tables.read().await;
        Ok(tables
            .courses
            .values()
            .find(|c| !c.is_deleted && c.slug.as_str() == slug)
            .cloned())
    }

    async fn find_courses(&self, ids: &[CourseId]) -> Result<Vec<Course>> {
        let tables = self.tables.read().await;
        Ok(ids
            .iter()
            .filter_map(|id| tables.courses.get(id).cloned())
            .collect())
    }

    async fn list_courses(&self, query: &CourseQuery, page: PageRequest) -> Result<Page<Course>> {
        let tables = self.tables.read().await;
        let mut courses: Vec<_> = tables
            .courses
            .values()
            .filter(|c| matches(c, query))
            .cloned()
            .collect();
        // Newest publication first; never-published courses last.
        courses.sort_by(|a, b| {
            b.published_at
                .cmp(&a.published_at)
                .then_with(|| a.title.cmp(&b.title))
        });
        Ok(page.paginate(courses))
    }

    async fn load_curriculum(&self, course_id: CourseId) -> Result<Curriculum> {
        let tables = self.tables.read().await;
        Ok(tables
            .curricula
            .get(&course_id)
            .cloned()
            .unwrap_or_else(|| Curriculum::empty(course_id)))
    }

    async fn save_curriculum(&self, curriculum: &Curriculum) -> Result<()> {
        let mut tables = self.tables.write().await;
        if !tables.courses.contains_key(&curriculum.course_id) {
            return Err(StoreError::not_found("course", curriculum.course_id));
        }
        tables
            .curricula
            .insert(curriculum.course_id, curriculum.clone());
        Ok(())
    }

    async fn course_of_section(&self, id: SectionId) -> Result<Option<CourseId>> {
        let tables = self.tables.read().await;
        Ok(tables
            .curricula
            .values()
            .find(|c| c.contains_section(id))
            .map(|c| c.course_id))
    }

    async fn course_of_session(&self, id: SessionId) -> Result<Option<CourseId>> {
        let tables = self.tables.read().await;
        Ok(tables
            .curricula
            .values()
            .find(|c| c.contains_session(id))
            .map(|c| c.course_id))
    }

    async fn insert_schedule(&self, schedule: &CourseSchedule) -> Result<()> {
        let mut tables = self.tables.write().await;
        if !tables.courses.contains_key(&schedule.course_id) {
            return Err(StoreError::not_found("course", schedule.course_id));
        }
        tables.schedules.insert(schedule.id, schedule.clone());
        Ok(())
    }

    async fn find_schedule(&self, id: ScheduleId) -> Result<Option<CourseSchedule>> {
        Ok(self.tables.read().await.schedules.get(&id).cloned())
    }

    async fn delete_schedule(&self, id: ScheduleId) -> Result<()> {
        let mut tables = self.tables.write().await;
        tables
            .schedules
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| StoreError::not_found("schedule", id))
    }

    async fn list_schedules(&self, course_id: CourseId) -> Result<Vec<CourseSchedule>> {
        let tables = self.tables.read().await;
        let mut schedules: Vec<_> = tables
            .schedules
            .values()
            .filter(|s| s.course_id == course_id)
            .cloned()
            .collect();
        schedules.sort_by(|a, b| a.starts_on.cmp(&b.starts_on).then(a.label.cmp(&b.label)));
        Ok(schedules)
    }

    async fn insert_enrollment(&self, enrollment: &CourseEnrollment) -> Result<()> {
        let mut tables = self.tables.write().await;
        if tables.is_enrolled(enrollment.course_id, enrollment.student_id) {
            return Err(StoreError::unique(
                constraints::COURSE_ENROLLMENTS_COURSE_STUDENT,
            ));
        }
        tables.enrollments.push(enrollment.clone());
        Ok(())
    }

    async fn find_enrollment(
        &self,
        course_id: CourseId,
        student_id: UserId,
    ) -> Result<Option<CourseEnrollment>> {
        let tables = self.tables.read().await;
        Ok(tables
            .enrollments
            .iter()
            .find(|e| e.course_id == course_id && e.student_id == student_id)
            .cloned())
    }

    async fn list_enrollments(&self, student_id: UserId) -> Result<Vec<CourseEnrollment>> {
        let tables = self.tables.read().await;
        let mut enrollments: Vec<_> = tables
            .enrollments
            .iter()
            .filter(|e| e.student_id == student_id)
            .cloned()
            .collect();
        enrollments.sort_by(|a, b| b.enrolled_at.cmp(&a.enrolled_at));
        Ok(enrollments)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use common::Money;
    use domain::catalog::{CategoryDetails, CourseDetails, CourseLevel, EnrollmentSource};
    use domain::seo::SeoMetadata;

    use super::*;

    fn category(name: &str) -> Category {
        Category::create(
            CategoryDetails {
                name: name.to_string(),
                ..CategoryDetails::default()
            },
            Utc::now(),
        )
        .unwrap()
    }

    fn course(category_id: CategoryId, title: &str, level: CourseLevel) -> Course {
        Course::create(
            UserId::new(),
            CourseDetails {
                category_id,
                title: title.to_string(),
                slug: None,
                summary: format!("Learn {title}"),
                description: String::new(),
                level,
                language: "en".to_string(),
                price: Money::from_cents(1000),
                seo: SeoMetadata::default(),
            },
            Utc::now(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn slug_is_unique_among_live_categories_only() {
        let store = InMemoryStore::new();
        let mut first = category("Design");
        store.insert_category(&first).await.unwrap();

        let err = store.insert_category(&category("Design")).await.unwrap_err();
        assert!(err.is_unique_violation(constraints::CATEGORIES_SLUG_ACTIVE));

        first.soft_delete(false, Utc::now()).unwrap();
        store.update_category(&first).await.unwrap();
        store.insert_category(&category("Design")).await.unwrap();
    }

    #[tokio::test]
    async fn list_courses_filters_and_orders() {
        let store = InMemoryStore::new();
        let cat = category("Programming");
        store.insert_category(&cat).await.unwrap();

        let mut rust = course(cat.id, "Rust", CourseLevel::Beginner);
        let mut go = course(cat.id, "Golang", CourseLevel::Advanced);
        let draft = course(cat.id, "Zig", CourseLevel::Beginner);
        let first = Utc::now();
        rust.publish(true, first).unwrap();
        go.publish(true, first + chrono::Duration::seconds(1)).unwrap();
        for c in [&rust, &go, &draft] {
            store.insert_course(c).await.unwrap();
        }

        let page = store
            .list_courses(&CourseQuery::new(), PageRequest::default())
            .await
            .unwrap();
        let titles: Vec<&str> = page.items.iter().map(|c| c.title.as_str()).collect();
        assert_eq!(titles, vec!["Golang", "Rust"]);

        let beginners = store
            .list_courses(
                &CourseQuery::new()
                    .level(CourseLevel::Beginner)
                    .include_unpublished(true),
                PageRequest::default(),
            )
            .await
            .unwrap();
        assert_eq!(beginners.total, 2);

        let search = store
            .list_courses(&CourseQuery::new().search("learn rust"), PageRequest::default())
            .await
            .unwrap();
        assert_eq!(search.items[0].id, rust.id);
    }

    #[tokio::test]
    async fn category_in_use_sees_children_and_courses() {
        let store = InMemoryStore::new();
        let parent = category("Parent");
        store.insert_category(&parent).await.unwrap();
        assert!(!store.category_in_use(parent.id).await.unwrap());

        store
            .insert_course(&course(parent.id, "Rust", CourseLevel::Beginner))
            .await
            .unwrap();
        assert!(store.category_in_use(parent.id).await.unwrap());
    }

    #[tokio::test]
    async fn duplicate_enrollment_is_rejected() {
        let store = InMemoryStore::new();
        let enrollment = CourseEnrollment::new(
            CourseId::new(),
            UserId::new(),
            EnrollmentSource::Admin,
            None,
            Utc::now(),
        );
        store.insert_enrollment(&enrollment).await.unwrap();

        let again = CourseEnrollment::new(
            enrollment.course_id,
            enrollment.student_id,
            EnrollmentSource::Free,
            None,
            Utc::now(),
        );
        let err = store.insert_enrollment(&again).await.unwrap_err();
        assert!(err.is_unique_violation(constraints::COURSE_ENROLLMENTS_COURSE_STUDENT));
    }
}
