//! Categories, courses, curricula, schedules and enrollments.

use chrono::Utc;
use common::{CategoryId, CourseId, OrderId, Page, PageRequest, ScheduleId, SectionId, SessionId, UserId};
use domain::catalog::{
    CatalogError, Category, CategoryDetails, CategoryNode, Course, CourseDetails, CourseEnrollment,
    CourseLevel, CourseSchedule, CourseSection, Curriculum, EnrollmentSource, ScheduleDetails,
    SessionDetails, build_tree, descendant_ids,
};
use domain::seo::SlugRedirect;
use serde::Serialize;
use store::{CourseQuery, Store, StoreError, constraints};

use super::seo::{Lookup, follow_redirects};
use crate::auth::Actor;
use crate::error::{ApplicationError, Result};

/// Filters for the public course listing.
#[derive(Debug, Clone, Default)]
pub struct CourseFilter {
    /// Category slug; courses of its subcategories match too.
    pub category: Option<String>,
    pub search: Option<String>,
    pub level: Option<CourseLevel>,
    pub instructor: Option<UserId>,
    /// Admins only.
    pub include_unpublished: bool,
}

/// A course page: the course with its curriculum and schedules.
#[derive(Debug, Clone, Serialize)]
pub struct CourseDetail {
    #[serde(flatten)]
    pub course: Course,
    pub sections: Vec<CourseSection>,
    pub schedules: Vec<CourseSchedule>,
    pub session_count: usize,
    pub total_minutes: u32,
}

/// A category page.
#[derive(Debug, Clone, Serialize)]
pub struct CategoryPage {
    #[serde(flatten)]
    pub category: Category,
    pub children: Vec<Category>,
}

#[derive(Clone)]
pub struct CatalogService<S> {
    store: S,
}

impl<S: Store> CatalogService<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    // --- categories ---

    #[tracing::instrument(skip(self, admin, details), fields(admin_id = %admin.user_id))]
    pub async fn create_category(&self, admin: &Actor, details: CategoryDetails) -> Result<Category> {
        admin.require_admin()?;
        if let Some(parent_id) = details.parent_id
            && self.find_live_category(parent_id).await?.is_none()
        {
            return Err(CatalogError::ParentUnavailable(parent_id).into());
        }
        let category = Category::create(details, Utc::now())?;
        self.store
            .insert_category(&category)
            .await
            .map_err(|e| slug_conflict(e, constraints::CATEGORIES_SLUG_ACTIVE, "category"))?;
        tracing::info!(category_id = %category.id, slug = %category.slug, "category created");
        Ok(category)
    }

    /// Updates a category. A slug change leaves a redirect from the old path.
    #[tracing::instrument(skip(self, admin, details), fields(admin_id = %admin.user_id))]
    pub async fn update_category(
        &self,
        admin: &Actor,
        id: CategoryId,
        details: CategoryDetails,
    ) -> Result<Category> {
        admin.require_admin()?;
        let mut category = self.live_category(id).await?;

        let all = self.store.list_categories().await?;
        let lineage = match details.parent_id {
            Some(parent_id) => {
                if !all.iter().any(|c| c.id == parent_id && !c.is_deleted) {
                    return Err(CatalogError::ParentUnavailable(parent_id).into());
                }
                lineage(&all, parent_id)
            }
            None => Vec::new(),
        };

        let now = Utc::now();
        let previous = category.update(details, &lineage, now)?;
        self.store
            .update_category(&category)
            .await
            .map_err(|e| slug_conflict(e, constraints::CATEGORIES_SLUG_ACTIVE, "category"))?;

        if let Some(old) = previous {
            let redirect =
                SlugRedirect::for_slug_change("/categories", old.as_str(), category.slug.as_str(), now)?;
            self.store.save_redirect(&redirect).await?;
            tracing::info!(from = %redirect.from_path, to = %redirect.to_path, "category slug changed");
        }
        Ok(category)
    }

    #[tracing::instrument(skip(self, admin), fields(admin_id = %admin.user_id))]
    pub async fn delete_category(&self, admin: &Actor, id: CategoryId) -> Result<()> {
        admin.require_admin()?;
        let mut category = self.live_category(id).await?;
        let in_use = self.store.category_in_use(id).await?;
        category.soft_delete(in_use, Utc::now())?;
        self.store.update_category(&category).await?;
        tracing::info!(category_id = %id, "category deleted");
        Ok(())
    }

    pub async fn category_tree(&self) -> Result<Vec<CategoryNode>> {
        Ok(build_tree(self.store.list_categories().await?))
    }

    pub async fn get_category_by_slug(&self, slug: &str) -> Result<Lookup<CategoryPage>> {
        if let Some(category) = self.store.find_category_by_slug(slug).await? {
            let children = self
                .store
                .list_categories()
                .await?
                .into_iter()
                .filter(|c| c.parent_id == Some(category.id))
                .collect();
            return Ok(Lookup::Found(CategoryPage { category, children }));
        }
        self.redirect_or_not_found(&format!("/categories/{slug}"), "category", slug)
            .await
    }

    // --- courses ---

    #[tracing::instrument(skip(self, actor, details), fields(user_id = %actor.user_id))]
    pub async fn create_course(&self, actor: &Actor, details: CourseDetails) -> Result<Course> {
        actor.require_instructor()?;
        self.ensure_category(details.category_id).await?;
        let course = Course::create(actor.user_id, details, Utc::now())?;
        self.store
            .insert_course(&course)
            .await
            .map_err(|e| slug_conflict(e, constraints::COURSES_SLUG_ACTIVE, "course"))?;
        metrics::counter!("courses_created_total").increment(1);
        tracing::info!(course_id = %course.id, slug = %course.slug, "course created");
        Ok(course)
    }

    /// Updates a course. A slug change leaves a redirect from the old path.
    #[tracing::instrument(skip(self, actor, details), fields(user_id = %actor.user_id))]
    pub async fn update_course(
        &self,
        actor: &Actor,
        id: CourseId,
        details: CourseDetails,
    ) -> Result<Course> {
        let mut course = self.editable_course(actor, id).await?;
        if details.category_id != course.category_id {
            self.ensure_category(details.category_id).await?;
        }

        let now = Utc::now();
        let previous = course.update(details, now)?;
        self.store
            .update_course(&course)
            .await
            .map_err(|e| slug_conflict(e, constraints::COURSES_SLUG_ACTIVE, "course"))?;

        if let Some(old) = previous {
            let redirect =
                SlugRedirect::for_slug_change("/courses", old.as_str(), course.slug.as_str(), now)?;
            self.store.save_redirect(&redirect).await?;
            tracing::info!(from = %redirect.from_path, to = %redirect.to_path, "course slug changed");
        }
        Ok(course)
    }

    #[tracing::instrument(skip(self, actor), fields(user_id = %actor.user_id))]
    pub async fn publish_course(&self, actor: &Actor, id: CourseId) -> Result<Course> {
        let mut course = self.editable_course(actor, id).await?;
        let curriculum = self.store.load_curriculum(id).await?;
        course.publish(curriculum.has_content(), Utc::now())?;
        self.store.update_course(&course).await?;
        metrics::counter!("courses_published_total").increment(1);
        tracing::info!(course_id = %id, "course published");
        Ok(course)
    }

    #[tracing::instrument(skip(self, actor), fields(user_id = %actor.user_id))]
    pub async fn archive_course(&self, actor: &Actor, id: CourseId) -> Result<Course> {
        let mut course = self.editable_course(actor, id).await?;
        course.archive(Utc::now())?;
        self.store.update_course(&course).await?;
        tracing::info!(course_id = %id, "course archived");
        Ok(course)
    }

    #[tracing::instrument(skip(self, actor), fields(user_id = %actor.user_id))]
    pub async fn delete_course(&self, actor: &Actor, id: CourseId) -> Result<()> {
        let mut course = self.editable_course(actor, id).await?;
        course.soft_delete(Utc::now())?;
        self.store.update_course(&course).await?;
        tracing::info!(course_id = %id, "course deleted");
        Ok(())
    }

    /// Brings a deleted course back as a draft. Fails if its slug was taken
    /// in the meantime.
    #[tracing::instrument(skip(self, admin), fields(admin_id = %admin.user_id))]
    pub async fn restore_course(&self, admin: &Actor, id: CourseId) -> Result<Course> {
        admin.require_admin()?;
        let mut course = self
            .store
            .find_course(id)
            .await?
            .ok_or_else(|| ApplicationError::not_found("course", id))?;
        course.restore(Utc::now())?;
        self.store
            .update_course(&course)
            .await
            .map_err(|e| slug_conflict(e, constraints::COURSES_SLUG_ACTIVE, "course"))?;
        tracing::info!(course_id = %id, "course restored");
        Ok(course)
    }

    /// A course as its owner or an admin sees it, whatever its status.
    pub async fn get_course(&self, actor: &Actor, id: CourseId) -> Result<Course> {
        self.editable_course(actor, id).await
    }

    /// A published course by slug, or a redirect when the slug moved.
    pub async fn get_course_by_slug(&self, slug: &str) -> Result<Lookup<Course>> {
        if let Some(course) = self.store.find_course_by_slug(slug).await?
            && course.is_visible()
        {
            return Ok(Lookup::Found(course));
        }
        self.redirect_or_not_found(&format!("/courses/{slug}"), "course", slug)
            .await
    }

    pub async fn course_detail(&self, slug: &str) -> Result<Lookup<CourseDetail>> {
        let course = match self.get_course_by_slug(slug).await? {
            Lookup::Found(course) => course,
            Lookup::Redirect(target) => return Ok(Lookup::Redirect(target)),
        };
        let curriculum = self.store.load_curriculum(course.id).await?;
        let schedules = self.store.list_schedules(course.id).await?;
        Ok(Lookup::Found(CourseDetail {
            session_count: curriculum.session_count(),
            total_minutes: curriculum.total_minutes(),
            course,
            sections: curriculum.sections,
            schedules,
        }))
    }

    #[tracing::instrument(skip(self, actor, page))]
    pub async fn list_courses(
        &self,
        actor: Option<&Actor>,
        filter: CourseFilter,
        page: PageRequest,
    ) -> Result<Page<Course>> {
        if filter.include_unpublished && !actor.is_some_and(Actor::is_admin) {
            return Err(ApplicationError::forbidden(
                "only admins may list unpublished courses",
            ));
        }

        let mut query = CourseQuery::new().include_unpublished(filter.include_unpublished);
        if let Some(slug) = &filter.category {
            let all = self.store.list_categories().await?;
            let Some(root) = all.iter().find(|c| c.slug.as_str() == slug) else {
                return Ok(page.paginate(Vec::new()));
            };
            query = query.categories(descendant_ids(&all, root.id));
        }
        if let Some(text) = filter.search {
            query = query.search(text);
        }
        if let Some(level) = filter.level {
            query = query.level(level);
        }
        if let Some(instructor) = filter.instructor {
            query = query.instructor(instructor);
        }

        Ok(self.store.list_courses(&query, page).await?)
    }

    // --- curriculum ---

    pub async fn curriculum(&self, actor: &Actor, course_id: CourseId) -> Result<Curriculum> {
        self.editable_course(actor, course_id).await?;
        Ok(self.store.load_curriculum(course_id).await?)
    }

    #[tracing::instrument(skip(self, actor), fields(user_id = %actor.user_id))]
    pub async fn add_section(
        &self,
        actor: &Actor,
        course_id: CourseId,
        title: &str,
    ) -> Result<Curriculum> {
        self.edit_curriculum(actor, course_id, |c| c.add_section(title).map(drop))
            .await
    }

    #[tracing::instrument(skip(self, actor), fields(user_id = %actor.user_id))]
    pub async fn rename_section(
        &self,
        actor: &Actor,
        section_id: SectionId,
        title: &str,
    ) -> Result<Curriculum> {
        let course_id = self.course_of_section(section_id).await?;
        self.edit_curriculum(actor, course_id, |c| c.rename_section(section_id, title))
            .await
    }

    #[tracing::instrument(skip(self, actor), fields(user_id = %actor.user_id))]
    pub async fn move_section(
        &self,
        actor: &Actor,
        section_id: SectionId,
        position: u32,
    ) -> Result<Curriculum> {
        let course_id = self.course_of_section(section_id).await?;
        self.edit_curriculum(actor, course_id, |c| c.move_section(section_id, position))
            .await
    }

    #[tracing::instrument(skip(self, actor), fields(user_id = %actor.user_id))]
    pub async fn remove_section(&self, actor: &Actor, section_id: SectionId) -> Result<Curriculum> {
        let course_id = self.course_of_section(section_id).await?;
        self.edit_curriculum(actor, course_id, |c| c.remove_section(section_id).map(drop))
            .await
    }

    #[tracing::instrument(skip(self, actor, details), fields(user_id = %actor.user_id))]
    pub async fn add_session(
        &self,
        actor: &Actor,
        section_id: SectionId,
        details: SessionDetails,
    ) -> Result<Curriculum> {
        let course_id = self.course_of_section(section_id).await?;
        self.edit_curriculum(actor, course_id, |c| {
            c.add_session(section_id, details).map(drop)
        })
        .await
    }

    #[tracing::instrument(skip(self, actor), fields(user_id = %actor.user_id))]
    pub async fn move_session(
        &self,
        actor: &Actor,
        session_id: SessionId,
        position: u32,
    ) -> Result<Curriculum> {
        let course_id = self.course_of_session(session_id).await?;
        self.edit_curriculum(actor, course_id, |c| c.move_session(session_id, position))
            .await
    }

    #[tracing::instrument(skip(self, actor), fields(user_id = %actor.user_id))]
    pub async fn remove_session(&self, actor: &Actor, session_id: SessionId) -> Result<Curriculum> {
        let course_id = self.course_of_session(session_id).await?;
        self.edit_curriculum(actor, course_id, |c| c.remove_session(session_id).map(drop))
            .await
    }

    // --- schedules ---

    #[tracing::instrument(skip(self, actor, details), fields(user_id = %actor.user_id))]
    pub async fn add_schedule(
        &self,
        actor: &Actor,
        course_id: CourseId,
        details: ScheduleDetails,
    ) -> Result<CourseSchedule> {
        self.editable_course(actor, course_id).await?;
        let schedule = CourseSchedule::create(course_id, details, Utc::now())?;
        self.store.insert_schedule(&schedule).await?;
        Ok(schedule)
    }

    #[tracing::instrument(skip(self, actor), fields(user_id = %actor.user_id))]
    pub async fn remove_schedule(&self, actor: &Actor, id: ScheduleId) -> Result<()> {
        let schedule = self
            .store
            .find_schedule(id)
            .await?
            .ok_or_else(|| ApplicationError::not_found("schedule", id))?;
        self.editable_course(actor, schedule.course_id).await?;
        self.store.delete_schedule(id).await?;
        Ok(())
    }

    pub async fn list_schedules(&self, course_id: CourseId) -> Result<Vec<CourseSchedule>> {
        Ok(self.store.list_schedules(course_id).await?)
    }

    // --- enrollments ---

    /// Enrolls a student. An existing enrollment is returned unchanged.
    #[tracing::instrument(skip(self))]
    pub async fn enroll(
        &self,
        course_id: CourseId,
        student_id: UserId,
        source: EnrollmentSource,
        order_id: Option<OrderId>,
    ) -> Result<CourseEnrollment> {
        if let Some(existing) = self.store.find_enrollment(course_id, student_id).await? {
            return Ok(existing);
        }
        let enrollment = CourseEnrollment::new(course_id, student_id, source, order_id, Utc::now());
        match self.store.insert_enrollment(&enrollment).await {
            Ok(()) => {
                metrics::counter!("enrollments_total", "source" => source.as_str()).increment(1);
                Ok(enrollment)
            }
            Err(e) if e.is_unique_violation(constraints::COURSE_ENROLLMENTS_COURSE_STUDENT) => self
                .store
                .find_enrollment(course_id, student_id)
                .await?
                .ok_or_else(|| ApplicationError::not_found("enrollment", course_id)),
            Err(e) => Err(e.into()),
        }
    }

    /// Enrolls the caller in a free published course.
    #[tracing::instrument(skip(self, actor), fields(user_id = %actor.user_id))]
    pub async fn enroll_free(&self, actor: &Actor, course_id: CourseId) -> Result<CourseEnrollment> {
        let course = self.visible_course(course_id).await?;
        if !course.is_free() {
            return Err(ApplicationError::Conflict(format!(
                "course {course_id} must be purchased"
            )));
        }
        self.enroll(course_id, actor.user_id, EnrollmentSource::Free, None)
            .await
    }

    /// Grants a course to a student without payment.
    #[tracing::instrument(skip(self, admin), fields(admin_id = %admin.user_id))]
    pub async fn admin_enroll(
        &self,
        admin: &Actor,
        course_id: CourseId,
        student_id: UserId,
    ) -> Result<CourseEnrollment> {
        admin.require_admin()?;
        let course = self
            .store
            .find_course(course_id)
            .await?
            .ok_or_else(|| ApplicationError::not_found("course", course_id))?;
        course.ensure_not_deleted()?;
        if self.store.find_user(student_id).await?.is_none() {
            return Err(ApplicationError::not_found("user", student_id));
        }
        self.enroll(course_id, student_id, EnrollmentSource::Admin, None)
            .await
    }

    pub async fn list_enrollments(&self, student_id: UserId) -> Result<Vec<CourseEnrollment>> {
        Ok(self.store.list_enrollments(student_id).await?)
    }

    pub async fn is_enrolled(&self, course_id: CourseId, student_id: UserId) -> Result<bool> {
        Ok(self
            .store
            .find_enrollment(course_id, student_id)
            .await?
            .is_some())
    }

    // --- helpers ---

    async fn find_live_category(&self, id: CategoryId) -> Result<Option<Category>> {
        Ok(self.store.find_category(id).await?.filter(|c| !c.is_deleted))
    }

    async fn live_category(&self, id: CategoryId) -> Result<Category> {
        self.find_live_category(id)
            .await?
            .ok_or_else(|| ApplicationError::not_found("category", id))
    }

    async fn ensure_category(&self, id: CategoryId) -> Result<()> {
        match self.find_live_category(id).await? {
            Some(_) => Ok(()),
            None => Err(ApplicationError::Validation(format!(
                "category {id} does not exist"
            ))),
        }
    }

    /// Loads a live course the actor may change.
    async fn editable_course(&self, actor: &Actor, id: CourseId) -> Result<Course> {
        let course = self
            .store
            .find_course(id)
            .await?
            .filter(|c| !c.is_deleted)
            .ok_or_else(|| ApplicationError::not_found("course", id))?;
        course.ensure_editable_by(actor.user_id, actor.is_admin())?;
        Ok(course)
    }

    async fn visible_course(&self, id: CourseId) -> Result<Course> {
        self.store
            .find_course(id)
            .await?
            .filter(Course::is_visible)
            .ok_or_else(|| ApplicationError::not_found("course", id))
    }

    async fn course_of_section(&self, id: SectionId) -> Result<CourseId> {
        self.store
            .course_of_section(id)
            .await?
            .ok_or_else(|| ApplicationError::not_found("section", id))
    }

    async fn course_of_session(&self, id: SessionId) -> Result<CourseId> {
        self.store
            .course_of_session(id)
            .await?
            .ok_or_else(|| ApplicationError::not_found("session", id))
    }

    async fn edit_curriculum<F>(&self, actor: &Actor, course_id: CourseId, edit: F) -> Result<Curriculum>
    where
        F: FnOnce(&mut Curriculum) -> std::result::Result<(), CatalogError>,
    {
        self.editable_course(actor, course_id).await?;
        let mut curriculum = self.store.load_curriculum(course_id).await?;
        edit(&mut curriculum)?;
        self.store.save_curriculum(&curriculum).await?;
        Ok(curriculum)
    }

    async fn redirect_or_not_found<T>(
        &self,
        path: &str,
        entity: &'static str,
        slug: &str,
    ) -> Result<Lookup<T>> {
        match follow_redirects(&self.store, path).await? {
            Some(target) => Ok(Lookup::Redirect(target)),
            None => Err(ApplicationError::not_found(entity, slug)),
        }
    }
}

/// The category `id` followed by its ancestors.
fn lineage(categories: &[Category], id: CategoryId) -> Vec<CategoryId> {
    let mut chain = vec![id];
    let mut current = categories.iter().find(|c| c.id == id);
    while let Some(parent_id) = current.and_then(|c| c.parent_id) {
        if chain.contains(&parent_id) {
            break;
        }
        chain.push(parent_id);
        current = categories.iter().find(|c| c.id == parent_id);
    }
    chain
}

fn slug_conflict(error: StoreError, constraint: &str, entity: &str) -> ApplicationError {
    if error.is_unique_violation(constraint) {
        ApplicationError::Conflict(format!("{entity} slug is already in use"))
    } else {
        error.into()
    }
}

#[cfg(test)]
mod tests {
    use common::Money;
    use domain::identity::Role;
    use store::InMemoryStore;

    use super::*;

    struct Fixture {
        service: CatalogService<InMemoryStore>,
        admin: Actor,
        instructor: Actor,
    }

    fn fixture() -> Fixture {
        Fixture {
            service: CatalogService::new(InMemoryStore::new()),
            admin: Actor::new(UserId::new(), [Role::Student, Role::Admin]),
            instructor: Actor::new(UserId::new(), [Role::Student, Role::Instructor]),
        }
    }

    fn category(name: &str, parent_id: Option<CategoryId>) -> CategoryDetails {
        CategoryDetails {
            parent_id,
            name: name.to_string(),
            ..CategoryDetails::default()
        }
    }

    fn course(category_id: CategoryId, title: &str) -> CourseDetails {
        CourseDetails {
            category_id,
            title: title.to_string(),
            slug: None,
            summary: "Learn things".to_string(),
            description: String::new(),
            level: CourseLevel::Beginner,
            language: "en".to_string(),
            price: Money::from_cents(1999),
            seo: Default::default(),
        }
    }

    #[tokio::test]
    async fn reparenting_under_a_descendant_is_rejected() {
        let f = fixture();
        let root = f.service.create_category(&f.admin, category("Programming", None)).await.unwrap();
        let child = f
            .service
            .create_category(&f.admin, category("Rust", Some(root.id)))
            .await
            .unwrap();

        let err = f
            .service
            .update_category(&f.admin, root.id, category("Programming", Some(child.id)))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::Conflict);
    }

    #[tokio::test]
    async fn renamed_category_redirects() {
        let f = fixture();
        let rust = f.service.create_category(&f.admin, category("Rust", None)).await.unwrap();
        f.service
            .update_category(&f.admin, rust.id, category("Rust Lang", None))
            .await
            .unwrap();

        match f.service.get_category_by_slug("rust").await.unwrap() {
            Lookup::Redirect(target) => assert_eq!(target.location, "/categories/rust-lang"),
            Lookup::Found(_) => panic!("expected a redirect"),
        }
    }

    #[tokio::test]
    async fn category_with_courses_cannot_be_deleted() {
        let f = fixture();
        let rust = f.service.create_category(&f.admin, category("Rust", None)).await.unwrap();
        f.service
            .create_course(&f.instructor, course(rust.id, "Intro to Rust"))
            .await
            .unwrap();

        let err = f.service.delete_category(&f.admin, rust.id).await.unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::Conflict);
    }

    #[tokio::test]
    async fn only_the_owner_edits_a_course() {
        let f = fixture();
        let rust = f.service.create_category(&f.admin, category("Rust", None)).await.unwrap();
        let created = f
            .service
            .create_course(&f.instructor, course(rust.id, "Intro to Rust"))
            .await
            .unwrap();
        let other = Actor::new(UserId::new(), [Role::Student, Role::Instructor]);

        let err = f
            .service
            .archive_course(&other, created.id)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::Forbidden);
        f.service.archive_course(&f.admin, created.id).await.unwrap();
    }

    #[tokio::test]
    async fn students_cannot_create_courses() {
        let f = fixture();
        let rust = f.service.create_category(&f.admin, category("Rust", None)).await.unwrap();
        let student = Actor::new(UserId::new(), [Role::Student]);

        let err = f
            .service
            .create_course(&student, course(rust.id, "Intro to Rust"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::Forbidden);
    }

    #[tokio::test]
    async fn publishing_needs_a_session() {
        let f = fixture();
        let rust = f.service.create_category(&f.admin, category("Rust", None)).await.unwrap();
        let created = f
            .service
            .create_course(&f.instructor, course(rust.id, "Intro to Rust"))
            .await
            .unwrap();

        let curriculum = f
            .service
            .add_section(&f.instructor, created.id, "Basics")
            .await
            .unwrap();
        assert!(f.service.publish_course(&f.instructor, created.id).await.is_err());

        let section_id = curriculum.sections[0].id;
        f.service
            .add_session(
                &f.instructor,
                section_id,
                SessionDetails {
                    title: "Hello".to_string(),
                    duration_minutes: 10,
                    is_preview: true,
                    content_url: None,
                },
            )
            .await
            .unwrap();
        let published = f.service.publish_course(&f.instructor, created.id).await.unwrap();
        assert!(published.published_at.is_some());
    }

    #[tokio::test]
    async fn sections_stay_densely_numbered() {
        let f = fixture();
        let rust = f.service.create_category(&f.admin, category("Rust", None)).await.unwrap();
        let created = f
            .service
            .create_course(&f.instructor, course(rust.id, "Intro to Rust"))
            .await
            .unwrap();
        for title in ["One", "Two", "Three"] {
            f.service
                .add_section(&f.instructor, created.id, title)
                .await
                .unwrap();
        }
        let curriculum = f.service.curriculum(&f.instructor, created.id).await.unwrap();
        let three = curriculum.sections[2].id;
        let one = curriculum.sections[0].id;

        f.service.move_section(&f.instructor, three, 0).await.unwrap();
        let curriculum = f.service.remove_section(&f.instructor, one).await.unwrap();

        let titles: Vec<_> = curriculum.sections.iter().map(|s| s.title.as_str()).collect();
        let positions: Vec<_> = curriculum.sections.iter().map(|s| s.position).collect();
        assert_eq!(titles, ["Three", "Two"]);
        assert_eq!(positions, [0, 1]);
    }

    #[tokio::test]
    async fn unpublished_listing_is_admin_only() {
        let f = fixture();
        let filter = CourseFilter {
            include_unpublished: true,
            ..CourseFilter::default()
        };

        let err = f
            .service
            .list_courses(Some(&f.instructor), filter.clone(), PageRequest::default())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::Forbidden);
        assert!(
            f.service
                .list_courses(Some(&f.admin), filter, PageRequest::default())
                .await
                .is_ok()
        );
    }

    #[tokio::test]
    async fn enroll_is_idempotent() {
        let f = fixture();
        let course_id = CourseId::new();
        let student = UserId::new();

        let first = f
            .service
            .enroll(course_id, student, EnrollmentSource::Admin, None)
            .await
            .unwrap();
        let second = f
            .service
            .enroll(course_id, student, EnrollmentSource::Free, None)
            .await
            .unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(second.source, EnrollmentSource::Admin);
    }
}
