use std::collections::HashMap;

use async_trait::async_trait;
use common::{
    CategoryId, CourseId, EnrollmentId, OrderId, Page, PageRequest, ScheduleId, SectionId,
    SessionId, UserId,
};
use domain::catalog::{
    Category, Course, CourseEnrollment, CourseSchedule, CourseSection, CourseSession, Curriculum,
};
use sqlx::{Postgres, QueryBuilder, Row, postgres::PgRow};

use super::{
    PostgresStore, db_error, id_column, json, limit_offset, money, opt_id_column, page_of, slug,
    text, unsigned,
};
use crate::query::like_pattern;
use crate::{CatalogRepository, CourseQuery, Result, StoreError};

const CATEGORY_COLUMNS: &str = "id, parent_id, name, slug, description, sort_order, seo, \
     is_deleted, created_at, updated_at";

const COURSE_COLUMNS: &str = "id, category_id, instructor_id, title, slug, summary, description, \
     level, language, price_cents, status, seo, is_deleted, published_at, created_at, updated_at";

const SCHEDULE_COLUMNS: &str =
    "id, course_id, label, starts_on, ends_on, capacity, timezone, created_at";

const ENROLLMENT_COLUMNS: &str = "id, course_id, student_id, source, order_id, enrolled_at";

fn category_from_row(row: &PgRow) -> Result<Category> {
    Ok(Category {
        id: CategoryId::from_uuid(id_column(row, "id")?),
        parent_id: opt_id_column(row, "parent_id")?.map(CategoryId::from_uuid),
        name: row.try_get("name")?,
        slug: slug(row, "slug")?,
        description: row.try_get("description")?,
        sort_order: row.try_get("sort_order")?,
        seo: json(row, "seo")?,
        is_deleted: row.try_get("is_deleted")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

pub(super) fn course_from_row(row: &PgRow) -> Result<Course> {
    Ok(Course {
        id: CourseId::from_uuid(id_column(row, "id")?),
        category_id: CategoryId::from_uuid(id_column(row, "category_id")?),
        instructor_id: UserId::from_uuid(id_column(row, "instructor_id")?),
        title: row.try_get("title")?,
        slug: slug(row, "slug")?,
        summary: row.try_get("summary")?,
        description: row.try_get("description")?,
        level: text(row, "level")?,
        language: row.try_get("language")?,
        price: money(row, "price_cents")?,
        status: text(row, "status")?,
        seo: json(row, "seo")?,
        is_deleted: row.try_get("is_deleted")?,
        published_at: row.try_get("published_at")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn schedule_from_row(row: &PgRow) -> Result<CourseSchedule> {
    let capacity: Option<i32> = row.try_get("capacity")?;
    let capacity = capacity
        .map(u32::try_from)
        .transpose()
        .map_err(|e| StoreError::Corrupt(format!("capacity: {e}")))?;
    Ok(CourseSchedule {
        id: ScheduleId::from_uuid(id_column(row, "id")?),
        course_id: CourseId::from_uuid(id_column(row, "course_id")?),
        label: row.try_get("label")?,
        starts_on: row.try_get("starts_on")?,
        ends_on: row.try_get("ends_on")?,
        capacity,
        timezone: row.try_get("timezone")?,
        created_at: row.try_get("created_at")?,
    })
}

pub(super) fn enrollment_from_row(row: &PgRow) -> Result<CourseEnrollment> {
    Ok(CourseEnrollment {
        id: EnrollmentId::from_uuid(id_column(row, "id")?),
        course_id: CourseId::from_uuid(id_column(row, "course_id")?),
        student_id: UserId::from_uuid(id_column(row, "student_id")?),
        source: text(row, "source")?,
        order_id: opt_id_column(row, "order_id")?.map(OrderId::from_uuid),
        enrolled_at: row.try_get("enrolled_at")?,
    })
}

fn as_int(value: u32) -> i32 {
    i32::try_from(value).unwrap_or(i32::MAX)
}

/// Appends the `WHERE` clause shared by the listing and its count.
fn push_course_filters(builder: &mut QueryBuilder<'_, Postgres>, query: &CourseQuery) {
    builder.push(" WHERE NOT is_deleted");
    if !query.include_unpublished {
        builder.push(" AND status = 'Published'");
    }
    if let Some(ids) = &query.category_ids {
        let ids: Vec<_> = ids.iter().map(|id| id.as_uuid()).collect();
        builder.push(" AND category_id = ANY(").push_bind(ids).push(")");
    }
    if let Some(level) = query.level {
        builder.push(" AND level = ").push_bind(level.as_str());
    }
    if let Some(instructor) = query.instructor_id {
        builder
            .push(" AND instructor_id = ")
            .push_bind(instructor.as_uuid());
    }
    if let Some(search) = &query.search {
        let pattern = like_pattern(search);
        builder
            .push(" AND (title ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR summary ILIKE ")
            .push_bind(pattern)
            .push(")");
    }
}

#[async_trait]
impl CatalogRepository for PostgresStore {
    async fn insert_category(&self, category: &Category) -> Result<()> {
        sqlx::query(&format!(
            "INSERT INTO categories ({CATEGORY_COLUMNS}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)"
        ))
        .bind(category.id.as_uuid())
        .bind(category.parent_id.map(|id| id.as_uuid()))
        .bind(&category.name)
        .bind(category.slug.as_str())
        .bind(&category.description)
        .bind(category.sort_order)
        .bind(serde_json::to_value(&category.seo)?)
        .bind(category.is_deleted)
        .bind(category.created_at)
        .bind(category.updated_at)
        .execute(self.pool())
        .await
        .map_err(db_error)?;
        Ok(())
    }

    async fn update_category(&self, category: &Category) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE categories
            SET parent_id = $2, name = $3, slug = $4, description = $5, sort_order = $6,
                seo = $7, is_deleted = $8, updated_at = $9
            WHERE id = $1
            "#,
        )
        .bind(category.id.as_uuid())
        .bind(category.parent_id.map(|id| id.as_uuid()))
        .bind(&category.name)
        .bind(category.slug.as_str())
        .bind(&category.description)
        .bind(category.sort_order)
        .bind(serde_json::to_value(&category.seo)?)
        .bind(category.is_deleted)
        .bind(category.updated_at)
        .execute(self.pool())
        .await
        .map_err(db_error)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::not_found("category", category.id));
        }
        Ok(())
    }

    async fn find_category(&self, id: CategoryId) -> Result<Option<Category>> {
        let row = sqlx::query(&format!("SELECT {CATEGORY_COLUMNS} FROM categories WHERE id = $1"))
            .bind(id.as_uuid())
            .fetch_optional(self.pool())
            .await?;
        row.as_ref().map(category_from_row).transpose()
    }

    async fn find_category_by_slug(&self, slug: &str) -> Result<Option<Category>> {
        let row = sqlx::query(&format!(
            "SELECT {CATEGORY_COLUMNS} FROM categories WHERE slug = $1 AND NOT is_deleted"
        ))
        .bind(slug)
        .fetch_optional(self.pool())
        .await?;
        row.as_ref().map(category_from_row).transpose()
    }

    async fn list_categories(&self) -> Result<Vec<Category>> {
        let rows = sqlx::query(&format!(
            "SELECT {CATEGORY_COLUMNS} FROM categories WHERE NOT is_deleted ORDER BY sort_order, name"
        ))
        .fetch_all(self.pool())
        .await?;
        rows.iter().map(category_from_row).collect()
    }

    async fn category_in_use(&self, id: CategoryId) -> Result<bool> {
        let in_use: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS (SELECT 1 FROM categories WHERE parent_id = $1 AND NOT is_deleted)
                OR EXISTS (SELECT 1 FROM courses WHERE category_id = $1 AND NOT is_deleted)
            "#,
        )
        .bind(id.as_uuid())
        .fetch_one(self.pool())
        .await?;
        Ok(in_use)
    }

    async fn insert_course(&self, course: &Course) -> Result<()> {
        sqlx::query(&format!(
            "INSERT INTO courses ({COURSE_COLUMNS}) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)"
        ))
        .bind(course.id.as_uuid())
        .bind(course.category_id.as_uuid())
        .bind(course.instructor_id.as_uuid())
        .bind(&course.title)
        .bind(course.slug.as_str())
        .bind(&course.summary)
        .bind(&course.description)
        .bind(course.level.as_str())
        .bind(&course.language)
        .bind(course.price.cents())
        .bind(course.status.as_str())
        .bind(serde_json::to_value(&course.seo)?)
        .bind(course.is_deleted)
        .bind(course.published_at)
        .bind(course.created_at)
        .bind(course.updated_at)
        .execute(self.pool())
        .await
        .map_err(db_error)?;
        Ok(())
    }

    async fn update_course(&self, course: &Course) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE courses
            SET category_id = $2, title = $3, slug = $4, summary = $5, description = $6,
                level = $7, language = $8, price_cents = $9, status = $10, seo = $11,
                is_deleted = $12, published_at = $13, updated_at = $14
            WHERE id = $1
            "#,
        )
        .bind(course.id.as_uuid())
        .bind(course.category_id.as_uuid())
        .bind(&course.title)
        .bind(course.slug.as_str())
        .bind(&course.summary)
        .bind(&course.description)
        .bind(course.level.as_str())
        .bind(&course.language)
        .bind(course.price.cents())
        .bind(course.status.as_str())
        .bind(serde_json::to_value(&course.seo)?)
        .bind(course.is_deleted)
        .bind(course.published_at)
        .bind(course.updated_at)
        .execute(self.pool())
        .await
        .map_err(db_error)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::not_found("course", course.id));
        }
        Ok(())
    }

    async fn find_course(&self, id: CourseId) -> Result<Option<Course>> {
        let row = sqlx::query(&format!("SELECT {COURSE_COLUMNS} FROM courses WHERE id = $1"))
            .bind(id.as_uuid())
            .fetch_optional(self.pool())
            .await?;
        row.as_ref().map(course_from_row).transpose()
    }

    async fn find_course_by_slug(&self, slug: &str) -> Result<Option<Course>> {
        let row = sqlx::query(&format!(
            "SELECT {COURSE_COLUMNS} FROM courses WHERE slug = $1 AND NOT is_deleted"
        ))
        .bind(slug)
        .fetch_optional(self.pool())
        .await?;
        row.as_ref().map(course_from_row).transpose()
    }

    async fn find_courses(&self, ids: &[CourseId]) -> Result<Vec<Course>> {
        let ids: Vec<_> = ids.iter().map(|id| id.as_uuid()).collect();
        let rows = sqlx::query(&format!(
            "SELECT {COURSE_COLUMNS} FROM courses WHERE id = ANY($1)"
        ))
        .bind(ids)
        .fetch_all(self.pool())
        .await?;
        rows.iter().map(course_from_row).collect()
    }

    async fn list_courses(&self, query: &CourseQuery, page: PageRequest) -> Result<Page<Course>> {
        let mut count = QueryBuilder::new("SELECT COUNT(*) FROM courses");
        push_course_filters(&mut count, query);
        let total: i64 = count
            .build_query_scalar()
            .fetch_one(self.pool())
            .await?;

        let (limit, offset) = limit_offset(page);
        let mut select = QueryBuilder::new(format!("SELECT {COURSE_COLUMNS} FROM courses"));
        push_course_filters(&mut select, query);
        select
            .push(" ORDER BY published_at DESC NULLS LAST, title ASC LIMIT ")
            .push_bind(limit)
            .push(" OFFSET ")
            .push_bind(offset);

        let rows = select.build().fetch_all(self.pool()).await?;
        let courses = rows.iter().map(course_from_row).collect::<Result<_>>()?;
        Ok(page_of(page, courses, total))
    }

    async fn load_curriculum(&self, course_id: CourseId) -> Result<Curriculum> {
        let section_rows = sqlx::query(
            "SELECT id, course_id, title, position FROM course_sections WHERE course_id = $1",
        )
        .bind(course_id.as_uuid())
        .fetch_all(self.pool())
        .await?;

        let session_rows = sqlx::query(
            r#"
            SELECT s.id, s.section_id, s.title, s.duration_minutes, s.position, s.is_preview,
                   s.content_url
            FROM course_sessions s
            JOIN course_sections c ON c.id = s.section_id
            WHERE c.course_id = $1
            "#,
        )
        .bind(course_id.as_uuid())
        .fetch_all(self.pool())
        .await?;

        let mut sessions: HashMap<SectionId, Vec<CourseSession>> = HashMap::new();
        for row in &session_rows {
            let section_id = SectionId::from_uuid(id_column(row, "section_id")?);
            sessions.entry(section_id).or_default().push(CourseSession {
                id: SessionId::from_uuid(id_column(row, "id")?),
                section_id,
                title: row.try_get("title")?,
                duration_minutes: unsigned(row, "duration_minutes")?,
                position: unsigned(row, "position")?,
                is_preview: row.try_get("is_preview")?,
                content_url: row.try_get("content_url")?,
            });
        }

        let sections = section_rows
            .iter()
            .map(|row| -> Result<CourseSection> {
                let id = SectionId::from_uuid(id_column(row, "id")?);
                Ok(CourseSection {
                    id,
                    course_id,
                    title: row.try_get("title")?,
                    position: unsigned(row, "position")?,
                    sessions: sessions.remove(&id).unwrap_or_default(),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Curriculum::from_parts(course_id, sections))
    }

    async fn save_curriculum(&self, curriculum: &Curriculum) -> Result<()> {
        let mut tx = self.pool().begin().await?;

        // Sessions go with their sections.
        sqlx::query("DELETE FROM course_sections WHERE course_id = $1")
            .bind(curriculum.course_id.as_uuid())
            .execute(&mut *tx)
            .await?;

        for section in &curriculum.sections {
            sqlx::query(
                "INSERT INTO course_sections (id, course_id, title, position) VALUES ($1, $2, $3, $4)",
            )
            .bind(section.id.as_uuid())
            .bind(curriculum.course_id.as_uuid())
            .bind(&section.title)
            .bind(as_int(section.position))
            .execute(&mut *tx)
            .await
            .map_err(db_error)?;

            for session in &section.sessions {
                sqlx::query(
                    r#"
                    INSERT INTO course_sessions
                        (id, section_id, title, duration_minutes, position, is_preview, content_url)
                    VALUES ($1, $2, $3, $4, $5, $6, $7)
                    "#,
                )
                .bind(session.id.as_uuid())
                .bind(section.id.as_uuid())
                .bind(&session.title)
                .bind(as_int(session.duration_minutes))
                .bind(as_int(session.position))
                .bind(session.is_preview)
                .bind(&session.content_url)
                .execute(&mut *tx)
                .await
                .map_err(db_error)?;
            }
        }

        tx.commit().await?;
        Ok(())
    }

    async fn course_of_section(&self, id: SectionId) -> Result<Option<CourseId>> {
        let course: Option<uuid::Uuid> =
            sqlx::query_scalar("SELECT course_id FROM course_sections WHERE id = $1")
                .bind(id.as_uuid())
                .fetch_optional(self.pool())
                .await?;
        Ok(course.map(CourseId::from_uuid))
    }

    async fn course_of_session(&self, id: SessionId) -> Result<Option<CourseId>> {
        let course: Option<uuid::Uuid> = sqlx::query_scalar(
            r#"
            SELECT c.course_id
            FROM course_sessions s
            JOIN course_sections c ON c.id = s.section_id
            WHERE s.id = $1
            "#,
        )
        .bind(id.as_uuid())
        .fetch_optional(self.pool())
        .await?;
        Ok(course.map(CourseId::from_uuid))
    }

    async fn insert_schedule(&self, schedule: &CourseSchedule) -> Result<()> {
        sqlx::query(&format!(
            "INSERT INTO course_schedules ({SCHEDULE_COLUMNS}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)"
        ))
        .bind(schedule.id.as_uuid())
        .bind(schedule.course_id.as_uuid())
        .bind(&schedule.label)
        .bind(schedule.starts_on)
        .bind(schedule.ends_on)
        .bind(schedule.capacity.map(as_int))
        .bind(&schedule.timezone)
        .bind(schedule.created_at)
        .execute(self.pool())
        .await
        .map_err(db_error)?;
        Ok(())
    }

    async fn find_schedule(&self, id: ScheduleId) -> Result<Option<CourseSchedule>> {
        let row = sqlx::query(&format!(
            "SELECT {SCHEDULE_COLUMNS} FROM course_schedules WHERE id = $1"
        ))
        .bind(id.as_uuid())
        .fetch_optional(self.pool())
        .await?;
        row.as_ref().map(schedule_from_row).transpose()
    }

    async fn delete_schedule(&self, id: ScheduleId) -> Result<()> {
        let result = sqlx::query("DELETE FROM course_schedules WHERE id = $1")
            .bind(id.as_uuid())
            .execute(self.pool())
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::not_found("schedule", id));
        }
        Ok(())
    }

    async fn list_schedules(&self, course_id: CourseId) -> Result<Vec<CourseSchedule>> {
        let rows = sqlx::query(&format!(
            "SELECT {SCHEDULE_COLUMNS} FROM course_schedules WHERE course_id = $1 ORDER BY starts_on, label"
        ))
        .bind(course_id.as_uuid())
        .fetch_all(self.pool())
        .await?;
        rows.iter().map(schedule_from_row).collect()
    }

    async fn insert_enrollment(&self, enrollment: &CourseEnrollment) -> Result<()> {
        sqlx::query(&format!(
            "INSERT INTO course_enrollments ({ENROLLMENT_COLUMNS}) VALUES ($1, $2, $3, $4, $5, $6)"
        ))
        .bind(enrollment.id.as_uuid())
        .bind(enrollment.course_id.as_uuid())
        .bind(enrollment.student_id.as_uuid())
        .bind(enrollment.source.as_str())
        .bind(enrollment.order_id.map(|id| id.as_uuid()))
        .bind(enrollment.enrolled_at)
        .execute(self.pool())
        .await
        .map_err(db_error)?;
        Ok(())
    }

    async fn find_enrollment(
        &self,
        course_id: CourseId,
        student_id: UserId,
    ) -> Result<Option<CourseEnrollment>> {
        let row = sqlx::query(&format!(
            "SELECT {ENROLLMENT_COLUMNS} FROM course_enrollments WHERE course_id = $1 AND student_id = $2"
        ))
        .bind(course_id.as_uuid())
        .bind(student_id.as_uuid())
        .fetch_optional(self.pool())
        .await?;
        row.as_ref().map(enrollment_from_row).transpose()
    }

    async fn list_enrollments(&self, student_id: UserId) -> Result<Vec<CourseEnrollment>> {
        let rows = sqlx::query(&format!(
            "SELECT {ENROLLMENT_COLUMNS} FROM course_enrollments WHERE student_id = $1 ORDER BY enrolled_at DESC"
        ))
        .bind(student_id.as_uuid())
        .fetch_all(self.pool())
        .await?;
        rows.iter().map(enrollment_from_row).collect()
    }
}
