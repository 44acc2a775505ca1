//! Course entity and its publication state machine.

use chrono::{DateTime, Utc};
use common::{CategoryId, CourseId, Money, UserId};
use serde::{Deserialize, Serialize};

use super::{CatalogError, validated_text};
use crate::seo::SeoMetadata;
use crate::slug::Slug;

/// The publication state of a course.
///
/// State transitions:
/// ```text
/// Draft ──► Published ◄──► Archived
///   └────────────────────────▲
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum CourseStatus {
    /// Being authored, not visible in the catalog.
    #[default]
    Draft,

    /// Visible and purchasable.
    Published,

    /// Hidden from the catalog; existing enrollments keep access.
    Archived,
}

impl CourseStatus {
    pub fn can_publish(&self) -> bool {
        matches!(self, CourseStatus::Draft | CourseStatus::Archived)
    }

    pub fn can_archive(&self) -> bool {
        matches!(self, CourseStatus::Draft | CourseStatus::Published)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CourseStatus::Draft => "Draft",
            CourseStatus::Published => "Published",
            CourseStatus::Archived => "Archived",
        }
    }
}

impl std::fmt::Display for CourseStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for CourseStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Draft" => Ok(CourseStatus::Draft),
            "Published" => Ok(CourseStatus::Published),
            "Archived" => Ok(CourseStatus::Archived),
            other => Err(format!("unknown course status '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum CourseLevel {
    Beginner,
    Intermediate,
    Advanced,
    #[default]
    AllLevels,
}

impl CourseLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            CourseLevel::Beginner => "Beginner",
            CourseLevel::Intermediate => "Intermediate",
            CourseLevel::Advanced => "Advanced",
            CourseLevel::AllLevels => "AllLevels",
        }
    }
}

impl std::str::FromStr for CourseLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Beginner" => Ok(CourseLevel::Beginner),
            "Intermediate" => Ok(CourseLevel::Intermediate),
            "Advanced" => Ok(CourseLevel::Advanced),
            "AllLevels" => Ok(CourseLevel::AllLevels),
            other => Err(format!("unknown course level '{other}'")),
        }
    }
}

/// Editable fields of a course.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CourseDetails {
    pub category_id: CategoryId,
    pub title: String,
    #[serde(default)]
    pub slug: Option<String>,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub level: CourseLevel,
    #[serde(default = "default_language")]
    pub language: String,
    pub price: Money,
    #[serde(default)]
    pub seo: SeoMetadata,
}

fn default_language() -> String {
    "en".to_string()
}

/// A course offered in the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Course {
    pub id: CourseId,
    pub category_id: CategoryId,
    pub instructor_id: UserId,
    pub title: String,
    pub slug: Slug,
    pub summary: String,
    pub description: String,
    pub level: CourseLevel,
    pub language: String,
    pub price: Money,
    pub status: CourseStatus,
    pub seo: SeoMetadata,
    pub is_deleted: bool,
    pub published_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

struct ValidDetails {
    title: String,
    slug: Slug,
    summary: String,
    description: String,
    language: String,
    seo: SeoMetadata,
}

fn validate(details: &CourseDetails) -> Result<ValidDetails, CatalogError> {
    let title = validated_text("title", &details.title, 3, 200)?;
    let slug = Slug::explicit_or_derived(details.slug.as_deref(), &title)?;
    let summary = validated_text("summary", &details.summary, 0, 500)?;
    let language = validated_text("language", &details.language, 2, 16)?;
    if details.price.is_negative() {
        return Err(CatalogError::NegativePrice(details.price.cents()));
    }

    Ok(ValidDetails {
        title,
        slug,
        summary,
        description: details.description.trim().to_string(),
        language,
        seo: details.seo.clone().normalized()?,
    })
}

impl Course {
    /// Creates a draft course owned by `instructor_id`.
    pub fn create(
        instructor_id: UserId,
        details: CourseDetails,
        now: DateTime<Utc>,
    ) -> Result<Self, CatalogError> {
        let valid = validate(&details)?;

        Ok(Self {
            id: CourseId::new(),
            category_id: details.category_id,
            instructor_id,
            title: valid.title,
            slug: valid.slug,
            summary: valid.summary,
            description: valid.description,
            level: details.level,
            language: valid.language,
            price: details.price,
            status: CourseStatus::Draft,
            seo: valid.seo,
            is_deleted: false,
            published_at: None,
            created_at: now,
            updated_at: now,
        })
    }

    /// Applies new details. Returns the previous slug if it changed.
    pub fn update(
        &mut self,
        details: CourseDetails,
        now: DateTime<Utc>,
    ) -> Result<Option<Slug>, CatalogError> {
        self.ensure_not_deleted()?;
        let valid = validate(&details)?;
        let previous = (valid.slug != self.slug).then(|| self.slug.clone());

        self.category_id = details.category_id;
        self.title = valid.title;
        self.slug = valid.slug;
        self.summary = valid.summary;
        self.description = valid.description;
        self.level = details.level;
        self.language = valid.language;
        self.price = details.price;
        self.seo = valid.seo;
        self.updated_at = now;

        Ok(previous)
    }

    /// Publishes the course. `has_content` tells whether the curriculum has
    /// at least one section containing a session.
    pub fn publish(&mut self, has_content: bool, now: DateTime<Utc>) -> Result<(), CatalogError> {
        self.ensure_not_deleted()?;
        if !self.status.can_publish() {
            return Err(CatalogError::InvalidStatusTransition {
                current: self.status,
                action: "publish",
            });
        }
        if !has_content {
            return Err(CatalogError::NoContent);
        }

        self.status = CourseStatus::Published;
        self.published_at.get_or_insert(now);
        self.updated_at = now;
        Ok(())
    }

    pub fn archive(&mut self, now: DateTime<Utc>) -> Result<(), CatalogError> {
        self.ensure_not_deleted()?;
        if !self.status.can_archive() {
            return Err(CatalogError::InvalidStatusTransition {
                current: self.status,
                action: "archive",
            });
        }
        self.status = CourseStatus::Archived;
        self.updated_at = now;
        Ok(())
    }

    pub fn soft_delete(&mut self, now: DateTime<Utc>) -> Result<(), CatalogError> {
        self.ensure_not_deleted()?;
        self.is_deleted = true;
        self.updated_at = now;
        Ok(())
    }

    /// Restores a soft-deleted course as a draft.
    pub fn restore(&mut self, now: DateTime<Utc>) -> Result<(), CatalogError> {
        if !self.is_deleted {
            return Err(CatalogError::CourseNotDeleted(self.id));
        }
        self.is_deleted = false;
        self.status = CourseStatus::Draft;
        self.updated_at = now;
        Ok(())
    }

    /// True when the course is listed in the public catalog and purchasable.
    pub fn is_visible(&self) -> bool {
        self.status == CourseStatus::Published && !self.is_deleted
    }

    pub fn is_free(&self) -> bool {
        self.price.is_zero()
    }

    pub fn ensure_not_deleted(&self) -> Result<(), CatalogError> {
        if self.is_deleted {
            Err(CatalogError::CourseDeleted(self.id))
        } else {
            Ok(())
        }
    }

    pub fn ensure_editable_by(&self, user_id: UserId, is_admin: bool) -> Result<(), CatalogError> {
        if is_admin || self.instructor_id == user_id {
            Ok(())
        } else {
            Err(CatalogError::NotCourseOwner(self.id))
        }
    }

    pub fn path(&self) -> String {
        format!("/courses/{}", self.slug)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn details(title: &str, price: i64) -> CourseDetails {
        CourseDetails {
            category_id: CategoryId::new(),
            title: title.to_string(),
            slug: None,
            summary: "A summary".to_string(),
            description: String::new(),
            level: CourseLevel::Beginner,
            language: "en".to_string(),
            price: Money::from_cents(price),
            seo: SeoMetadata::default(),
        }
    }

    fn course() -> Course {
        Course::create(UserId::new(), details("Rust Basics", 4900), Utc::now()).unwrap()
    }

    #[test]
    fn test_status_transitions() {
        assert!(CourseStatus::Draft.can_publish());
        assert!(CourseStatus::Archived.can_publish());
        assert!(!CourseStatus::Published.can_publish());
        assert!(CourseStatus::Published.can_archive());
        assert!(!CourseStatus::Archived.can_archive());
    }

    #[test]
    fn test_create_course_is_draft() {
        let course = course();
        assert_eq!(course.status, CourseStatus::Draft);
        assert_eq!(course.slug.as_str(), "rust-basics");
        assert!(!course.is_visible());
    }

    #[test]
    fn test_negative_price_rejected() {
        let result = Course::create(UserId::new(), details("Rust Basics", -1), Utc::now());
        assert_eq!(result, Err(CatalogError::NegativePrice(-1)));
    }

    #[test]
    fn test_short_title_rejected() {
        let result = Course::create(UserId::new(), details("Rs", 0), Utc::now());
        assert!(matches!(result, Err(CatalogError::InvalidLength { .. })));
    }

    #[test]
    fn test_publish_requires_content() {
        let mut course = course();
        assert_eq!(course.publish(false, Utc::now()), Err(CatalogError::NoContent));
        course.publish(true, Utc::now()).unwrap();
        assert!(course.is_visible());
        assert!(course.published_at.is_some());
    }

    #[test]
    fn test_republish_keeps_first_publication_date() {
        let mut course = course();
        let first = Utc::now();
        course.publish(true, first).unwrap();
        course.archive(Utc::now()).unwrap();
        course.publish(true, Utc::now()).unwrap();
        assert_eq!(course.published_at, Some(first));
    }

    #[test]
    fn test_publish_twice_fails() {
        let mut course = course();
        course.publish(true, Utc::now()).unwrap();
        let result = course.publish(true, Utc::now());
        assert!(matches!(
            result,
            Err(CatalogError::InvalidStatusTransition { .. })
        ));
    }

    #[test]
    fn test_update_reports_slug_change() {
        let mut course = course();
        let previous = course
            .update(details("Rust Advanced", 4900), Utc::now())
            .unwrap();
        assert_eq!(previous.unwrap().as_str(), "rust-basics");
        assert_eq!(course.path(), "/courses/rust-advanced");

        let unchanged = course
            .update(details("Rust Advanced", 5900), Utc::now())
            .unwrap();
        assert!(unchanged.is_none());
    }

    #[test]
    fn test_deleted_course_cannot_change() {
        let mut course = course();
        course.soft_delete(Utc::now()).unwrap();
        assert_eq!(
            course.publish(true, Utc::now()),
            Err(CatalogError::CourseDeleted(course.id))
        );
        course.restore(Utc::now()).unwrap();
        assert!(!course.is_deleted);
        assert_eq!(course.status, CourseStatus::Draft);
    }

    #[test]
    fn test_ownership() {
        let course = course();
        assert!(course.ensure_editable_by(course.instructor_id, false).is_ok());
        assert!(course.ensure_editable_by(UserId::new(), true).is_ok());
        assert!(course.ensure_editable_by(UserId::new(), false).is_err());
    }
}
