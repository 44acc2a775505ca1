//! Course catalog: categories, courses, schedules, curriculum and enrollments.

mod category;
mod course;
mod curriculum;
mod enrollment;
mod schedule;

pub use category::{Category, CategoryDetails, CategoryNode, build_tree, descendant_ids};
pub use course::{Course, CourseDetails, CourseLevel, CourseStatus};
pub use curriculum::{CourseSection, CourseSession, Curriculum, SessionDetails};
pub use enrollment::{CourseEnrollment, EnrollmentSource};
pub use schedule::{CourseSchedule, ScheduleDetails};

use common::{CategoryId, CourseId, SectionId, SessionId};
use thiserror::Error;

use crate::seo::SeoError;

/// Errors that can occur during catalog operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CatalogError {
    #[error("{field} must be between {min} and {max} characters")]
    InvalidLength {
        field: &'static str,
        min: usize,
        max: usize,
    },

    #[error("Price cannot be negative: {0}")]
    NegativePrice(i64),

    #[error("Category {0} cannot be its own ancestor")]
    CategoryCycle(CategoryId),

    #[error("Parent category {0} does not exist or is deleted")]
    ParentUnavailable(CategoryId),

    #[error("Category {0} still has active subcategories or courses")]
    CategoryInUse(CategoryId),

    #[error("Invalid state transition: cannot {action} a course in {current} state")]
    InvalidStatusTransition {
        current: CourseStatus,
        action: &'static str,
    },

    #[error("A course needs at least one section with a session before publishing")]
    NoContent,

    #[error("Course {0} is deleted")]
    CourseDeleted(CourseId),

    #[error("Course {0} is not deleted")]
    CourseNotDeleted(CourseId),

    #[error("Only the course instructor or an admin may change course {0}")]
    NotCourseOwner(CourseId),

    #[error("Invalid schedule: {0}")]
    InvalidSchedule(String),

    #[error("Section {0} not found in this course")]
    SectionNotFound(SectionId),

    #[error("Session {0} not found in this course")]
    SessionNotFound(SessionId),

    #[error("Position {position} is out of range (0..={max})")]
    InvalidPosition { position: u32, max: u32 },

    #[error("Session duration must be between 1 and 1440 minutes")]
    InvalidDuration,

    #[error(transparent)]
    Seo(#[from] SeoError),
}

/// Trims `value` and checks its length in characters.
pub(crate) fn validated_text(
    field: &'static str,
    value: &str,
    min: usize,
    max: usize,
) -> Result<String, CatalogError> {
    let value = value.trim();
    let len = value.chars().count();
    if len < min || len > max {
        return Err(CatalogError::InvalidLength { field, min, max });
    }
    Ok(value.to_string())
}
