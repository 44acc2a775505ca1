use chrono::{DateTime, Utc};
use common::{CourseId, EnrollmentId, OrderId, UserId};
use serde::{Deserialize, Serialize};

/// How a student came to be enrolled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EnrollmentSource {
    Purchase,
    Free,
    Admin,
}

impl EnrollmentSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            EnrollmentSource::Purchase => "Purchase",
            EnrollmentSource::Free => "Free",
            EnrollmentSource::Admin => "Admin",
        }
    }
}

impl std::str::FromStr for EnrollmentSource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Purchase" => Ok(EnrollmentSource::Purchase),
            "Free" => Ok(EnrollmentSource::Free),
            "Admin" => Ok(EnrollmentSource::Admin),
            other => Err(format!("unknown enrollment source '{other}'")),
        }
    }
}

/// Access of one student to one course. At most one per pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CourseEnrollment {
    pub id: EnrollmentId,
    pub course_id: CourseId,
    pub student_id: UserId,
    pub source: EnrollmentSource,
    pub order_id: Option<OrderId>,
    pub enrolled_at: DateTime<Utc>,
}

impl CourseEnrollment {
    pub fn new(
        course_id: CourseId,
        student_id: UserId,
        source: EnrollmentSource,
        order_id: Option<OrderId>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: EnrollmentId::new(),
            course_id,
            student_id,
            source,
            order_id,
            enrolled_at: now,
        }
    }
}
