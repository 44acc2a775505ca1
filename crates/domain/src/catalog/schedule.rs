use chrono::{DateTime, NaiveDate, Utc};
use common::{CourseId, ScheduleId};
use serde::{Deserialize, Serialize};

use super::{CatalogError, validated_text};

/// Input for a new schedule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleDetails {
    pub label: String,
    pub starts_on: NaiveDate,
    pub ends_on: NaiveDate,
    #[serde(default)]
    pub capacity: Option<u32>,
    #[serde(default = "default_timezone")]
    pub timezone: String,
}

fn default_timezone() -> String {
    "UTC".to_string()
}

/// A dated run of a course.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CourseSchedule {
    pub id: ScheduleId,
    pub course_id: CourseId,
    pub label: String,
    pub starts_on: NaiveDate,
    pub ends_on: NaiveDate,
    pub capacity: Option<u32>,
    pub timezone: String,
    pub created_at: DateTime<Utc>,
}

impl CourseSchedule {
    pub fn create(
        course_id: CourseId,
        details: ScheduleDetails,
        now: DateTime<Utc>,
    ) -> Result<Self, CatalogError> {
        let label = validated_text("label", &details.label, 1, 100)?;
        let timezone = validated_text("timezone", &details.timezone, 1, 64)?;
        if details.ends_on < details.starts_on {
            return Err(CatalogError::InvalidSchedule(format!(
                "ends on {} before it starts on {}",
                details.ends_on, details.starts_on
            )));
        }
        if details.capacity == Some(0) {
            return Err(CatalogError::InvalidSchedule(
                "capacity must be positive".to_string(),
            ));
        }

        Ok(Self {
            id: ScheduleId::new(),
            course_id,
            label,
            starts_on: details.starts_on,
            ends_on: details.ends_on,
            capacity: details.capacity,
            timezone,
            created_at: now,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn details(start: (i32, u32, u32), end: (i32, u32, u32)) -> ScheduleDetails {
        ScheduleDetails {
            label: "Spring cohort".to_string(),
            starts_on: NaiveDate::from_ymd_opt(start.0, start.1, start.2).unwrap(),
            ends_on: NaiveDate::from_ymd_opt(end.0, end.1, end.2).unwrap(),
            capacity: Some(30),
            timezone: "Europe/Berlin".to_string(),
        }
    }

    #[test]
    fn single_day_schedule_is_valid() {
        let schedule =
            CourseSchedule::create(CourseId::new(), details((2026, 3, 1), (2026, 3, 1)), Utc::now())
                .unwrap();
        assert_eq!(schedule.capacity, Some(30));
    }

    #[test]
    fn end_before_start_is_rejected() {
        let result =
            CourseSchedule::create(CourseId::new(), details((2026, 3, 2), (2026, 3, 1)), Utc::now());
        assert!(matches!(result, Err(CatalogError::InvalidSchedule(_))));
    }

    #[test]
    fn zero_capacity_is_rejected() {
        let mut d = details((2026, 3, 1), (2026, 4, 1));
        d.capacity = Some(0);
        assert!(CourseSchedule::create(CourseId::new(), d, Utc::now()).is_err());
    }
}
