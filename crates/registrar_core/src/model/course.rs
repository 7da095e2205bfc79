//! Course catalog model.
//!
//! # Responsibility
//! - Define the course record and its read-only capacity snapshot.
//! - Validate new-course input before persistence.
//!
//! # Invariants
//! - `0 <= filled_seats <= max_seats` and `max_seats > 0`.
//! - `SeatCell` is a snapshot; the live cell is only mutated through
//!   `repo::course_repo::{reserve_seat, release_seat}`.

use crate::model::roster::ProfessorId;
use crate::model::{require_text, ValidationError};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub type CourseId = Uuid;

/// Admission status of a course. Only `Active` courses accept new seats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CourseStatus {
    Active,
    /// Temporarily closed to admission; existing enrollments are kept.
    Inactive,
    /// Past offering kept for history.
    Archived,
}

impl CourseStatus {
    pub fn accepts_enrollment(self) -> bool {
        self == Self::Active
    }
}

/// Point-in-time view of one course's capacity cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeatCell {
    pub max_seats: u32,
    pub filled_seats: u32,
}

impl SeatCell {
    pub fn available(&self) -> u32 {
        self.max_seats.saturating_sub(self.filled_seats)
    }

    pub fn is_full(&self) -> bool {
        self.filled_seats >= self.max_seats
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Course {
    pub id: CourseId,
    /// Catalog code such as `CS-101`, unique case-insensitively.
    pub code: String,
    pub title: String,
    /// Offering term label, e.g. `2024-FALL`.
    pub semester: String,
    pub professor_id: Option<ProfessorId>,
    pub status: CourseStatus,
    pub seats: SeatCell,
    /// Epoch ms.
    pub created_at: i64,
    /// Epoch ms.
    pub updated_at: i64,
}

/// Input for creating a course offering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewCourse {
    pub code: String,
    pub title: String,
    pub semester: String,
    pub professor_id: Option<ProfessorId>,
    pub max_seats: u32,
}

impl NewCourse {
    pub fn new(
        code: impl Into<String>,
        title: impl Into<String>,
        semester: impl Into<String>,
        max_seats: u32,
    ) -> Self {
        Self {
            code: code.into(),
            title: title.into(),
            semester: semester.into(),
            professor_id: None,
            max_seats,
        }
    }

    /// Returns a trimmed copy, or the first validation failure.
    pub fn normalized(&self) -> Result<Self, ValidationError> {
        if self.max_seats == 0 {
            return Err(ValidationError::NonPositiveCapacity(0));
        }
        Ok(Self {
            code: require_text("code", &self.code)?.to_ascii_uppercase(),
            title: require_text("title", &self.title)?,
            semester: require_text("semester", &self.semester)?.to_ascii_uppercase(),
            professor_id: self.professor_id,
            max_seats: self.max_seats,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::{NewCourse, SeatCell};
    use crate::model::ValidationError;

    #[test]
    fn normalized_course_uppercases_code_and_semester() {
        let course = NewCourse::new(" cs-101 ", " Intro ", "2024-fall", 30)
            .normalized()
            .unwrap();
        assert_eq!(course.code, "CS-101");
        assert_eq!(course.title, "Intro");
        assert_eq!(course.semester, "2024-FALL");
    }

    #[test]
    fn zero_capacity_is_rejected() {
        let err = NewCourse::new("CS-101", "Intro", "2024-FALL", 0)
            .normalized()
            .unwrap_err();
        assert_eq!(err, ValidationError::NonPositiveCapacity(0));
    }

    #[test]
    fn seat_cell_reports_availability() {
        let cell = SeatCell {
            max_seats: 3,
            filled_seats: 3,
        };
        assert!(cell.is_full());
        assert_eq!(cell.available(), 0);
    }
}
