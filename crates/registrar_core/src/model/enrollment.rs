//! Enrollment ledger record and lifecycle.
//!
//! # Invariants
//! - Lifecycle is `Enrolled -> Dropped` or `Enrolled -> Completed`; both
//!   targets are terminal.
//! - A record in `Enrolled` or `Completed` holds one seat of its course;
//!   a `Dropped` record holds none.

use crate::model::course::CourseId;
use crate::model::grade::LetterGrade;
use crate::model::roster::StudentId;
use crate::model::ValidationError;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub type EnrollmentId = Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnrollmentStatus {
    Enrolled,
    Dropped,
    Completed,
}

impl EnrollmentStatus {
    /// Returns whether `self -> next` is an allowed lifecycle edge.
    ///
    /// Every edge leaves the only non-terminal state for a terminal one.
    pub fn can_transition_to(self, next: EnrollmentStatus) -> bool {
        !self.is_terminal() && next.is_terminal()
    }

    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Enrolled)
    }

    /// Whether a record in this state counts against course capacity.
    pub fn holds_seat(self) -> bool {
        !matches!(self, Self::Dropped)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Enrollment {
    pub id: EnrollmentId,
    pub student_id: StudentId,
    pub course_id: CourseId,
    pub status: EnrollmentStatus,
    /// Epoch ms.
    pub enrolled_at: i64,
    pub drop_reason: Option<String>,
    pub dropped_at: Option<i64>,
    pub completed_at: Option<i64>,
    /// Cached from the finalized grade.
    pub grade_letter: Option<LetterGrade>,
    /// Cached from the attendance collaborator.
    pub attendance_pct: Option<f64>,
}

/// Validates an attendance summary percentage.
pub fn validate_attendance_pct(value: f64) -> Result<f64, ValidationError> {
    if !value.is_finite() || !(0.0..=100.0).contains(&value) {
        return Err(ValidationError::AttendanceOutOfRange(value));
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::{validate_attendance_pct, EnrollmentStatus};

    #[test]
    fn only_enrolled_has_outgoing_edges() {
        use EnrollmentStatus::*;
        assert!(Enrolled.can_transition_to(Dropped));
        assert!(Enrolled.can_transition_to(Completed));
        assert!(!Enrolled.can_transition_to(Enrolled));
        assert!(!Enrolled.is_terminal());
        for from in [Dropped, Completed] {
            assert!(from.is_terminal());
            for to in [Enrolled, Dropped, Completed] {
                assert!(!from.can_transition_to(to));
            }
        }
    }

    #[test]
    fn dropped_rows_release_their_seat() {
        assert!(EnrollmentStatus::Enrolled.holds_seat());
        assert!(EnrollmentStatus::Completed.holds_seat());
        assert!(!EnrollmentStatus::Dropped.holds_seat());
    }

    #[test]
    fn attendance_bounds_are_inclusive() {
        assert!(validate_attendance_pct(0.0).is_ok());
        assert!(validate_attendance_pct(100.0).is_ok());
        assert!(validate_attendance_pct(100.5).is_err());
        assert!(validate_attendance_pct(f64::NAN).is_err());
    }
}
