//! Grade ledger model and deterministic letter derivation.
//!
//! # Responsibility
//! - Define the grade record, its finalization state and partial updates.
//! - Own the fixed percentage -> letter -> 4.0 points tables.
//!
//! # Invariants
//! - `letter`/`points` are always derived from `value`/`max_points`.
//! - `status` is the single source of truth for finality; `is_final()` is a view.
//!
//! Letter table (percentage = value / max_points * 100):
//!
//! | percentage | letter | points |
//! |------------|--------|--------|
//! | >= 90      | A      | 4.0    |
//! | >= 80      | B      | 3.0    |
//! | >= 70      | C      | 2.0    |
//! | >= 60      | D      | 1.0    |
//! | < 60       | F      | 0.0    |

use crate::model::course::CourseId;
use crate::model::enrollment::EnrollmentId;
use crate::model::roster::StudentId;
use crate::model::ValidationError;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use uuid::Uuid;

pub type GradeId = Uuid;

const LETTER_BREAKPOINTS: [(f64, LetterGrade); 4] = [
    (90.0, LetterGrade::A),
    (80.0, LetterGrade::B),
    (70.0, LetterGrade::C),
    (60.0, LetterGrade::D),
];

// Absorbs float noise such as 27/30*100 landing just under 90.
const BREAKPOINT_EPSILON: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LetterGrade {
    A,
    B,
    C,
    D,
    F,
}

impl LetterGrade {
    /// Grade points on the 4.0 scale.
    pub fn points(self) -> f64 {
        match self {
            Self::A => 4.0,
            Self::B => 3.0,
            Self::C => 2.0,
            Self::D => 1.0,
            Self::F => 0.0,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::A => "A",
            Self::B => "B",
            Self::C => "C",
            Self::D => "D",
            Self::F => "F",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "A" => Some(Self::A),
            "B" => Some(Self::B),
            "C" => Some(Self::C),
            "D" => Some(Self::D),
            "F" => Some(Self::F),
            _ => None,
        }
    }
}

impl Display for LetterGrade {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Assessment category recorded alongside the raw score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GradeType {
    Exam,
    Quiz,
    Assignment,
    Project,
    Participation,
    Final,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GradeStatus {
    Pending,
    Final,
}

/// Letter and points derived from one raw score.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DerivedGrade {
    pub percentage: f64,
    pub letter: LetterGrade,
    pub points: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Grade {
    pub id: GradeId,
    pub enrollment_id: EnrollmentId,
    pub value: f64,
    pub max_points: f64,
    pub letter: LetterGrade,
    pub points: f64,
    pub grade_type: GradeType,
    pub comment: Option<String>,
    pub status: GradeStatus,
    pub finalized_at: Option<i64>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Grade {
    pub fn is_final(&self) -> bool {
        self.status == GradeStatus::Final
    }

    pub fn percentage(&self) -> f64 {
        self.value / self.max_points * 100.0
    }
}

/// Input for attaching the single grade of one enrollment.
#[derive(Debug, Clone, PartialEq)]
pub struct NewGrade {
    pub enrollment_id: EnrollmentId,
    pub value: f64,
    pub max_points: f64,
    pub grade_type: GradeType,
    pub comment: Option<String>,
}

impl NewGrade {
    pub fn new(
        enrollment_id: EnrollmentId,
        value: f64,
        max_points: f64,
        grade_type: GradeType,
    ) -> Self {
        Self {
            enrollment_id,
            value,
            max_points,
            grade_type,
            comment: None,
        }
    }
}

/// Partial grade update; `None` fields are left untouched.
///
/// A `comment` that is blank after trim clears the stored comment.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GradeUpdate {
    pub value: Option<f64>,
    pub max_points: Option<f64>,
    pub grade_type: Option<GradeType>,
    pub comment: Option<String>,
}

impl GradeUpdate {
    pub fn comment(comment: impl Into<String>) -> Self {
        Self {
            comment: Some(comment.into()),
            ..Self::default()
        }
    }

    /// Whether this update touches the inputs of the derived fields.
    pub fn changes_score(&self) -> bool {
        self.value.is_some() || self.max_points.is_some()
    }

    pub fn is_empty(&self) -> bool {
        !self.changes_score() && self.grade_type.is_none() && self.comment.is_none()
    }
}

/// Which grades an aggregate covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GradeScope {
    Student(StudentId),
    Course(CourseId),
}

/// Summary over the raw `value` of every grade in a scope.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GradeAggregate {
    pub count: u32,
    pub average: f64,
    pub min: f64,
    pub max: f64,
}

/// Maps a percentage onto the fixed letter table.
pub fn letter_for_percentage(percentage: f64) -> LetterGrade {
    LETTER_BREAKPOINTS
        .iter()
        .find(|(floor, _)| percentage + BREAKPOINT_EPSILON >= *floor)
        .map_or(LetterGrade::F, |(_, letter)| *letter)
}

/// Validates a raw score and derives its letter and points.
pub fn derive_grade(value: f64, max_points: f64) -> Result<DerivedGrade, ValidationError> {
    if !max_points.is_finite() || max_points <= 0.0 {
        return Err(ValidationError::InvalidMaxPoints(max_points));
    }
    if !value.is_finite() || value < 0.0 || value > max_points {
        return Err(ValidationError::ScoreOutOfRange { value, max_points });
    }

    let percentage = value / max_points * 100.0;
    let letter = letter_for_percentage(percentage);
    Ok(DerivedGrade {
        percentage,
        letter,
        points: letter.points(),
    })
}

#[cfg(test)]
mod tests {
    use super::{derive_grade, letter_for_percentage, GradeUpdate, LetterGrade};
    use crate::model::ValidationError;

    #[test]
    fn breakpoints_are_inclusive_lower_bounds() {
        assert_eq!(letter_for_percentage(100.0), LetterGrade::A);
        assert_eq!(letter_for_percentage(90.0), LetterGrade::A);
        assert_eq!(letter_for_percentage(89.99), LetterGrade::B);
        assert_eq!(letter_for_percentage(80.0), LetterGrade::B);
        assert_eq!(letter_for_percentage(70.0), LetterGrade::C);
        assert_eq!(letter_for_percentage(60.0), LetterGrade::D);
        assert_eq!(letter_for_percentage(59.99), LetterGrade::F);
        assert_eq!(letter_for_percentage(0.0), LetterGrade::F);
    }

    #[test]
    fn exact_thirds_hit_the_breakpoint() {
        assert_eq!(derive_grade(27.0, 30.0).unwrap().letter, LetterGrade::A);
        assert_eq!(derive_grade(21.0, 30.0).unwrap().letter, LetterGrade::C);
    }

    #[test]
    fn derive_uses_ratio_not_raw_value() {
        let derived = derive_grade(46.0, 50.0).unwrap();
        assert_eq!(derived.letter, LetterGrade::A);
        assert_eq!(derived.points, 4.0);

        let derived = derive_grade(55.0, 100.0).unwrap();
        assert_eq!(derived.letter, LetterGrade::F);
        assert_eq!(derived.points, 0.0);
    }

    #[test]
    fn derive_rejects_invalid_inputs() {
        assert_eq!(
            derive_grade(10.0, 0.0).unwrap_err(),
            ValidationError::InvalidMaxPoints(0.0)
        );
        assert!(matches!(
            derive_grade(101.0, 100.0).unwrap_err(),
            ValidationError::ScoreOutOfRange { .. }
        ));
        assert!(matches!(
            derive_grade(-1.0, 100.0).unwrap_err(),
            ValidationError::ScoreOutOfRange { .. }
        ));
    }

    #[test]
    fn comment_only_update_does_not_change_score() {
        let update = GradeUpdate::comment("late submission");
        assert!(!update.changes_score());
        assert!(!update.is_empty());
        assert!(GradeUpdate::default().is_empty());
    }
}
