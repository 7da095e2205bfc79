//! Ledger domain model: roster identities, courses, enrollments and grades.
//!
//! # Responsibility
//! - Define canonical data structures used by ledger business logic.
//! - Own field validation and derived-field computation.
//!
//! # Invariants
//! - Every record is identified by a stable UUID.
//! - Derived fields (grade letter/points, `Grade::is_final`) are computed
//!   here, never supplied by callers.

use std::error::Error;
use std::fmt::{Display, Formatter};

pub mod course;
pub mod enrollment;
pub mod grade;
pub mod roster;

/// Field-level validation failures for ledger input.
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationError {
    /// A required text field is blank after trim.
    BlankField(&'static str),
    /// Course capacity must be strictly positive.
    NonPositiveCapacity(i64),
    /// New capacity would fall below seats already filled.
    CapacityBelowFill { max_seats: u32, filled_seats: u32 },
    /// Maximum points must be a finite value greater than zero.
    InvalidMaxPoints(f64),
    /// Raw score must be finite and within `0..=max_points`.
    ScoreOutOfRange { value: f64, max_points: f64 },
    /// Attendance percentage must be within `0..=100`.
    AttendanceOutOfRange(f64),
    /// A date range was given with `from` after `to`.
    InvertedRange { from: i64, to: i64 },
}

impl Display for ValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BlankField(field) => write!(f, "`{field}` must not be blank"),
            Self::NonPositiveCapacity(value) => {
                write!(f, "max_seats must be greater than zero, got {value}")
            }
            Self::CapacityBelowFill {
                max_seats,
                filled_seats,
            } => write!(
                f,
                "max_seats {max_seats} is below the {filled_seats} seats already filled"
            ),
            Self::InvalidMaxPoints(value) => {
                write!(f, "max_points must be a finite value above zero, got {value}")
            }
            Self::ScoreOutOfRange { value, max_points } => {
                write!(f, "score {value} is outside 0..={max_points}")
            }
            Self::AttendanceOutOfRange(value) => {
                write!(f, "attendance percentage {value} is outside 0..=100")
            }
            Self::InvertedRange { from, to } => {
                write!(f, "range start {from} is after range end {to}")
            }
        }
    }
}

impl Error for ValidationError {}

/// Trims `value` and rejects it when nothing remains.
pub fn require_text(field: &'static str, value: &str) -> Result<String, ValidationError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::BlankField(field));
    }
    Ok(trimmed.to_string())
}

/// Trims optional free text; blank input collapses to `None`.
pub fn optional_text(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|trimmed| !trimmed.is_empty())
        .map(str::to_string)
}

/// Current wall clock as epoch milliseconds; the single clock for every
/// persisted timestamp.
pub(crate) fn now_epoch_ms() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map_or(0, |elapsed| i64::try_from(elapsed.as_millis()).unwrap_or(i64::MAX))
}
