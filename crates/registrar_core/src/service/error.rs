//! Public error kinds of the ledger operations.

use crate::model::course::CourseId;
use crate::model::ValidationError;
use crate::repo::RepoError;
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

/// Error returned by every ledger service operation.
#[derive(Debug)]
pub enum LedgerError {
    /// Missing student, professor, course, enrollment or grade id.
    NotFound { entity: &'static str, id: Uuid },
    /// Duplicate active enrollment, duplicate grade or duplicate course code.
    AlreadyExists { entity: &'static str, key: String },
    /// Course has no free seat.
    CapacityExceeded { course_id: CourseId, max_seats: u32 },
    /// Operation not allowed in the record's current state.
    InvalidState(String),
    /// Missing or out-of-range input.
    Validation(ValidationError),
    /// Lock contention persisted through every bounded retry; safe to retry later.
    TransientFailure {
        operation: &'static str,
        attempts: u32,
    },
    /// Unexpected storage failure.
    Repo(RepoError),
}

impl LedgerError {
    /// Stable machine-readable kind, used in log lines.
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "not_found",
            Self::AlreadyExists { .. } => "already_exists",
            Self::CapacityExceeded { .. } => "capacity_exceeded",
            Self::InvalidState(_) => "invalid_state",
            Self::Validation(_) => "validation_error",
            Self::TransientFailure { .. } => "transient_failure",
            Self::Repo(_) => "storage_error",
        }
    }

    /// Whether this is a business rejection rather than an infrastructure fault.
    pub fn is_business(&self) -> bool {
        !matches!(self, Self::TransientFailure { .. } | Self::Repo(_))
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::TransientFailure { .. })
    }
}

impl Display for LedgerError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotFound { entity, id } => write!(f, "{entity} not found: {id}"),
            Self::AlreadyExists { entity, key } => write!(f, "{entity} already exists: {key}"),
            Self::CapacityExceeded {
                course_id,
                max_seats,
            } => write!(
                f,
                "course {course_id} has no free seat (capacity {max_seats})"
            ),
            Self::InvalidState(message) => write!(f, "invalid state: {message}"),
            Self::Validation(err) => write!(f, "{err}"),
            Self::TransientFailure {
                operation,
                attempts,
            } => write!(
                f,
                "{operation} failed on lock contention after {attempts} attempt(s); retry later"
            ),
            Self::Repo(err) => write!(f, "{err}"),
        }
    }
}

impl Error for LedgerError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            Self::Repo(err) => Some(err),
            _ => None,
        }
    }
}

impl From<ValidationError> for LedgerError {
    fn from(value: ValidationError) -> Self {
        Self::Validation(value)
    }
}

impl From<RepoError> for LedgerError {
    fn from(value: RepoError) -> Self {
        if value.is_transient() {
            return Self::TransientFailure {
                operation: "storage",
                attempts: 1,
            };
        }

        match value {
            RepoError::Validation(err) => Self::Validation(err),
            RepoError::NotFound { entity, id } => Self::NotFound { entity, id },
            RepoError::EnrollmentConflict { existing, .. } => Self::AlreadyExists {
                entity: "enrollment",
                key: existing.to_string(),
            },
            RepoError::DuplicateCourseCode(code) => Self::AlreadyExists {
                entity: "course",
                key: code,
            },
            RepoError::GradeExists { grade_id, .. } => Self::AlreadyExists {
                entity: "grade",
                key: grade_id.to_string(),
            },
            RepoError::CourseFull {
                course_id,
                max_seats,
            } => Self::CapacityExceeded {
                course_id,
                max_seats,
            },
            err @ (RepoError::CourseClosed { .. }
            | RepoError::InvalidTransition { .. }
            | RepoError::EnrollmentNotGradable { .. }
            | RepoError::GradeFinalized(_)) => Self::InvalidState(err.to_string()),
            other => Self::Repo(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::LedgerError;
    use crate::db::DbError;
    use crate::model::course::CourseStatus;
    use crate::repo::RepoError;
    use rusqlite::ffi;
    use uuid::Uuid;

    #[test]
    fn busy_database_maps_to_transient_failure() {
        let busy = rusqlite::Error::SqliteFailure(ffi::Error::new(ffi::SQLITE_BUSY), None);
        let err = LedgerError::from(RepoError::Db(DbError::Sqlite(busy)));
        assert!(err.is_retryable());
        assert!(!err.is_business());
    }

    #[test]
    fn closed_course_maps_to_invalid_state() {
        let err = LedgerError::from(RepoError::CourseClosed {
            course_id: Uuid::new_v4(),
            status: CourseStatus::Inactive,
        });
        assert_eq!(err.code(), "invalid_state");
        assert!(err.to_string().contains("inactive"));
    }

    #[test]
    fn full_course_maps_to_capacity_exceeded() {
        let course_id = Uuid::new_v4();
        let err = LedgerError::from(RepoError::CourseFull {
            course_id,
            max_seats: 2,
        });
        assert!(matches!(
            err,
            LedgerError::CapacityExceeded { course_id: id, max_seats: 2 } if id == course_id
        ));
    }
}
