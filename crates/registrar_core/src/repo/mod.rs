//! Repository layer abstractions and SQLite implementations.
//!
//! # Responsibility
//! - Define use-case oriented data access contracts for the ledger.
//! - Express every cross-table cascade (seat + record) as one SQLite
//!   `IMMEDIATE` transaction.
//!
//! # Invariants
//! - Repository APIs return semantic errors (`NotFound`, `CourseFull`,
//!   `InvalidTransition`, ...) in addition to DB transport errors.
//! - Repositories refuse connections whose schema is not fully migrated.

use crate::db::migrations::latest_version;
use crate::db::DbError;
use crate::model::course::{CourseId, CourseStatus};
use crate::model::enrollment::{EnrollmentId, EnrollmentStatus};
use crate::model::grade::GradeId;
use crate::model::roster::StudentId;
use crate::model::ValidationError;
use rusqlite::Connection;
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

pub mod course_repo;
pub mod enrollment_repo;
pub mod grade_repo;
pub mod roster_repo;

pub type RepoResult<T> = Result<T, RepoError>;

/// Errors from ledger repository operations.
#[derive(Debug)]
pub enum RepoError {
    /// Underlying SQLite/bootstrap error.
    Db(DbError),
    /// Input rejected before any SQL mutation.
    Validation(ValidationError),
    /// Target record does not exist.
    NotFound { entity: &'static str, id: Uuid },
    /// The student already holds an active enrollment in the course.
    EnrollmentConflict {
        student_id: StudentId,
        course_id: CourseId,
        existing: EnrollmentId,
    },
    /// Another course already uses this catalog code.
    DuplicateCourseCode(String),
    /// The enrollment already carries a grade.
    GradeExists {
        enrollment_id: EnrollmentId,
        grade_id: GradeId,
    },
    /// Conditional seat reservation found no free seat.
    CourseFull { course_id: CourseId, max_seats: u32 },
    /// Course exists but does not accept new enrollments.
    CourseClosed {
        course_id: CourseId,
        status: CourseStatus,
    },
    /// Enrollment lifecycle edge is not allowed.
    InvalidTransition {
        enrollment_id: EnrollmentId,
        from: EnrollmentStatus,
        to: EnrollmentStatus,
    },
    /// Enrollment state does not accept a grade.
    EnrollmentNotGradable {
        enrollment_id: EnrollmentId,
        status: EnrollmentStatus,
    },
    /// Grade is final and can no longer change.
    GradeFinalized(GradeId),
    /// Connection schema is not at the expected migrated version.
    UninitializedConnection {
        expected_version: u32,
        actual_version: u32,
    },
    /// Required table is missing.
    MissingRequiredTable(&'static str),
    /// Persisted data cannot be converted to a valid read model.
    InvalidData(String),
}

impl RepoError {
    /// Lock contention that may succeed when the whole unit is retried.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Db(err) => err.is_busy(),
            _ => false,
        }
    }
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::Validation(err) => write!(f, "{err}"),
            Self::NotFound { entity, id } => write!(f, "{entity} not found: {id}"),
            Self::EnrollmentConflict {
                student_id,
                course_id,
                existing,
            } => write!(
                f,
                "student {student_id} already enrolled in course {course_id} (enrollment {existing})"
            ),
            Self::DuplicateCourseCode(code) => write!(f, "course code already in use: {code}"),
            Self::GradeExists {
                enrollment_id,
                grade_id,
            } => write!(
                f,
                "enrollment {enrollment_id} already has grade {grade_id}"
            ),
            Self::CourseFull {
                course_id,
                max_seats,
            } => write!(f, "course {course_id} is full ({max_seats} seats)"),
            Self::CourseClosed { course_id, status } => write!(
                f,
                "course {course_id} is not accepting enrollments (status {})",
                course_repo::course_status_to_db(*status)
            ),
            Self::InvalidTransition {
                enrollment_id,
                from,
                to,
            } => write!(
                f,
                "enrollment {enrollment_id} cannot move from {} to {}",
                enrollment_repo::enrollment_status_to_db(*from),
                enrollment_repo::enrollment_status_to_db(*to)
            ),
            Self::EnrollmentNotGradable {
                enrollment_id,
                status,
            } => write!(
                f,
                "enrollment {enrollment_id} cannot be graded while {}",
                enrollment_repo::enrollment_status_to_db(*status)
            ),
            Self::GradeFinalized(id) => write!(f, "grade {id} is already final"),
            Self::UninitializedConnection {
                expected_version,
                actual_version,
            } => write!(
                f,
                "ledger repository requires schema version {expected_version}, got {actual_version}"
            ),
            Self::MissingRequiredTable(table) => {
                write!(f, "ledger repository requires table `{table}`")
            }
            Self::InvalidData(message) => write!(f, "invalid persisted ledger data: {message}"),
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            Self::Validation(err) => Some(err),
            _ => None,
        }
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

impl From<ValidationError> for RepoError {
    fn from(value: ValidationError) -> Self {
        Self::Validation(value)
    }
}

/// Verifies the connection is migrated and carries `tables`.
pub(crate) fn ensure_connection_ready(
    conn: &Connection,
    tables: &[&'static str],
) -> RepoResult<()> {
    let expected_version = latest_version();
    let actual_version: u32 = conn.query_row("PRAGMA user_version;", [], |row| row.get(0))?;
    if actual_version != expected_version {
        return Err(RepoError::UninitializedConnection {
            expected_version,
            actual_version,
        });
    }

    for table in tables {
        if !table_exists(conn, table)? {
            return Err(RepoError::MissingRequiredTable(table));
        }
    }
    Ok(())
}

fn table_exists(conn: &Connection, table: &str) -> RepoResult<bool> {
    let exists: i64 = conn.query_row(
        "SELECT EXISTS(
            SELECT 1
            FROM sqlite_master
            WHERE type = 'table' AND name = ?1
        );",
        [table],
        |row| row.get(0),
    )?;
    Ok(exists == 1)
}

pub(crate) fn parse_uuid(value: &str, column: &'static str) -> RepoResult<Uuid> {
    Uuid::parse_str(value)
        .map_err(|_| RepoError::InvalidData(format!("invalid uuid `{value}` in {column}")))
}

pub(crate) fn parse_optional_uuid(
    value: Option<String>,
    column: &'static str,
) -> RepoResult<Option<Uuid>> {
    value.map(|text| parse_uuid(&text, column)).transpose()
}

pub(crate) fn read_count(value: i64, column: &'static str) -> RepoResult<u32> {
    u32::try_from(value)
        .map_err(|_| RepoError::InvalidData(format!("invalid count `{value}` in {column}")))
}
