//! Core ledger for course admission, enrollment and grading.
//! This crate is the single source of truth for seat-capacity and grade
//! invariants; callers reach storage only through its services.

pub mod config;
pub mod db;
pub mod logging;
pub mod model;
pub mod repo;
pub mod service;

pub use config::LedgerConfig;
pub use logging::{default_log_level, init_logging, logging_status};
pub use model::course::{Course, CourseId, CourseStatus, NewCourse, SeatCell};
pub use model::enrollment::{Enrollment, EnrollmentId, EnrollmentStatus};
pub use model::grade::{
    derive_grade, letter_for_percentage, DerivedGrade, Grade, GradeAggregate, GradeId,
    GradeScope, GradeStatus, GradeType, GradeUpdate, LetterGrade, NewGrade,
};
pub use model::roster::{Professor, ProfessorId, Student, StudentId};
pub use model::ValidationError;
pub use repo::course_repo::{
    CourseListQuery, CourseRepository, SeatDrift, SqliteCourseRepository,
};
pub use repo::enrollment_repo::{
    EnrollmentQuery, EnrollmentRepository, SqliteEnrollmentRepository,
};
pub use repo::grade_repo::{FinalizedGrade, GradeQuery, GradeRepository, SqliteGradeRepository};
pub use repo::roster_repo::{import_professor, import_student, RosterProvider, SqliteRoster};
pub use repo::{RepoError, RepoResult};
pub use service::catalog_service::CatalogService;
pub use service::enrollment_service::EnrollmentService;
pub use service::error::LedgerError;
pub use service::grade_service::GradeService;
pub use service::notify::{LedgerEvent, LedgerNotifier, NoopNotifier, NotifyError};

/// Minimal health-check API for early integration.
pub fn ping() -> &'static str {
    "pong"
}

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::{core_version, ping};

    #[test]
    fn ping_returns_pong() {
        assert_eq!(ping(), "pong");
    }

    #[test]
    fn version_is_not_empty() {
        assert!(!core_version().is_empty());
    }
}
