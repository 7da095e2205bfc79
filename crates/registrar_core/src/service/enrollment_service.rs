//! Enrollment use-case service.
//!
//! # Responsibility
//! - Validate roster references before touching the ledger.
//! - Run enroll/drop/delete as retried transactional units.
//! - Publish committed enrollment events.
//!
//! # Invariants
//! - A notification is only sent after the unit committed.
//! - Unknown student or course ids fail with `NotFound` before any write.

use crate::config::LedgerConfig;
use crate::model::course::CourseId;
use crate::model::enrollment::{Enrollment, EnrollmentId};
use crate::model::roster::StudentId;
use crate::repo::enrollment_repo::{EnrollmentQuery, EnrollmentRepository};
use crate::repo::roster_repo::RosterProvider;
use crate::service::error::LedgerError;
use crate::service::log_failure;
use crate::service::notify::{publish, LedgerEvent, LedgerNotifier, NoopNotifier};
use crate::service::retry::with_transient_retry;
use log::info;
use std::sync::Arc;
use std::time::Instant;

pub struct EnrollmentService<R: EnrollmentRepository, P: RosterProvider> {
    repo: R,
    roster: P,
    config: LedgerConfig,
    notifier: Arc<dyn LedgerNotifier>,
}

impl<R: EnrollmentRepository, P: RosterProvider> EnrollmentService<R, P> {
    pub fn new(repo: R, roster: P) -> Self {
        Self {
            repo,
            roster,
            config: LedgerConfig::default(),
            notifier: Arc::new(NoopNotifier),
        }
    }

    pub fn with_config(mut self, config: LedgerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn LedgerNotifier>) -> Self {
        self.notifier = notifier;
        self
    }

    /// Enrolls a student into a course, taking one seat.
    ///
    /// # Errors
    /// - `NotFound` for an unknown student or course.
    /// - `InvalidState` when the course is not active.
    /// - `AlreadyExists` when the student is already enrolled.
    /// - `CapacityExceeded` when no seat is free.
    /// - `TransientFailure` when lock contention outlasts every retry.
    pub fn enroll(
        &self,
        student_id: StudentId,
        course_id: CourseId,
    ) -> Result<Enrollment, LedgerError> {
        let started_at = Instant::now();
        // Roster reads run before, not inside, the write transaction; both
        // are repeated when either hits lock contention.
        let result = with_transient_retry(&self.config, "enroll", || {
            self.ensure_roster(student_id, course_id)?;
            self.repo
                .enroll(student_id, course_id)
                .map_err(LedgerError::from)
        });

        match &result {
            Ok(enrollment) => {
                info!(
                    "event=enroll module=enrollment status=ok enrollment_id={} student_id={student_id} course_id={course_id} duration_ms={}",
                    enrollment.id,
                    started_at.elapsed().as_millis()
                );
                publish(
                    self.notifier.as_ref(),
                    &LedgerEvent::Enrolled {
                        enrollment_id: enrollment.id,
                        student_id,
                        course_id,
                    },
                );
            }
            Err(err) => log_failure("enroll", "enrollment", started_at, err),
        }
        result
    }

    /// Drops an active enrollment and releases its seat.
    ///
    /// # Errors
    /// - `NotFound` for an unknown enrollment.
    /// - `InvalidState` when the enrollment is already dropped or completed;
    ///   the seat is not released a second time.
    pub fn drop_enrollment(
        &self,
        id: EnrollmentId,
        reason: Option<&str>,
    ) -> Result<Enrollment, LedgerError> {
        let started_at = Instant::now();
        let result = with_transient_retry(&self.config, "drop_enrollment", || {
            self.repo
                .drop_enrollment(id, reason)
                .map_err(LedgerError::from)
        });

        match &result {
            Ok(enrollment) => {
                info!(
                    "event=drop_enrollment module=enrollment status=ok enrollment_id={id} course_id={} duration_ms={}",
                    enrollment.course_id,
                    started_at.elapsed().as_millis()
                );
                publish(
                    self.notifier.as_ref(),
                    &LedgerEvent::Dropped {
                        enrollment_id: id,
                        student_id: enrollment.student_id,
                        course_id: enrollment.course_id,
                    },
                );
            }
            Err(err) => log_failure("drop_enrollment", "enrollment", started_at, err),
        }
        result
    }

    /// Administrative hard delete; releases the seat when the row held one.
    pub fn delete_enrollment(&self, id: EnrollmentId) -> Result<Enrollment, LedgerError> {
        let started_at = Instant::now();
        let result = with_transient_retry(&self.config, "delete_enrollment", || {
            self.repo.delete_enrollment(id).map_err(LedgerError::from)
        });
        match &result {
            Ok(removed) => info!(
                "event=delete_enrollment module=enrollment status=ok enrollment_id={id} course_id={} released_seat={} duration_ms={}",
                removed.course_id,
                removed.status.holds_seat(),
                started_at.elapsed().as_millis()
            ),
            Err(err) => log_failure("delete_enrollment", "enrollment", started_at, err),
        }
        result
    }

    /// Stores the attendance summary supplied by the attendance collaborator.
    pub fn record_attendance(
        &self,
        id: EnrollmentId,
        attendance_pct: f64,
    ) -> Result<Enrollment, LedgerError> {
        let started_at = Instant::now();
        let result = with_transient_retry(&self.config, "record_attendance", || {
            self.repo
                .record_attendance(id, attendance_pct)
                .map_err(LedgerError::from)
        });
        if let Err(err) = &result {
            log_failure("record_attendance", "enrollment", started_at, err);
        }
        result
    }

    pub fn get_enrollment(&self, id: EnrollmentId) -> Result<Enrollment, LedgerError> {
        self.repo.get_enrollment(id)?.ok_or(LedgerError::NotFound {
            entity: "enrollment",
            id,
        })
    }

    /// Lists enrollments ordered by `enrolled_at DESC, id ASC`.
    pub fn list_enrollments(
        &self,
        query: &EnrollmentQuery,
    ) -> Result<Vec<Enrollment>, LedgerError> {
        Ok(self.repo.list_enrollments(query)?)
    }

    pub fn list_for_student(&self, student_id: StudentId) -> Result<Vec<Enrollment>, LedgerError> {
        self.list_enrollments(&EnrollmentQuery {
            student_id: Some(student_id),
            ..EnrollmentQuery::default()
        })
    }

    pub fn list_for_course(&self, course_id: CourseId) -> Result<Vec<Enrollment>, LedgerError> {
        self.list_enrollments(&EnrollmentQuery {
            course_id: Some(course_id),
            ..EnrollmentQuery::default()
        })
    }

    fn ensure_roster(&self, student_id: StudentId, course_id: CourseId) -> Result<(), LedgerError> {
        if !self.roster.student_exists(student_id)? {
            return Err(LedgerError::NotFound {
                entity: "student",
                id: student_id,
            });
        }
        if !self.roster.course_exists(course_id)? {
            return Err(LedgerError::NotFound {
                entity: "course",
                id: course_id,
            });
        }
        Ok(())
    }
}
