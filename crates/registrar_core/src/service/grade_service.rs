//! Grade use-case service.
//!
//! # Responsibility
//! - Assign, update and finalize the single grade of an enrollment.
//! - Answer aggregate and listing queries.
//!
//! # Invariants
//! - Letter and points are always derived from the score.
//! - Finalization and enrollment completion commit together or not at all.

use crate::config::LedgerConfig;
use crate::model::enrollment::EnrollmentId;
use crate::model::grade::{
    Grade, GradeAggregate, GradeId, GradeScope, GradeType, GradeUpdate, NewGrade,
};
use crate::repo::grade_repo::{FinalizedGrade, GradeQuery, GradeRepository};
use crate::service::error::LedgerError;
use crate::service::log_failure;
use crate::service::notify::{publish, LedgerEvent, LedgerNotifier, NoopNotifier};
use crate::service::retry::with_transient_retry;
use log::info;
use std::sync::Arc;
use std::time::Instant;

pub struct GradeService<R: GradeRepository> {
    repo: R,
    config: LedgerConfig,
    notifier: Arc<dyn LedgerNotifier>,
}

impl<R: GradeRepository> GradeService<R> {
    pub fn new(repo: R) -> Self {
        Self {
            repo,
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

    /// Attaches a pending grade to an enrollment.
    ///
    /// # Errors
    /// - `Validation` when `max_points <= 0` or the value is outside
    ///   `0..=max_points`.
    /// - `NotFound` for an unknown enrollment.
    /// - `AlreadyExists` when the enrollment already has a grade; the
    ///   existing grade is unchanged.
    /// - `InvalidState` when the enrollment was dropped.
    pub fn assign_grade(
        &self,
        enrollment_id: EnrollmentId,
        value: f64,
        max_points: f64,
        grade_type: GradeType,
    ) -> Result<Grade, LedgerError> {
        self.assign(&NewGrade::new(enrollment_id, value, max_points, grade_type))
    }

    /// Same as `assign_grade`, with an optional comment.
    pub fn assign(&self, grade: &NewGrade) -> Result<Grade, LedgerError> {
        let started_at = Instant::now();
        let result = with_transient_retry(&self.config, "assign_grade", || {
            self.repo.assign_grade(grade).map_err(LedgerError::from)
        });
        match &result {
            Ok(created) => {
                info!(
                    "event=assign_grade module=grade status=ok grade_id={} enrollment_id={} letter={} duration_ms={}",
                    created.id,
                    created.enrollment_id,
                    created.letter,
                    started_at.elapsed().as_millis()
                );
                publish(
                    self.notifier.as_ref(),
                    &LedgerEvent::GradeAssigned {
                        grade_id: created.id,
                        enrollment_id: created.enrollment_id,
                        letter: created.letter,
                    },
                );
            }
            Err(err) => log_failure("assign_grade", "grade", started_at, err),
        }
        result
    }

    /// Applies a partial update to a pending grade.
    ///
    /// Letter and points are recomputed only when the value or max points
    /// change. An empty update returns the stored grade untouched.
    pub fn update_grade(&self, id: GradeId, update: &GradeUpdate) -> Result<Grade, LedgerError> {
        if update.is_empty() {
            return self.get_grade(id);
        }

        let started_at = Instant::now();
        let result = with_transient_retry(&self.config, "update_grade", || {
            self.repo.update_grade(id, update).map_err(LedgerError::from)
        });
        match &result {
            Ok(updated) => info!(
                "event=update_grade module=grade status=ok grade_id={id} rescored={} letter={} duration_ms={}",
                update.changes_score(),
                updated.letter,
                started_at.elapsed().as_millis()
            ),
            Err(err) => log_failure("update_grade", "grade", started_at, err),
        }
        result
    }

    /// Makes a grade final and completes its enrollment in one unit.
    ///
    /// # Errors
    /// - `InvalidState` when the grade is already final or the enrollment
    ///   is not active; nothing is written in that case.
    pub fn finalize_grade(&self, id: GradeId) -> Result<FinalizedGrade, LedgerError> {
        let started_at = Instant::now();
        let result = with_transient_retry(&self.config, "finalize_grade", || {
            self.repo.finalize_grade(id).map_err(LedgerError::from)
        });
        match &result {
            Ok(finalized) => {
                info!(
                    "event=finalize_grade module=grade status=ok grade_id={id} enrollment_id={} letter={} duration_ms={}",
                    finalized.enrollment.id,
                    finalized.grade.letter,
                    started_at.elapsed().as_millis()
                );
                publish(
                    self.notifier.as_ref(),
                    &LedgerEvent::GradeFinalized {
                        grade_id: id,
                        enrollment_id: finalized.enrollment.id,
                        letter: finalized.grade.letter,
                    },
                );
            }
            Err(err) => log_failure("finalize_grade", "grade", started_at, err),
        }
        result
    }

    /// Count, average, min and max of raw values in a scope; `None` when
    /// the scope has no grades.
    pub fn aggregate(&self, scope: GradeScope) -> Result<Option<GradeAggregate>, LedgerError> {
        Ok(self.repo.aggregate(scope)?)
    }

    pub fn get_grade(&self, id: GradeId) -> Result<Grade, LedgerError> {
        self.repo
            .get_grade(id)?
            .ok_or(LedgerError::NotFound { entity: "grade", id })
    }

    pub fn get_grade_for_enrollment(
        &self,
        enrollment_id: EnrollmentId,
    ) -> Result<Option<Grade>, LedgerError> {
        Ok(self.repo.get_grade_for_enrollment(enrollment_id)?)
    }

    pub fn list_grades(&self, query: &GradeQuery) -> Result<Vec<Grade>, LedgerError> {
        Ok(self.repo.list_grades(query)?)
    }
}
