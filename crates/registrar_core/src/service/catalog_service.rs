//! Course catalog use-case service.
//!
//! # Responsibility
//! - Create and maintain course offerings and their capacity cells.
//! - Expose the raw seat mutators for callers that manage their own
//!   enrollment records, plus the seat-drift audit.
//!
//! # Invariants
//! - Every seat change goes through the conditional mutators in
//!   `repo::course_repo`; this service never computes a fill itself.

use crate::config::LedgerConfig;
use crate::model::course::{Course, CourseId, CourseStatus, NewCourse, SeatCell};
use crate::repo::course_repo::{CourseListQuery, CourseRepository, SeatDrift};
use crate::service::error::LedgerError;
use crate::service::log_failure;
use crate::service::retry::with_transient_retry;
use log::{info, warn};
use std::time::Instant;

pub struct CatalogService<R: CourseRepository> {
    repo: R,
    config: LedgerConfig,
}

impl<R: CourseRepository> CatalogService<R> {
    pub fn new(repo: R) -> Self {
        Self {
            repo,
            config: LedgerConfig::default(),
        }
    }

    pub fn with_config(mut self, config: LedgerConfig) -> Self {
        self.config = config;
        self
    }

    /// Creates a course with `filled_seats = 0`.
    ///
    /// # Errors
    /// - `Validation` for blank fields or zero capacity.
    /// - `NotFound` when the professor id is unknown.
    /// - `AlreadyExists` when the code is taken.
    pub fn create_course(&self, course: &NewCourse) -> Result<Course, LedgerError> {
        let started_at = Instant::now();
        let result = with_transient_retry(&self.config, "create_course", || {
            self.repo.create_course(course).map_err(LedgerError::from)
        });
        match &result {
            Ok(created) => info!(
                "event=create_course module=catalog status=ok course_id={} code={} max_seats={} duration_ms={}",
                created.id,
                created.code,
                created.seats.max_seats,
                started_at.elapsed().as_millis()
            ),
            Err(err) => log_failure("create_course", "catalog", started_at, err),
        }
        result
    }

    pub fn get_course(&self, id: CourseId) -> Result<Course, LedgerError> {
        self.repo
            .get_course(id)?
            .ok_or(LedgerError::NotFound { entity: "course", id })
    }

    /// Looks up a course by catalog code, ignoring case.
    pub fn get_course_by_code(&self, code: &str) -> Result<Option<Course>, LedgerError> {
        Ok(self.repo.get_course_by_code(code)?)
    }

    pub fn list_courses(&self, query: &CourseListQuery) -> Result<Vec<Course>, LedgerError> {
        Ok(self.repo.list_courses(query)?)
    }

    /// Changes the course status and returns the updated course.
    ///
    /// Existing enrollments are untouched; only new enrollments are gated.
    pub fn set_course_status(
        &self,
        id: CourseId,
        status: CourseStatus,
    ) -> Result<Course, LedgerError> {
        let started_at = Instant::now();
        let result = with_transient_retry(&self.config, "set_course_status", || {
            self.repo.set_status(id, status).map_err(LedgerError::from)
        })
        .and_then(|()| self.get_course(id));
        match &result {
            Ok(course) => info!(
                "event=set_course_status module=catalog status=ok course_id={id} course_status={:?} duration_ms={}",
                course.status,
                started_at.elapsed().as_millis()
            ),
            Err(err) => log_failure("set_course_status", "catalog", started_at, err),
        }
        result
    }

    /// Changes capacity; a capacity below the current fill is rejected.
    pub fn resize_course(&self, id: CourseId, max_seats: u32) -> Result<SeatCell, LedgerError> {
        let started_at = Instant::now();
        let result = with_transient_retry(&self.config, "resize_course", || {
            self.repo.resize(id, max_seats).map_err(LedgerError::from)
        });
        match &result {
            Ok(cell) => info!(
                "event=resize_course module=catalog status=ok course_id={id} max_seats={} filled_seats={} duration_ms={}",
                cell.max_seats,
                cell.filled_seats,
                started_at.elapsed().as_millis()
            ),
            Err(err) => log_failure("resize_course", "catalog", started_at, err),
        }
        result
    }

    /// Atomically takes one seat and returns the new fill.
    ///
    /// The caller owns the matching record; pair every successful reserve
    /// with exactly one `release_seat` when that record goes away.
    pub fn reserve_seat(&self, id: CourseId) -> Result<u32, LedgerError> {
        let started_at = Instant::now();
        let result = with_transient_retry(&self.config, "reserve_seat", || {
            self.repo.reserve_seat(id).map_err(LedgerError::from)
        });
        match &result {
            Ok(filled) => info!(
                "event=reserve_seat module=catalog status=ok course_id={id} filled_seats={filled} duration_ms={}",
                started_at.elapsed().as_millis()
            ),
            Err(err) => log_failure("reserve_seat", "catalog", started_at, err),
        }
        result
    }

    /// Gives one seat back; the fill never goes below zero.
    pub fn release_seat(&self, id: CourseId) -> Result<u32, LedgerError> {
        let started_at = Instant::now();
        let result = with_transient_retry(&self.config, "release_seat", || {
            self.repo.release_seat(id).map_err(LedgerError::from)
        });
        match &result {
            Ok(filled) => info!(
                "event=release_seat module=catalog status=ok course_id={id} filled_seats={filled} duration_ms={}",
                started_at.elapsed().as_millis()
            ),
            Err(err) => log_failure("release_seat", "catalog", started_at, err),
        }
        result
    }

    /// Compares every capacity cell with its seat-holding enrollments.
    ///
    /// Returns the disagreeing courses; an empty list means the catalog is
    /// consistent. Nothing is repaired.
    pub fn audit_seats(&self) -> Result<Vec<SeatDrift>, LedgerError> {
        let drift = self.repo.seat_drift()?;
        for entry in &drift {
            warn!(
                "event=seat_audit module=catalog status=drift course_id={} filled_seats={} held_seats={}",
                entry.course_id, entry.filled_seats, entry.held_seats
            );
        }
        info!(
            "event=seat_audit module=catalog status=ok drifted_courses={}",
            drift.len()
        );
        Ok(drift)
    }
}
