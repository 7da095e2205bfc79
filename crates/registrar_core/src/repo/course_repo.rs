//! Course catalog repository and capacity-cell mutators.
//!
//! # Responsibility
//! - Persist course offerings and their capacity cells (`course_seats`).
//! - Provide the only two seat mutators, `reserve_seat` and `release_seat`.
//!
//! # Invariants
//! - A seat is reserved by one conditional `UPDATE ... RETURNING` statement;
//!   the fill check and the increment are never separate steps.
//! - `filled_seats` never exceeds `max_seats` and never drops below zero.
//! - Callers that compose seat changes with other writes must pass an open
//!   transaction so both commit together.

use crate::model::course::{Course, CourseId, CourseStatus, NewCourse, SeatCell};
use crate::model::{now_epoch_ms, ValidationError};
use crate::repo::{
    ensure_connection_ready, parse_optional_uuid, parse_uuid, read_count, RepoError, RepoResult,
};
use log::{debug, warn};
use rusqlite::types::Value;
use rusqlite::{
    params, params_from_iter, Connection, OptionalExtension, Row, Transaction, TransactionBehavior,
};
use uuid::Uuid;

const COURSE_SELECT_SQL: &str = "SELECT
    c.id AS id,
    c.code AS code,
    c.title AS title,
    c.semester AS semester,
    c.professor_id AS professor_id,
    c.status AS status,
    c.created_at AS created_at,
    c.updated_at AS updated_at,
    s.max_seats AS max_seats,
    s.filled_seats AS filled_seats
FROM courses c
INNER JOIN course_seats s ON s.course_id = c.id";

/// Query options for listing courses.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CourseListQuery {
    /// Exact semester label, compared case-insensitively.
    pub semester: Option<String>,
    pub status: Option<CourseStatus>,
}

/// A course whose capacity cell disagrees with its seat-holding enrollments.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeatDrift {
    pub course_id: CourseId,
    pub filled_seats: u32,
    /// Count of enrollments in `enrolled` or `completed` state.
    pub held_seats: u32,
}

/// Repository interface for the course catalog.
pub trait CourseRepository {
    /// Creates one course together with its capacity cell.
    fn create_course(&self, course: &NewCourse) -> RepoResult<Course>;
    fn get_course(&self, id: CourseId) -> RepoResult<Option<Course>>;
    fn get_course_by_code(&self, code: &str) -> RepoResult<Option<Course>>;
    /// Lists courses ordered by `code ASC`.
    fn list_courses(&self, query: &CourseListQuery) -> RepoResult<Vec<Course>>;
    fn set_status(&self, id: CourseId, status: CourseStatus) -> RepoResult<()>;
    /// Changes capacity; rejects a capacity below the current fill.
    fn resize(&self, id: CourseId, max_seats: u32) -> RepoResult<SeatCell>;
    /// Reserves one seat in its own transaction and returns the new fill.
    fn reserve_seat(&self, id: CourseId) -> RepoResult<u32>;
    /// Releases one seat in its own transaction and returns the new fill.
    fn release_seat(&self, id: CourseId) -> RepoResult<u32>;
    /// Returns every course whose cell disagrees with its enrollment rows.
    fn seat_drift(&self) -> RepoResult<Vec<SeatDrift>>;
}

/// SQLite-backed course catalog repository.
pub struct SqliteCourseRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteCourseRepository<'conn> {
    pub fn try_new(conn: &'conn Connection) -> RepoResult<Self> {
        ensure_connection_ready(conn, &["courses", "course_seats", "enrollments"])?;
        Ok(Self { conn })
    }
}

impl CourseRepository for SqliteCourseRepository<'_> {
    fn create_course(&self, course: &NewCourse) -> RepoResult<Course> {
        let course = course.normalized()?;
        let id = Uuid::new_v4();

        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        if let Some(professor_id) = course.professor_id {
            let exists: i64 = tx.query_row(
                "SELECT EXISTS(SELECT 1 FROM professors WHERE id = ?1);",
                [professor_id.to_string()],
                |row| row.get(0),
            )?;
            if exists == 0 {
                return Err(RepoError::NotFound {
                    entity: "professor",
                    id: professor_id,
                });
            }
        }

        let code_taken: i64 = tx.query_row(
            "SELECT EXISTS(SELECT 1 FROM courses WHERE code = ?1 COLLATE NOCASE);",
            [course.code.as_str()],
            |row| row.get(0),
        )?;
        if code_taken == 1 {
            return Err(RepoError::DuplicateCourseCode(course.code));
        }

        tx.execute(
            "INSERT INTO courses (
                id,
                code,
                title,
                semester,
                professor_id,
                status,
                created_at,
                updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, 'active', ?6, ?6);",
            params![
                id.to_string(),
                course.code.as_str(),
                course.title.as_str(),
                course.semester.as_str(),
                course.professor_id.map(|value| value.to_string()),
                now_epoch_ms(),
            ],
        )?;
        tx.execute(
            "INSERT INTO course_seats (course_id, max_seats, filled_seats) VALUES (?1, ?2, 0);",
            params![id.to_string(), i64::from(course.max_seats)],
        )?;
        let created = load_course(&tx, id)?.ok_or(RepoError::NotFound {
            entity: "course",
            id,
        })?;
        tx.commit()?;
        Ok(created)
    }

    fn get_course(&self, id: CourseId) -> RepoResult<Option<Course>> {
        load_course(self.conn, id)
    }

    fn get_course_by_code(&self, code: &str) -> RepoResult<Option<Course>> {
        let mut stmt = self.conn.prepare(&format!(
            "{COURSE_SELECT_SQL} WHERE c.code = ?1 COLLATE NOCASE;"
        ))?;
        let mut rows = stmt.query([code.trim()])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_course_row(row)?));
        }
        Ok(None)
    }

    fn list_courses(&self, query: &CourseListQuery) -> RepoResult<Vec<Course>> {
        let mut sql = format!("{COURSE_SELECT_SQL} WHERE 1 = 1");
        let mut bind_values: Vec<Value> = Vec::new();

        if let Some(semester) = query.semester.as_ref() {
            sql.push_str(" AND c.semester = ? COLLATE NOCASE");
            bind_values.push(Value::Text(semester.trim().to_string()));
        }
        if let Some(status) = query.status {
            sql.push_str(" AND c.status = ?");
            bind_values.push(Value::Text(course_status_to_db(status).to_string()));
        }
        sql.push_str(" ORDER BY c.code ASC");

        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query(params_from_iter(bind_values))?;
        let mut courses = Vec::new();
        while let Some(row) = rows.next()? {
            courses.push(parse_course_row(row)?);
        }
        Ok(courses)
    }

    fn set_status(&self, id: CourseId, status: CourseStatus) -> RepoResult<()> {
        let changed = self.conn.execute(
            "UPDATE courses
             SET status = ?2,
                 updated_at = ?3
             WHERE id = ?1;",
            params![id.to_string(), course_status_to_db(status), now_epoch_ms()],
        )?;
        if changed == 0 {
            return Err(RepoError::NotFound {
                entity: "course",
                id,
            });
        }
        Ok(())
    }

    fn resize(&self, id: CourseId, max_seats: u32) -> RepoResult<SeatCell> {
        if max_seats == 0 {
            return Err(ValidationError::NonPositiveCapacity(0).into());
        }

        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        let resized = tx
            .query_row(
                "UPDATE course_seats
                 SET max_seats = ?2
                 WHERE course_id = ?1
                   AND filled_seats <= ?2
                 RETURNING max_seats, filled_seats;",
                params![id.to_string(), i64::from(max_seats)],
                |row| Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?)),
            )
            .optional()?;

        let Some((max, filled)) = resized else {
            let cell = load_seat_cell(&tx, id)?.ok_or(RepoError::NotFound {
                entity: "course",
                id,
            })?;
            return Err(ValidationError::CapacityBelowFill {
                max_seats,
                filled_seats: cell.filled_seats,
            }
            .into());
        };
        tx.commit()?;

        Ok(SeatCell {
            max_seats: read_count(max, "course_seats.max_seats")?,
            filled_seats: read_count(filled, "course_seats.filled_seats")?,
        })
    }

    fn reserve_seat(&self, id: CourseId) -> RepoResult<u32> {
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        let filled = reserve_seat(&tx, id)?;
        tx.commit()?;
        Ok(filled)
    }

    fn release_seat(&self, id: CourseId) -> RepoResult<u32> {
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        let filled = release_seat(&tx, id)?;
        tx.commit()?;
        Ok(filled)
    }

    fn seat_drift(&self) -> RepoResult<Vec<SeatDrift>> {
        let mut stmt = self.conn.prepare(
            "SELECT course_id, filled_seats, held_seats
             FROM (
                SELECT
                    s.course_id AS course_id,
                    s.filled_seats AS filled_seats,
                    (
                        SELECT COUNT(*)
                        FROM enrollments e
                        WHERE e.course_id = s.course_id
                          AND e.status IN ('enrolled', 'completed')
                    ) AS held_seats
                FROM course_seats s
             )
             WHERE filled_seats != held_seats
             ORDER BY course_id ASC;",
        )?;
        let mut rows = stmt.query([])?;
        let mut drift = Vec::new();
        while let Some(row) = rows.next()? {
            let course_id: String = row.get("course_id")?;
            drift.push(SeatDrift {
                course_id: parse_uuid(&course_id, "course_seats.course_id")?,
                filled_seats: read_count(row.get("filled_seats")?, "course_seats.filled_seats")?,
                held_seats: read_count(row.get("held_seats")?, "enrollments.count")?,
            });
        }
        Ok(drift)
    }
}

/// Atomically takes one seat of `course_id` and returns the new fill.
///
/// # Errors
/// - `CourseFull` when no seat is free.
/// - `CourseClosed` when the course is not active.
/// - `NotFound` when the course has no capacity cell.
pub(crate) fn reserve_seat(conn: &Connection, course_id: CourseId) -> RepoResult<u32> {
    let reserved: Option<i64> = conn
        .query_row(
            "UPDATE course_seats
             SET filled_seats = filled_seats + 1
             WHERE course_id = ?1
               AND filled_seats < max_seats
               AND EXISTS (
                 SELECT 1 FROM courses WHERE id = ?1 AND status = 'active'
               )
             RETURNING filled_seats;",
            [course_id.to_string()],
            |row| row.get(0),
        )
        .optional()?;

    if let Some(filled) = reserved {
        debug!(
            "event=seat_reserve module=catalog status=ok course_id={} filled_seats={}",
            course_id, filled
        );
        return read_count(filled, "course_seats.filled_seats");
    }

    // Nothing matched; classify the rejection from the unchanged row.
    let state: Option<(String, i64)> = conn
        .query_row(
            "SELECT c.status, s.max_seats
             FROM courses c
             INNER JOIN course_seats s ON s.course_id = c.id
             WHERE c.id = ?1;",
            [course_id.to_string()],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()?;

    match state {
        None => Err(RepoError::NotFound {
            entity: "course",
            id: course_id,
        }),
        Some((status_text, max_seats)) => {
            let status = parse_course_status(&status_text)?;
            if !status.accepts_enrollment() {
                return Err(RepoError::CourseClosed { course_id, status });
            }
            Err(RepoError::CourseFull {
                course_id,
                max_seats: read_count(max_seats, "course_seats.max_seats")?,
            })
        }
    }
}

/// Returns one seat of `course_id`, floored at zero, and returns the new fill.
pub(crate) fn release_seat(conn: &Connection, course_id: CourseId) -> RepoResult<u32> {
    let released: Option<i64> = conn
        .query_row(
            "UPDATE course_seats
             SET filled_seats = MAX(filled_seats - 1, 0)
             WHERE course_id = ?1
             RETURNING filled_seats;",
            [course_id.to_string()],
            |row| row.get(0),
        )
        .optional()?;

    let Some(filled) = released else {
        return Err(RepoError::NotFound {
            entity: "course",
            id: course_id,
        });
    };
    if filled == 0 {
        warn!(
            "event=seat_release module=catalog status=floor course_id={} filled_seats=0",
            course_id
        );
    } else {
        debug!(
            "event=seat_release module=catalog status=ok course_id={} filled_seats={}",
            course_id, filled
        );
    }
    read_count(filled, "course_seats.filled_seats")
}

pub(crate) fn load_course(conn: &Connection, id: CourseId) -> RepoResult<Option<Course>> {
    let mut stmt = conn.prepare(&format!("{COURSE_SELECT_SQL} WHERE c.id = ?1;"))?;
    let mut rows = stmt.query([id.to_string()])?;
    if let Some(row) = rows.next()? {
        return Ok(Some(parse_course_row(row)?));
    }
    Ok(None)
}

fn load_seat_cell(conn: &Connection, id: CourseId) -> RepoResult<Option<SeatCell>> {
    let cell: Option<(i64, i64)> = conn
        .query_row(
            "SELECT max_seats, filled_seats FROM course_seats WHERE course_id = ?1;",
            [id.to_string()],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()?;
    cell.map(|(max, filled)| {
        Ok(SeatCell {
            max_seats: read_count(max, "course_seats.max_seats")?,
            filled_seats: read_count(filled, "course_seats.filled_seats")?,
        })
    })
    .transpose()
}

fn parse_course_row(row: &Row<'_>) -> RepoResult<Course> {
    let id_text: String = row.get("id")?;
    let status_text: String = row.get("status")?;
    Ok(Course {
        id: parse_uuid(&id_text, "courses.id")?,
        code: row.get("code")?,
        title: row.get("title")?,
        semester: row.get("semester")?,
        professor_id: parse_optional_uuid(row.get("professor_id")?, "courses.professor_id")?,
        status: parse_course_status(&status_text)?,
        seats: SeatCell {
            max_seats: read_count(row.get("max_seats")?, "course_seats.max_seats")?,
            filled_seats: read_count(row.get("filled_seats")?, "course_seats.filled_seats")?,
        },
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}

pub(crate) fn course_status_to_db(status: CourseStatus) -> &'static str {
    match status {
        CourseStatus::Active => "active",
        CourseStatus::Inactive => "inactive",
        CourseStatus::Archived => "archived",
    }
}

fn parse_course_status(value: &str) -> RepoResult<CourseStatus> {
    match value {
        "active" => Ok(CourseStatus::Active),
        "inactive" => Ok(CourseStatus::Inactive),
        "archived" => Ok(CourseStatus::Archived),
        other => Err(RepoError::InvalidData(format!(
            "invalid course status `{other}` in courses.status"
        ))),
    }
}
