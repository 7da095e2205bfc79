//! Enrollment ledger repository.
//!
//! # Responsibility
//! - Create, transition and query enrollment records.
//! - Pair every seat change with its record change in one transaction.
//!
//! # Invariants
//! - At most one `enrolled` row per (student, course); dropped and completed
//!   rows never block a new enrollment.
//! - `enroll` writes nothing when the seat reservation fails.
//! - Every transition out of `enrolled` is a conditional update on
//!   `status = 'enrolled'`, so a stale caller cannot apply it twice.

use crate::model::course::CourseId;
use crate::model::enrollment::{
    validate_attendance_pct, Enrollment, EnrollmentId, EnrollmentStatus,
};
use crate::model::grade::LetterGrade;
use crate::model::roster::StudentId;
use crate::model::{now_epoch_ms, optional_text, ValidationError};
use crate::repo::course_repo::{release_seat, reserve_seat};
use crate::repo::{ensure_connection_ready, parse_uuid, RepoError, RepoResult};
use rusqlite::types::Value;
use rusqlite::{
    params, params_from_iter, Connection, OptionalExtension, Row, Transaction, TransactionBehavior,
};
use uuid::Uuid;

const ENROLLMENT_SELECT_SQL: &str = "SELECT
    e.id AS id,
    e.student_id AS student_id,
    e.course_id AS course_id,
    e.status AS status,
    e.enrolled_at AS enrolled_at,
    e.drop_reason AS drop_reason,
    e.dropped_at AS dropped_at,
    e.completed_at AS completed_at,
    e.grade_letter AS grade_letter,
    e.attendance_pct AS attendance_pct
FROM enrollments e
INNER JOIN courses c ON c.id = e.course_id";

/// Filter options for enrollment read queries. All filters combine with AND.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EnrollmentQuery {
    pub student_id: Option<StudentId>,
    pub course_id: Option<CourseId>,
    pub status: Option<EnrollmentStatus>,
    /// Inclusive lower bound on `enrolled_at` (epoch ms).
    pub enrolled_from: Option<i64>,
    /// Inclusive upper bound on `enrolled_at` (epoch ms).
    pub enrolled_to: Option<i64>,
    /// Semester label of the enrolled course, compared case-insensitively.
    pub semester: Option<String>,
    pub limit: Option<u32>,
    pub offset: u32,
}

/// Repository interface for enrollment records.
pub trait EnrollmentRepository {
    /// Reserves a seat and inserts an `enrolled` row as one unit.
    fn enroll(&self, student_id: StudentId, course_id: CourseId) -> RepoResult<Enrollment>;
    /// Marks an `enrolled` row dropped and releases its seat as one unit.
    fn drop_enrollment(&self, id: EnrollmentId, reason: Option<&str>) -> RepoResult<Enrollment>;
    /// Removes a row (and its grade) and releases the seat it still holds.
    fn delete_enrollment(&self, id: EnrollmentId) -> RepoResult<Enrollment>;
    /// Caches the attendance percentage reported for this enrollment.
    fn record_attendance(&self, id: EnrollmentId, attendance_pct: f64) -> RepoResult<Enrollment>;
    fn get_enrollment(&self, id: EnrollmentId) -> RepoResult<Option<Enrollment>>;
    /// Lists rows ordered by `enrolled_at DESC, id ASC`.
    fn list_enrollments(&self, query: &EnrollmentQuery) -> RepoResult<Vec<Enrollment>>;
}

/// SQLite-backed enrollment repository.
pub struct SqliteEnrollmentRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteEnrollmentRepository<'conn> {
    pub fn try_new(conn: &'conn Connection) -> RepoResult<Self> {
        ensure_connection_ready(conn, &["enrollments", "courses", "course_seats", "students"])?;
        Ok(Self { conn })
    }
}

impl EnrollmentRepository for SqliteEnrollmentRepository<'_> {
    fn enroll(&self, student_id: StudentId, course_id: CourseId) -> RepoResult<Enrollment> {
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;

        if let Some(existing) = active_enrollment_for_pair(&tx, student_id, course_id)? {
            return Err(RepoError::EnrollmentConflict {
                student_id,
                course_id,
                existing,
            });
        }

        reserve_seat(&tx, course_id)?;

        let id = Uuid::new_v4();
        tx.execute(
            "INSERT INTO enrollments (id, student_id, course_id, status, enrolled_at, updated_at)
             VALUES (?1, ?2, ?3, 'enrolled', ?4, ?4);",
            params![
                id.to_string(),
                student_id.to_string(),
                course_id.to_string(),
                now_epoch_ms(),
            ],
        )?;

        let created = load_required_enrollment(&tx, id)?;
        tx.commit()?;
        Ok(created)
    }

    fn drop_enrollment(&self, id: EnrollmentId, reason: Option<&str>) -> RepoResult<Enrollment> {
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        let current = load_required_enrollment(&tx, id)?;
        ensure_transition(&current, EnrollmentStatus::Dropped)?;

        let changed = tx.execute(
            "UPDATE enrollments
             SET status = 'dropped',
                 drop_reason = ?2,
                 dropped_at = ?3,
                 updated_at = ?3
             WHERE id = ?1
               AND status = 'enrolled';",
            params![id.to_string(), optional_text(reason), now_epoch_ms()],
        )?;
        if changed == 0 {
            return Err(RepoError::InvalidTransition {
                enrollment_id: id,
                from: current.status,
                to: EnrollmentStatus::Dropped,
            });
        }
        release_seat(&tx, current.course_id)?;

        let dropped = load_required_enrollment(&tx, id)?;
        tx.commit()?;
        Ok(dropped)
    }

    fn delete_enrollment(&self, id: EnrollmentId) -> RepoResult<Enrollment> {
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        let current = load_required_enrollment(&tx, id)?;

        tx.execute("DELETE FROM enrollments WHERE id = ?1;", [id.to_string()])?;
        if current.status.holds_seat() {
            release_seat(&tx, current.course_id)?;
        }

        tx.commit()?;
        Ok(current)
    }

    fn record_attendance(&self, id: EnrollmentId, attendance_pct: f64) -> RepoResult<Enrollment> {
        let attendance_pct = validate_attendance_pct(attendance_pct)?;
        let changed = self.conn.execute(
            "UPDATE enrollments
             SET attendance_pct = ?2,
                 updated_at = ?3
             WHERE id = ?1;",
            params![id.to_string(), attendance_pct, now_epoch_ms()],
        )?;
        if changed == 0 {
            return Err(RepoError::NotFound {
                entity: "enrollment",
                id,
            });
        }
        load_required_enrollment(self.conn, id)
    }

    fn get_enrollment(&self, id: EnrollmentId) -> RepoResult<Option<Enrollment>> {
        load_enrollment(self.conn, id)
    }

    fn list_enrollments(&self, query: &EnrollmentQuery) -> RepoResult<Vec<Enrollment>> {
        if let (Some(from), Some(to)) = (query.enrolled_from, query.enrolled_to) {
            if from > to {
                return Err(ValidationError::InvertedRange { from, to }.into());
            }
        }

        let mut sql = format!("{ENROLLMENT_SELECT_SQL} WHERE 1 = 1");
        let mut bind_values: Vec<Value> = Vec::new();

        if let Some(student_id) = query.student_id {
            sql.push_str(" AND e.student_id = ?");
            bind_values.push(Value::Text(student_id.to_string()));
        }
        if let Some(course_id) = query.course_id {
            sql.push_str(" AND e.course_id = ?");
            bind_values.push(Value::Text(course_id.to_string()));
        }
        if let Some(status) = query.status {
            sql.push_str(" AND e.status = ?");
            bind_values.push(Value::Text(enrollment_status_to_db(status).to_string()));
        }
        if let Some(from) = query.enrolled_from {
            sql.push_str(" AND e.enrolled_at >= ?");
            bind_values.push(Value::Integer(from));
        }
        if let Some(to) = query.enrolled_to {
            sql.push_str(" AND e.enrolled_at <= ?");
            bind_values.push(Value::Integer(to));
        }
        if let Some(semester) = query.semester.as_ref() {
            sql.push_str(" AND c.semester = ? COLLATE NOCASE");
            bind_values.push(Value::Text(semester.trim().to_string()));
        }

        sql.push_str(" ORDER BY e.enrolled_at DESC, e.id ASC");

        if let Some(limit) = query.limit {
            sql.push_str(" LIMIT ?");
            bind_values.push(Value::Integer(i64::from(limit)));
            if query.offset > 0 {
                sql.push_str(" OFFSET ?");
                bind_values.push(Value::Integer(i64::from(query.offset)));
            }
        } else if query.offset > 0 {
            sql.push_str(" LIMIT -1 OFFSET ?");
            bind_values.push(Value::Integer(i64::from(query.offset)));
        }

        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query(params_from_iter(bind_values))?;
        let mut enrollments = Vec::new();
        while let Some(row) = rows.next()? {
            enrollments.push(parse_enrollment_row(row)?);
        }
        Ok(enrollments)
    }
}

/// Moves an `enrolled` row to `completed` at `completed_at` and caches the
/// final letter.
///
/// Must run inside the caller's transaction so the grade write and this
/// transition commit together.
pub(crate) fn complete_enrollment(
    conn: &Connection,
    id: EnrollmentId,
    letter: LetterGrade,
    completed_at: i64,
) -> RepoResult<Enrollment> {
    let current = load_required_enrollment(conn, id)?;
    ensure_transition(&current, EnrollmentStatus::Completed)?;

    let changed = conn.execute(
        "UPDATE enrollments
         SET status = 'completed',
             completed_at = ?2,
             grade_letter = ?3,
             updated_at = ?2
         WHERE id = ?1
           AND status = 'enrolled';",
        params![id.to_string(), completed_at, letter.as_str()],
    )?;
    if changed == 0 {
        return Err(RepoError::InvalidTransition {
            enrollment_id: id,
            from: current.status,
            to: EnrollmentStatus::Completed,
        });
    }
    load_required_enrollment(conn, id)
}

pub(crate) fn load_enrollment(
    conn: &Connection,
    id: EnrollmentId,
) -> RepoResult<Option<Enrollment>> {
    let mut stmt = conn.prepare(&format!("{ENROLLMENT_SELECT_SQL} WHERE e.id = ?1;"))?;
    let mut rows = stmt.query([id.to_string()])?;
    if let Some(row) = rows.next()? {
        return Ok(Some(parse_enrollment_row(row)?));
    }
    Ok(None)
}

pub(crate) fn load_required_enrollment(
    conn: &Connection,
    id: EnrollmentId,
) -> RepoResult<Enrollment> {
    load_enrollment(conn, id)?.ok_or(RepoError::NotFound {
        entity: "enrollment",
        id,
    })
}

fn ensure_transition(current: &Enrollment, next: EnrollmentStatus) -> RepoResult<()> {
    if current.status.can_transition_to(next) {
        return Ok(());
    }
    Err(RepoError::InvalidTransition {
        enrollment_id: current.id,
        from: current.status,
        to: next,
    })
}

fn active_enrollment_for_pair(
    conn: &Connection,
    student_id: StudentId,
    course_id: CourseId,
) -> RepoResult<Option<EnrollmentId>> {
    let existing: Option<String> = conn
        .query_row(
            "SELECT id
             FROM enrollments
             WHERE student_id = ?1
               AND course_id = ?2
               AND status = 'enrolled';",
            params![student_id.to_string(), course_id.to_string()],
            |row| row.get(0),
        )
        .optional()?;
    existing
        .map(|value| parse_uuid(&value, "enrollments.id"))
        .transpose()
}

fn parse_enrollment_row(row: &Row<'_>) -> RepoResult<Enrollment> {
    let id_text: String = row.get("id")?;
    let student_text: String = row.get("student_id")?;
    let course_text: String = row.get("course_id")?;
    let status_text: String = row.get("status")?;

    let grade_letter = match row.get::<_, Option<String>>("grade_letter")? {
        Some(value) => Some(LetterGrade::parse(&value).ok_or_else(|| {
            RepoError::InvalidData(format!(
                "invalid grade letter `{value}` in enrollments.grade_letter"
            ))
        })?),
        None => None,
    };

    Ok(Enrollment {
        id: parse_uuid(&id_text, "enrollments.id")?,
        student_id: parse_uuid(&student_text, "enrollments.student_id")?,
        course_id: parse_uuid(&course_text, "enrollments.course_id")?,
        status: parse_enrollment_status(&status_text)?,
        enrolled_at: row.get("enrolled_at")?,
        drop_reason: row.get("drop_reason")?,
        dropped_at: row.get("dropped_at")?,
        completed_at: row.get("completed_at")?,
        grade_letter,
        attendance_pct: row.get("attendance_pct")?,
    })
}

pub(crate) fn enrollment_status_to_db(status: EnrollmentStatus) -> &'static str {
    match status {
        EnrollmentStatus::Enrolled => "enrolled",
        EnrollmentStatus::Dropped => "dropped",
        EnrollmentStatus::Completed => "completed",
    }
}

fn parse_enrollment_status(value: &str) -> RepoResult<EnrollmentStatus> {
    match value {
        "enrolled" => Ok(EnrollmentStatus::Enrolled),
        "dropped" => Ok(EnrollmentStatus::Dropped),
        "completed" => Ok(EnrollmentStatus::Completed),
        other => Err(RepoError::InvalidData(format!(
            "invalid enrollment status `{other}` in enrollments.status"
        ))),
    }
}
