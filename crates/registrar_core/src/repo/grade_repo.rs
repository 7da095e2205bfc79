//! Grade ledger repository.
//!
//! # Responsibility
//! - Attach, update, finalize and aggregate grades.
//! - Commit grade finalization and enrollment completion as one unit.
//!
//! # Invariants
//! - `grades.enrollment_id` is unique; a second assign is rejected and the
//!   first grade is left untouched.
//! - Stored `letter`/`points` always come from `model::grade::derive_grade`.
//! - Only `status` records finality; there is no separate boolean column.

use crate::model::course::CourseId;
use crate::model::enrollment::{Enrollment, EnrollmentId, EnrollmentStatus};
use crate::model::grade::{
    derive_grade, Grade, GradeAggregate, GradeId, GradeScope, GradeStatus, GradeType,
    GradeUpdate, LetterGrade, NewGrade,
};
use crate::model::roster::StudentId;
use crate::model::{now_epoch_ms, optional_text};
use crate::repo::enrollment_repo::{complete_enrollment, load_required_enrollment};
use crate::repo::{ensure_connection_ready, parse_uuid, read_count, RepoError, RepoResult};
use rusqlite::types::Value;
use rusqlite::{
    params, params_from_iter, Connection, OptionalExtension, Row, Transaction, TransactionBehavior,
};
use uuid::Uuid;

const GRADE_SELECT_SQL: &str = "SELECT
    g.id AS id,
    g.enrollment_id AS enrollment_id,
    g.value AS value,
    g.max_points AS max_points,
    g.letter AS letter,
    g.points AS points,
    g.grade_type AS grade_type,
    g.comment AS comment,
    g.status AS status,
    g.finalized_at AS finalized_at,
    g.created_at AS created_at,
    g.updated_at AS updated_at
FROM grades g
INNER JOIN enrollments e ON e.id = g.enrollment_id";

/// Filter options for grade listing. All filters combine with AND.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GradeQuery {
    pub student_id: Option<StudentId>,
    pub course_id: Option<CourseId>,
    pub status: Option<GradeStatus>,
}

/// Result of a committed finalization.
#[derive(Debug, Clone, PartialEq)]
pub struct FinalizedGrade {
    pub grade: Grade,
    pub enrollment: Enrollment,
}

/// Repository interface for grade records.
pub trait GradeRepository {
    fn assign_grade(&self, grade: &NewGrade) -> RepoResult<Grade>;
    fn update_grade(&self, id: GradeId, update: &GradeUpdate) -> RepoResult<Grade>;
    /// Marks the grade final and completes its enrollment as one unit.
    fn finalize_grade(&self, id: GradeId) -> RepoResult<FinalizedGrade>;
    fn get_grade(&self, id: GradeId) -> RepoResult<Option<Grade>>;
    fn get_grade_for_enrollment(&self, enrollment_id: EnrollmentId) -> RepoResult<Option<Grade>>;
    /// Lists grades ordered by `created_at ASC, id ASC`.
    fn list_grades(&self, query: &GradeQuery) -> RepoResult<Vec<Grade>>;
    /// Returns `None` when the scope matches no grade.
    fn aggregate(&self, scope: GradeScope) -> RepoResult<Option<GradeAggregate>>;
}

/// SQLite-backed grade repository.
pub struct SqliteGradeRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteGradeRepository<'conn> {
    pub fn try_new(conn: &'conn Connection) -> RepoResult<Self> {
        ensure_connection_ready(conn, &["grades", "enrollments"])?;
        Ok(Self { conn })
    }
}

impl GradeRepository for SqliteGradeRepository<'_> {
    fn assign_grade(&self, grade: &NewGrade) -> RepoResult<Grade> {
        let derived = derive_grade(grade.value, grade.max_points)?;

        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        let enrollment = load_required_enrollment(&tx, grade.enrollment_id)?;
        if enrollment.status == EnrollmentStatus::Dropped {
            return Err(RepoError::EnrollmentNotGradable {
                enrollment_id: enrollment.id,
                status: enrollment.status,
            });
        }
        if let Some(existing) = grade_id_for_enrollment(&tx, enrollment.id)? {
            return Err(RepoError::GradeExists {
                enrollment_id: enrollment.id,
                grade_id: existing,
            });
        }

        let id = Uuid::new_v4();
        tx.execute(
            "INSERT INTO grades (
                id,
                enrollment_id,
                value,
                max_points,
                letter,
                points,
                grade_type,
                comment,
                status,
                created_at,
                updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, 'pending', ?9, ?9);",
            params![
                id.to_string(),
                enrollment.id.to_string(),
                grade.value,
                grade.max_points,
                derived.letter.as_str(),
                derived.points,
                grade_type_to_db(grade.grade_type),
                optional_text(grade.comment.as_deref()),
                now_epoch_ms(),
            ],
        )?;

        let created = load_required_grade(&tx, id)?;
        tx.commit()?;
        Ok(created)
    }

    fn update_grade(&self, id: GradeId, update: &GradeUpdate) -> RepoResult<Grade> {
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        let current = load_required_grade(&tx, id)?;
        if current.is_final() {
            return Err(RepoError::GradeFinalized(id));
        }

        let value = update.value.unwrap_or(current.value);
        let max_points = update.max_points.unwrap_or(current.max_points);
        let (letter, points) = if update.changes_score() {
            let derived = derive_grade(value, max_points)?;
            (derived.letter, derived.points)
        } else {
            (current.letter, current.points)
        };
        let grade_type = update.grade_type.unwrap_or(current.grade_type);
        let comment = match update.comment.as_deref() {
            Some(text) => optional_text(Some(text)),
            None => current.comment.clone(),
        };

        tx.execute(
            "UPDATE grades
             SET value = ?2,
                 max_points = ?3,
                 letter = ?4,
                 points = ?5,
                 grade_type = ?6,
                 comment = ?7,
                 updated_at = ?8
             WHERE id = ?1
               AND status = 'pending';",
            params![
                id.to_string(),
                value,
                max_points,
                letter.as_str(),
                points,
                grade_type_to_db(grade_type),
                comment,
                now_epoch_ms(),
            ],
        )?;

        let updated = load_required_grade(&tx, id)?;
        tx.commit()?;
        Ok(updated)
    }

    fn finalize_grade(&self, id: GradeId) -> RepoResult<FinalizedGrade> {
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        let current = load_required_grade(&tx, id)?;
        if current.is_final() {
            return Err(RepoError::GradeFinalized(id));
        }

        let finalized_at = now_epoch_ms();
        let enrollment =
            complete_enrollment(&tx, current.enrollment_id, current.letter, finalized_at)?;
        let changed = tx.execute(
            "UPDATE grades
             SET status = 'final',
                 finalized_at = ?2,
                 updated_at = ?2
             WHERE id = ?1
               AND status = 'pending';",
            params![id.to_string(), finalized_at],
        )?;
        if changed == 0 {
            return Err(RepoError::GradeFinalized(id));
        }

        let grade = load_required_grade(&tx, id)?;
        tx.commit()?;
        Ok(FinalizedGrade { grade, enrollment })
    }

    fn get_grade(&self, id: GradeId) -> RepoResult<Option<Grade>> {
        load_grade(self.conn, id)
    }

    fn get_grade_for_enrollment(&self, enrollment_id: EnrollmentId) -> RepoResult<Option<Grade>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{GRADE_SELECT_SQL} WHERE g.enrollment_id = ?1;"))?;
        let mut rows = stmt.query([enrollment_id.to_string()])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_grade_row(row)?));
        }
        Ok(None)
    }

    fn list_grades(&self, query: &GradeQuery) -> RepoResult<Vec<Grade>> {
        let mut sql = format!("{GRADE_SELECT_SQL} WHERE 1 = 1");
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
            sql.push_str(" AND g.status = ?");
            bind_values.push(Value::Text(grade_status_to_db(status).to_string()));
        }
        sql.push_str(" ORDER BY g.created_at ASC, g.id ASC");

        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query(params_from_iter(bind_values))?;
        let mut grades = Vec::new();
        while let Some(row) = rows.next()? {
            grades.push(parse_grade_row(row)?);
        }
        Ok(grades)
    }

    fn aggregate(&self, scope: GradeScope) -> RepoResult<Option<GradeAggregate>> {
        let (filter, id) = match scope {
            GradeScope::Student(id) => ("e.student_id = ?1", id),
            GradeScope::Course(id) => ("e.course_id = ?1", id),
        };
        let (count, average, min, max): (i64, Option<f64>, Option<f64>, Option<f64>) =
            self.conn.query_row(
                &format!(
                    "SELECT COUNT(g.id), AVG(g.value), MIN(g.value), MAX(g.value)
                     FROM grades g
                     INNER JOIN enrollments e ON e.id = g.enrollment_id
                     WHERE {filter};"
                ),
                [id.to_string()],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
            )?;

        match (average, min, max) {
            (Some(average), Some(min), Some(max)) if count > 0 => Ok(Some(GradeAggregate {
                count: read_count(count, "grades.count")?,
                average,
                min,
                max,
            })),
            _ => Ok(None),
        }
    }
}

fn load_grade(conn: &Connection, id: GradeId) -> RepoResult<Option<Grade>> {
    let mut stmt = conn.prepare(&format!("{GRADE_SELECT_SQL} WHERE g.id = ?1;"))?;
    let mut rows = stmt.query([id.to_string()])?;
    if let Some(row) = rows.next()? {
        return Ok(Some(parse_grade_row(row)?));
    }
    Ok(None)
}

fn load_required_grade(conn: &Connection, id: GradeId) -> RepoResult<Grade> {
    load_grade(conn, id)?.ok_or(RepoError::NotFound { entity: "grade", id })
}

fn grade_id_for_enrollment(
    conn: &Connection,
    enrollment_id: EnrollmentId,
) -> RepoResult<Option<GradeId>> {
    let existing: Option<String> = conn
        .query_row(
            "SELECT id FROM grades WHERE enrollment_id = ?1;",
            [enrollment_id.to_string()],
            |row| row.get(0),
        )
        .optional()?;
    existing
        .map(|value| parse_uuid(&value, "grades.id"))
        .transpose()
}

fn parse_grade_row(row: &Row<'_>) -> RepoResult<Grade> {
    let id_text: String = row.get("id")?;
    let enrollment_text: String = row.get("enrollment_id")?;
    let letter_text: String = row.get("letter")?;
    let type_text: String = row.get("grade_type")?;
    let status_text: String = row.get("status")?;

    let letter = LetterGrade::parse(&letter_text).ok_or_else(|| {
        RepoError::InvalidData(format!("invalid letter `{letter_text}` in grades.letter"))
    })?;
    let grade_type = parse_grade_type(&type_text).ok_or_else(|| {
        RepoError::InvalidData(format!(
            "invalid grade type `{type_text}` in grades.grade_type"
        ))
    })?;
    let status = match status_text.as_str() {
        "pending" => GradeStatus::Pending,
        "final" => GradeStatus::Final,
        other => {
            return Err(RepoError::InvalidData(format!(
                "invalid grade status `{other}` in grades.status"
            )));
        }
    };

    Ok(Grade {
        id: parse_uuid(&id_text, "grades.id")?,
        enrollment_id: parse_uuid(&enrollment_text, "grades.enrollment_id")?,
        value: row.get("value")?,
        max_points: row.get("max_points")?,
        letter,
        points: row.get("points")?,
        grade_type,
        comment: row.get("comment")?,
        status,
        finalized_at: row.get("finalized_at")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}

fn grade_status_to_db(status: GradeStatus) -> &'static str {
    match status {
        GradeStatus::Pending => "pending",
        GradeStatus::Final => "final",
    }
}

fn grade_type_to_db(kind: GradeType) -> &'static str {
    match kind {
        GradeType::Exam => "exam",
        GradeType::Quiz => "quiz",
        GradeType::Assignment => "assignment",
        GradeType::Project => "project",
        GradeType::Participation => "participation",
        GradeType::Final => "final",
    }
}

fn parse_grade_type(value: &str) -> Option<GradeType> {
    match value {
        "exam" => Some(GradeType::Exam),
        "quiz" => Some(GradeType::Quiz),
        "assignment" => Some(GradeType::Assignment),
        "project" => Some(GradeType::Project),
        "participation" => Some(GradeType::Participation),
        "final" => Some(GradeType::Final),
        _ => None,
    }
}
