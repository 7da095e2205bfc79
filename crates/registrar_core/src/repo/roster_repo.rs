//! Read-only roster lookups.
//!
//! # Responsibility
//! - Answer "does this id exist" for students, professors and courses.
//! - Import roster rows mirrored from the identity service.
//!
//! # Invariants
//! - `RosterProvider` never mutates anything.

use crate::model::course::CourseId;
use crate::model::roster::{Professor, ProfessorId, Student, StudentId};
use crate::model::{now_epoch_ms, require_text};
use crate::repo::{ensure_connection_ready, RepoResult};
use rusqlite::{params, Connection};

/// Existence lookups consumed by the enrollment ledger.
pub trait RosterProvider {
    fn student_exists(&self, id: StudentId) -> RepoResult<bool>;
    fn professor_exists(&self, id: ProfessorId) -> RepoResult<bool>;
    fn course_exists(&self, id: CourseId) -> RepoResult<bool>;
}

impl<T: RosterProvider + ?Sized> RosterProvider for &T {
    fn student_exists(&self, id: StudentId) -> RepoResult<bool> {
        (**self).student_exists(id)
    }

    fn professor_exists(&self, id: ProfessorId) -> RepoResult<bool> {
        (**self).professor_exists(id)
    }

    fn course_exists(&self, id: CourseId) -> RepoResult<bool> {
        (**self).course_exists(id)
    }
}

/// SQLite-backed roster provider over the mirrored roster tables.
pub struct SqliteRoster<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteRoster<'conn> {
    pub fn try_new(conn: &'conn Connection) -> RepoResult<Self> {
        ensure_connection_ready(conn, &["students", "professors", "courses"])?;
        Ok(Self { conn })
    }

    fn exists(&self, sql: &str, id: uuid::Uuid) -> RepoResult<bool> {
        let exists: i64 = self.conn.query_row(sql, [id.to_string()], |row| row.get(0))?;
        Ok(exists == 1)
    }
}

impl RosterProvider for SqliteRoster<'_> {
    fn student_exists(&self, id: StudentId) -> RepoResult<bool> {
        self.exists("SELECT EXISTS(SELECT 1 FROM students WHERE id = ?1);", id)
    }

    fn professor_exists(&self, id: ProfessorId) -> RepoResult<bool> {
        self.exists("SELECT EXISTS(SELECT 1 FROM professors WHERE id = ?1);", id)
    }

    fn course_exists(&self, id: CourseId) -> RepoResult<bool> {
        self.exists("SELECT EXISTS(SELECT 1 FROM courses WHERE id = ?1);", id)
    }
}

/// Mirrors one student row from the identity service.
pub fn import_student(conn: &Connection, student: &Student) -> RepoResult<()> {
    let number = require_text("student_number", &student.student_number)?;
    let name = require_text("display_name", &student.display_name)?;
    conn.execute(
        "INSERT INTO students (id, student_number, display_name, created_at)
         VALUES (?1, ?2, ?3, ?4);",
        params![student.id.to_string(), number, name, now_epoch_ms()],
    )?;
    Ok(())
}

/// Mirrors one professor row from the identity service.
pub fn import_professor(conn: &Connection, professor: &Professor) -> RepoResult<()> {
    let name = require_text("display_name", &professor.display_name)?;
    conn.execute(
        "INSERT INTO professors (id, display_name, department, created_at)
         VALUES (?1, ?2, ?3, ?4);",
        params![
            professor.id.to_string(),
            name,
            professor.department.as_deref(),
            now_epoch_ms()
        ],
    )?;
    Ok(())
}
