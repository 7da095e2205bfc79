//! Roster identities mirrored from the identity service.
//!
//! The ledger never edits these records; it only needs their ids.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub type StudentId = Uuid;
pub type ProfessorId = Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Student {
    pub id: StudentId,
    /// Institution-issued number, unique across the roster.
    pub student_number: String,
    pub display_name: String,
}

impl Student {
    pub fn new(student_number: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            student_number: student_number.into(),
            display_name: display_name.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Professor {
    pub id: ProfessorId,
    pub display_name: String,
    pub department: Option<String>,
}

impl Professor {
    pub fn new(display_name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            display_name: display_name.into(),
            department: None,
        }
    }
}
