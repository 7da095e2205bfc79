//! Post-commit ledger notifications.
//!
//! # Invariants
//! - Events are published only after the owning transaction committed.
//! - A failing notifier is logged and ignored; it never rolls back or
//!   fails the operation that produced the event.

use crate::model::course::CourseId;
use crate::model::enrollment::EnrollmentId;
use crate::model::grade::{GradeId, LetterGrade};
use crate::model::roster::StudentId;
use log::{debug, warn};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Committed ledger change published to downstream collaborators.
#[derive(Debug, Clone, PartialEq)]
pub enum LedgerEvent {
    Enrolled {
        enrollment_id: EnrollmentId,
        student_id: StudentId,
        course_id: CourseId,
    },
    Dropped {
        enrollment_id: EnrollmentId,
        student_id: StudentId,
        course_id: CourseId,
    },
    GradeAssigned {
        grade_id: GradeId,
        enrollment_id: EnrollmentId,
        letter: LetterGrade,
    },
    GradeFinalized {
        grade_id: GradeId,
        enrollment_id: EnrollmentId,
        letter: LetterGrade,
    },
}

impl LedgerEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Enrolled { .. } => "enrolled",
            Self::Dropped { .. } => "dropped",
            Self::GradeAssigned { .. } => "grade_assigned",
            Self::GradeFinalized { .. } => "grade_finalized",
        }
    }
}

/// Delivery failure reported by a notifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotifyError {
    message: String,
}

impl NotifyError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl Display for NotifyError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "notification failed: {}", self.message)
    }
}

impl Error for NotifyError {}

/// Receiver of committed ledger events (mail, push, audit feeds).
pub trait LedgerNotifier: Send + Sync {
    fn notify(&self, event: &LedgerEvent) -> Result<(), NotifyError>;
}

/// Notifier that discards every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopNotifier;

impl LedgerNotifier for NoopNotifier {
    fn notify(&self, _event: &LedgerEvent) -> Result<(), NotifyError> {
        Ok(())
    }
}

pub(crate) fn publish(notifier: &dyn LedgerNotifier, event: &LedgerEvent) {
    match notifier.notify(event) {
        Ok(()) => debug!(
            "event=notify module=notify status=ok ledger_event={}",
            event.name()
        ),
        Err(err) => warn!(
            "event=notify module=notify status=error ledger_event={} error={err}",
            event.name()
        ),
    }
}
