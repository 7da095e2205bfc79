//! Ledger use-case services.
//!
//! # Responsibility
//! - Orchestrate roster checks, repository units, bounded retries and
//!   post-commit notifications into the public ledger operations.
//! - Translate repository errors into `LedgerError` kinds.
//!
//! # Invariants
//! - Business errors are returned as-is; only `TransientFailure` is retried.
//! - Notifications are published after commit and never fail an operation.

pub mod catalog_service;
pub mod enrollment_service;
pub mod error;
pub mod grade_service;
pub mod notify;
mod retry;

use crate::service::error::LedgerError;
use log::{error, warn};
use std::time::Instant;

/// Logs a failed operation with its error kind; business rejections are
/// `warn`, storage failures are `error`.
pub(crate) fn log_failure(event: &str, module: &str, started_at: Instant, err: &LedgerError) {
    let duration_ms = started_at.elapsed().as_millis();
    if err.is_business() {
        warn!(
            "event={event} module={module} status=rejected duration_ms={duration_ms} error_code={}",
            err.code()
        );
    } else {
        error!(
            "event={event} module={module} status=error duration_ms={duration_ms} error_code={} error={}",
            err.code(),
            err
        );
    }
}
