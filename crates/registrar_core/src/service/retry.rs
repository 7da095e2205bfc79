//! Bounded retry for units of work that hit lock contention.

use crate::config::LedgerConfig;
use crate::service::error::LedgerError;
use log::warn;
use std::thread;

/// Runs `unit` until it succeeds, fails with a business error, or exhausts
/// `config.max_attempts()` transient failures.
///
/// Each attempt must be a complete transactional unit; a failed attempt has
/// already rolled back when it returns.
pub(crate) fn with_transient_retry<T>(
    config: &LedgerConfig,
    operation: &'static str,
    mut unit: impl FnMut() -> Result<T, LedgerError>,
) -> Result<T, LedgerError> {
    let max_attempts = config.max_attempts();
    let mut attempt = 1;
    loop {
        match unit() {
            Err(err) if err.is_retryable() && attempt < max_attempts => {
                warn!(
                    "event=transient_retry module=service status=retry operation={operation} attempt={attempt} max_attempts={max_attempts}"
                );
                thread::sleep(config.backoff_for_attempt(attempt));
                attempt += 1;
            }
            Err(err) if err.is_retryable() => {
                warn!(
                    "event=transient_retry module=service status=exhausted operation={operation} attempts={attempt}"
                );
                return Err(LedgerError::TransientFailure {
                    operation,
                    attempts: attempt,
                });
            }
            other => return other,
        }
    }
}
