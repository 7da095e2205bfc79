//! Ledger runtime configuration.
//!
//! # Responsibility
//! - Hold connection tuning and transient-retry policy in one value.
//! - Parse configuration from JSON with per-field defaults.
//!
//! # Invariants
//! - `busy_timeout_ms` is never zero; lock waits are always bounded.
//! - Retries apply to `TransientFailure` only, never to business errors.

use serde::{Deserialize, Serialize};
use std::time::Duration;

const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;
const DEFAULT_MAX_TRANSIENT_RETRIES: u32 = 3;
const DEFAULT_RETRY_BACKOFF_MS: u64 = 25;

/// Connection and retry settings shared by ledger services.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    /// Upper bound for one SQLite lock wait, in milliseconds.
    pub busy_timeout_ms: u64,
    /// Extra attempts after the first one when a write hits lock contention.
    pub max_transient_retries: u32,
    /// Base sleep between attempts; attempt `n` sleeps `n * retry_backoff_ms`.
    pub retry_backoff_ms: u64,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
            max_transient_retries: DEFAULT_MAX_TRANSIENT_RETRIES,
            retry_backoff_ms: DEFAULT_RETRY_BACKOFF_MS,
        }
    }
}

impl LedgerConfig {
    /// Parses a JSON document; missing fields fall back to defaults.
    ///
    /// # Errors
    /// - Returns an error string when JSON is malformed or validation fails.
    pub fn from_json_str(value: &str) -> Result<Self, String> {
        let config: Self =
            serde_json::from_str(value).map_err(|err| format!("invalid ledger config: {err}"))?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects settings that would allow unbounded or zero-length lock waits.
    pub fn validate(&self) -> Result<(), String> {
        if self.busy_timeout_ms == 0 {
            return Err("busy_timeout_ms must be greater than zero".to_string());
        }
        Ok(())
    }

    /// Total attempts for one transient-prone write, including the first.
    pub fn max_attempts(&self) -> u32 {
        self.max_transient_retries.saturating_add(1)
    }

    pub fn backoff_for_attempt(&self, attempt: u32) -> Duration {
        Duration::from_millis(self.retry_backoff_ms.saturating_mul(u64::from(attempt)))
    }
}

#[cfg(test)]
mod tests {
    use super::LedgerConfig;
    use std::time::Duration;

    #[test]
    fn missing_fields_use_defaults() {
        let config = LedgerConfig::from_json_str(r#"{"max_transient_retries": 7}"#)
            .expect("partial config should parse");
        assert_eq!(config.max_transient_retries, 7);
        assert_eq!(config.busy_timeout_ms, LedgerConfig::default().busy_timeout_ms);
        assert_eq!(config.max_attempts(), 8);
    }

    #[test]
    fn zero_busy_timeout_is_rejected() {
        let error = LedgerConfig::from_json_str(r#"{"busy_timeout_ms": 0}"#)
            .expect_err("zero timeout must be rejected");
        assert!(error.contains("busy_timeout_ms"));
    }

    #[test]
    fn backoff_grows_linearly() {
        let config = LedgerConfig {
            retry_backoff_ms: 10,
            ..LedgerConfig::default()
        };
        assert_eq!(config.backoff_for_attempt(1), Duration::from_millis(10));
        assert_eq!(config.backoff_for_attempt(3), Duration::from_millis(30));
    }
}
