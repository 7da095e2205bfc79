//! Ledger schema steps and the runner that brings a connection up to date.
//!
//! # Responsibility
//! - Declare the roster, catalog and ledger schema steps in apply order.
//! - Run pending steps in one transaction and record progress in
//!   `PRAGMA user_version`.
//! - Refuse a database whose ledger tables are missing at the latest version.
//!
//! # Invariants
//! - Step versions are contiguous from 1; a step never changes once shipped.
//! - A database newer than this binary is never touched.

use crate::db::{DbError, DbResult};
use log::{error, info};
use rusqlite::Connection;
use std::time::Instant;

struct SchemaStep {
    version: u32,
    name: &'static str,
    sql: &'static str,
}

const SCHEMA_STEPS: [SchemaStep; 3] = [
    SchemaStep {
        version: 1,
        name: "roster",
        sql: include_str!("0001_roster.sql"),
    },
    SchemaStep {
        version: 2,
        name: "catalog",
        sql: include_str!("0002_catalog.sql"),
    },
    SchemaStep {
        version: 3,
        name: "ledger",
        sql: include_str!("0003_ledger.sql"),
    },
];

/// Tables every ledger repository depends on once the schema is current.
const LEDGER_TABLES: [&str; 6] = [
    "students",
    "professors",
    "courses",
    "course_seats",
    "enrollments",
    "grades",
];

/// Returns the schema version this binary writes.
pub fn latest_version() -> u32 {
    SCHEMA_STEPS.len() as u32
}

/// Applies every pending schema step, then verifies the ledger tables.
///
/// # Errors
/// - `UnsupportedSchemaVersion` when the file was written by a newer binary.
/// - `MissingLedgerTable` when the version is current but a table is absent.
/// - `Sqlite` when a step fails; the transaction is rolled back.
pub fn apply_migrations(conn: &mut Connection) -> DbResult<()> {
    let from_version: u32 = conn.query_row("PRAGMA user_version;", [], |row| row.get(0))?;
    let to_version = latest_version();
    if from_version > to_version {
        return Err(DbError::UnsupportedSchemaVersion {
            db_version: from_version,
            latest_supported: to_version,
        });
    }

    if from_version < to_version {
        let started_at = Instant::now();
        if let Err(err) = run_pending_steps(conn, from_version) {
            error!(
                "event=db_migrate module=db status=error from_version={from_version} to_version={to_version} duration_ms={} error={err}",
                started_at.elapsed().as_millis()
            );
            return Err(err);
        }
        info!(
            "event=db_migrate module=db status=ok from_version={from_version} to_version={to_version} duration_ms={}",
            started_at.elapsed().as_millis()
        );
    }

    verify_ledger_tables(conn, to_version)
}

fn run_pending_steps(conn: &mut Connection, from_version: u32) -> DbResult<()> {
    let tx = conn.transaction()?;
    for step in SCHEMA_STEPS.iter().filter(|step| step.version > from_version) {
        tx.execute_batch(step.sql)?;
        tx.pragma_update(None, "user_version", step.version)?;
        info!(
            "event=db_migrate_step module=db status=ok version={} step={}",
            step.version, step.name
        );
    }
    tx.commit()?;
    Ok(())
}

fn verify_ledger_tables(conn: &Connection, version: u32) -> DbResult<()> {
    let mut stmt = conn.prepare(
        "SELECT EXISTS(
            SELECT 1
            FROM sqlite_master
            WHERE type = 'table' AND name = ?1
        );",
    )?;
    for table in LEDGER_TABLES {
        let present: bool = stmt.query_row([table], |row| row.get(0))?;
        if !present {
            return Err(DbError::MissingLedgerTable { version, table });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{latest_version, SCHEMA_STEPS};

    #[test]
    fn step_versions_are_contiguous_from_one() {
        for (index, step) in SCHEMA_STEPS.iter().enumerate() {
            assert_eq!(step.version as usize, index + 1, "step {}", step.name);
        }
        assert_eq!(latest_version(), 3);
    }
}
