//! CLI smoke entry point.
//!
//! # Responsibility
//! - Provide a minimal executable to verify `registrar_core` linkage.
//! - Optionally audit seat counters of an existing ledger database.

use registrar_core::db::open_db;
use registrar_core::{CatalogService, SqliteCourseRepository};
use std::env;
use std::process::ExitCode;

fn main() -> ExitCode {
    println!("registrar_core ping={}", registrar_core::ping());
    println!("registrar_core version={}", registrar_core::core_version());

    let Some(db_path) = env::args().nth(1) else {
        return ExitCode::SUCCESS;
    };

    match audit(&db_path) {
        Ok(0) => {
            println!("seat_audit status=ok drifted_courses=0");
            ExitCode::SUCCESS
        }
        Ok(drifted) => {
            println!("seat_audit status=drift drifted_courses={drifted}");
            ExitCode::from(2)
        }
        Err(message) => {
            eprintln!("seat_audit status=error error={message}");
            ExitCode::FAILURE
        }
    }
}

fn audit(db_path: &str) -> Result<usize, String> {
    let conn = open_db(db_path).map_err(|err| err.to_string())?;
    let repo = SqliteCourseRepository::try_new(&conn).map_err(|err| err.to_string())?;
    let drift = CatalogService::new(repo)
        .audit_seats()
        .map_err(|err| err.to_string())?;
    for entry in &drift {
        println!(
            "course_id={} filled_seats={} held_seats={}",
            entry.course_id, entry.filled_seats, entry.held_seats
        );
    }
    Ok(drift.len())
}
