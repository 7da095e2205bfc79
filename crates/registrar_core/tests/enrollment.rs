use registrar_core::db::{open_db_in_memory, DbError};
use registrar_core::{
    import_student, CatalogService, Course, CourseId, CourseStatus, EnrollmentQuery,
    EnrollmentService, EnrollmentStatus, LedgerConfig, LedgerError, NewCourse, ProfessorId,
    RepoError, RepoResult, RosterProvider, SqliteCourseRepository, SqliteEnrollmentRepository,
    SqliteRoster, Student, StudentId, ValidationError,
};
use rusqlite::{ffi, params, Connection};
use std::cell::Cell;
use uuid::Uuid;

type Service<'conn> = EnrollmentService<SqliteEnrollmentRepository<'conn>, SqliteRoster<'conn>>;

fn enrollment_service(conn: &Connection) -> Service<'_> {
    EnrollmentService::new(
        SqliteEnrollmentRepository::try_new(conn).unwrap(),
        SqliteRoster::try_new(conn).unwrap(),
    )
}

fn seed_student(conn: &Connection, number: &str) -> StudentId {
    let student = Student::new(number, format!("Student {number}"));
    import_student(conn, &student).unwrap();
    student.id
}

fn seed_course(conn: &Connection, code: &str, semester: &str, max_seats: u32) -> Course {
    CatalogService::new(SqliteCourseRepository::try_new(conn).unwrap())
        .create_course(&NewCourse::new(code, format!("{code} title"), semester, max_seats))
        .unwrap()
}

fn filled_seats(conn: &Connection, course: &Course) -> u32 {
    conn.query_row(
        "SELECT filled_seats FROM course_seats WHERE course_id = ?1;",
        [course.id.to_string()],
        |row| row.get(0),
    )
    .unwrap()
}

#[test]
fn enroll_creates_record_and_takes_a_seat() {
    let conn = open_db_in_memory().unwrap();
    let student = seed_student(&conn, "S-001");
    let course = seed_course(&conn, "CS101", "FALL-2026", 30);
    let service = enrollment_service(&conn);

    let enrollment = service.enroll(student, course.id).unwrap();

    assert_eq!(enrollment.status, EnrollmentStatus::Enrolled);
    assert_eq!(enrollment.student_id, student);
    assert_eq!(enrollment.course_id, course.id);
    assert!(enrollment.enrolled_at > 0);
    assert_eq!(filled_seats(&conn, &course), 1);
    assert_eq!(service.get_enrollment(enrollment.id).unwrap(), enrollment);
}

#[test]
fn enroll_rejects_unknown_roster_ids_without_writing() {
    let conn = open_db_in_memory().unwrap();
    let student = seed_student(&conn, "S-001");
    let course = seed_course(&conn, "CS101", "FALL-2026", 30);
    let service = enrollment_service(&conn);

    let ghost_student = Uuid::new_v4();
    assert!(matches!(
        service.enroll(ghost_student, course.id),
        Err(LedgerError::NotFound { entity: "student", id }) if id == ghost_student
    ));
    assert!(matches!(
        service.enroll(student, Uuid::new_v4()),
        Err(LedgerError::NotFound { entity: "course", .. })
    ));
    assert_eq!(filled_seats(&conn, &course), 0);
    assert!(service.list_for_course(course.id).unwrap().is_empty());
}

#[test]
fn duplicate_active_enrollment_is_rejected() {
    let conn = open_db_in_memory().unwrap();
    let student = seed_student(&conn, "S-001");
    let course = seed_course(&conn, "CS101", "FALL-2026", 30);
    let service = enrollment_service(&conn);

    let first = service.enroll(student, course.id).unwrap();
    let second = service.enroll(student, course.id);

    assert!(matches!(
        second,
        Err(LedgerError::AlreadyExists { entity: "enrollment", ref key })
            if *key == first.id.to_string()
    ));
    assert_eq!(filled_seats(&conn, &course), 1);
}

#[test]
fn full_course_rejects_enrollment_and_writes_nothing() {
    let conn = open_db_in_memory().unwrap();
    let first = seed_student(&conn, "S-001");
    let second = seed_student(&conn, "S-002");
    let course = seed_course(&conn, "CS101", "FALL-2026", 1);
    let service = enrollment_service(&conn);

    service.enroll(first, course.id).unwrap();
    assert!(matches!(
        service.enroll(second, course.id),
        Err(LedgerError::CapacityExceeded { max_seats: 1, .. })
    ));
    assert_eq!(filled_seats(&conn, &course), 1);
    assert!(service.list_for_student(second).unwrap().is_empty());
}

#[test]
fn inactive_course_rejects_enrollment() {
    let conn = open_db_in_memory().unwrap();
    let student = seed_student(&conn, "S-001");
    let course = seed_course(&conn, "CS101", "FALL-2026", 10);
    CatalogService::new(SqliteCourseRepository::try_new(&conn).unwrap())
        .set_course_status(course.id, CourseStatus::Inactive)
        .unwrap();
    let service = enrollment_service(&conn);

    assert!(matches!(
        service.enroll(student, course.id),
        Err(LedgerError::InvalidState(_))
    ));
    assert_eq!(filled_seats(&conn, &course), 0);
}

#[test]
fn drop_releases_seat_exactly_once() {
    let conn = open_db_in_memory().unwrap();
    let student = seed_student(&conn, "S-001");
    let other = seed_student(&conn, "S-002");
    let course = seed_course(&conn, "CS101", "FALL-2026", 5);
    let service = enrollment_service(&conn);

    let enrollment = service.enroll(student, course.id).unwrap();
    service.enroll(other, course.id).unwrap();
    assert_eq!(filled_seats(&conn, &course), 2);

    let dropped = service
        .drop_enrollment(enrollment.id, Some("  schedule conflict "))
        .unwrap();
    assert_eq!(dropped.status, EnrollmentStatus::Dropped);
    assert_eq!(dropped.drop_reason.as_deref(), Some("schedule conflict"));
    assert!(dropped.dropped_at.is_some());
    assert_eq!(filled_seats(&conn, &course), 1);

    assert!(matches!(
        service.drop_enrollment(enrollment.id, None),
        Err(LedgerError::InvalidState(_))
    ));
    assert_eq!(filled_seats(&conn, &course), 1);
}

#[test]
fn student_can_reenroll_after_dropping() {
    let conn = open_db_in_memory().unwrap();
    let student = seed_student(&conn, "S-001");
    let course = seed_course(&conn, "CS101", "FALL-2026", 5);
    let service = enrollment_service(&conn);

    let first = service.enroll(student, course.id).unwrap();
    service.drop_enrollment(first.id, None).unwrap();
    let second = service.enroll(student, course.id).unwrap();

    assert_ne!(first.id, second.id);
    assert_eq!(filled_seats(&conn, &course), 1);
    let history = service.list_for_student(student).unwrap();
    assert_eq!(history.len(), 2);
}

#[test]
fn delete_releases_seat_only_for_seat_holding_rows() {
    let conn = open_db_in_memory().unwrap();
    let active = seed_student(&conn, "S-001");
    let dropped = seed_student(&conn, "S-002");
    let course = seed_course(&conn, "CS101", "FALL-2026", 5);
    let service = enrollment_service(&conn);

    let active_row = service.enroll(active, course.id).unwrap();
    let dropped_row = service.enroll(dropped, course.id).unwrap();
    service.drop_enrollment(dropped_row.id, None).unwrap();
    assert_eq!(filled_seats(&conn, &course), 1);

    service.delete_enrollment(dropped_row.id).unwrap();
    assert_eq!(filled_seats(&conn, &course), 1);

    let removed = service.delete_enrollment(active_row.id).unwrap();
    assert_eq!(removed.status, EnrollmentStatus::Enrolled);
    assert_eq!(filled_seats(&conn, &course), 0);
    assert!(matches!(
        service.get_enrollment(active_row.id),
        Err(LedgerError::NotFound { entity: "enrollment", .. })
    ));
}

#[test]
fn record_attendance_validates_percentage() {
    let conn = open_db_in_memory().unwrap();
    let student = seed_student(&conn, "S-001");
    let course = seed_course(&conn, "CS101", "FALL-2026", 5);
    let service = enrollment_service(&conn);
    let enrollment = service.enroll(student, course.id).unwrap();

    let updated = service.record_attendance(enrollment.id, 87.5).unwrap();
    assert_eq!(updated.attendance_pct, Some(87.5));

    assert!(matches!(
        service.record_attendance(enrollment.id, 100.5),
        Err(LedgerError::Validation(ValidationError::AttendanceOutOfRange(_)))
    ));
    assert!(matches!(
        service.record_attendance(Uuid::new_v4(), 50.0),
        Err(LedgerError::NotFound { entity: "enrollment", .. })
    ));
}

#[test]
fn list_filters_by_date_range_and_semester() {
    let conn = open_db_in_memory().unwrap();
    let student = seed_student(&conn, "S-001");
    let fall = seed_course(&conn, "CS101", "FALL-2026", 5);
    let spring = seed_course(&conn, "CS102", "SPRING-2027", 5);
    let later = seed_course(&conn, "CS103", "SPRING-2027", 5);
    let service = enrollment_service(&conn);

    let in_fall = service.enroll(student, fall.id).unwrap();
    let in_spring = service.enroll(student, spring.id).unwrap();
    let in_later = service.enroll(student, later.id).unwrap();
    for (id, enrolled_at) in [
        (in_fall.id, 1_000_i64),
        (in_spring.id, 2_000),
        (in_later.id, 3_000),
    ] {
        conn.execute(
            "UPDATE enrollments SET enrolled_at = ?2 WHERE id = ?1;",
            params![id.to_string(), enrolled_at],
        )
        .unwrap();
    }

    let ranged = service
        .list_enrollments(&EnrollmentQuery {
            student_id: Some(student),
            enrolled_from: Some(1_500),
            enrolled_to: Some(3_000),
            ..EnrollmentQuery::default()
        })
        .unwrap();
    let ids: Vec<Uuid> = ranged.iter().map(|row| row.id).collect();
    assert_eq!(ids, vec![in_later.id, in_spring.id]);

    let spring_only = service
        .list_enrollments(&EnrollmentQuery {
            student_id: Some(student),
            semester: Some("spring-2027".to_string()),
            limit: Some(1),
            ..EnrollmentQuery::default()
        })
        .unwrap();
    assert_eq!(spring_only.len(), 1);
    assert_eq!(spring_only[0].id, in_later.id);

    let inverted = service.list_enrollments(&EnrollmentQuery {
        enrolled_from: Some(3_000),
        enrolled_to: Some(1_000),
        ..EnrollmentQuery::default()
    });
    assert!(matches!(
        inverted,
        Err(LedgerError::Validation(ValidationError::InvertedRange { .. }))
    ));
}

/// Roster whose first `busy_calls` student lookups report a locked database.
struct ContendedRoster<'conn> {
    inner: SqliteRoster<'conn>,
    busy_calls: u32,
    student_calls: Cell<u32>,
}

impl<'conn> ContendedRoster<'conn> {
    fn new(conn: &'conn Connection, busy_calls: u32) -> Self {
        Self {
            inner: SqliteRoster::try_new(conn).unwrap(),
            busy_calls,
            student_calls: Cell::new(0),
        }
    }
}

impl RosterProvider for ContendedRoster<'_> {
    fn student_exists(&self, id: StudentId) -> RepoResult<bool> {
        let call = self.student_calls.get() + 1;
        self.student_calls.set(call);
        if call <= self.busy_calls {
            let busy = rusqlite::Error::SqliteFailure(ffi::Error::new(ffi::SQLITE_BUSY), None);
            return Err(RepoError::Db(DbError::Sqlite(busy)));
        }
        self.inner.student_exists(id)
    }

    fn professor_exists(&self, id: ProfessorId) -> RepoResult<bool> {
        self.inner.professor_exists(id)
    }

    fn course_exists(&self, id: CourseId) -> RepoResult<bool> {
        self.inner.course_exists(id)
    }
}

fn no_backoff(max_transient_retries: u32) -> LedgerConfig {
    LedgerConfig {
        max_transient_retries,
        retry_backoff_ms: 0,
        ..LedgerConfig::default()
    }
}

#[test]
fn busy_roster_lookup_is_retried_until_attempts_run_out() {
    let conn = open_db_in_memory().unwrap();
    let student = seed_student(&conn, "S-001");
    let course = seed_course(&conn, "CS101", "FALL-2026", 5);
    let config = no_backoff(2);
    let roster = ContendedRoster::new(&conn, u32::MAX);
    let repo = SqliteEnrollmentRepository::try_new(&conn).unwrap();
    let service = EnrollmentService::new(repo, &roster).with_config(config.clone());

    let result = service.enroll(student, course.id);

    assert!(matches!(
        result,
        Err(LedgerError::TransientFailure {
            operation: "enroll",
            attempts: 3
        })
    ));
    assert_eq!(roster.student_calls.get(), config.max_attempts());
    assert_eq!(filled_seats(&conn, &course), 0);
}

#[test]
fn enroll_succeeds_once_roster_contention_clears() {
    let conn = open_db_in_memory().unwrap();
    let student = seed_student(&conn, "S-001");
    let course = seed_course(&conn, "CS101", "FALL-2026", 5);
    let roster = ContendedRoster::new(&conn, 2);
    let repo = SqliteEnrollmentRepository::try_new(&conn).unwrap();
    let service = EnrollmentService::new(repo, &roster).with_config(no_backoff(3));

    let enrollment = service.enroll(student, course.id).unwrap();

    assert_eq!(enrollment.status, EnrollmentStatus::Enrolled);
    assert_eq!(roster.student_calls.get(), 3);
    assert_eq!(filled_seats(&conn, &course), 1);
}
