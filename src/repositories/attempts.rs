use sqlx::PgPool;
use time::PrimitiveDateTime;

use crate::db::models::ExamStudent;
use crate::db::types::AttemptStatus;

pub(crate) const COLUMNS: &str = "\
    exam_id, student_id, student_name, start_time, end_time, status, points, selection_seed";

const OVERDUE_BATCH: i64 = 500;

pub(crate) async fn find(
    executor: impl sqlx::PgExecutor<'_>,
    exam_id: i64,
    student_id: i64,
) -> Result<Option<ExamStudent>, sqlx::Error> {
    sqlx::query_as::<_, ExamStudent>(&format!(
        "SELECT {COLUMNS} FROM exam_students WHERE exam_id = $1 AND student_id = $2"
    ))
    .bind(exam_id)
    .bind(student_id)
    .fetch_optional(executor)
    .await
}

/// Serializes attempt creation per (exam, student) until the transaction ends.
pub(crate) async fn acquire_attempt_lock(
    executor: impl sqlx::PgExecutor<'_>,
    exam_id: i64,
    student_id: i64,
) -> Result<(), sqlx::Error> {
    sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1))")
        .bind(format!("exam_attempt:{exam_id}:{student_id}"))
        .execute(executor)
        .await?;
    Ok(())
}

pub(crate) async fn create(
    executor: impl sqlx::PgExecutor<'_>,
    attempt: &ExamStudent,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "INSERT INTO exam_students (
            exam_id, student_id, student_name, start_time, end_time, status, points, selection_seed
        ) VALUES ($1,$2,$3,$4,$5,$6,$7,$8)
        ON CONFLICT (exam_id, student_id) DO NOTHING",
    )
    .bind(attempt.exam_id)
    .bind(attempt.student_id)
    .bind(&attempt.student_name)
    .bind(attempt.start_time)
    .bind(attempt.end_time)
    .bind(attempt.status)
    .bind(attempt.points)
    .bind(attempt.selection_seed)
    .execute(executor)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Moves an in-progress attempt to a terminal status. Returns `false` when it
/// was already terminal.
pub(crate) async fn complete(
    executor: impl sqlx::PgExecutor<'_>,
    exam_id: i64,
    student_id: i64,
    status: AttemptStatus,
    points: f64,
    end_time: PrimitiveDateTime,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE exam_students SET status = $3, points = $4, end_time = $5
         WHERE exam_id = $1 AND student_id = $2 AND status = $6",
    )
    .bind(exam_id)
    .bind(student_id)
    .bind(status)
    .bind(points)
    .bind(end_time)
    .bind(AttemptStatus::InProgress)
    .execute(executor)
    .await?;

    Ok(result.rows_affected() > 0)
}

pub(crate) async fn list_overdue(
    pool: &PgPool,
    now: PrimitiveDateTime,
) -> Result<Vec<(i64, i64)>, sqlx::Error> {
    sqlx::query_as::<_, (i64, i64)>(
        "SELECT es.exam_id, es.student_id
         FROM exam_students es
         JOIN exams e ON e.id = es.exam_id
         WHERE es.status = $1
           AND es.start_time + make_interval(mins => e.duration_minutes) <= $2
         ORDER BY es.start_time
         LIMIT $3",
    )
    .bind(AttemptStatus::InProgress)
    .bind(now)
    .bind(OVERDUE_BATCH)
    .fetch_all(pool)
    .await
}

pub(crate) async fn list_by_exam(
    pool: &PgPool,
    exam_id: i64,
) -> Result<Vec<ExamStudent>, sqlx::Error> {
    sqlx::query_as::<_, ExamStudent>(&format!(
        "SELECT {COLUMNS} FROM exam_students WHERE exam_id = $1 ORDER BY student_name, student_id"
    ))
    .bind(exam_id)
    .fetch_all(pool)
    .await
}
