use sqlx::PgPool;

use crate::db::models::ViolationRecord;
use crate::services::store::NewViolation;

pub(crate) const COLUMNS: &str = "\
    id, exam_id, student_id, violation_type, source, occurred_at, duration_ms";

pub(crate) async fn insert(
    pool: &PgPool,
    violation: &NewViolation,
) -> Result<ViolationRecord, sqlx::Error> {
    sqlx::query_as::<_, ViolationRecord>(&format!(
        "INSERT INTO violation_records (
            exam_id, student_id, violation_type, source, occurred_at, duration_ms
        ) VALUES ($1,$2,$3,$4,$5,$6)
        RETURNING {COLUMNS}"
    ))
    .bind(violation.exam_id)
    .bind(violation.student_id)
    .bind(violation.violation_type)
    .bind(violation.source.as_deref())
    .bind(violation.occurred_at)
    .bind(violation.duration_ms)
    .fetch_one(pool)
    .await
}

pub(crate) async fn list(
    pool: &PgPool,
    exam_id: i64,
    student_id: i64,
) -> Result<Vec<ViolationRecord>, sqlx::Error> {
    sqlx::query_as::<_, ViolationRecord>(&format!(
        "SELECT {COLUMNS} FROM violation_records \
         WHERE exam_id = $1 AND student_id = $2 ORDER BY occurred_at, id"
    ))
    .bind(exam_id)
    .bind(student_id)
    .fetch_all(pool)
    .await
}
