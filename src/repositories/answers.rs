use sqlx::types::Json;
use sqlx::{PgPool, Postgres, QueryBuilder};
use time::PrimitiveDateTime;

use crate::db::models::{QuestionExam, StudentQuestion};
use crate::db::types::AttemptStatus;
use crate::services::store::AnswerUpdate;

pub(crate) const COLUMNS: &str = "\
    exam_id, student_id, question_id, answer, result, time_spent, question_point, \
    created_at, updated_at";

/// One unanswered row per snapshot question, created with the attempt.
pub(crate) async fn insert_blank(
    executor: impl sqlx::PgExecutor<'_>,
    snapshot: &[QuestionExam],
    created_at: PrimitiveDateTime,
) -> Result<(), sqlx::Error> {
    if snapshot.is_empty() {
        return Ok(());
    }

    let mut builder = QueryBuilder::<Postgres>::new(
        "INSERT INTO student_questions (
            exam_id, student_id, question_id, time_spent, question_point, created_at, updated_at
        ) ",
    );
    builder.push_values(snapshot, |mut values, row| {
        values
            .push_bind(row.exam_id)
            .push_bind(row.student_id)
            .push_bind(row.question_id)
            .push_bind(0_i32)
            .push_bind(row.point)
            .push_bind(created_at)
            .push_bind(created_at);
    });

    builder.build().execute(executor).await?;
    Ok(())
}

/// Overwrites the answer while the attempt is in progress. Last write wins.
pub(crate) async fn save(pool: &PgPool, update: &AnswerUpdate) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE student_questions sq
         SET answer = $4, time_spent = COALESCE($5, sq.time_spent), updated_at = $6
         FROM exam_students es
         WHERE sq.exam_id = $1 AND sq.student_id = $2 AND sq.question_id = $3
           AND es.exam_id = sq.exam_id AND es.student_id = sq.student_id
           AND es.status = $7",
    )
    .bind(update.exam_id)
    .bind(update.student_id)
    .bind(update.question_id)
    .bind(Json(&update.answer))
    .bind(update.time_spent)
    .bind(update.saved_at)
    .bind(AttemptStatus::InProgress)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

pub(crate) async fn store_results(
    executor: impl sqlx::PgExecutor<'_>,
    exam_id: i64,
    student_id: i64,
    results: &[(i64, f64)],
) -> Result<(), sqlx::Error> {
    let (question_ids, points): (Vec<i64>, Vec<f64>) = results.iter().copied().unzip();

    sqlx::query(
        "UPDATE student_questions sq SET result = r.result
         FROM UNNEST($3::BIGINT[], $4::DOUBLE PRECISION[]) AS r(question_id, result)
         WHERE sq.exam_id = $1 AND sq.student_id = $2 AND sq.question_id = r.question_id",
    )
    .bind(exam_id)
    .bind(student_id)
    .bind(question_ids)
    .bind(points)
    .execute(executor)
    .await?;

    Ok(())
}

pub(crate) async fn list(
    pool: &PgPool,
    exam_id: i64,
    student_id: i64,
) -> Result<Vec<StudentQuestion>, sqlx::Error> {
    sqlx::query_as::<_, StudentQuestion>(&format!(
        "SELECT {COLUMNS} FROM student_questions \
         WHERE exam_id = $1 AND student_id = $2 ORDER BY question_id"
    ))
    .bind(exam_id)
    .bind(student_id)
    .fetch_all(pool)
    .await
}
