use sqlx::{PgPool, Postgres, QueryBuilder};

use crate::db::models::QuestionExam;

pub(crate) const COLUMNS: &str = "\
    exam_id, student_id, question_id, question_order, point, correct_answer, \
    question_type, content, options";

pub(crate) async fn insert_all(
    executor: impl sqlx::PgExecutor<'_>,
    rows: &[QuestionExam],
) -> Result<(), sqlx::Error> {
    if rows.is_empty() {
        return Ok(());
    }

    let mut builder =
        QueryBuilder::<Postgres>::new(format!("INSERT INTO question_exams ({COLUMNS}) "));
    builder.push_values(rows, |mut values, row| {
        values
            .push_bind(row.exam_id)
            .push_bind(row.student_id)
            .push_bind(row.question_id)
            .push_bind(row.question_order)
            .push_bind(row.point)
            .push_bind(&row.correct_answer)
            .push_bind(row.question_type)
            .push_bind(&row.content)
            .push_bind(&row.options);
    });

    builder.build().execute(executor).await?;
    Ok(())
}

pub(crate) async fn list(
    pool: &PgPool,
    exam_id: i64,
    student_id: i64,
) -> Result<Vec<QuestionExam>, sqlx::Error> {
    sqlx::query_as::<_, QuestionExam>(&format!(
        "SELECT {COLUMNS} FROM question_exams \
         WHERE exam_id = $1 AND student_id = $2 ORDER BY question_order"
    ))
    .bind(exam_id)
    .bind(student_id)
    .fetch_all(pool)
    .await
}
