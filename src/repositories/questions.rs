use sqlx::PgPool;

use crate::db::models::Question;
use crate::db::types::Difficulty;

pub(crate) const COLUMNS: &str = "\
    id, subject_id, chapter, difficulty, question_type, point, content, answer_encoding";

pub(crate) async fn list_bucket(
    pool: &PgPool,
    subject_id: i64,
    chapter: i32,
    difficulty: Difficulty,
) -> Result<Vec<Question>, sqlx::Error> {
    sqlx::query_as::<_, Question>(&format!(
        "SELECT {COLUMNS} FROM questions \
         WHERE subject_id = $1 AND chapter = $2 AND difficulty = $3 ORDER BY id"
    ))
    .bind(subject_id)
    .bind(chapter)
    .bind(difficulty)
    .fetch_all(pool)
    .await
}
