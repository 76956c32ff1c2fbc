use sqlx::PgPool;

use crate::db::models::{Blueprint, BlueprintRow, ChapterRequirement};

pub(crate) async fn find_by_id(pool: &PgPool, id: i64) -> Result<Option<Blueprint>, sqlx::Error> {
    let row = sqlx::query_as::<_, BlueprintRow>(
        "SELECT id, subject_id, created_at FROM blueprints WHERE id = $1",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;

    let Some(row) = row else {
        return Ok(None);
    };

    let chapters = sqlx::query_as::<_, ChapterRequirement>(
        "SELECT chapter, easy_count, medium_count, hard_count, very_hard_count \
         FROM blueprint_chapters WHERE blueprint_id = $1 ORDER BY position, chapter",
    )
    .bind(id)
    .fetch_all(pool)
    .await?;

    Ok(Some(row.with_chapters(chapters)))
}
