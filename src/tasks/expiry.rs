use anyhow::{Context, Result};
use time::PrimitiveDateTime;

use crate::services::grading::{finalize_attempt, FinalizeMode};
use crate::services::store::ExamStore;

/// Grades and closes every in-progress attempt whose deadline has passed.
/// Returns how many attempts this sweep closed.
pub(crate) async fn close_expired_attempts(
    store: &dyn ExamStore,
    now: PrimitiveDateTime,
) -> Result<usize> {
    let overdue =
        store.list_overdue_attempts(now).await.context("Failed to fetch overdue attempts")?;

    let mut closed = 0;

    for key in overdue {
        let Some(exam) = store.find_exam(key.exam_id).await.context("Failed to fetch exam")? else {
            tracing::warn!(exam_id = key.exam_id, "Overdue attempt references a missing exam");
            continue;
        };
        let Some(attempt) = store
            .find_attempt(key.exam_id, key.student_id)
            .await
            .context("Failed to fetch attempt")?
        else {
            continue;
        };

        match finalize_attempt(store, &exam, &attempt, FinalizeMode::AutoDeadline, now).await {
            Ok(_) => closed += 1,
            Err(err) => tracing::error!(
                exam_id = key.exam_id,
                student_id = key.student_id,
                error = %err,
                "Failed to close overdue attempt"
            ),
        }
    }

    if closed > 0 {
        tracing::info!(closed_attempts = closed, "Closed expired attempts");
    }
    metrics::counter!("expired_attempts_closed_total").increment(closed as u64);

    Ok(closed)
}
