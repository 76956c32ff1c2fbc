//! Attempt lifecycle: not started, in progress, then completed or expired.

use rand::rngs::StdRng;
use rand::SeedableRng;
use time::PrimitiveDateTime;

use crate::core::config::ShortfallPolicy;
use crate::core::security::Identity;
use crate::db::models::{Exam, ExamStudent};
use crate::db::types::AttemptStatus;
use crate::schemas::attempt::QuestionView;
use crate::services::attempt_timing::{check_window, deadline_for, is_expired, remaining_seconds};
use crate::services::blueprint_selector::select_questions;
use crate::services::error::EngineError;
use crate::services::grading::{finalize_attempt, FinalizeMode};
use crate::services::snapshot_builder::{build_snapshot, question_views};
use crate::services::store::{AttemptCreation, ExamStore, NewAttempt, QuestionBank};

#[derive(Debug)]
pub(crate) enum AttemptState {
    InProgress { attempt: ExamStudent, questions: Vec<QuestionView>, remaining_seconds: i64 },
    Finished { attempt: ExamStudent },
}

/// An in-progress attempt the live channel may attach to.
#[derive(Debug, Clone)]
pub(crate) struct ActiveAttempt {
    pub(crate) exam: Exam,
    pub(crate) attempt: ExamStudent,
    pub(crate) deadline: PrimitiveDateTime,
}

pub(crate) async fn start_or_resume(
    store: &dyn ExamStore,
    bank: &dyn QuestionBank,
    policy: ShortfallPolicy,
    exam_id: i64,
    student: &Identity,
    now: PrimitiveDateTime,
) -> Result<AttemptState, EngineError> {
    let exam = store.find_exam(exam_id).await?.ok_or(EngineError::NotFound("exam"))?;

    if let Some(existing) = store.find_attempt(exam_id, student.id).await? {
        return resume(store, &exam, existing, now).await;
    }

    check_window(&exam, now)?;

    let seed = rand::random::<u64>();
    let mut rng = StdRng::seed_from_u64(seed);
    let selection = select_questions(bank, exam.blueprint_id, policy, &mut rng).await?;
    let snapshot = build_snapshot(exam.id, student.id, &selection.questions);

    let attempt = ExamStudent {
        exam_id: exam.id,
        student_id: student.id,
        student_name: student.name.clone(),
        start_time: now,
        end_time: None,
        status: AttemptStatus::InProgress,
        points: None,
        selection_seed: seed as i64,
    };

    let created = store
        .create_attempt(NewAttempt { attempt: attempt.clone(), snapshot: snapshot.clone() })
        .await?;

    match created {
        AttemptCreation::Created => {
            metrics::counter!("attempts_started_total").increment(1);
            tracing::info!(
                exam_id = exam.id,
                student_id = student.id,
                questions = snapshot.len(),
                shortfalls = selection.shortfalls.len(),
                seed,
                "Attempt started"
            );

            Ok(AttemptState::InProgress {
                remaining_seconds: remaining_seconds(deadline_for(&attempt, &exam), now),
                questions: question_views(&snapshot),
                attempt,
            })
        }
        AttemptCreation::AlreadyExists(existing) => {
            tracing::info!(
                exam_id = exam.id,
                student_id = student.id,
                "Concurrent start lost the race; resuming existing attempt"
            );
            resume(store, &exam, existing, now).await
        }
    }
}

async fn resume(
    store: &dyn ExamStore,
    exam: &Exam,
    attempt: ExamStudent,
    now: PrimitiveDateTime,
) -> Result<AttemptState, EngineError> {
    if attempt.status.is_final() {
        return Ok(AttemptState::Finished { attempt });
    }

    let deadline = deadline_for(&attempt, exam);
    if is_expired(deadline, now) {
        let attempt =
            finalize_attempt(store, exam, &attempt, FinalizeMode::AutoDeadline, now).await?;
        return Ok(AttemptState::Finished { attempt });
    }

    let snapshot = store.list_snapshot(attempt.exam_id, attempt.student_id).await?;

    Ok(AttemptState::InProgress {
        questions: question_views(&snapshot),
        remaining_seconds: remaining_seconds(deadline, now),
        attempt,
    })
}

/// Loads the attempt behind a live connection. Overdue attempts are closed
/// and reported as `Expired`.
pub(crate) async fn load_active(
    store: &dyn ExamStore,
    exam_id: i64,
    student_id: i64,
    now: PrimitiveDateTime,
) -> Result<ActiveAttempt, EngineError> {
    let exam = store.find_exam(exam_id).await?.ok_or(EngineError::NotFound("exam"))?;
    let attempt = store
        .find_attempt(exam_id, student_id)
        .await?
        .ok_or(EngineError::NotFound("attempt"))?;

    match attempt.status {
        AttemptStatus::Completed => return Err(EngineError::AlreadyCompleted),
        AttemptStatus::Expired => return Err(EngineError::Expired),
        AttemptStatus::InProgress => {}
    }

    let deadline = deadline_for(&attempt, &exam);
    if is_expired(deadline, now) {
        finalize_attempt(store, &exam, &attempt, FinalizeMode::AutoDeadline, now).await?;
        return Err(EngineError::Expired);
    }

    Ok(ActiveAttempt { exam, attempt, deadline })
}
