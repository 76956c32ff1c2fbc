//! Binary, all-or-nothing grading against frozen snapshot keys.

use std::collections::HashMap;

use time::PrimitiveDateTime;

use crate::db::models::{Exam, ExamStudent, QuestionExam, StudentQuestion};
use crate::db::types::AttemptStatus;
use crate::services::answer_key::{answer_text, normalize_answer};
use crate::services::attempt_timing::deadline_for;
use crate::services::error::EngineError;
use crate::services::store::{AttemptCompletion, ExamStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FinalizeMode {
    /// Student sent `SubmitExam`.
    ManualSubmit,
    /// Deadline passed; closed by the read path or the expiry sweep.
    AutoDeadline,
}

impl FinalizeMode {
    fn as_str(self) -> &'static str {
        match self {
            FinalizeMode::ManualSubmit => "submit",
            FinalizeMode::AutoDeadline => "deadline",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct GradedAttempt {
    pub(crate) earned_points: f64,
    pub(crate) total_points: f64,
    pub(crate) final_score: f64,
    pub(crate) results: Vec<(i64, f64)>,
}

/// An empty key (no marked tokens, e.g. an essay) never matches, not even an
/// empty submission.
pub(crate) fn is_correct(submitted: Option<&str>, correct_key: &str) -> bool {
    match submitted {
        Some(raw) => !correct_key.is_empty() && normalize_answer(raw) == correct_key,
        None => false,
    }
}

pub(crate) fn grade_question(submitted: Option<&str>, correct_key: &str, point: f64) -> f64 {
    if is_correct(submitted, correct_key) {
        point
    } else {
        0.0
    }
}

/// Rounds to the nearest half point, ties away from zero.
pub(crate) fn round_to_half(raw: f64) -> f64 {
    (raw * 2.0).round() / 2.0
}

pub(crate) fn final_score(earned_points: f64, total_points: f64) -> f64 {
    if total_points <= 0.0 {
        return 0.0;
    }
    round_to_half(earned_points / total_points * 10.0)
}

/// Submitted answer of a stored row as encoded text. Unparseable payloads
/// grade as unanswered.
pub(crate) fn submitted_text(row: &StudentQuestion) -> Option<String> {
    let value = row.answer.as_ref()?;
    match answer_text(&value.0) {
        Ok(text) => text,
        Err(err) => {
            tracing::warn!(
                exam_id = row.exam_id,
                student_id = row.student_id,
                question_id = row.question_id,
                error = %err,
                "Stored answer cannot be normalized; awarding zero credit"
            );
            None
        }
    }
}

pub(crate) fn grade_attempt(
    snapshot: &[QuestionExam],
    answers: &[StudentQuestion],
) -> GradedAttempt {
    let answers_by_question =
        answers.iter().map(|row| (row.question_id, row)).collect::<HashMap<_, _>>();

    let mut earned_points = 0.0;
    let mut total_points = 0.0;
    let mut results = Vec::with_capacity(snapshot.len());

    for question in snapshot {
        total_points += question.point;

        if question.correct_answer.is_empty() {
            tracing::warn!(
                exam_id = question.exam_id,
                student_id = question.student_id,
                question_id = question.question_id,
                "Snapshot has no correct answer tokens; question cannot award points"
            );
        }

        let submitted =
            answers_by_question.get(&question.question_id).and_then(|row| submitted_text(row));
        let earned = grade_question(submitted.as_deref(), &question.correct_answer, question.point);

        earned_points += earned;
        results.push((question.question_id, earned));
    }

    GradedAttempt {
        earned_points,
        total_points,
        final_score: final_score(earned_points, total_points),
        results,
    }
}

/// Grades an in-progress attempt and persists its terminal state.
///
/// Safe to race: only the first finalizer writes, everyone gets the stored
/// row back.
pub(crate) async fn finalize_attempt(
    store: &dyn ExamStore,
    exam: &Exam,
    attempt: &ExamStudent,
    mode: FinalizeMode,
    now: PrimitiveDateTime,
) -> Result<ExamStudent, EngineError> {
    if attempt.status.is_final() {
        return Ok(attempt.clone());
    }

    let snapshot = store.list_snapshot(attempt.exam_id, attempt.student_id).await?;
    let answers = store.list_answers(attempt.exam_id, attempt.student_id).await?;
    let graded = grade_attempt(&snapshot, &answers);

    let (status, end_time) = match mode {
        FinalizeMode::ManualSubmit => (AttemptStatus::Completed, now),
        FinalizeMode::AutoDeadline => (AttemptStatus::Expired, deadline_for(attempt, exam)),
    };

    let updated = store
        .complete_attempt(AttemptCompletion {
            exam_id: attempt.exam_id,
            student_id: attempt.student_id,
            status,
            points: graded.final_score,
            end_time,
            results: graded.results,
        })
        .await?;

    if updated {
        metrics::counter!("attempts_finalized_total", "mode" => mode.as_str()).increment(1);
        tracing::info!(
            exam_id = attempt.exam_id,
            student_id = attempt.student_id,
            mode = mode.as_str(),
            earned_points = graded.earned_points,
            total_points = graded.total_points,
            score = graded.final_score,
            "Attempt finalized"
        );
    } else {
        tracing::debug!(
            exam_id = attempt.exam_id,
            student_id = attempt.student_id,
            "Attempt was finalized concurrently"
        );
    }

    store
        .find_attempt(attempt.exam_id, attempt.student_id)
        .await?
        .ok_or(EngineError::NotFound("attempt"))
}
