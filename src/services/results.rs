use std::collections::HashMap;

use time::PrimitiveDateTime;

use crate::core::time::format_primitive;
use crate::db::models::{ExamStudent, QuestionExam, StudentQuestion};
use crate::schemas::result::{AttemptDetail, AttemptSummary, QuestionResult};
use crate::services::attempt_timing::{deadline_for, is_expired};
use crate::services::error::EngineError;
use crate::services::grading::{
    final_score, finalize_attempt, is_correct, submitted_text, FinalizeMode,
};
use crate::services::store::ExamStore;

/// Result views read frozen snapshot rows and stored per-question results only.
pub(crate) fn build_detail(
    attempt: &ExamStudent,
    snapshot: &[QuestionExam],
    answers: &[StudentQuestion],
) -> AttemptDetail {
    let answers_by_question =
        answers.iter().map(|row| (row.question_id, row)).collect::<HashMap<_, _>>();

    let mut rows = snapshot.iter().collect::<Vec<_>>();
    rows.sort_by_key(|row| row.question_order);

    let questions = rows
        .into_iter()
        .map(|question| {
            let answer = answers_by_question.get(&question.question_id);
            let submitted = answer.and_then(|row| submitted_text(row));

            QuestionResult {
                order: question.question_order,
                question_id: question.question_id,
                question_type: question.question_type,
                content: question.content.clone(),
                options: question.options.0.clone(),
                submitted_answer: answer.and_then(|row| row.answer.as_ref().map(|v| v.0.clone())),
                correct_answer: question
                    .correct_answer
                    .split('|')
                    .filter(|token| !token.is_empty())
                    .map(str::to_string)
                    .collect(),
                is_correct: is_correct(submitted.as_deref(), &question.correct_answer),
                question_point: question.point,
                earned_point: answer.and_then(|row| row.result).unwrap_or(0.0),
            }
        })
        .collect::<Vec<_>>();

    AttemptDetail { summary: summarize(attempt, &questions), questions }
}

fn summarize(attempt: &ExamStudent, questions: &[QuestionResult]) -> AttemptSummary {
    let earned_points = questions.iter().map(|q| q.earned_point).sum::<f64>();
    let total_points = questions.iter().map(|q| q.question_point).sum::<f64>();

    AttemptSummary {
        exam_id: attempt.exam_id,
        student_id: attempt.student_id,
        student_name: attempt.student_name.clone(),
        status: attempt.status,
        score: attempt.points.unwrap_or_else(|| final_score(earned_points, total_points)),
        earned_points,
        total_points,
        correct_count: questions.iter().filter(|q| q.is_correct).count(),
        question_count: questions.len(),
        start_time: format_primitive(attempt.start_time),
        submitted_at: attempt.end_time.map(format_primitive),
    }
}

/// Loads the detail view of a finalized attempt. An overdue attempt found
/// in progress is closed first.
pub(crate) async fn load_detail(
    store: &dyn ExamStore,
    exam_id: i64,
    student_id: i64,
    now: PrimitiveDateTime,
) -> Result<AttemptDetail, EngineError> {
    let exam = store.find_exam(exam_id).await?.ok_or(EngineError::NotFound("exam"))?;
    let mut attempt = store
        .find_attempt(exam_id, student_id)
        .await?
        .ok_or(EngineError::NotFound("attempt"))?;

    if !attempt.status.is_final() {
        if !is_expired(deadline_for(&attempt, &exam), now) {
            return Err(EngineError::NotFinished);
        }
        attempt = finalize_attempt(store, &exam, &attempt, FinalizeMode::AutoDeadline, now).await?;
    }

    let snapshot = store.list_snapshot(exam_id, student_id).await?;
    let answers = store.list_answers(exam_id, student_id).await?;

    Ok(build_detail(&attempt, &snapshot, &answers))
}

pub(crate) async fn load_summary(
    store: &dyn ExamStore,
    exam_id: i64,
    student_id: i64,
    now: PrimitiveDateTime,
) -> Result<AttemptSummary, EngineError> {
    Ok(load_detail(store, exam_id, student_id, now).await?.summary)
}
