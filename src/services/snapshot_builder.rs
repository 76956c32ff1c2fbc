use sqlx::types::Json;

use crate::db::models::{Question, QuestionExam};
use crate::schemas::attempt::QuestionView;
use crate::services::answer_key::{correct_answer_key, display_options};

/// Freezes a selected pool into per-student snapshot rows, numbered from 1 in
/// pool order.
pub(crate) fn build_snapshot(
    exam_id: i64,
    student_id: i64,
    pool: &[Question],
) -> Vec<QuestionExam> {
    pool.iter()
        .enumerate()
        .map(|(index, question)| QuestionExam {
            exam_id,
            student_id,
            question_id: question.id,
            question_order: index as i32 + 1,
            point: question.point,
            correct_answer: correct_answer_key(&question.answer_encoding),
            question_type: question.question_type,
            content: question.content.clone(),
            options: Json(display_options(&question.answer_encoding)),
        })
        .collect()
}

/// Student-facing view of a snapshot. Never exposes the correct key.
pub(crate) fn question_views(snapshot: &[QuestionExam]) -> Vec<QuestionView> {
    let mut rows = snapshot.iter().collect::<Vec<_>>();
    rows.sort_by_key(|row| row.question_order);

    rows.into_iter()
        .map(|row| QuestionView {
            order: row.question_order,
            question_id: row.question_id,
            question_type: row.question_type,
            content: row.content.clone(),
            options: row.options.0.clone(),
            point: row.point,
        })
        .collect()
}
