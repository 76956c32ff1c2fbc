use serde::Serialize;

use crate::core::time::format_primitive;
use crate::db::models::{ExamStudent, ViolationRecord};
use crate::db::types::{AttemptStatus, QuestionType, ViolationType};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct AttemptSummary {
    pub(crate) exam_id: i64,
    pub(crate) student_id: i64,
    pub(crate) student_name: String,
    pub(crate) status: AttemptStatus,
    pub(crate) score: f64,
    pub(crate) earned_points: f64,
    pub(crate) total_points: f64,
    pub(crate) correct_count: usize,
    pub(crate) question_count: usize,
    pub(crate) start_time: String,
    pub(crate) submitted_at: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct QuestionResult {
    pub(crate) order: i32,
    pub(crate) question_id: i64,
    pub(crate) question_type: QuestionType,
    pub(crate) content: String,
    pub(crate) options: Vec<String>,
    pub(crate) submitted_answer: Option<serde_json::Value>,
    pub(crate) correct_answer: Vec<String>,
    pub(crate) is_correct: bool,
    pub(crate) question_point: f64,
    pub(crate) earned_point: f64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct AttemptDetail {
    #[serde(flatten)]
    pub(crate) summary: AttemptSummary,
    pub(crate) questions: Vec<QuestionResult>,
}

/// One row of the per-exam monitoring list.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct AttemptStatusRow {
    pub(crate) student_id: i64,
    pub(crate) student_name: String,
    pub(crate) status: AttemptStatus,
    pub(crate) score: Option<f64>,
    pub(crate) submitted_at: Option<String>,
}

impl AttemptStatusRow {
    pub(crate) fn from_db(attempt: &ExamStudent) -> Self {
        Self {
            student_id: attempt.student_id,
            student_name: attempt.student_name.clone(),
            status: attempt.status,
            score: attempt.points,
            submitted_at: attempt.end_time.map(format_primitive),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ViolationResponse {
    pub(crate) id: i64,
    pub(crate) exam_id: i64,
    pub(crate) student_id: i64,
    pub(crate) violation_type: ViolationType,
    pub(crate) source: Option<String>,
    pub(crate) occurred_at: String,
    pub(crate) duration_ms: Option<i64>,
}

impl ViolationResponse {
    pub(crate) fn from_db(record: ViolationRecord) -> Self {
        Self {
            id: record.id,
            exam_id: record.exam_id,
            student_id: record.student_id,
            violation_type: record.violation_type,
            source: record.source,
            occurred_at: format_primitive(record.occurred_at),
            duration_ms: record.duration_ms,
        }
    }
}
