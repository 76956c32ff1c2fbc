use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::core::time::format_primitive;
use crate::db::models::ExamStudent;
use crate::db::types::{AttemptStatus, QuestionType};
use crate::schemas::result::AttemptSummary;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct QuestionView {
    pub(crate) order: i32,
    pub(crate) question_id: i64,
    pub(crate) question_type: QuestionType,
    pub(crate) content: String,
    pub(crate) options: Vec<String>,
    pub(crate) point: f64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct AttemptResponse {
    pub(crate) exam_id: i64,
    pub(crate) student_id: i64,
    pub(crate) student_name: String,
    pub(crate) status: AttemptStatus,
    pub(crate) start_time: String,
    pub(crate) end_time: Option<String>,
    pub(crate) points: Option<f64>,
}

impl AttemptResponse {
    pub(crate) fn from_db(attempt: &ExamStudent) -> Self {
        Self {
            exam_id: attempt.exam_id,
            student_id: attempt.student_id,
            student_name: attempt.student_name.clone(),
            status: attempt.status,
            start_time: format_primitive(attempt.start_time),
            end_time: attempt.end_time.map(format_primitive),
            points: attempt.points,
        }
    }
}

/// Where the client opens the live channel for this attempt.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct LiveDescriptor {
    pub(crate) path: String,
    pub(crate) heartbeat_seconds: u64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct StartAttemptResponse {
    pub(crate) state: &'static str,
    pub(crate) attempt: AttemptResponse,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) questions: Option<Vec<QuestionView>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) remaining_seconds: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) live: Option<LiveDescriptor>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) result: Option<AttemptSummary>,
}

/// Page-hide beacon sent with `navigator.sendBeacon`.
#[derive(Debug, Deserialize, Validate)]
pub(crate) struct ViolationBeacon {
    #[serde(alias = "pageId")]
    #[validate(length(min = 1, max = 128, message = "page_id must be 1..=128 characters"))]
    pub(crate) page_id: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct BeaconAck {
    /// `false` when this page was already reported.
    pub(crate) recorded: bool,
}
