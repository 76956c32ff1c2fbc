use axum::{
    extract::{Path, State},
    Json,
};
use validator::Validate;

use crate::api::errors::ApiError;
use crate::api::guards::CurrentStudent;
use crate::core::state::AppState;
use crate::core::time::{primitive_now_utc, unix_millis};
use crate::db::types::ViolationType;
use crate::schemas::attempt::{
    AttemptResponse, BeaconAck, LiveDescriptor, StartAttemptResponse, ViolationBeacon,
};
use crate::schemas::result::{AttemptDetail, AttemptSummary};
use crate::services::integrity::DetectedViolation;
use crate::services::results;
use crate::services::session_machine::{self, AttemptState};
use crate::services::store::AttemptKey;

pub(super) async fn start_attempt(
    Path(exam_id): Path<i64>,
    CurrentStudent(student): CurrentStudent,
    State(state): State<AppState>,
) -> Result<Json<StartAttemptResponse>, ApiError> {
    let now = primitive_now_utc();
    let attempt_state = session_machine::start_or_resume(
        state.store(),
        state.bank(),
        state.settings().exam().shortfall_policy,
        exam_id,
        &student,
        now,
    )
    .await?;

    let response = match attempt_state {
        AttemptState::InProgress { attempt, questions, remaining_seconds } => {
            let api_prefix = &state.settings().api().api_v1_str;
            let live = LiveDescriptor {
                path: format!("{api_prefix}/attempts/exams/{exam_id}/live"),
                heartbeat_seconds: state.settings().live().heartbeat_interval_seconds,
            };

            StartAttemptResponse {
                state: attempt.status.as_str(),
                attempt: AttemptResponse::from_db(&attempt),
                questions: Some(questions),
                remaining_seconds: Some(remaining_seconds),
                live: Some(live),
                result: None,
            }
        }
        AttemptState::Finished { attempt } => {
            let summary = results::load_summary(state.store(), exam_id, student.id, now).await?;

            StartAttemptResponse {
                state: attempt.status.as_str(),
                attempt: AttemptResponse::from_db(&attempt),
                questions: None,
                remaining_seconds: None,
                live: None,
                result: Some(summary),
            }
        }
    };

    Ok(Json(response))
}

/// Page-hide beacon. Counts as one `left-page` violation per page id.
pub(super) async fn report_left_page(
    Path(exam_id): Path<i64>,
    CurrentStudent(student): CurrentStudent,
    State(state): State<AppState>,
    Json(payload): Json<ViolationBeacon>,
) -> Result<Json<BeaconAck>, ApiError> {
    payload.validate().map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let now = primitive_now_utc();
    let active = session_machine::load_active(state.store(), exam_id, student.id, now).await?;

    let detected = DetectedViolation {
        violation_type: ViolationType::LeftPage,
        source: None,
        occurred_at_ms: unix_millis(now),
        duration_ms: None,
    };
    let key =
        AttemptKey { exam_id: active.attempt.exam_id, student_id: active.attempt.student_id };
    let recorded =
        state.violations().record(key, &detected, Some(payload.page_id.as_str())).await?;

    Ok(Json(BeaconAck { recorded: recorded.is_some() }))
}

pub(super) async fn get_result(
    Path(exam_id): Path<i64>,
    CurrentStudent(student): CurrentStudent,
    State(state): State<AppState>,
) -> Result<Json<AttemptSummary>, ApiError> {
    let summary =
        results::load_summary(state.store(), exam_id, student.id, primitive_now_utc()).await?;
    Ok(Json(summary))
}

pub(super) async fn get_result_detail(
    Path(exam_id): Path<i64>,
    CurrentStudent(student): CurrentStudent,
    State(state): State<AppState>,
) -> Result<Json<AttemptDetail>, ApiError> {
    let detail =
        results::load_detail(state.store(), exam_id, student.id, primitive_now_utc()).await?;
    Ok(Json(detail))
}
