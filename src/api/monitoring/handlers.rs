use axum::{
    extract::{Path, State},
    Json,
};

use crate::api::errors::ApiError;
use crate::api::guards::CurrentStaff;
use crate::core::state::AppState;
use crate::core::time::primitive_now_utc;
use crate::schemas::result::{AttemptDetail, AttemptStatusRow, ViolationResponse};
use crate::services::error::EngineError;
use crate::services::results;

async fn ensure_exam(state: &AppState, exam_id: i64) -> Result<(), ApiError> {
    match state.store().find_exam(exam_id).await? {
        Some(_) => Ok(()),
        None => Err(EngineError::NotFound("exam").into()),
    }
}

pub(super) async fn list_attempts(
    Path(exam_id): Path<i64>,
    CurrentStaff(staff): CurrentStaff,
    State(state): State<AppState>,
) -> Result<Json<Vec<AttemptStatusRow>>, ApiError> {
    ensure_exam(&state, exam_id).await?;

    let attempts = state.store().list_attempts_for_exam(exam_id).await?;
    tracing::debug!(
        exam_id,
        staff_id = staff.id,
        attempts = attempts.len(),
        "Attempt list served"
    );

    Ok(Json(attempts.iter().map(AttemptStatusRow::from_db).collect()))
}

pub(super) async fn list_student_violations(
    Path((exam_id, student_id)): Path<(i64, i64)>,
    CurrentStaff(_staff): CurrentStaff,
    State(state): State<AppState>,
) -> Result<Json<Vec<ViolationResponse>>, ApiError> {
    ensure_exam(&state, exam_id).await?;

    let records = state.store().list_violations(exam_id, student_id).await?;

    Ok(Json(records.into_iter().map(ViolationResponse::from_db).collect()))
}

/// Detail view for manual review. Closes the attempt first when it is overdue.
pub(super) async fn get_student_result(
    Path((exam_id, student_id)): Path<(i64, i64)>,
    CurrentStaff(_staff): CurrentStaff,
    State(state): State<AppState>,
) -> Result<Json<AttemptDetail>, ApiError> {
    let detail =
        results::load_detail(state.store(), exam_id, student_id, primitive_now_utc()).await?;
    Ok(Json(detail))
}
