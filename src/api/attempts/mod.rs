mod handlers;
mod live;

use axum::{routing::get, routing::post, Router};

use crate::core::state::AppState;

pub(crate) fn router() -> Router<AppState> {
    Router::new()
        .route("/exams/:exam_id/start", post(handlers::start_attempt))
        .route("/exams/:exam_id/live", get(live::live_channel))
        .route("/exams/:exam_id/violations", post(handlers::report_left_page))
        .route("/exams/:exam_id/result", get(handlers::get_result))
        .route("/exams/:exam_id/result/detail", get(handlers::get_result_detail))
}
