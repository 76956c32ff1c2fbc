mod handlers;

use axum::{routing::get, Router};

use crate::core::state::AppState;

pub(crate) fn router() -> Router<AppState> {
    Router::new()
        .route("/exams/:exam_id/attempts", get(handlers::list_attempts))
        .route(
            "/exams/:exam_id/students/:student_id/violations",
            get(handlers::list_student_violations),
        )
        .route("/exams/:exam_id/students/:student_id/result", get(handlers::get_student_result))
}
