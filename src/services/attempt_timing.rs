use time::{Duration, PrimitiveDateTime};

use crate::db::models::{Exam, ExamStudent};
use crate::services::error::EngineError;

/// Server-side view of an attempt clock, recomputed from storage on every use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TimerState {
    Running { remaining_seconds: i64 },
    Expired,
}

pub(crate) fn attempt_deadline(
    started_at: PrimitiveDateTime,
    duration_minutes: i32,
) -> PrimitiveDateTime {
    started_at + Duration::minutes(duration_minutes.max(0) as i64)
}

pub(crate) fn deadline_for(attempt: &ExamStudent, exam: &Exam) -> PrimitiveDateTime {
    attempt_deadline(attempt.start_time, exam.duration_minutes)
}

pub(crate) fn is_expired(deadline: PrimitiveDateTime, now: PrimitiveDateTime) -> bool {
    now >= deadline
}

/// Whole seconds left, rounded up so a client never sees 0 before expiry.
pub(crate) fn remaining_seconds(deadline: PrimitiveDateTime, now: PrimitiveDateTime) -> i64 {
    let left = deadline - now;
    if left <= Duration::ZERO {
        return 0;
    }

    let whole = left.whole_seconds();
    if left - Duration::seconds(whole) > Duration::ZERO {
        whole + 1
    } else {
        whole
    }
}

pub(crate) fn timer_state(deadline: PrimitiveDateTime, now: PrimitiveDateTime) -> TimerState {
    if is_expired(deadline, now) {
        TimerState::Expired
    } else {
        TimerState::Running { remaining_seconds: remaining_seconds(deadline, now) }
    }
}

/// Attempts may only begin inside `[start_time, end_time]`.
pub(crate) fn check_window(exam: &Exam, now: PrimitiveDateTime) -> Result<(), EngineError> {
    if now < exam.start_time {
        return Err(EngineError::NotStarted);
    }
    if now > exam.end_time {
        return Err(EngineError::WindowClosed);
    }
    Ok(())
}
