//! Protocol state of one live sync connection.
//!
//! Transport-free: the websocket handler feeds decoded client messages and
//! timer ticks in, and writes the returned server messages out. All timing is
//! derived from the stored attempt, so reconnecting never changes the deadline.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::PrimitiveDateTime;

use crate::core::time::unix_millis;
use crate::db::models::ExamStudent;
use crate::db::types::{AttemptStatus, ViolationType};
use crate::services::answer_key::answer_text;
use crate::services::attempt_timing::{is_expired, timer_state, TimerState};
use crate::services::error::EngineError;
use crate::services::grading::{finalize_attempt, FinalizeMode};
use crate::services::integrity::{
    FocusSource, IntegrityConfig, IntegrityEvent, IntegrityMonitor, IntegritySignal,
};
use crate::services::session_machine::{load_active, ActiveAttempt};
use crate::services::store::{AnswerUpdate, AttemptKey, ExamStore};
use crate::services::violations::ViolationRecorder;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "Action")]
pub(crate) enum ClientMessage {
    SyncState,
    Heartbeat,
    #[serde(rename_all = "PascalCase")]
    SubmitAnswer {
        order: i32,
        question_id: i64,
        #[serde(default)]
        answer: Value,
        #[serde(default)]
        time_spent: Option<i32>,
    },
    SubmitExam,
    #[serde(rename_all = "PascalCase")]
    Integrity {
        signal: IntegritySignal,
        #[serde(default)]
        source: Option<FocusSource>,
        #[serde(default)]
        page_id: Option<String>,
    },
}

pub(crate) fn parse_client_message(text: &str) -> Result<ClientMessage, serde_json::Error> {
    serde_json::from_str(text)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub(crate) enum ServerMessage {
    /// Seconds left on the attempt clock.
    Remaining(i64),
    Answers(Vec<SavedAnswer>),
    Status(StatusMessage),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub(crate) struct SavedAnswer {
    pub(crate) order: i32,
    pub(crate) question_id: i64,
    pub(crate) answer: Value,
    pub(crate) time_spent: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct StatusMessage {
    pub(crate) status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) question_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) violation_type: Option<ViolationType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) open: Option<bool>,
}

impl StatusMessage {
    fn bare(status: &'static str) -> Self {
        Self { status, question_id: None, message: None, violation_type: None, open: None }
    }

    pub(crate) fn answer_saved(question_id: i64) -> Self {
        Self { question_id: Some(question_id), ..Self::bare("submitted") }
    }

    pub(crate) fn exam_submitted() -> Self {
        Self::bare("submitted")
    }

    pub(crate) fn expired() -> Self {
        Self::bare("expired")
    }

    pub(crate) fn error(message: impl Into<String>) -> Self {
        Self { message: Some(message.into()), ..Self::bare("error") }
    }

    pub(crate) fn alert(violation_type: ViolationType) -> Self {
        Self { violation_type: Some(violation_type), ..Self::bare("alert") }
    }

    pub(crate) fn gate(open: bool) -> Self {
        Self { open: Some(open), ..Self::bare("gate") }
    }
}

impl From<StatusMessage> for ServerMessage {
    fn from(status: StatusMessage) -> Self {
        ServerMessage::Status(status)
    }
}

/// Message text safe to show a student. Storage failures stay in the logs.
pub(crate) fn client_error(err: &EngineError) -> String {
    match err {
        EngineError::Store(inner) => {
            tracing::error!(error = %inner, "Live channel storage failure");
            "internal error".to_string()
        }
        other => other.to_string(),
    }
}

pub(crate) struct LiveContext<'a> {
    pub(crate) store: &'a dyn ExamStore,
    pub(crate) violations: &'a ViolationRecorder,
}

pub(crate) struct LiveSession {
    active: ActiveAttempt,
    orders: HashMap<i64, i32>,
    monitor: IntegrityMonitor,
    page_id: Option<String>,
    finished: bool,
}

impl LiveSession {
    /// Attaches to an in-progress attempt. Fails with `Expired` or
    /// `AlreadyCompleted` when there is nothing left to sync.
    pub(crate) async fn open(
        store: &dyn ExamStore,
        exam_id: i64,
        student_id: i64,
        integrity: IntegrityConfig,
        now: PrimitiveDateTime,
    ) -> Result<Self, EngineError> {
        let active = load_active(store, exam_id, student_id, now).await?;
        let orders = store
            .list_snapshot(exam_id, student_id)
            .await?
            .into_iter()
            .map(|row| (row.question_id, row.question_order))
            .collect();

        Ok(Self {
            active,
            orders,
            monitor: IntegrityMonitor::new(integrity),
            page_id: None,
            finished: false,
        })
    }

    pub(crate) fn key(&self) -> AttemptKey {
        AttemptKey {
            exam_id: self.active.attempt.exam_id,
            student_id: self.active.attempt.student_id,
        }
    }

    pub(crate) fn is_finished(&self) -> bool {
        self.finished
    }

    pub(crate) async fn handle(
        &mut self,
        ctx: &LiveContext<'_>,
        message: ClientMessage,
        now: PrimitiveDateTime,
    ) -> Vec<ServerMessage> {
        if self.finished {
            return vec![StatusMessage::error(EngineError::AlreadyCompleted.to_string()).into()];
        }

        if is_expired(self.active.deadline, now) {
            let mut replies: Vec<ServerMessage> = Vec::new();
            if matches!(message, ClientMessage::SubmitAnswer { .. } | ClientMessage::SubmitExam) {
                replies.push(StatusMessage::error(EngineError::Expired.to_string()).into());
            }
            replies.extend(self.expire(ctx, now).await);
            return replies;
        }

        match message {
            ClientMessage::SyncState => match self.saved_answers(ctx.store).await {
                Ok(answers) => vec![ServerMessage::Answers(answers)],
                Err(err) => vec![StatusMessage::error(client_error(&err)).into()],
            },
            ClientMessage::Heartbeat => Vec::new(),
            ClientMessage::SubmitAnswer { order, question_id, answer, time_spent } => {
                let saved =
                    self.save_answer(ctx.store, order, question_id, answer, time_spent, now).await;
                match saved {
                    Ok(reply) => vec![reply],
                    Err(err) => vec![StatusMessage::error(client_error(&err)).into()],
                }
            }
            ClientMessage::SubmitExam => self.submit(ctx, now).await,
            ClientMessage::Integrity { signal, source, page_id } => {
                if page_id.is_some() {
                    self.page_id = page_id;
                }
                let events = self.monitor.observe(signal, source, unix_millis(now));
                self.apply_integrity(ctx, events).await
            }
        }
    }

    /// Periodic server push: expiry check, pending integrity alerts and the
    /// remaining seconds.
    pub(crate) async fn tick(
        &mut self,
        ctx: &LiveContext<'_>,
        now: PrimitiveDateTime,
    ) -> Vec<ServerMessage> {
        if self.finished {
            return Vec::new();
        }

        match timer_state(self.active.deadline, now) {
            TimerState::Expired => self.expire(ctx, now).await,
            TimerState::Running { remaining_seconds } => {
                let events = self.monitor.poll(unix_millis(now));
                let mut replies = self.apply_integrity(ctx, events).await;
                replies.push(ServerMessage::Remaining(remaining_seconds));
                replies
            }
        }
    }

    /// Connection teardown. The attempt stays as it is in storage.
    pub(crate) async fn close(&mut self, ctx: &LiveContext<'_>, now: PrimitiveDateTime) {
        let events = self.monitor.finish(unix_millis(now));
        self.apply_integrity(ctx, events).await;
    }

    async fn saved_answers(&self, store: &dyn ExamStore) -> Result<Vec<SavedAnswer>, EngineError> {
        let key = self.key();
        let mut answers = store
            .list_answers(key.exam_id, key.student_id)
            .await?
            .into_iter()
            .filter_map(|row| {
                let answer = row.answer?.0;
                if answer.is_null() {
                    return None;
                }
                Some(SavedAnswer {
                    order: self.orders.get(&row.question_id).copied().unwrap_or_default(),
                    question_id: row.question_id,
                    answer,
                    time_spent: row.time_spent,
                })
            })
            .collect::<Vec<_>>();

        answers.sort_by_key(|answer| answer.order);
        Ok(answers)
    }

    async fn save_answer(
        &mut self,
        store: &dyn ExamStore,
        order: i32,
        question_id: i64,
        answer: Value,
        time_spent: Option<i32>,
        now: PrimitiveDateTime,
    ) -> Result<ServerMessage, EngineError> {
        let key = self.key();
        let expected_order = self
            .orders
            .get(&question_id)
            .copied()
            .ok_or(EngineError::UnknownQuestion(question_id))?;
        if expected_order != order {
            tracing::debug!(
                exam_id = key.exam_id,
                student_id = key.student_id,
                question_id,
                order,
                expected_order,
                "Client order differs from snapshot; using snapshot order"
            );
        }

        answer_text(&answer)?;

        let saved = store
            .save_answer(AnswerUpdate {
                exam_id: key.exam_id,
                student_id: key.student_id,
                question_id,
                answer,
                time_spent: time_spent.map(|seconds| seconds.max(0)),
                saved_at: now,
            })
            .await?;

        if !saved {
            self.finished = true;
            let status = store
                .find_attempt(key.exam_id, key.student_id)
                .await?
                .map(|attempt| attempt.status);
            return Err(match status {
                Some(AttemptStatus::Expired) => EngineError::Expired,
                _ => EngineError::AlreadyCompleted,
            });
        }

        metrics::counter!("answers_autosaved_total").increment(1);
        Ok(StatusMessage::answer_saved(question_id).into())
    }

    async fn submit(
        &mut self,
        ctx: &LiveContext<'_>,
        now: PrimitiveDateTime,
    ) -> Vec<ServerMessage> {
        let result = finalize_attempt(
            ctx.store,
            &self.active.exam,
            &self.active.attempt,
            FinalizeMode::ManualSubmit,
            now,
        )
        .await;

        match result {
            Ok(attempt) => {
                let replies = self.finish_with(ctx, &attempt, now).await;
                self.active.attempt = attempt;
                replies
            }
            Err(err) => vec![StatusMessage::error(client_error(&err)).into()],
        }
    }

    async fn expire(
        &mut self,
        ctx: &LiveContext<'_>,
        now: PrimitiveDateTime,
    ) -> Vec<ServerMessage> {
        let result = finalize_attempt(
            ctx.store,
            &self.active.exam,
            &self.active.attempt,
            FinalizeMode::AutoDeadline,
            now,
        )
        .await;

        match result {
            Ok(attempt) => {
                let replies = self.finish_with(ctx, &attempt, now).await;
                self.active.attempt = attempt;
                replies
            }
            Err(err) => {
                // The sweep retries; the client still learns time is up.
                tracing::error!(
                    exam_id = self.active.attempt.exam_id,
                    student_id = self.active.attempt.student_id,
                    error = %err,
                    "Failed to finalize expired attempt from live channel"
                );
                self.finished = true;
                vec![StatusMessage::expired().into()]
            }
        }
    }

    async fn finish_with(
        &mut self,
        ctx: &LiveContext<'_>,
        attempt: &ExamStudent,
        now: PrimitiveDateTime,
    ) -> Vec<ServerMessage> {
        self.finished = true;
        let events = self.monitor.finish(unix_millis(now));
        self.apply_integrity(ctx, events).await;

        match attempt.status {
            AttemptStatus::Expired => vec![StatusMessage::expired().into()],
            _ => vec![StatusMessage::exam_submitted().into()],
        }
    }

    async fn apply_integrity(
        &mut self,
        ctx: &LiveContext<'_>,
        events: Vec<IntegrityEvent>,
    ) -> Vec<ServerMessage> {
        let key = self.key();
        let mut replies = Vec::new();

        for event in events {
            match event {
                IntegrityEvent::Violation(detected) => {
                    if let Err(err) =
                        ctx.violations.record(key, &detected, self.page_id.as_deref()).await
                    {
                        tracing::error!(
                            exam_id = key.exam_id,
                            student_id = key.student_id,
                            error = %err,
                            "Failed to record integrity violation"
                        );
                    }
                }
                IntegrityEvent::Alert(violation_type) => {
                    replies.push(StatusMessage::alert(violation_type).into());
                }
                IntegrityEvent::Gate { open } => replies.push(StatusMessage::gate(open).into()),
            }
        }

        replies
    }
}
