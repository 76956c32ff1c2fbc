//! Storage seams of the engine.
//!
//! The question bank and blueprint store are owned by the surrounding
//! platform; the engine only reads them. Attempt, snapshot, answer and
//! violation rows are owned by the engine. `repositories::PgStore` implements
//! both traits on PostgreSQL.

use async_trait::async_trait;
use time::PrimitiveDateTime;

use crate::db::models::{
    Blueprint, Exam, ExamStudent, Question, QuestionExam, StudentQuestion, ViolationRecord,
};
use crate::db::types::{AttemptStatus, Difficulty, ViolationType};
use crate::services::error::StoreError;

#[async_trait]
pub(crate) trait QuestionBank: Send + Sync {
    /// Blueprint with its chapter requirements loaded.
    async fn get_blueprint(&self, blueprint_id: i64) -> Result<Option<Blueprint>, StoreError>;

    async fn find_questions(
        &self,
        subject_id: i64,
        chapter: i32,
        difficulty: Difficulty,
    ) -> Result<Vec<Question>, StoreError>;
}

/// Rows written in one unit when an attempt starts.
#[derive(Debug, Clone)]
pub(crate) struct NewAttempt {
    pub(crate) attempt: ExamStudent,
    pub(crate) snapshot: Vec<QuestionExam>,
}

#[derive(Debug)]
pub(crate) enum AttemptCreation {
    Created,
    /// Another request won the race; this is its row.
    AlreadyExists(ExamStudent),
}

#[derive(Debug, Clone)]
pub(crate) struct AnswerUpdate {
    pub(crate) exam_id: i64,
    pub(crate) student_id: i64,
    pub(crate) question_id: i64,
    pub(crate) answer: serde_json::Value,
    pub(crate) time_spent: Option<i32>,
    pub(crate) saved_at: PrimitiveDateTime,
}

#[derive(Debug, Clone)]
pub(crate) struct AttemptCompletion {
    pub(crate) exam_id: i64,
    pub(crate) student_id: i64,
    pub(crate) status: AttemptStatus,
    pub(crate) points: f64,
    pub(crate) end_time: PrimitiveDateTime,
    /// Earned points keyed by question id.
    pub(crate) results: Vec<(i64, f64)>,
}

#[derive(Debug, Clone)]
pub(crate) struct NewViolation {
    pub(crate) exam_id: i64,
    pub(crate) student_id: i64,
    pub(crate) violation_type: ViolationType,
    pub(crate) source: Option<String>,
    pub(crate) occurred_at: PrimitiveDateTime,
    pub(crate) duration_ms: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct AttemptKey {
    pub(crate) exam_id: i64,
    pub(crate) student_id: i64,
}

#[async_trait]
pub(crate) trait ExamStore: Send + Sync {
    async fn ping(&self) -> Result<(), StoreError>;

    async fn find_exam(&self, exam_id: i64) -> Result<Option<Exam>, StoreError>;

    async fn find_attempt(
        &self,
        exam_id: i64,
        student_id: i64,
    ) -> Result<Option<ExamStudent>, StoreError>;

    /// Inserts the attempt, its snapshot and empty answer rows atomically.
    /// At most one attempt per (exam, student) ever succeeds.
    async fn create_attempt(&self, attempt: NewAttempt) -> Result<AttemptCreation, StoreError>;

    /// Snapshot rows ordered by `question_order`.
    async fn list_snapshot(
        &self,
        exam_id: i64,
        student_id: i64,
    ) -> Result<Vec<QuestionExam>, StoreError>;

    /// Upserts one answer. Returns `false` once the attempt is no longer in progress.
    async fn save_answer(&self, update: AnswerUpdate) -> Result<bool, StoreError>;

    async fn list_answers(
        &self,
        exam_id: i64,
        student_id: i64,
    ) -> Result<Vec<StudentQuestion>, StoreError>;

    /// Freezes results and the final status. Returns `false` when the attempt
    /// was already finalized by someone else.
    async fn complete_attempt(&self, completion: AttemptCompletion) -> Result<bool, StoreError>;

    /// In-progress attempts whose `start_time + duration` is at or before `now`.
    async fn list_overdue_attempts(
        &self,
        now: PrimitiveDateTime,
    ) -> Result<Vec<AttemptKey>, StoreError>;

    async fn list_attempts_for_exam(&self, exam_id: i64) -> Result<Vec<ExamStudent>, StoreError>;

    async fn append_violation(
        &self,
        violation: NewViolation,
    ) -> Result<ViolationRecord, StoreError>;

    async fn list_violations(
        &self,
        exam_id: i64,
        student_id: i64,
    ) -> Result<Vec<ViolationRecord>, StoreError>;
}
