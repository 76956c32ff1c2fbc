//! PostgreSQL access. Each module holds plain query functions over a pool or
//! executor; `PgStore` composes them into the engine's storage traits.

pub(crate) mod answers;
pub(crate) mod attempts;
pub(crate) mod blueprints;
pub(crate) mod exams;
pub(crate) mod questions;
pub(crate) mod snapshots;
pub(crate) mod violations;

use async_trait::async_trait;
use sqlx::PgPool;
use time::PrimitiveDateTime;

use crate::db::models::{
    Blueprint, Exam, ExamStudent, Question, QuestionExam, StudentQuestion, ViolationRecord,
};
use crate::db::types::Difficulty;
use crate::services::error::StoreError;
use crate::services::store::{
    AnswerUpdate, AttemptCompletion, AttemptCreation, AttemptKey, ExamStore, NewAttempt,
    NewViolation, QuestionBank,
};

#[derive(Clone)]
pub(crate) struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub(crate) fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl QuestionBank for PgStore {
    async fn get_blueprint(&self, blueprint_id: i64) -> Result<Option<Blueprint>, StoreError> {
        Ok(blueprints::find_by_id(&self.pool, blueprint_id).await?)
    }

    async fn find_questions(
        &self,
        subject_id: i64,
        chapter: i32,
        difficulty: Difficulty,
    ) -> Result<Vec<Question>, StoreError> {
        Ok(questions::list_bucket(&self.pool, subject_id, chapter, difficulty).await?)
    }
}

#[async_trait]
impl ExamStore for PgStore {
    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn find_exam(&self, exam_id: i64) -> Result<Option<Exam>, StoreError> {
        Ok(exams::find_by_id(&self.pool, exam_id).await?)
    }

    async fn find_attempt(
        &self,
        exam_id: i64,
        student_id: i64,
    ) -> Result<Option<ExamStudent>, StoreError> {
        Ok(attempts::find(&self.pool, exam_id, student_id).await?)
    }

    async fn create_attempt(&self, new: NewAttempt) -> Result<AttemptCreation, StoreError> {
        let NewAttempt { attempt, snapshot } = new;
        let mut tx = self.pool.begin().await?;

        attempts::acquire_attempt_lock(&mut *tx, attempt.exam_id, attempt.student_id).await?;

        let existing = attempts::find(&mut *tx, attempt.exam_id, attempt.student_id).await?;
        if let Some(existing) = existing {
            tx.commit().await?;
            return Ok(AttemptCreation::AlreadyExists(existing));
        }

        if !attempts::create(&mut *tx, &attempt).await? {
            tx.rollback().await?;
            let existing = attempts::find(&self.pool, attempt.exam_id, attempt.student_id)
                .await?
                .ok_or_else(|| {
                    StoreError::Inconsistent(format!(
                        "attempt ({}, {}) conflicted but cannot be read",
                        attempt.exam_id, attempt.student_id
                    ))
                })?;
            return Ok(AttemptCreation::AlreadyExists(existing));
        }

        snapshots::insert_all(&mut *tx, &snapshot).await?;
        answers::insert_blank(&mut *tx, &snapshot, attempt.start_time).await?;

        tx.commit().await?;
        Ok(AttemptCreation::Created)
    }

    async fn list_snapshot(
        &self,
        exam_id: i64,
        student_id: i64,
    ) -> Result<Vec<QuestionExam>, StoreError> {
        Ok(snapshots::list(&self.pool, exam_id, student_id).await?)
    }

    async fn save_answer(&self, update: AnswerUpdate) -> Result<bool, StoreError> {
        Ok(answers::save(&self.pool, &update).await?)
    }

    async fn list_answers(
        &self,
        exam_id: i64,
        student_id: i64,
    ) -> Result<Vec<StudentQuestion>, StoreError> {
        Ok(answers::list(&self.pool, exam_id, student_id).await?)
    }

    async fn complete_attempt(&self, completion: AttemptCompletion) -> Result<bool, StoreError> {
        let mut tx = self.pool.begin().await?;

        let updated = attempts::complete(
            &mut *tx,
            completion.exam_id,
            completion.student_id,
            completion.status,
            completion.points,
            completion.end_time,
        )
        .await?;

        if !updated {
            tx.rollback().await?;
            return Ok(false);
        }

        answers::store_results(
            &mut *tx,
            completion.exam_id,
            completion.student_id,
            &completion.results,
        )
        .await?;

        tx.commit().await?;
        Ok(true)
    }

    async fn list_overdue_attempts(
        &self,
        now: PrimitiveDateTime,
    ) -> Result<Vec<AttemptKey>, StoreError> {
        let rows = attempts::list_overdue(&self.pool, now).await?;
        Ok(rows
            .into_iter()
            .map(|(exam_id, student_id)| AttemptKey { exam_id, student_id })
            .collect())
    }

    async fn list_attempts_for_exam(&self, exam_id: i64) -> Result<Vec<ExamStudent>, StoreError> {
        Ok(attempts::list_by_exam(&self.pool, exam_id).await?)
    }

    async fn append_violation(
        &self,
        violation: NewViolation,
    ) -> Result<ViolationRecord, StoreError> {
        Ok(violations::insert(&self.pool, &violation).await?)
    }

    async fn list_violations(
        &self,
        exam_id: i64,
        student_id: i64,
    ) -> Result<Vec<ViolationRecord>, StoreError> {
        Ok(violations::list(&self.pool, exam_id, student_id).await?)
    }
}
