use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, OnceLock};

use async_trait::async_trait;
use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request},
    Router,
};
use sqlx::types::Json;
use time::macros::datetime;
use time::PrimitiveDateTime;
use tokio::sync::{watch, OwnedMutexGuard};

use crate::api;
use crate::core::{
    config::Settings,
    redis::RedisHandle,
    security::{self, Identity},
    state::AppState,
};
use crate::db::models::{
    Blueprint, ChapterRequirement, Exam, ExamStudent, Question, QuestionExam, StudentQuestion,
    ViolationRecord,
};
use crate::db::types::{AttemptStatus, Difficulty, QuestionType, Role};
use crate::services::attempt_timing::{attempt_deadline, is_expired};
use crate::services::error::StoreError;
use crate::services::integrity::IntegrityConfig;
use crate::services::store::{
    AnswerUpdate, AttemptCompletion, AttemptCreation, AttemptKey, ExamStore, NewAttempt,
    NewViolation, QuestionBank,
};

const TEST_SECRET_KEY: &str = "test-secret";
const TEST_REDIS_URL: &str = "redis://127.0.0.1:6379/1";

/// Questions drawn by the blueprint of [`seeded_store`].
pub(crate) const SEEDED_BLUEPRINT_SIZE: usize = 10;

pub(crate) async fn env_lock() -> OwnedMutexGuard<()> {
    static LOCK: OnceLock<Arc<tokio::sync::Mutex<()>>> = OnceLock::new();
    let lock = LOCK.get_or_init(|| Arc::new(tokio::sync::Mutex::new(()))).clone();
    lock.lock_owned().await
}

pub(crate) fn set_test_env() {
    std::env::set_var("EXAM_ENGINE_ENV", "test");
    std::env::set_var("EXAM_ENGINE_STRICT_CONFIG", "0");
    std::env::set_var("SECRET_KEY", TEST_SECRET_KEY);
    std::env::set_var("PROMETHEUS_ENABLED", "0");
    for name in [
        "API_V1_STR",
        "PROJECT_NAME",
        "SELECTION_SHORTFALL_POLICY",
        "LIVE_TICK_INTERVAL_MS",
        "LIVE_HEARTBEAT_INTERVAL_SECONDS",
        "LIVE_HEARTBEAT_GRACE_SECONDS",
        "INTEGRITY_FOCUS_LOSS_THRESHOLD_MS",
        "INTEGRITY_ALERT_COOLDOWN_MS",
        "INTEGRITY_FULLSCREEN_REQUIRED",
    ] {
        std::env::remove_var(name);
    }
}

pub(crate) struct TestContext {
    pub(crate) state: AppState,
    pub(crate) app: Router,
    pub(crate) store: Arc<MemoryStore>,
    _shutdown: watch::Sender<bool>,
    _guard: OwnedMutexGuard<()>,
}

/// Router over a [`seeded_store`] with Redis left disconnected.
pub(crate) async fn setup_test_context() -> TestContext {
    let guard = env_lock().await;
    set_test_env();

    let settings = Settings::load().expect("settings");
    let (state, store, shutdown) = build_state(settings);
    let app = api::router::router(state.clone());

    TestContext { state, app, store, _shutdown: shutdown, _guard: guard }
}

pub(crate) fn build_state(
    settings: Settings,
) -> (AppState, Arc<MemoryStore>, watch::Sender<bool>) {
    let store = Arc::new(seeded_store());
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let state = AppState::new(settings, store.clone(), store.clone(), offline_redis(), shutdown_rx);
    (state, store, shutdown_tx)
}

pub(crate) fn offline_redis() -> RedisHandle {
    RedisHandle::new(TEST_REDIS_URL.to_string())
}

pub(crate) fn integrity() -> IntegrityConfig {
    IntegrityConfig {
        focus_loss_threshold_ms: 5000,
        alert_cooldown_ms: 2000,
        fullscreen_required: false,
    }
}

pub(crate) fn student(id: i64) -> Identity {
    Identity { id, role: Role::Student, name: format!("Student {id}") }
}

pub(crate) fn teacher(id: i64) -> Identity {
    Identity { id, role: Role::Teacher, name: format!("Teacher {id}") }
}

pub(crate) fn bearer_token(identity: &Identity, settings: &Settings) -> String {
    security::create_access_token(identity, settings, time::Duration::minutes(30)).expect("token")
}

pub(crate) fn json_request(
    method: Method,
    uri: &str,
    token: Option<&str>,
    body: Option<serde_json::Value>,
) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);

    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }

    if let Some(body) = body {
        let bytes = serde_json::to_vec(&body).expect("serialize body");
        builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(bytes))
            .expect("request body")
    } else {
        builder.body(Body::empty()).expect("request body")
    }
}

pub(crate) async fn read_json(response: axum::response::Response<Body>) -> serde_json::Value {
    let body = to_bytes(response.into_body(), usize::MAX).await.expect("response body");
    serde_json::from_slice(&body).unwrap_or_else(|err| {
        let body_text = String::from_utf8_lossy(&body);
        panic!("json parse: {err}; body: {body_text}");
    })
}

pub(crate) fn fixed_now() -> PrimitiveDateTime {
    datetime!(2025-03-10 09:00:00)
}

pub(crate) fn exam(
    id: i64,
    blueprint_id: i64,
    start_time: PrimitiveDateTime,
    end_time: PrimitiveDateTime,
    duration_minutes: i32,
) -> Exam {
    Exam {
        id,
        name: format!("Exam {id}"),
        class_id: 1,
        blueprint_id,
        start_time,
        end_time,
        duration_minutes,
    }
}

pub(crate) fn attempt(exam: &Exam, student_id: i64, start_time: PrimitiveDateTime) -> ExamStudent {
    ExamStudent {
        exam_id: exam.id,
        student_id,
        student_name: format!("Student {student_id}"),
        start_time,
        end_time: None,
        status: AttemptStatus::InProgress,
        points: None,
        selection_seed: 0,
    }
}

/// Bank question with id assigned by [`MemoryStore::add_question`].
pub(crate) fn question(
    subject_id: i64,
    chapter: i32,
    difficulty: Difficulty,
    encoding: &str,
) -> Question {
    let question_type = if encoding.matches('*').count() > 1 {
        QuestionType::MultiChoice
    } else {
        QuestionType::SingleChoice
    };

    Question {
        id: 0,
        subject_id,
        chapter,
        difficulty,
        question_type,
        point: 1.0,
        content: format!("Chapter {chapter} {} question", difficulty.as_str()),
        answer_encoding: encoding.to_string(),
    }
}

/// Requirement with counts in `[easy, medium, hard, very_hard]` order.
pub(crate) fn chapter(chapter: i32, counts: [i32; 4]) -> ChapterRequirement {
    ChapterRequirement {
        chapter,
        easy_count: counts[0],
        medium_count: counts[1],
        hard_count: counts[2],
        very_hard_count: counts[3],
    }
}

pub(crate) fn snapshot_row(
    exam_id: i64,
    student_id: i64,
    question_id: i64,
    question_order: i32,
    correct_answer: &str,
    point: f64,
) -> QuestionExam {
    QuestionExam {
        exam_id,
        student_id,
        question_id,
        question_order,
        point,
        correct_answer: correct_answer.to_string(),
        question_type: QuestionType::SingleChoice,
        content: format!("Question {question_id}"),
        options: Json(correct_answer.split('|').map(str::to_string).collect()),
    }
}

pub(crate) fn answer_row(
    exam_id: i64,
    student_id: i64,
    question_id: i64,
    answer: Option<serde_json::Value>,
    at: PrimitiveDateTime,
) -> StudentQuestion {
    StudentQuestion {
        exam_id,
        student_id,
        question_id,
        answer: answer.map(Json),
        result: None,
        time_spent: 0,
        question_point: 1.0,
        created_at: at,
        updated_at: at,
    }
}

/// Blueprint 1 over subject 1: chapter 1 draws 2/1/1/0 and chapter 2 draws
/// 1/2/1/2 questions by difficulty, three candidates per bucket.
pub(crate) fn seeded_store() -> MemoryStore {
    let store = MemoryStore::default();
    let encodings = ["Paris*|London|Rome", "a*|b*|c", "true*|false"];

    for chapter in 1..=2 {
        for difficulty in Difficulty::ALL {
            for encoding in encodings {
                store.add_question(question(1, chapter, difficulty, encoding));
            }
        }
    }

    store.add_blueprint(1, vec![self::chapter(1, [2, 1, 1, 0]), self::chapter(2, [1, 2, 1, 2])]);
    store
}

fn blank_answers(snapshot: &[QuestionExam], at: PrimitiveDateTime) -> Vec<StudentQuestion> {
    snapshot
        .iter()
        .map(|row| StudentQuestion {
            question_point: row.point,
            ..answer_row(row.exam_id, row.student_id, row.question_id, None, at)
        })
        .collect()
}

/// In-memory [`ExamStore`] and [`QuestionBank`] with the same uniqueness and
/// status guards as the PostgreSQL store.
#[derive(Default)]
pub(crate) struct MemoryStore {
    data: Mutex<MemoryData>,
}

#[derive(Default)]
struct MemoryData {
    questions: Vec<Question>,
    blueprints: HashMap<i64, Blueprint>,
    exams: HashMap<i64, Exam>,
    attempts: BTreeMap<(i64, i64), ExamStudent>,
    snapshots: HashMap<(i64, i64), Vec<QuestionExam>>,
    answers: HashMap<(i64, i64), Vec<StudentQuestion>>,
    violations: Vec<ViolationRecord>,
    attempts_created: usize,
}

impl MemoryStore {
    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryData> {
        self.data.lock().expect("memory store lock")
    }

    pub(crate) fn add_question(&self, mut question: Question) -> Question {
        let mut data = self.lock();
        if question.id == 0 {
            question.id = data.questions.len() as i64 + 1;
        }
        data.questions.push(question.clone());
        question
    }

    pub(crate) fn add_blueprint(&self, subject_id: i64, chapters: Vec<ChapterRequirement>) -> i64 {
        let mut data = self.lock();
        let id = data.blueprints.len() as i64 + 1;
        data.blueprints
            .insert(id, Blueprint { id, subject_id, created_at: fixed_now(), chapters });
        id
    }

    pub(crate) fn add_exam(&self, exam: Exam) -> Exam {
        self.lock().exams.insert(exam.id, exam.clone());
        exam
    }

    /// Seeds an attempt directly, bypassing selection.
    pub(crate) fn insert_attempt(&self, attempt: ExamStudent, snapshot: Vec<QuestionExam>) {
        let key = (attempt.exam_id, attempt.student_id);
        let mut data = self.lock();
        data.answers.insert(key, blank_answers(&snapshot, attempt.start_time));
        data.snapshots.insert(key, snapshot);
        data.attempts.insert(key, attempt);
    }

    pub(crate) fn attempts_created(&self) -> usize {
        self.lock().attempts_created
    }
}

#[async_trait]
impl QuestionBank for MemoryStore {
    async fn get_blueprint(&self, blueprint_id: i64) -> Result<Option<Blueprint>, StoreError> {
        Ok(self.lock().blueprints.get(&blueprint_id).cloned())
    }

    async fn find_questions(
        &self,
        subject_id: i64,
        chapter: i32,
        difficulty: Difficulty,
    ) -> Result<Vec<Question>, StoreError> {
        Ok(self
            .lock()
            .questions
            .iter()
            .filter(|q| {
                q.subject_id == subject_id && q.chapter == chapter && q.difficulty == difficulty
            })
            .cloned()
            .collect())
    }
}

#[async_trait]
impl ExamStore for MemoryStore {
    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }

    async fn find_exam(&self, exam_id: i64) -> Result<Option<Exam>, StoreError> {
        Ok(self.lock().exams.get(&exam_id).cloned())
    }

    async fn find_attempt(
        &self,
        exam_id: i64,
        student_id: i64,
    ) -> Result<Option<ExamStudent>, StoreError> {
        Ok(self.lock().attempts.get(&(exam_id, student_id)).cloned())
    }

    async fn create_attempt(&self, new: NewAttempt) -> Result<AttemptCreation, StoreError> {
        let key = (new.attempt.exam_id, new.attempt.student_id);
        let mut data = self.lock();

        if let Some(existing) = data.attempts.get(&key) {
            return Ok(AttemptCreation::AlreadyExists(existing.clone()));
        }

        data.answers.insert(key, blank_answers(&new.snapshot, new.attempt.start_time));
        data.snapshots.insert(key, new.snapshot);
        data.attempts.insert(key, new.attempt);
        data.attempts_created += 1;

        Ok(AttemptCreation::Created)
    }

    async fn list_snapshot(
        &self,
        exam_id: i64,
        student_id: i64,
    ) -> Result<Vec<QuestionExam>, StoreError> {
        let mut rows =
            self.lock().snapshots.get(&(exam_id, student_id)).cloned().unwrap_or_default();
        rows.sort_by_key(|row| row.question_order);
        Ok(rows)
    }

    async fn save_answer(&self, update: AnswerUpdate) -> Result<bool, StoreError> {
        let key = (update.exam_id, update.student_id);
        let mut data = self.lock();

        let in_progress = data
            .attempts
            .get(&key)
            .is_some_and(|attempt| attempt.status == AttemptStatus::InProgress);
        if !in_progress {
            return Ok(false);
        }

        let Some(row) = data
            .answers
            .get_mut(&key)
            .and_then(|rows| rows.iter_mut().find(|row| row.question_id == update.question_id))
        else {
            return Ok(false);
        };

        row.answer = Some(Json(update.answer));
        if let Some(time_spent) = update.time_spent {
            row.time_spent = time_spent;
        }
        row.updated_at = update.saved_at;
        Ok(true)
    }

    async fn list_answers(
        &self,
        exam_id: i64,
        student_id: i64,
    ) -> Result<Vec<StudentQuestion>, StoreError> {
        let mut rows =
            self.lock().answers.get(&(exam_id, student_id)).cloned().unwrap_or_default();
        rows.sort_by_key(|row| row.question_id);
        Ok(rows)
    }

    async fn complete_attempt(&self, completion: AttemptCompletion) -> Result<bool, StoreError> {
        let key = (completion.exam_id, completion.student_id);
        let mut data = self.lock();

        let Some(attempt) = data.attempts.get_mut(&key) else {
            return Ok(false);
        };
        if attempt.status != AttemptStatus::InProgress {
            return Ok(false);
        }
        attempt.status = completion.status;
        attempt.points = Some(completion.points);
        attempt.end_time = Some(completion.end_time);

        let results = completion.results.into_iter().collect::<HashMap<_, _>>();
        if let Some(rows) = data.answers.get_mut(&key) {
            for row in rows.iter_mut() {
                if let Some(earned) = results.get(&row.question_id) {
                    row.result = Some(*earned);
                }
            }
        }

        Ok(true)
    }

    async fn list_overdue_attempts(
        &self,
        now: PrimitiveDateTime,
    ) -> Result<Vec<AttemptKey>, StoreError> {
        let data = self.lock();
        let overdue = data
            .attempts
            .values()
            .filter(|attempt| attempt.status == AttemptStatus::InProgress)
            .filter(|attempt| {
                data.exams.get(&attempt.exam_id).is_some_and(|exam| {
                    is_expired(attempt_deadline(attempt.start_time, exam.duration_minutes), now)
                })
            })
            .map(|attempt| AttemptKey { exam_id: attempt.exam_id, student_id: attempt.student_id })
            .collect();
        Ok(overdue)
    }

    async fn list_attempts_for_exam(&self, exam_id: i64) -> Result<Vec<ExamStudent>, StoreError> {
        let mut attempts = self
            .lock()
            .attempts
            .values()
            .filter(|attempt| attempt.exam_id == exam_id)
            .cloned()
            .collect::<Vec<_>>();
        attempts.sort_by(|a, b| {
            a.student_name.cmp(&b.student_name).then(a.student_id.cmp(&b.student_id))
        });
        Ok(attempts)
    }

    async fn append_violation(
        &self,
        violation: NewViolation,
    ) -> Result<ViolationRecord, StoreError> {
        let mut data = self.lock();
        let record = ViolationRecord {
            id: data.violations.len() as i64 + 1,
            exam_id: violation.exam_id,
            student_id: violation.student_id,
            violation_type: violation.violation_type,
            source: violation.source,
            occurred_at: violation.occurred_at,
            duration_ms: violation.duration_ms,
        };
        data.violations.push(record.clone());
        Ok(record)
    }

    async fn list_violations(
        &self,
        exam_id: i64,
        student_id: i64,
    ) -> Result<Vec<ViolationRecord>, StoreError> {
        let mut records = self
            .lock()
            .violations
            .iter()
            .filter(|record| record.exam_id == exam_id && record.student_id == student_id)
            .cloned()
            .collect::<Vec<_>>();
        records.sort_by_key(|record| (record.occurred_at, record.id));
        Ok(records)
    }
}
