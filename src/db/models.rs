use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;
use time::PrimitiveDateTime;

use crate::db::types::{AttemptStatus, Difficulty, QuestionType, ViolationType};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct Blueprint {
    pub(crate) id: i64,
    pub(crate) subject_id: i64,
    pub(crate) created_at: PrimitiveDateTime,
    pub(crate) chapters: Vec<ChapterRequirement>,
}

#[derive(Debug, Clone, FromRow)]
pub(crate) struct BlueprintRow {
    pub(crate) id: i64,
    pub(crate) subject_id: i64,
    pub(crate) created_at: PrimitiveDateTime,
}

impl BlueprintRow {
    pub(crate) fn with_chapters(self, chapters: Vec<ChapterRequirement>) -> Blueprint {
        Blueprint {
            id: self.id,
            subject_id: self.subject_id,
            created_at: self.created_at,
            chapters,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub(crate) struct ChapterRequirement {
    pub(crate) chapter: i32,
    pub(crate) easy_count: i32,
    pub(crate) medium_count: i32,
    pub(crate) hard_count: i32,
    pub(crate) very_hard_count: i32,
}

impl ChapterRequirement {
    pub(crate) fn count_for(&self, difficulty: Difficulty) -> usize {
        let count = match difficulty {
            Difficulty::Easy => self.easy_count,
            Difficulty::Medium => self.medium_count,
            Difficulty::Hard => self.hard_count,
            Difficulty::VeryHard => self.very_hard_count,
        };
        count.max(0) as usize
    }

    pub(crate) fn total(&self) -> usize {
        Difficulty::ALL.iter().map(|difficulty| self.count_for(*difficulty)).sum()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct Question {
    pub(crate) id: i64,
    pub(crate) subject_id: i64,
    pub(crate) chapter: i32,
    pub(crate) difficulty: Difficulty,
    pub(crate) question_type: QuestionType,
    pub(crate) point: f64,
    pub(crate) content: String,
    pub(crate) answer_encoding: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct Exam {
    pub(crate) id: i64,
    pub(crate) name: String,
    pub(crate) class_id: i64,
    pub(crate) blueprint_id: i64,
    pub(crate) start_time: PrimitiveDateTime,
    pub(crate) end_time: PrimitiveDateTime,
    pub(crate) duration_minutes: i32,
}

/// Frozen per-student copy of one selected question.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct QuestionExam {
    pub(crate) exam_id: i64,
    pub(crate) student_id: i64,
    pub(crate) question_id: i64,
    pub(crate) question_order: i32,
    pub(crate) point: f64,
    pub(crate) correct_answer: String,
    pub(crate) question_type: QuestionType,
    pub(crate) content: String,
    pub(crate) options: Json<Vec<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct ExamStudent {
    pub(crate) exam_id: i64,
    pub(crate) student_id: i64,
    pub(crate) student_name: String,
    pub(crate) start_time: PrimitiveDateTime,
    pub(crate) end_time: Option<PrimitiveDateTime>,
    pub(crate) status: AttemptStatus,
    pub(crate) points: Option<f64>,
    pub(crate) selection_seed: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct StudentQuestion {
    pub(crate) exam_id: i64,
    pub(crate) student_id: i64,
    pub(crate) question_id: i64,
    pub(crate) answer: Option<Json<serde_json::Value>>,
    pub(crate) result: Option<f64>,
    pub(crate) time_spent: i32,
    pub(crate) question_point: f64,
    pub(crate) created_at: PrimitiveDateTime,
    pub(crate) updated_at: PrimitiveDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct ViolationRecord {
    pub(crate) id: i64,
    pub(crate) exam_id: i64,
    pub(crate) student_id: i64,
    pub(crate) violation_type: ViolationType,
    pub(crate) source: Option<String>,
    pub(crate) occurred_at: PrimitiveDateTime,
    pub(crate) duration_ms: Option<i64>,
}
