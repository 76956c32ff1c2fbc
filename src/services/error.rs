use thiserror::Error;

use crate::db::types::Difficulty;

#[derive(Debug, Error)]
pub(crate) enum StoreError {
    #[error(transparent)]
    Database(#[from] sqlx::Error),
    #[error("inconsistent state: {0}")]
    Inconsistent(String),
}

/// Failures of the exam session engine, independent of transport.
#[derive(Debug, Error)]
pub(crate) enum EngineError {
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("blueprint has no chapter requirements")]
    NoChaptersDefined,
    #[error("exam has not started yet")]
    NotStarted,
    #[error("exam window is closed")]
    WindowClosed,
    #[error("attempt is already completed")]
    AlreadyCompleted,
    #[error("attempt has expired")]
    Expired,
    #[error("attempt has not been finalized yet")]
    NotFinished,
    #[error(
        "chapter {chapter} has {available} {} question(s), blueprint requires {requested}",
        difficulty.as_str()
    )]
    InsufficientQuestions {
        chapter: i32,
        difficulty: Difficulty,
        requested: usize,
        available: usize,
    },
    #[error("malformed answer: {0}")]
    MalformedAnswer(String),
    #[error("question {0} is not part of this attempt")]
    UnknownQuestion(i64),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<sqlx::Error> for EngineError {
    fn from(err: sqlx::Error) -> Self {
        Self::Store(StoreError::Database(err))
    }
}
