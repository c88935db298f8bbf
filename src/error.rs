//! Error taxonomy shared by the scheduler, the digest tracker and the stores.

use crate::models::{QuestionId, UserId};
use chrono::{DateTime, Utc};
use thiserror::Error;

/// Boxed collaborator failure, kept as-is so callers see the original cause.
pub type StorageCause = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Debug, Error)]
pub enum CoreError {
    /// The answer is older than the last review already recorded for the pair.
    #[error(
        "answer for user {user_id} question {question_id} at {answered_at} precedes last review at {last_review_at}"
    )]
    OutOfOrderEvent {
        user_id: UserId,
        question_id: QuestionId,
        answered_at: DateTime<Utc>,
        last_review_at: DateTime<Utc>,
    },

    #[error("unknown user {user_id} or question {question_id}")]
    UnknownPair {
        user_id: UserId,
        question_id: QuestionId,
    },

    /// A concurrent writer updated the row first. Refetch and retry.
    #[error("storage conflict on {0}")]
    StorageConflict(String),

    #[error("storage unavailable: {0}")]
    StorageUnavailable(#[source] StorageCause),

    #[error("invalid value: {0}")]
    InvalidValue(String),

    #[error("config error: {0}")]
    Config(String),
}

impl CoreError {
    pub fn is_conflict(&self) -> bool {
        matches!(self, CoreError::StorageConflict(_))
    }
}

impl From<rusqlite::Error> for CoreError {
    fn from(err: rusqlite::Error) -> Self {
        CoreError::StorageUnavailable(Box::new(err))
    }
}

pub type CoreResult<T> = Result<T, CoreError>;
