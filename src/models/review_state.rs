use super::{Interval, QuestionId, UserId};
use crate::error::{CoreError, CoreResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Current review schedule of one (user, question) pair.
///
/// Field names match the `reviews` table so API clients keep working.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "ReviewRecord")]
pub struct ReviewState {
    pub user_id: UserId,
    pub question_id: QuestionId,
    #[serde(rename = "last_review_at")]
    pub last_reviewed_at: DateTime<Utc>,
    #[serde(rename = "next_review_at")]
    pub next_due_at: DateTime<Utc>,
}

impl ReviewState {
    /// Review with explicit times; rejects a next review before the last one.
    pub fn new(
        user_id: UserId,
        question_id: QuestionId,
        last_reviewed_at: DateTime<Utc>,
        next_due_at: DateTime<Utc>,
    ) -> CoreResult<Self> {
        if next_due_at < last_reviewed_at {
            return Err(CoreError::InvalidValue(format!(
                "review of question {question_id} is due at {next_due_at}, before its last review at {last_reviewed_at}"
            )));
        }
        Ok(Self {
            user_id,
            question_id,
            last_reviewed_at,
            next_due_at,
        })
    }

    pub fn scheduled(
        user_id: UserId,
        question_id: QuestionId,
        reviewed_at: DateTime<Utc>,
        interval: Interval,
    ) -> CoreResult<Self> {
        let next_due_at = reviewed_at
            .checked_add_signed(interval.as_delta())
            .ok_or_else(|| {
                CoreError::InvalidValue(format!(
                    "next review for question {question_id} overflows the calendar"
                ))
            })?;

        Ok(Self {
            user_id,
            question_id,
            last_reviewed_at: reviewed_at,
            next_due_at,
        })
    }

    /// Interval that produced this schedule. `None` only for rows written
    /// with next == last by some other writer.
    pub fn interval(&self) -> Option<Interval> {
        Interval::between(self.last_reviewed_at, self.next_due_at)
    }

    pub fn is_due(&self, as_of: DateTime<Utc>) -> bool {
        self.next_due_at <= as_of
    }
}

#[derive(Deserialize)]
struct ReviewRecord {
    user_id: UserId,
    question_id: QuestionId,
    last_review_at: DateTime<Utc>,
    next_review_at: DateTime<Utc>,
}

impl TryFrom<ReviewRecord> for ReviewState {
    type Error = CoreError;

    fn try_from(record: ReviewRecord) -> Result<Self, Self::Error> {
        ReviewState::new(
            record.user_id,
            record.question_id,
            record.last_review_at,
            record.next_review_at,
        )
    }
}
