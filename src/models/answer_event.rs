//! One recorded attempt at a question. Appended to the response log, never changed.
use super::{Elapsed, QuestionId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnswerEvent {
    pub user_id: UserId,
    pub question_id: QuestionId,
    pub is_correct: bool,
    #[serde(rename = "elapsed_ms")]
    pub elapsed: Elapsed,
    pub answered_at: DateTime<Utc>,
}
