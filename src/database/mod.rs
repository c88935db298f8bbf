//! Storage boundary of the core.
//!
//! The scheduler and the tracker only see these traits. Every write is a
//! single compare-and-swap keyed by the row's `version`: `expected_version`
//! of `None` means "the row must not exist yet". A store that finds a
//! different version returns [`CoreError::StorageConflict`] and changes
//! nothing.
//!
//! [`CoreError::StorageConflict`]: crate::error::CoreError::StorageConflict

pub mod db;

use crate::error::CoreResult;
use crate::models::{
    AnswerEvent, ChangeDigest, QuestionId, ReviewState, StudySet, StudySetId, UserId,
};
use chrono::{DateTime, Utc};

pub use db::SqliteStore;

/// A stored row together with the version its next write must expect.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Versioned<T> {
    pub value: T,
    pub version: u64,
}

/// Position after the last row of a due-review page.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DueCursor {
    pub next_due_at: DateTime<Utc>,
    pub question_id: QuestionId,
}

impl DueCursor {
    pub fn after(state: &ReviewState) -> Self {
        Self {
            next_due_at: state.next_due_at,
            question_id: state.question_id,
        }
    }
}

pub trait ReviewStore: Send + Sync {
    fn load_review(
        &self,
        user_id: UserId,
        question_id: QuestionId,
    ) -> CoreResult<Option<Versioned<ReviewState>>>;

    /// Appends `event` to the response log and writes `state` in one
    /// transaction. Fails with `UnknownPair` if the user or question does not
    /// exist. Returns the new version of the review row.
    fn commit_answer(
        &self,
        event: &AnswerEvent,
        state: &ReviewState,
        expected_version: Option<u64>,
    ) -> CoreResult<u64>;

    /// Whether the response log already holds exactly this answer.
    fn response_exists(&self, event: &AnswerEvent) -> CoreResult<bool>;

    /// Reviews with `next_due_at <= as_of`, ordered by `(next_due_at, question_id)`,
    /// starting strictly after `after`.
    fn due_reviews_page(
        &self,
        user_id: UserId,
        as_of: DateTime<Utc>,
        after: Option<DueCursor>,
        limit: usize,
    ) -> CoreResult<Vec<ReviewState>>;

    /// Every review of the user ordered like [`ReviewStore::due_reviews_page`].
    fn reviews_for_user(&self, user_id: UserId) -> CoreResult<Vec<ReviewState>>;
}

pub trait DigestStore: Send + Sync {
    fn load_digest(&self, user_id: UserId) -> CoreResult<Option<Versioned<ChangeDigest>>>;

    fn save_digest(&self, digest: &ChangeDigest, expected_version: Option<u64>)
    -> CoreResult<u64>;
}

pub trait StudySetStore: Send + Sync {
    fn load_study_set(&self, set_id: StudySetId) -> CoreResult<Option<StudySet>>;

    /// Replaces the set and its question list.
    fn save_study_set(&self, set: &StudySet) -> CoreResult<()>;
}
