//! Entry point used by request handlers.
//!
//! Runs the answer data flow (scheduler, then tracker), retries lost
//! optimistic-concurrency races, keeps study sets and the owner's digest in
//! step, and assembles the snapshot a sync client downloads.

use crate::config::CoreConfig;
use crate::database::{DigestStore, ReviewStore, StudySetStore};
use crate::error::CoreResult;
use crate::models::{
    AnswerEvent, ChangeDigest, ChangeEvent, DigestValue, EntityId, EntityKind, QuestionId,
    ReviewState, StudySet, StudySetId, UserId,
};
use crate::retry::{RetryConfig, retry_on_conflict};
use crate::scheduler::ReviewScheduler;
use crate::tracker::ChangeTracker;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Everything a sync client needs to rebuild the user's review schedule.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserSnapshot {
    pub digest: ChangeDigest,
    pub reviews: Vec<ReviewState>,
    pub due: Vec<QuestionId>,
}

pub struct StudyCore<S> {
    scheduler: ReviewScheduler<S>,
    tracker: ChangeTracker<S>,
    study_sets: S,
    retry: RetryConfig,
}

impl<S> StudyCore<S>
where
    S: ReviewStore + DigestStore + StudySetStore + Clone,
{
    pub fn new(store: S, config: &CoreConfig) -> Self {
        Self {
            scheduler: ReviewScheduler::new(store.clone(), config.policy)
                .with_due_page_size(config.due_page_size),
            tracker: ChangeTracker::new(store.clone()),
            study_sets: store,
            retry: config.retry,
        }
    }

    pub fn scheduler(&self) -> &ReviewScheduler<S> {
        &self.scheduler
    }

    pub fn tracker(&self) -> &ChangeTracker<S> {
        &self.tracker
    }

    /// Reschedules the pair, then marks the review and the response as
    /// changed in the user's digest.
    ///
    /// The review commit and the digest update are separate writes. Both
    /// digest changes go in one write, so they are recorded together or not
    /// at all. If that write fails the review is already stored and the error
    /// is returned; submitting the same answer again is safe, it is not
    /// logged twice and only the digest update is redone.
    pub fn record_answer(&self, event: &AnswerEvent) -> CoreResult<ReviewState> {
        let state = retry_on_conflict(self.retry, "record_answer", || {
            self.scheduler.record_answer(event)
        })?;

        let entity_id = EntityId(event.question_id.get());
        let changes = [EntityKind::Review, EntityKind::Response].map(|kind| ChangeEvent {
            user_id: event.user_id,
            entity_kind: kind,
            entity_id,
            occurred_at: state.last_reviewed_at,
        });
        retry_on_conflict(self.retry, "touch", || {
            self.tracker.apply_all(event.user_id, &changes)
        })?;

        tracing::info!(
            user_id = %event.user_id,
            question_id = %event.question_id,
            is_correct = event.is_correct,
            next_review_at = %state.next_due_at,
            "answer recorded"
        );
        Ok(state)
    }

    pub fn touch(&self, change: &ChangeEvent) -> CoreResult<ChangeDigest> {
        retry_on_conflict(self.retry, "touch", || self.tracker.apply(change))
    }

    pub fn due_questions(&self, user_id: UserId, as_of: DateTime<Utc>) -> CoreResult<Vec<QuestionId>> {
        self.scheduler.due_questions(user_id, as_of).collect()
    }

    pub fn has_changed_since(&self, user_id: UserId, client_digest: &DigestValue) -> CoreResult<bool> {
        self.tracker.has_changed_since(user_id, client_digest)
    }

    pub fn save_study_set(&self, set: &StudySet) -> CoreResult<ChangeDigest> {
        self.study_sets.save_study_set(set)?;
        self.touch(&ChangeEvent {
            user_id: set.owner_user_id,
            entity_kind: EntityKind::StudySet,
            entity_id: EntityId(set.set_id.get()),
            occurred_at: set.updated_at,
        })
    }

    pub fn load_study_set(&self, set_id: StudySetId) -> CoreResult<Option<StudySet>> {
        self.study_sets.load_study_set(set_id)
    }

    pub fn snapshot(&self, user_id: UserId, as_of: DateTime<Utc>) -> CoreResult<UserSnapshot> {
        Ok(UserSnapshot {
            digest: self.tracker.digest(user_id)?,
            reviews: self.scheduler.store().reviews_for_user(user_id)?,
            due: self.due_questions(user_id, as_of)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::{DueCursor, SqliteStore, Versioned};
    use crate::error::CoreError;
    use crate::models::{Elapsed, Interval};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn at(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(secs, 0).unwrap()
    }

    fn seeded_store(questions: i64) -> SqliteStore {
        let store = SqliteStore::in_memory().unwrap();
        store.register_user(UserId(1), "alice", at(0)).unwrap();
        for q in 1..=questions {
            store
                .register_question(QuestionId(q), UserId(1), "{}", at(0))
                .unwrap();
        }
        store
    }

    fn core() -> StudyCore<SqliteStore> {
        StudyCore::new(seeded_store(3), &CoreConfig::default())
    }

    /// SQLite store whose digest writes fail while `failures` is above zero.
    #[derive(Clone)]
    struct FailingDigestStore {
        inner: SqliteStore,
        failures: Arc<AtomicU32>,
    }

    impl ReviewStore for FailingDigestStore {
        fn load_review(
            &self,
            user_id: UserId,
            question_id: QuestionId,
        ) -> CoreResult<Option<Versioned<ReviewState>>> {
            self.inner.load_review(user_id, question_id)
        }

        fn commit_answer(
            &self,
            event: &AnswerEvent,
            state: &ReviewState,
            expected_version: Option<u64>,
        ) -> CoreResult<u64> {
            self.inner.commit_answer(event, state, expected_version)
        }

        fn response_exists(&self, event: &AnswerEvent) -> CoreResult<bool> {
            self.inner.response_exists(event)
        }

        fn due_reviews_page(
            &self,
            user_id: UserId,
            as_of: DateTime<Utc>,
            after: Option<DueCursor>,
            limit: usize,
        ) -> CoreResult<Vec<ReviewState>> {
            self.inner.due_reviews_page(user_id, as_of, after, limit)
        }

        fn reviews_for_user(&self, user_id: UserId) -> CoreResult<Vec<ReviewState>> {
            self.inner.reviews_for_user(user_id)
        }
    }

    impl DigestStore for FailingDigestStore {
        fn load_digest(&self, user_id: UserId) -> CoreResult<Option<Versioned<ChangeDigest>>> {
            self.inner.load_digest(user_id)
        }

        fn save_digest(
            &self,
            digest: &ChangeDigest,
            expected_version: Option<u64>,
        ) -> CoreResult<u64> {
            let failing = self
                .failures
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            if failing {
                return Err(CoreError::StorageUnavailable("disk full".into()));
            }
            self.inner.save_digest(digest, expected_version)
        }
    }

    impl StudySetStore for FailingDigestStore {
        fn load_study_set(&self, set_id: StudySetId) -> CoreResult<Option<StudySet>> {
            self.inner.load_study_set(set_id)
        }

        fn save_study_set(&self, set: &StudySet) -> CoreResult<()> {
            self.inner.save_study_set(set)
        }
    }

    fn answer(question: i64, correct: bool, secs: i64) -> AnswerEvent {
        AnswerEvent {
            user_id: UserId(1),
            question_id: QuestionId(question),
            is_correct: correct,
            elapsed: Elapsed::from_millis(1_200).unwrap(),
            answered_at: at(secs),
        }
    }

    #[test]
    fn test_answer_changes_digest() {
        let core = core();
        let before = core.tracker().digest(UserId(1)).unwrap();

        core.record_answer(&answer(1, true, 1_000)).unwrap();

        let after = core.tracker().digest(UserId(1)).unwrap();
        assert_ne!(before.hash_value, after.hash_value);
        assert_eq!(after.updated_at, at(1_000));
        assert!(core.has_changed_since(UserId(1), &before.hash_value).unwrap());
        assert!(!core.has_changed_since(UserId(1), &after.hash_value).unwrap());
    }

    #[test]
    fn test_digest_matches_manual_fold() {
        let core = core();
        core.record_answer(&answer(2, false, 50)).unwrap();

        let expected = [EntityKind::Review, EntityKind::Response]
            .into_iter()
            .map(|kind| ChangeEvent {
                user_id: UserId(1),
                entity_kind: kind,
                entity_id: EntityId(2),
                occurred_at: at(50),
            })
            .fold(None, |digest: Option<ChangeDigest>, change| {
                Some(match digest {
                    Some(digest) => digest.apply(&change),
                    None => ChangeDigest::from_change(&change),
                })
            })
            .unwrap();
        assert_eq!(core.tracker().digest(UserId(1)).unwrap(), expected);
    }

    #[test]
    fn test_rejected_answer_leaves_digest_alone() {
        let core = core();
        core.record_answer(&answer(1, true, 1_000)).unwrap();
        let digest = core.tracker().digest(UserId(1)).unwrap();

        let err = core.record_answer(&answer(1, true, 10)).unwrap_err();
        assert!(matches!(err, CoreError::OutOfOrderEvent { .. }));
        assert_eq!(core.tracker().digest(UserId(1)).unwrap(), digest);
    }

    #[test]
    fn test_resubmit_after_failed_digest_write() {
        let inner = seeded_store(3);
        let store = FailingDigestStore {
            inner: inner.clone(),
            failures: Arc::new(AtomicU32::new(1)),
        };
        let core = StudyCore::new(store, &CoreConfig::default());
        let event = answer(1, true, 1_000);

        let err = core.record_answer(&event).unwrap_err();
        assert!(matches!(err, CoreError::StorageUnavailable(_)));
        assert_eq!(core.tracker().digest(UserId(1)).unwrap(), ChangeDigest::empty(UserId(1)));
        assert_eq!(inner.response_count(UserId(1), QuestionId(1)).unwrap(), 1);

        let state = core.record_answer(&event).unwrap();
        assert_eq!(state.interval(), Some(Interval::from_days(1).unwrap()));
        assert_eq!(inner.response_count(UserId(1), QuestionId(1)).unwrap(), 1);

        let clean = self::core();
        clean.record_answer(&event).unwrap();
        assert_eq!(
            core.tracker().digest(UserId(1)).unwrap(),
            clean.tracker().digest(UserId(1)).unwrap()
        );
    }

    #[test]
    fn test_concurrent_answers_all_land() {
        let mut config = CoreConfig::default();
        config.retry.max_attempts = 1_000;
        let core = StudyCore::new(seeded_store(8), &config);

        let results: Vec<CoreResult<ReviewState>> = std::thread::scope(|scope| {
            let handles: Vec<_> = (1..=8)
                .map(|q| {
                    let core = &core;
                    scope.spawn(move || core.record_answer(&answer(q, q % 2 == 0, 100 * q)))
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });
        for result in &results {
            assert!(result.is_ok(), "{result:?}");
        }

        let store = core.scheduler().store();
        for q in 1..=8 {
            assert_eq!(store.response_count(UserId(1), QuestionId(q)).unwrap(), 1);
        }
        assert_eq!(store.reviews_for_user(UserId(1)).unwrap().len(), 8);

        let sequential = StudyCore::new(seeded_store(8), &CoreConfig::default());
        for q in (1..=8).rev() {
            sequential.record_answer(&answer(q, q % 2 == 0, 100 * q)).unwrap();
        }
        assert_eq!(
            core.tracker().digest(UserId(1)).unwrap(),
            sequential.tracker().digest(UserId(1)).unwrap()
        );
        assert_eq!(core.tracker().digest(UserId(1)).unwrap().updated_at, at(800));
    }

    #[test]
    fn test_study_set_save_touches_owner() {
        let core = core();
        let mut set = StudySet::new(StudySetId(4), UserId(1), "security+", at(300));
        set.add_question(QuestionId(2));

        let digest = core.save_study_set(&set).unwrap();
        assert_eq!(digest.updated_at, at(300));
        assert_ne!(digest.hash_value, DigestValue::EMPTY);
        assert_eq!(core.load_study_set(StudySetId(4)).unwrap(), Some(set));
    }

    #[test]
    fn test_snapshot() {
        let core = core();
        core.record_answer(&answer(1, true, 0)).unwrap();
        core.record_answer(&answer(2, true, 86_400)).unwrap();

        let snapshot = core.snapshot(UserId(1), at(86_400)).unwrap();
        assert_eq!(snapshot.reviews.len(), 2);
        assert_eq!(snapshot.due, vec![QuestionId(1)]);
        assert_eq!(snapshot.digest, core.tracker().digest(UserId(1)).unwrap());
    }
}
