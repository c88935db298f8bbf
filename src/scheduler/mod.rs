//! Review scheduler: turns answers into the next review time of a
//! (user, question) pair and lists the questions that are due.

pub mod policy;

pub use policy::{SchedulePolicy, SlowAnswerRule};

use crate::database::{DueCursor, ReviewStore};
use crate::error::{CoreError, CoreResult};
use crate::models::time::truncate_to_millis;
use crate::models::{AnswerEvent, QuestionId, ReviewState, UserId};
use chrono::{DateTime, Utc};
use std::collections::VecDeque;

pub const DEFAULT_DUE_PAGE_SIZE: usize = 100;

pub struct ReviewScheduler<S> {
    store: S,
    policy: SchedulePolicy,
    due_page_size: usize,
}

impl<S: ReviewStore> ReviewScheduler<S> {
    pub fn new(store: S, policy: SchedulePolicy) -> Self {
        Self {
            store,
            policy,
            due_page_size: DEFAULT_DUE_PAGE_SIZE,
        }
    }

    pub fn with_due_page_size(mut self, size: usize) -> Self {
        self.due_page_size = size.max(1);
        self
    }

    pub fn policy(&self) -> &SchedulePolicy {
        &self.policy
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Records one answer and reschedules the pair.
    ///
    /// Never retries: a `StorageConflict` means another answer for the same
    /// pair won the race and the caller should submit again.
    ///
    /// Resubmitting the answer that produced the current review (same time,
    /// outcome and elapsed time, already in the response log) returns the
    /// stored state without logging it again.
    pub fn record_answer(&self, event: &AnswerEvent) -> CoreResult<ReviewState> {
        let event = AnswerEvent {
            answered_at: truncate_to_millis(event.answered_at),
            ..event.clone()
        };
        let prior = self.store.load_review(event.user_id, event.question_id)?;

        if let Some(prior) = &prior {
            if event.answered_at < prior.value.last_reviewed_at {
                return Err(CoreError::OutOfOrderEvent {
                    user_id: event.user_id,
                    question_id: event.question_id,
                    answered_at: event.answered_at,
                    last_review_at: prior.value.last_reviewed_at,
                });
            }
            if event.answered_at == prior.value.last_reviewed_at
                && self.store.response_exists(&event)?
            {
                tracing::debug!(
                    user_id = %event.user_id,
                    question_id = %event.question_id,
                    answered_at = %event.answered_at,
                    "answer already recorded"
                );
                return Ok(prior.value.clone());
            }
        }

        let previous_interval = prior.as_ref().map(|p| {
            p.value.interval().unwrap_or(self.policy.baseline())
        });
        let interval =
            self.policy
                .next_interval(previous_interval, event.is_correct, event.elapsed);
        let state = ReviewState::scheduled(
            event.user_id,
            event.question_id,
            event.answered_at,
            interval,
        )?;

        let expected_version = prior.as_ref().map(|p| p.version);
        self.store
            .commit_answer(&event, &state, expected_version)?;

        tracing::debug!(
            user_id = %event.user_id,
            question_id = %event.question_id,
            is_correct = event.is_correct,
            interval_secs = interval.as_secs(),
            next_review_at = %state.next_due_at,
            "review rescheduled"
        );

        Ok(state)
    }

    /// Questions of `user_id` due at `as_of`, earliest first.
    ///
    /// Pages are fetched from the store as the iterator advances. Nothing is
    /// kept between calls, so calling again starts over from current storage.
    pub fn due_questions(&self, user_id: UserId, as_of: DateTime<Utc>) -> DueQuestions<'_, S> {
        DueQuestions {
            store: &self.store,
            user_id,
            as_of: truncate_to_millis(as_of),
            page_size: self.due_page_size,
            cursor: None,
            buffered: VecDeque::new(),
            exhausted: false,
        }
    }
}

/// Lazy, finite sequence of due question ids.
pub struct DueQuestions<'a, S> {
    store: &'a S,
    user_id: UserId,
    as_of: DateTime<Utc>,
    page_size: usize,
    cursor: Option<DueCursor>,
    buffered: VecDeque<ReviewState>,
    exhausted: bool,
}

impl<S: ReviewStore> DueQuestions<'_, S> {
    fn fetch_page(&mut self) -> CoreResult<()> {
        let page = self
            .store
            .due_reviews_page(self.user_id, self.as_of, self.cursor, self.page_size)?;
        if page.len() < self.page_size {
            self.exhausted = true;
        }
        if let Some(last) = page.last() {
            self.cursor = Some(DueCursor::after(last));
        }
        self.buffered.extend(page);
        Ok(())
    }
}

impl<S: ReviewStore> Iterator for DueQuestions<'_, S> {
    type Item = CoreResult<QuestionId>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.buffered.is_empty() && !self.exhausted {
            if let Err(e) = self.fetch_page() {
                self.exhausted = true;
                return Some(Err(e));
            }
        }
        self.buffered.pop_front().map(|state| Ok(state.question_id))
    }
}
