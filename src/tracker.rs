//! Change-digest tracker.
//!
//! Folds change events into each user's stored digest so sync clients can
//! ask "did anything change since digest D?" without downloading their data.

use crate::database::DigestStore;
use crate::error::{CoreError, CoreResult};
use crate::models::time::truncate_to_millis;
use crate::models::{ChangeDigest, ChangeEvent, DigestValue, EntityId, EntityKind, UserId};
use chrono::{DateTime, Utc};

pub struct ChangeTracker<S> {
    store: S,
}

impl<S: DigestStore> ChangeTracker<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Folds one change into the user's digest and persists it.
    ///
    /// The fold cannot fail; only the store can, with `StorageConflict` when
    /// another writer updated the digest between our read and write.
    pub fn touch(
        &self,
        user_id: UserId,
        entity_kind: EntityKind,
        entity_id: EntityId,
        occurred_at: DateTime<Utc>,
    ) -> CoreResult<ChangeDigest> {
        self.apply(&ChangeEvent {
            user_id,
            entity_kind,
            entity_id,
            occurred_at,
        })
    }

    pub fn apply(&self, change: &ChangeEvent) -> CoreResult<ChangeDigest> {
        self.apply_all(change.user_id, std::slice::from_ref(change))
    }

    /// Folds several changes of one user into the digest with a single write,
    /// so either all of them are recorded or none is.
    pub fn apply_all(&self, user_id: UserId, changes: &[ChangeEvent]) -> CoreResult<ChangeDigest> {
        if let Some(other) = changes.iter().find(|change| change.user_id != user_id) {
            return Err(CoreError::InvalidValue(format!(
                "change for user {} folded into digest of user {user_id}",
                other.user_id
            )));
        }
        let stored = self.store.load_digest(user_id)?;
        let expected_version = stored.as_ref().map(|stored| stored.version);
        let mut current = stored.map(|stored| stored.value);

        for change in changes {
            let change = ChangeEvent {
                occurred_at: truncate_to_millis(change.occurred_at),
                ..*change
            };
            current = Some(match current {
                Some(digest) => digest.apply(&change),
                None => ChangeDigest::from_change(&change),
            });
            tracing::debug!(
                user_id = %change.user_id,
                entity_kind = %change.entity_kind,
                entity_id = %change.entity_id,
                "change folded"
            );
        }

        let Some(updated) = current else {
            return self.digest(user_id);
        };
        self.store.save_digest(&updated, expected_version)?;
        tracing::debug!(user_id = %user_id, hash_value = %updated.hash_value, "user digest updated");
        Ok(updated)
    }

    /// Current digest of the user; the empty digest if nothing was recorded.
    pub fn digest(&self, user_id: UserId) -> CoreResult<ChangeDigest> {
        Ok(self
            .store
            .load_digest(user_id)?
            .map(|stored| stored.value)
            .unwrap_or_else(|| ChangeDigest::empty(user_id)))
    }

    pub fn has_changed_since(&self, user_id: UserId, client_digest: &DigestValue) -> CoreResult<bool> {
        Ok(self.digest(user_id)?.hash_value != *client_digest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::SqliteStore;

    fn at(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(secs, 0).unwrap()
    }

    fn tracker() -> ChangeTracker<SqliteStore> {
        ChangeTracker::new(SqliteStore::in_memory().unwrap())
    }

    #[test]
    fn test_touch_order_independent() {
        let first = tracker();
        first.touch(UserId(7), EntityKind::Review, EntityId(42), at(100)).unwrap();
        let a = first.touch(UserId(7), EntityKind::Response, EntityId(99), at(50)).unwrap();

        let second = tracker();
        second.touch(UserId(7), EntityKind::Response, EntityId(99), at(50)).unwrap();
        let b = second.touch(UserId(7), EntityKind::Review, EntityId(42), at(100)).unwrap();

        assert_eq!(a, b);
        assert_eq!(a.updated_at, at(100));
        assert_eq!(first.digest(UserId(7)).unwrap(), second.digest(UserId(7)).unwrap());
    }

    #[test]
    fn test_updated_at_never_moves_back() {
        let tracker = tracker();
        tracker.touch(UserId(1), EntityKind::StudySet, EntityId(1), at(500)).unwrap();
        let digest = tracker.touch(UserId(1), EntityKind::StudySet, EntityId(2), at(20)).unwrap();
        assert_eq!(digest.updated_at, at(500));
    }

    #[test]
    fn test_first_touch_before_epoch_keeps_its_time() {
        let tracker = tracker();
        let digest = tracker.touch(UserId(4), EntityKind::Review, EntityId(1), at(-1_000)).unwrap();
        assert_eq!(digest.updated_at, at(-1_000));
        assert_eq!(tracker.digest(UserId(4)).unwrap().updated_at, at(-1_000));

        let digest = tracker.touch(UserId(4), EntityKind::Review, EntityId(2), at(-3_000)).unwrap();
        assert_eq!(digest.updated_at, at(-1_000));
    }

    #[test]
    fn test_apply_all_matches_single_touches() {
        let changes = [
            ChangeEvent { user_id: UserId(2), entity_kind: EntityKind::Review, entity_id: EntityId(9), occurred_at: at(40) },
            ChangeEvent { user_id: UserId(2), entity_kind: EntityKind::Response, entity_id: EntityId(9), occurred_at: at(40) },
        ];
        let batched = tracker();
        let one_write = batched.apply_all(UserId(2), &changes).unwrap();
        assert_eq!(batched.store().load_digest(UserId(2)).unwrap().unwrap().version, 1);

        let single = tracker();
        for change in &changes {
            single.apply(change).unwrap();
        }
        assert_eq!(one_write, single.digest(UserId(2)).unwrap());
    }

    #[test]
    fn test_apply_all_rejects_foreign_user() {
        let tracker = tracker();
        let foreign = ChangeEvent {
            user_id: UserId(3),
            entity_kind: EntityKind::Review,
            entity_id: EntityId(1),
            occurred_at: at(1),
        };
        let err = tracker.apply_all(UserId(2), &[foreign]).unwrap_err();
        assert!(matches!(err, CoreError::InvalidValue(_)));
        assert_eq!(tracker.store().load_digest(UserId(2)).unwrap(), None);
    }

    #[test]
    fn test_has_changed_since() {
        let tracker = tracker();
        assert!(!tracker.has_changed_since(UserId(3), &DigestValue::EMPTY).unwrap());

        let seen = tracker.touch(UserId(3), EntityKind::Enrollment, EntityId(5), at(1)).unwrap();
        assert!(tracker.has_changed_since(UserId(3), &DigestValue::EMPTY).unwrap());
        assert!(!tracker.has_changed_since(UserId(3), &seen.hash_value).unwrap());

        tracker.touch(UserId(3), EntityKind::Favorite, EntityId(8), at(2)).unwrap();
        assert!(tracker.has_changed_since(UserId(3), &seen.hash_value).unwrap());
    }

    #[test]
    fn test_digests_are_per_user() {
        let tracker = tracker();
        tracker.touch(UserId(1), EntityKind::Review, EntityId(1), at(1)).unwrap();
        assert_eq!(tracker.digest(UserId(2)).unwrap(), ChangeDigest::empty(UserId(2)));
    }

    #[test]
    fn test_lost_race_surfaces_conflict() {
        let tracker = tracker();
        tracker.touch(UserId(1), EntityKind::Review, EntityId(1), at(1)).unwrap();
        let stale = tracker.store().load_digest(UserId(1)).unwrap().unwrap();

        tracker.touch(UserId(1), EntityKind::Review, EntityId(2), at(2)).unwrap();
        let err = tracker
            .store()
            .save_digest(&stale.value, Some(stale.version))
            .unwrap_err();
        assert!(err.is_conflict());
    }
}
