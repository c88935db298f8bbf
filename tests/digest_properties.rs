use chrono::{DateTime, Utc};
use proptest::prelude::*;
use quiz_core::SqliteStore;
use quiz_core::models::{ChangeDigest, ChangeEvent, EntityId, EntityKind, UserId};
use quiz_core::tracker::ChangeTracker;

fn kind() -> impl Strategy<Value = EntityKind> {
    prop_oneof![
        Just(EntityKind::User),
        Just(EntityKind::Review),
        Just(EntityKind::Response),
        Just(EntityKind::StudySet),
        Just(EntityKind::Enrollment),
        Just(EntityKind::Favorite),
    ]
}

fn change() -> impl Strategy<Value = ChangeEvent> {
    (kind(), 0i64..1_000, -10_000_000i64..10_000_000).prop_map(|(entity_kind, id, secs)| ChangeEvent {
        user_id: UserId(7),
        entity_kind,
        entity_id: EntityId(id),
        occurred_at: DateTime::from_timestamp(secs, 0).unwrap(),
    })
}

fn replay(changes: &[ChangeEvent]) -> ChangeDigest {
    let tracker = ChangeTracker::new(SqliteStore::in_memory().unwrap());
    for change in changes {
        tracker.apply(change).unwrap();
    }
    tracker.digest(UserId(7)).unwrap()
}

proptest! {
    #[test]
    fn permutations_give_the_same_digest(
        (changes, shuffled) in proptest::collection::vec(change(), 1..16)
            .prop_flat_map(|changes| {
                let shuffled = Just(changes.clone()).prop_shuffle();
                (Just(changes), shuffled)
            }),
    ) {
        prop_assert_eq!(replay(&changes), replay(&shuffled));
    }

    #[test]
    fn updated_at_is_the_latest_change(changes in proptest::collection::vec(change(), 1..16)) {
        let latest = changes.iter().map(|c| c.occurred_at).max().unwrap();
        prop_assert_eq!(replay(&changes).updated_at, latest);
    }
}

#[test]
fn touches_commute_with_later_timestamp_kept() {
    let at = |secs| DateTime::<Utc>::from_timestamp(secs, 0).unwrap();
    let review = ChangeEvent {
        user_id: UserId(7),
        entity_kind: EntityKind::Review,
        entity_id: EntityId(42),
        occurred_at: at(100),
    };
    let response = ChangeEvent {
        user_id: UserId(7),
        entity_kind: EntityKind::Response,
        entity_id: EntityId(99),
        occurred_at: at(50),
    };

    let forward = replay(&[review, response]);
    let backward = replay(&[response, review]);
    assert_eq!(forward, backward);
    assert_eq!(forward.updated_at, at(100));
}

#[test]
fn changes_before_the_epoch_are_kept() {
    let at = |secs| DateTime::<Utc>::from_timestamp(secs, 0).unwrap();
    let change = |id, secs| ChangeEvent {
        user_id: UserId(7),
        entity_kind: EntityKind::Favorite,
        entity_id: EntityId(id),
        occurred_at: at(secs),
    };

    let digest = replay(&[change(1, -86_400), change(2, -90_000)]);
    assert_eq!(digest.updated_at, at(-86_400));
    assert_ne!(digest, ChangeDigest::empty(UserId(7)));
}
