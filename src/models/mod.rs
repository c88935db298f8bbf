pub mod answer_event;
pub mod change_digest;
pub mod entity_kind;
pub mod ids;
pub mod review_state;
pub mod study_set;
pub mod time;

pub use answer_event::AnswerEvent;
pub use change_digest::{ChangeDigest, ChangeEvent, DigestValue};
pub use entity_kind::EntityKind;
pub use ids::{EntityId, QuestionId, StudySetId, UserId};
pub use review_state::ReviewState;
pub use study_set::StudySet;
pub use time::{Elapsed, Interval};
