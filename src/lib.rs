pub mod config;
pub mod database;
pub mod error;
pub mod export;
pub mod models;
pub mod retry;
pub mod scheduler;
pub mod service;
pub mod tracker;

pub use config::CoreConfig;
pub use database::SqliteStore;
pub use error::{CoreError, CoreResult};
pub use models::{AnswerEvent, ChangeDigest, ChangeEvent, DigestValue, EntityKind, ReviewState};
pub use scheduler::{ReviewScheduler, SchedulePolicy};
pub use service::{StudyCore, UserSnapshot};
pub use tracker::ChangeTracker;
