//! Caller-side retry for lost optimistic-concurrency races.
//!
//! The scheduler and tracker never retry on their own. Whoever calls them
//! re-runs the whole operation, which refetches current state, when the store
//! reports `StorageConflict`. Every other error is returned immediately.

use crate::error::CoreResult;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Maximum number of attempts, including the first one.
    pub max_attempts: u32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self { max_attempts: 5 }
    }
}

pub fn retry_on_conflict<T>(
    config: RetryConfig,
    operation: &str,
    mut attempt: impl FnMut() -> CoreResult<T>,
) -> CoreResult<T> {
    let max_attempts = config.max_attempts.max(1);
    let mut tries = 1;
    loop {
        match attempt() {
            Err(e) if e.is_conflict() && tries < max_attempts => {
                tracing::warn!(operation, attempt = tries, error = %e, "write conflict, retrying");
                tries += 1;
            }
            result => return result,
        }
    }
}
