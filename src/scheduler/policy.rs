//! Interval ratchet used by the review scheduler.
//!
//! - The first answer to a question schedules it one baseline interval out
//! - A correct answer multiplies the previous interval by the growth factor,
//!   capped at the maximum interval
//! - A slow correct answer (if configured) grows by a smaller factor
//! - An incorrect answer collapses the interval back to the baseline
//!
//! Only the previous interval and the new outcome are needed, so scheduling
//! never replays the answer history.

use crate::error::{CoreError, CoreResult};
use crate::models::{Elapsed, Interval};
use serde::{Deserialize, Serialize};

/// Smaller growth for correct answers that took a long time.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct SlowAnswerRule {
    pub threshold_ms: i64,
    pub growth_factor: f64,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawPolicy", into = "RawPolicy")]
pub struct SchedulePolicy {
    baseline: Interval,
    growth_factor: f64,
    max_interval: Interval,
    slow_answer: Option<SlowAnswerRule>,
}

impl Default for SchedulePolicy {
    fn default() -> Self {
        Self {
            baseline: Interval::days(1),
            growth_factor: 2.0,
            max_interval: Interval::days(180),
            slow_answer: None,
        }
    }
}

impl SchedulePolicy {
    pub fn new(baseline: Interval, growth_factor: f64, max_interval: Interval) -> CoreResult<Self> {
        if !growth_factor.is_finite() || growth_factor <= 1.0 {
            return Err(CoreError::InvalidValue(format!(
                "growth factor must be greater than 1 (got {growth_factor})"
            )));
        }
        if max_interval < baseline {
            return Err(CoreError::InvalidValue(format!(
                "max interval {}s is shorter than baseline {}s",
                max_interval.as_secs(),
                baseline.as_secs()
            )));
        }
        Ok(Self {
            baseline,
            growth_factor,
            max_interval,
            slow_answer: None,
        })
    }

    pub fn with_slow_answer(mut self, rule: SlowAnswerRule) -> CoreResult<Self> {
        if !rule.growth_factor.is_finite() || rule.growth_factor < 1.0 {
            return Err(CoreError::InvalidValue(format!(
                "slow answer growth factor must be at least 1 (got {})",
                rule.growth_factor
            )));
        }
        Elapsed::from_millis(rule.threshold_ms)?;
        self.slow_answer = Some(rule);
        Ok(self)
    }

    pub fn baseline(&self) -> Interval {
        self.baseline
    }

    pub fn growth_factor(&self) -> f64 {
        self.growth_factor
    }

    pub fn max_interval(&self) -> Interval {
        self.max_interval
    }

    pub fn slow_answer(&self) -> Option<SlowAnswerRule> {
        self.slow_answer
    }

    /// Interval to schedule after an answer, given the interval that led to it.
    pub fn next_interval(
        &self,
        previous: Option<Interval>,
        is_correct: bool,
        elapsed: Elapsed,
    ) -> Interval {
        let Some(previous) = previous else {
            return self.baseline;
        };
        if !is_correct {
            return self.baseline;
        }

        let previous = previous.max(self.baseline);
        let factor = match self.slow_answer {
            Some(rule) if elapsed.as_millis() >= rule.threshold_ms => rule.growth_factor,
            _ => self.growth_factor,
        };
        let grown = (previous.as_secs() as f64 * factor).round();
        let capped = grown.min(self.max_interval.as_secs() as f64) as i64;

        Interval::from_secs(capped)
            .map(|interval| interval.max(self.baseline))
            .unwrap_or(self.baseline)
    }
}

#[derive(Serialize, Deserialize)]
struct RawPolicy {
    baseline_secs: i64,
    growth_factor: f64,
    max_interval_secs: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    slow_answer: Option<SlowAnswerRule>,
}

impl TryFrom<RawPolicy> for SchedulePolicy {
    type Error = CoreError;

    fn try_from(raw: RawPolicy) -> Result<Self, Self::Error> {
        let policy = SchedulePolicy::new(
            Interval::from_secs(raw.baseline_secs)?,
            raw.growth_factor,
            Interval::from_secs(raw.max_interval_secs)?,
        )?;
        match raw.slow_answer {
            Some(rule) => policy.with_slow_answer(rule),
            None => Ok(policy),
        }
    }
}

impl From<SchedulePolicy> for RawPolicy {
    fn from(policy: SchedulePolicy) -> Self {
        Self {
            baseline_secs: policy.baseline.as_secs(),
            growth_factor: policy.growth_factor,
            max_interval_secs: policy.max_interval.as_secs(),
            slow_answer: policy.slow_answer,
        }
    }
}
