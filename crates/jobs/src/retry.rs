//! Bounded retry policy applied to each firing of a job.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Attempts per firing when the caller does not say otherwise.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Fixed wait between two attempts of the same firing.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(60);

/// How many times a firing may run the job and how long to wait in between.
///
/// `max_retries` counts total attempts, so a job that always fails is invoked
/// exactly `max_retries` times per firing. Zero is treated as one attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryPolicy {
    pub max_retries: u32,
    #[serde(with = "duration_ms")]
    pub delay: Duration,
}

impl RetryPolicy {
    #[must_use]
    pub fn new(max_retries: u32, delay: Duration) -> Self {
        Self { max_retries, delay }
    }

    /// Same delay, different attempt budget.
    #[must_use]
    pub fn with_max_retries(self, max_retries: u32) -> Self {
        Self {
            max_retries,
            ..self
        }
    }

    /// Upper bound on attempts in one firing.
    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.max(1)
    }

    /// Whether another attempt is allowed after `attempts_made` failures.
    #[must_use]
    pub fn should_retry(&self, attempts_made: u32) -> bool {
        attempts_made < self.max_attempts()
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_RETRIES, DEFAULT_RETRY_DELAY)
    }
}

mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
