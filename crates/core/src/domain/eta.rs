use std::time::Duration;

use buildwatch_api_types::ProgrammingSubmission;
use chrono::{DateTime, Utc};

use super::DomainError;

/// Load dependent estimate of how long a build takes until its result arrives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResultEtaPolicy {
    default_eta: Duration,
    step: Duration,
    bucket_size: u64,
}

impl ResultEtaPolicy {
    pub const DEFAULT_ETA: Duration = Duration::from_millis(2 * 60 * 1000);
    pub const DEFAULT_STEP: Duration = Duration::from_millis(4000 * 60);
    pub const DEFAULT_BUCKET_SIZE: u64 = 100;

    pub fn new(default_eta: Duration, step: Duration, bucket_size: u64) -> Result<Self, DomainError> {
        if bucket_size == 0 {
            return Err(DomainError::InvalidEtaBucketSize(bucket_size));
        }

        Ok(Self {
            default_eta,
            step,
            bucket_size,
        })
    }

    pub fn default_eta(&self) -> Duration {
        self.default_eta
    }

    /// Every full bucket of building submissions adds one step to the default.
    pub fn eta_for(&self, building_count: usize) -> Duration {
        let buckets = building_count as u64 / self.bucket_size;
        let buckets = u32::try_from(buckets).unwrap_or(u32::MAX);
        self.default_eta.saturating_add(self.step.saturating_mul(buckets))
    }
}

impl Default for ResultEtaPolicy {
    fn default() -> Self {
        Self {
            default_eta: Self::DEFAULT_ETA,
            step: Self::DEFAULT_STEP,
            bucket_size: Self::DEFAULT_BUCKET_SIZE,
        }
    }
}

/// Milliseconds left until a submission made at `submitted_at` should have a
/// result. Negative once the expected time is exceeded.
pub fn remaining_build_time(eta: Duration, submitted_at: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    let eta_ms = i64::try_from(eta.as_millis()).unwrap_or(i64::MAX);
    let elapsed_ms = (now - submitted_at).num_milliseconds();
    eta_ms.saturating_sub(elapsed_ms)
}

/// State a freshly fetched pending submission starts in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchedState {
    NoPending,
    Building { remaining: Duration },
    Failed,
}

impl FetchedState {
    pub fn classify(
        submission: Option<&ProgrammingSubmission>,
        eta: Duration,
        now: DateTime<Utc>,
    ) -> Self {
        let Some(submission) = submission else {
            return Self::NoPending;
        };

        let remaining = remaining_build_time(eta, submission.submission_date, now);
        if remaining > 0 {
            Self::Building {
                remaining: Duration::from_millis(remaining.unsigned_abs()),
            }
        } else {
            Self::Failed
        }
    }
}
