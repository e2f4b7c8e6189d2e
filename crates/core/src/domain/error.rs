use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error("invalid eta bucket size: {0}. bucket size must be greater than 0")]
    InvalidEtaBucketSize(u64),

    #[error("participation {participation} does not belong to exercise {exercise}")]
    ForeignParticipation { participation: i64, exercise: i64 },
}
