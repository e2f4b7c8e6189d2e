mod error;
mod eta;
mod ids;
mod record;
mod submission_state;

pub use error::DomainError;
pub use eta::{FetchedState, ResultEtaPolicy, remaining_build_time};
pub use ids::{ExerciseId, ParticipationId, ResultId, SubmissionId};
pub use record::{ExerciseState, PendingSubmissionRecord};
pub use submission_state::SubmissionState;
