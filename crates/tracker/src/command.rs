use buildwatch_api_types::{BuildResult, ProgrammingSubmission, SubmissionMessage};
use buildwatch_core::{ExerciseId, ParticipationId};

use crate::api::PendingSubmissions;

/// 事件循环的输入，每次状态变化都从这里开始。
#[derive(Debug)]
pub(crate) enum Command {
    FetchParticipation {
        participation_id: ParticipationId,
        exercise_id: ExerciseId,
    },
    ParticipationFetched {
        participation_id: ParticipationId,
        exercise_id: ExerciseId,
        submission: Option<ProgrammingSubmission>,
    },
    FetchExercise {
        exercise_id: ExerciseId,
    },
    ExerciseFetched {
        exercise_id: ExerciseId,
        submissions: PendingSubmissions,
    },
    PushMessage {
        participation_id: ParticipationId,
        message: SubmissionMessage,
    },
    ResultArrived {
        participation_id: ParticipationId,
        result: BuildResult,
    },
    TimerExpired {
        participation_id: ParticipationId,
        generation: u64,
    },
    Shutdown,
}
