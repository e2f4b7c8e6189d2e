use std::collections::BTreeMap;

use buildwatch_api_types::ProgrammingSubmission;
use serde::{Deserialize, Serialize};

use super::{DomainError, ExerciseId, ParticipationId, SubmissionId, SubmissionState};

/// Current build state of one participation.
///
/// `submission` is set while building and kept when the build is declared
/// failed, so the last known submission can still be shown.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingSubmissionRecord {
    pub participation_id: ParticipationId,
    pub exercise_id: ExerciseId,
    pub state: SubmissionState,
    pub submission: Option<ProgrammingSubmission>,
}

impl PendingSubmissionRecord {
    pub fn no_pending(participation_id: ParticipationId, exercise_id: ExerciseId) -> Self {
        Self {
            participation_id,
            exercise_id,
            state: SubmissionState::NoPending,
            submission: None,
        }
    }

    pub fn building(
        participation_id: ParticipationId,
        exercise_id: ExerciseId,
        submission: ProgrammingSubmission,
    ) -> Self {
        Self {
            participation_id,
            exercise_id,
            state: SubmissionState::Building,
            submission: Some(submission),
        }
    }

    pub fn failed(
        participation_id: ParticipationId,
        exercise_id: ExerciseId,
        submission: Option<ProgrammingSubmission>,
    ) -> Self {
        Self {
            participation_id,
            exercise_id,
            state: SubmissionState::Failed,
            submission,
        }
    }

    /// Id of the tracked submission, if any.
    pub fn submission_id(&self) -> Option<SubmissionId> {
        self.submission
            .as_ref()
            .map(|submission| SubmissionId::new(submission.id))
    }

    /// Whether a result for `submission_id` resolves this record.
    pub fn awaits(&self, submission_id: SubmissionId) -> bool {
        self.state.is_building() && self.submission_id() == Some(submission_id)
    }
}

/// Snapshot of all tracked participations of one exercise.
///
/// Snapshots are values: an update builds a new snapshot and leaves
/// previously published ones untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExerciseState {
    exercise_id: ExerciseId,
    records: BTreeMap<ParticipationId, PendingSubmissionRecord>,
}

impl ExerciseState {
    pub fn new(exercise_id: ExerciseId) -> Self {
        Self {
            exercise_id,
            records: BTreeMap::new(),
        }
    }

    pub fn exercise_id(&self) -> ExerciseId {
        self.exercise_id
    }

    pub fn get(&self, participation_id: ParticipationId) -> Option<&PendingSubmissionRecord> {
        self.records.get(&participation_id)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> impl Iterator<Item = &PendingSubmissionRecord> {
        self.records.values()
    }

    /// Returns a copy of this snapshot with `record` stored under its
    /// participation id, replacing any previous record.
    pub fn with_record(&self, record: PendingSubmissionRecord) -> Result<Self, DomainError> {
        if record.exercise_id != self.exercise_id {
            return Err(DomainError::ForeignParticipation {
                participation: record.participation_id.into_inner(),
                exercise: self.exercise_id.into_inner(),
            });
        }

        let mut next = self.clone();
        next.records.insert(record.participation_id, record);
        Ok(next)
    }

    pub fn count_in(&self, state: SubmissionState) -> usize {
        self.records
            .values()
            .filter(|record| record.state == state)
            .count()
    }

    /// Participation ids whose record is currently in `state`, ascending.
    pub fn participations_in(&self, state: SubmissionState) -> Vec<ParticipationId> {
        self.records
            .values()
            .filter(|record| record.state == state)
            .map(|record| record.participation_id)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;

    fn submission(id: i64) -> ProgrammingSubmission {
        ProgrammingSubmission {
            id,
            submission_date: Utc::now(),
            commit_hash: None,
            build_failed: false,
            build_artifact: false,
            submission_type: None,
        }
    }

    #[test]
    fn with_record_overwrites_existing_participation() {
        let exercise = ExerciseId::new(1);
        let participation = ParticipationId::new(10);
        let state = ExerciseState::new(exercise)
            .with_record(PendingSubmissionRecord::building(
                participation,
                exercise,
                submission(42),
            ))
            .expect("record belongs to exercise");

        let next = state
            .with_record(PendingSubmissionRecord::no_pending(participation, exercise))
            .expect("record belongs to exercise");

        assert_eq!(next.len(), 1);
        assert_eq!(
            next.get(participation).map(|record| record.state),
            Some(SubmissionState::NoPending)
        );
        assert_eq!(
            state.get(participation).map(|record| record.state),
            Some(SubmissionState::Building)
        );
    }

    #[test]
    fn with_record_rejects_foreign_exercise() {
        let state = ExerciseState::new(ExerciseId::new(1));
        let err = state
            .with_record(PendingSubmissionRecord::no_pending(
                ParticipationId::new(3),
                ExerciseId::new(2),
            ))
            .expect_err("record of another exercise should be rejected");

        assert_eq!(
            err,
            DomainError::ForeignParticipation {
                participation: 3,
                exercise: 1,
            }
        );
    }

    #[test]
    fn participations_in_filters_by_state() {
        let exercise = ExerciseId::new(1);
        let state = [
            PendingSubmissionRecord::building(ParticipationId::new(3), exercise, submission(1)),
            PendingSubmissionRecord::failed(ParticipationId::new(1), exercise, Some(submission(2))),
            PendingSubmissionRecord::building(ParticipationId::new(2), exercise, submission(3)),
        ]
        .into_iter()
        .try_fold(ExerciseState::new(exercise), |acc, record| acc.with_record(record))
        .expect("records belong to exercise");

        assert_eq!(
            state.participations_in(SubmissionState::Building),
            vec![ParticipationId::new(2), ParticipationId::new(3)]
        );
        assert_eq!(state.count_in(SubmissionState::Failed), 1);
        assert_eq!(state.count_in(SubmissionState::NoPending), 0);
    }

    #[test]
    fn only_building_record_awaits_its_submission() {
        let exercise = ExerciseId::new(1);
        let participation = ParticipationId::new(10);
        let building = PendingSubmissionRecord::building(participation, exercise, submission(42));
        let failed = PendingSubmissionRecord::failed(participation, exercise, Some(submission(42)));

        assert!(building.awaits(SubmissionId::new(42)));
        assert!(!building.awaits(SubmissionId::new(41)));
        assert!(!failed.awaits(SubmissionId::new(42)));
    }
}
