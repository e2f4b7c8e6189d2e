#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration as StdDuration;

use async_trait::async_trait;
use buildwatch_api_types::{BuildResult, ProgrammingSubmission, SubmissionRef};
use buildwatch_core::{ExerciseId, ParticipationId};
use chrono::{Duration, Utc};
use submission_tracker::{PendingSubmissions, Result, SubmissionApi, TrackerError};

/// 内存中的平台接口，记录每次调用。
#[derive(Clone, Default)]
pub struct MockSubmissionApi {
    pending: Arc<Mutex<HashMap<ParticipationId, ProgrammingSubmission>>>,
    exercises: Arc<Mutex<HashMap<ExerciseId, PendingSubmissions>>>,
    participation_fetches: Arc<AtomicUsize>,
    exercise_fetches: Arc<AtomicUsize>,
    unavailable: Arc<AtomicBool>,
    triggers: Arc<Mutex<Vec<String>>>,
    participation_delay: StdDuration,
}

impl MockSubmissionApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_pending(self, participation_id: i64, submission: ProgrammingSubmission) -> Self {
        self.pending
            .lock()
            .unwrap()
            .insert(ParticipationId::new(participation_id), submission);
        self
    }

    pub fn with_exercise(self, exercise_id: i64, submissions: PendingSubmissions) -> Self {
        self.exercises
            .lock()
            .unwrap()
            .insert(ExerciseId::new(exercise_id), submissions);
        self
    }

    /// 参与查询在 `delay` 之后才返回。
    pub fn with_participation_delay(mut self, delay: StdDuration) -> Self {
        self.participation_delay = delay;
        self
    }

    /// 之后的查询都返回错误。
    pub fn unavailable(self) -> Self {
        self.unavailable.store(true, Ordering::SeqCst);
        self
    }

    pub fn participation_fetches(&self) -> usize {
        self.participation_fetches.load(Ordering::SeqCst)
    }

    pub fn exercise_fetches(&self) -> usize {
        self.exercise_fetches.load(Ordering::SeqCst)
    }

    pub fn triggers(&self) -> Vec<String> {
        self.triggers.lock().unwrap().clone()
    }

    fn check_available(&self) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(TrackerError::Api("server unavailable".to_string()));
        }
        Ok(())
    }

    fn record(&self, call: String) {
        self.triggers.lock().unwrap().push(call);
    }
}

#[async_trait]
impl SubmissionApi for MockSubmissionApi {
    async fn latest_pending_submission(
        &self,
        participation_id: ParticipationId,
    ) -> Result<Option<ProgrammingSubmission>> {
        self.participation_fetches.fetch_add(1, Ordering::SeqCst);
        if !self.participation_delay.is_zero() {
            tokio::time::sleep(self.participation_delay).await;
        }
        self.check_available()?;
        Ok(self.pending.lock().unwrap().get(&participation_id).cloned())
    }

    async fn latest_pending_submissions(&self, exercise_id: ExerciseId) -> Result<PendingSubmissions> {
        self.exercise_fetches.fetch_add(1, Ordering::SeqCst);
        self.check_available()?;
        Ok(self
            .exercises
            .lock()
            .unwrap()
            .get(&exercise_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn trigger_build(&self, participation_id: ParticipationId) -> Result<()> {
        self.record(format!("build {participation_id}"));
        Ok(())
    }

    async fn trigger_instructor_build(&self, participation_id: ParticipationId) -> Result<()> {
        self.record(format!("instructor {participation_id}"));
        Ok(())
    }

    async fn trigger_instructor_build_all(&self, exercise_id: ExerciseId) -> Result<()> {
        self.record(format!("all {exercise_id}"));
        Ok(())
    }

    async fn trigger_instructor_build_for(
        &self,
        exercise_id: ExerciseId,
        participation_ids: &[ParticipationId],
    ) -> Result<()> {
        let ids: Vec<String> = participation_ids.iter().map(ToString::to_string).collect();
        self.record(format!("for {exercise_id} [{}]", ids.join(",")));
        Ok(())
    }
}

/// 提交时间为 `age_ms` 毫秒之前的提交。
pub fn submission(id: i64, age_ms: i64) -> ProgrammingSubmission {
    ProgrammingSubmission {
        id,
        submission_date: Utc::now() - Duration::milliseconds(age_ms),
        commit_hash: Some(format!("commit-{id}")),
        build_failed: false,
        build_artifact: false,
        submission_type: Some("MANUAL".to_string()),
    }
}

pub fn result_for(id: i64, submission_id: i64) -> BuildResult {
    BuildResult {
        id,
        submission: Some(SubmissionRef { id: submission_id }),
        successful: true,
        score: Some(100.0),
        completion_date: Some(Utc::now()),
    }
}
