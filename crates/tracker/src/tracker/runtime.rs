use std::collections::HashMap;
use std::sync::Arc;

use buildwatch_api_types::{BuildResult, ProgrammingSubmission, SubmissionMessage};
use buildwatch_core::{
    ExerciseId, FetchedState, ParticipationId, PendingSubmissionRecord, ResultId, SubmissionId,
    SubmissionState,
};
use chrono::Utc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::streams::StreamRegistry;
use crate::api::{PendingSubmissions, SubmissionApi};
use crate::channel::PushChannel;
use crate::command::Command;
use crate::registry::{PushSubscriptionRegistry, ResultSubscriptionRegistry};
use crate::store::StateStore;
use crate::timer::TimerRegistry;
use crate::{EventBroadcaster, TrackerEvent};

/// 追踪器的事件循环。
///
/// 所有状态转换都在这里串行执行，并且只通过 `apply` 写入存储。
pub(crate) struct TrackerRuntime {
    api: Arc<dyn SubmissionApi>,
    store: Arc<StateStore>,
    streams: Arc<StreamRegistry>,
    events: Arc<EventBroadcaster>,
    sender: mpsc::UnboundedSender<Command>,
    receiver: mpsc::UnboundedReceiver<Command>,
    timers: TimerRegistry,
    push: PushSubscriptionRegistry,
    results: ResultSubscriptionRegistry,
    exercise_of: HashMap<ParticipationId, ExerciseId>,
}

impl TrackerRuntime {
    pub(crate) fn new(
        api: Arc<dyn SubmissionApi>,
        channel: Arc<dyn PushChannel>,
        store: Arc<StateStore>,
        streams: Arc<StreamRegistry>,
        events: Arc<EventBroadcaster>,
        sender: mpsc::UnboundedSender<Command>,
        receiver: mpsc::UnboundedReceiver<Command>,
    ) -> Self {
        Self {
            api,
            store,
            streams,
            events,
            timers: TimerRegistry::new(sender.clone()),
            push: PushSubscriptionRegistry::new(channel.clone(), sender.clone()),
            results: ResultSubscriptionRegistry::new(channel, sender.clone()),
            sender,
            receiver,
            exercise_of: HashMap::new(),
        }
    }

    pub(crate) async fn run(mut self) {
        debug!("tracker event loop started");
        while let Some(command) = self.receiver.recv().await {
            match command {
                Command::FetchParticipation {
                    participation_id,
                    exercise_id,
                } => self.fetch_participation(participation_id, exercise_id),
                Command::ParticipationFetched {
                    participation_id,
                    exercise_id,
                    submission,
                } => {
                    self.seed(participation_id, exercise_id, submission).await;
                }
                Command::FetchExercise { exercise_id } => self.fetch_exercise(exercise_id),
                Command::ExerciseFetched {
                    exercise_id,
                    submissions,
                } => self.seed_exercise(exercise_id, submissions).await,
                Command::PushMessage {
                    participation_id,
                    message,
                } => self.on_push_message(participation_id, message).await,
                Command::ResultArrived {
                    participation_id,
                    result,
                } => self.on_result(participation_id, result).await,
                Command::TimerExpired {
                    participation_id,
                    generation,
                } => self.on_timer_expired(participation_id, generation).await,
                Command::Shutdown => break,
            }
        }

        self.timers.disarm_all();
        self.push.unsubscribe_all();
        self.results.unsubscribe_all();
        self.streams.close();
        info!("tracker event loop stopped");
    }

    fn fetch_participation(&self, participation_id: ParticipationId, exercise_id: ExerciseId) {
        let api = self.api.clone();
        let sender = self.sender.clone();
        tokio::spawn(async move {
            let submission = match api.latest_pending_submission(participation_id).await {
                Ok(submission) => submission,
                Err(err) => {
                    warn!(
                        participation_id = %participation_id,
                        error = %err,
                        "failed to fetch latest pending submission, assuming none"
                    );
                    None
                }
            };
            let _ = sender.send(Command::ParticipationFetched {
                participation_id,
                exercise_id,
                submission,
            });
        });
    }

    fn fetch_exercise(&self, exercise_id: ExerciseId) {
        let api = self.api.clone();
        let sender = self.sender.clone();
        tokio::spawn(async move {
            let submissions = match api.latest_pending_submissions(exercise_id).await {
                Ok(submissions) => submissions,
                Err(err) => {
                    warn!(
                        exercise_id = %exercise_id,
                        error = %err,
                        "failed to fetch pending submissions of exercise, assuming none"
                    );
                    PendingSubmissions::new()
                }
            };
            let _ = sender.send(Command::ExerciseFetched {
                exercise_id,
                submissions,
            });
        });
    }

    /// 处理刚从服务器取得的待处理提交。
    async fn seed(
        &mut self,
        participation_id: ParticipationId,
        exercise_id: ExerciseId,
        submission: Option<ProgrammingSubmission>,
    ) {
        self.exercise_of.insert(participation_id, exercise_id);
        self.push.ensure_subscribed(participation_id).await;
        self.results.ensure_subscribed(participation_id).await;

        let current = self.store.record(exercise_id, participation_id).await;
        if is_stale_fetch(current.as_ref(), submission.as_ref()) {
            debug!(
                participation_id = %participation_id,
                fetched_submission_id = ?submission.as_ref().map(|submission| submission.id),
                "ignoring fetched submission older than the tracked one"
            );
            return;
        }

        let eta = self.store.current_eta();
        let record = match (FetchedState::classify(submission.as_ref(), eta, Utc::now()), submission) {
            (FetchedState::Building { remaining }, Some(submission)) => {
                self.timers.arm(participation_id, remaining);
                PendingSubmissionRecord::building(participation_id, exercise_id, submission)
            }
            (FetchedState::Failed, submission) => {
                self.timers.disarm(participation_id);
                info!(
                    participation_id = %participation_id,
                    "pending submission is older than the expected result time"
                );
                PendingSubmissionRecord::failed(participation_id, exercise_id, submission)
            }
            _ => {
                self.timers.disarm(participation_id);
                PendingSubmissionRecord::no_pending(participation_id, exercise_id)
            }
        };

        self.apply(record).await;
    }

    async fn seed_exercise(&mut self, exercise_id: ExerciseId, submissions: PendingSubmissions) {
        let mut submissions: Vec<_> = submissions.into_iter().collect();
        submissions.sort_by_key(|(participation_id, _)| *participation_id);
        let participation_count = submissions.len();

        for (participation_id, submission) in submissions {
            self.seed(participation_id, exercise_id, submission).await;
        }

        let snapshot = self.store.get(exercise_id).await;
        self.streams.seed_exercise(snapshot);
        info!(
            exercise_id = %exercise_id,
            participation_count,
            "exercise submission states loaded"
        );
        self.events.emit(TrackerEvent::ExerciseSeeded {
            exercise_id,
            participation_count,
        });
    }

    async fn on_push_message(&mut self, participation_id: ParticipationId, message: SubmissionMessage) {
        let Some(exercise_id) = self.exercise_of.get(&participation_id).copied() else {
            debug!(participation_id = %participation_id, "ignoring push message of untracked participation");
            return;
        };

        match message {
            SubmissionMessage::Submission(submission) => {
                self.apply(PendingSubmissionRecord::building(
                    participation_id,
                    exercise_id,
                    submission,
                ))
                .await;
                let eta = self.store.current_eta();
                self.timers.arm(participation_id, eta);
            }
            SubmissionMessage::Error(error) => {
                warn!(
                    participation_id = %participation_id,
                    error = %error.error,
                    "server reported a failed submission"
                );
                self.timers.disarm(participation_id);
                self.fail(participation_id, exercise_id).await;
            }
        }
    }

    async fn on_result(&mut self, participation_id: ParticipationId, result: BuildResult) {
        let Some(exercise_id) = self.exercise_of.get(&participation_id).copied() else {
            return;
        };
        let result_id = ResultId::from(result.id);
        let Some(submission_id) = result.submission_id().map(SubmissionId::new) else {
            debug!(
                participation_id = %participation_id,
                result_id = %result_id,
                "discarding result without submission"
            );
            return;
        };
        let awaited = self
            .store
            .record(exercise_id, participation_id)
            .await
            .is_some_and(|record| record.awaits(submission_id));
        if !awaited {
            debug!(
                participation_id = %participation_id,
                submission_id = %submission_id,
                result_id = %result_id,
                "discarding result of a submission that is not pending"
            );
            return;
        }

        debug!(
            participation_id = %participation_id,
            result_id = %result_id,
            "result arrived for pending submission"
        );
        self.timers.disarm(participation_id);
        self.apply(PendingSubmissionRecord::no_pending(participation_id, exercise_id))
            .await;
    }

    async fn on_timer_expired(&mut self, participation_id: ParticipationId, generation: u64) {
        if !self.timers.take_expired(participation_id, generation) {
            debug!(participation_id = %participation_id, generation, "ignoring superseded timer");
            return;
        }
        let Some(exercise_id) = self.exercise_of.get(&participation_id).copied() else {
            return;
        };
        let building = self
            .store
            .record(exercise_id, participation_id)
            .await
            .is_some_and(|record| record.state == SubmissionState::Building);
        if !building {
            return;
        }

        warn!(
            participation_id = %participation_id,
            "no result arrived in the expected time, marking submission as failed"
        );
        self.fail(participation_id, exercise_id).await;
    }

    /// 标记为失败，保留最后已知的提交。
    async fn fail(&mut self, participation_id: ParticipationId, exercise_id: ExerciseId) {
        let submission = self
            .store
            .record(exercise_id, participation_id)
            .await
            .and_then(|record| record.submission);
        self.apply(PendingSubmissionRecord::failed(
            participation_id,
            exercise_id,
            submission,
        ))
        .await;
    }

    /// 唯一的写入路径：存储、通知参与与练习订阅方、广播事件。
    async fn apply(&mut self, record: PendingSubmissionRecord) {
        let exercise_id = record.exercise_id;
        let update = match self.store.set(exercise_id, record.clone()).await {
            Ok(update) => update,
            Err(err) => {
                warn!(
                    participation_id = %record.participation_id,
                    exercise_id = %exercise_id,
                    error = %err,
                    "rejected submission state update"
                );
                return;
            }
        };

        info!(
            participation_id = %record.participation_id,
            exercise_id = %exercise_id,
            state = ?record.state,
            submission_id = ?record.submission_id(),
            "submission state changed"
        );
        self.streams.publish_participation(record.clone());
        self.streams.publish_exercise(update.snapshot);
        self.events
            .emit(TrackerEvent::ParticipationStateChanged { record });

        if let Some(eta) = update.eta_changed {
            info!(eta_ms = eta.as_millis() as u64, "result eta changed");
            self.events.emit(TrackerEvent::ResultEtaChanged {
                eta_ms: eta.as_millis() as u64,
            });
        }
    }
}

/// 抓取结果是否落后于已追踪的构建中提交。
///
/// 抓取请求可能早于推送到达的新提交发出，此时不能用旧数据覆盖。
fn is_stale_fetch(
    current: Option<&PendingSubmissionRecord>,
    fetched: Option<&ProgrammingSubmission>,
) -> bool {
    let Some(tracked) = current
        .filter(|record| record.state == SubmissionState::Building)
        .and_then(|record| record.submission.as_ref())
    else {
        return false;
    };
    fetched.is_none_or(|fetched| fetched.id <= tracked.id)
}
