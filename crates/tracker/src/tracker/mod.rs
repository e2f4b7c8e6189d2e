//! 提交状态追踪器。
//!
//! 对外提供按参与、按练习的状态流和预计出结果时间流，
//! 内部由单个事件循环串行处理抓取结果、推送消息、构建结果与计时器到期。

use std::sync::Arc;
use std::time::Duration;

use buildwatch_core::{
    ExerciseId, ExerciseState, ParticipationId, PendingSubmissionRecord, ResultEtaPolicy,
    SubmissionState,
};
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::api::SubmissionApi;
use crate::channel::PushChannel;
use crate::command::Command;
use crate::store::StateStore;
use crate::{EventBroadcaster, EventStream, Result, TrackerConfig};

mod runtime;
mod streams;

pub use streams::{EtaStream, StateStream};

use runtime::TrackerRuntime;
use streams::StreamRegistry;

const DEFAULT_EVENT_BUFFER_SIZE: usize = 1_000;

pub struct SubmissionTracker {
    api: Arc<dyn SubmissionApi>,
    store: Arc<StateStore>,
    streams: Arc<StreamRegistry>,
    event_broadcaster: Arc<EventBroadcaster>,
    commands: mpsc::UnboundedSender<Command>,
}

impl SubmissionTracker {
    /// 根据配置创建追踪器并启动事件循环。
    ///
    /// 需要在 tokio 运行时内调用。
    pub fn new(
        config: &TrackerConfig,
        api: Arc<dyn SubmissionApi>,
        channel: Arc<dyn PushChannel>,
    ) -> Result<Self> {
        info!(
            server_url = %config.server_url,
            default_result_eta_ms = config.default_result_eta_ms,
            event_buffer_size = config.event_buffer_size,
            "initializing submission tracker"
        );

        Ok(Self::with_policy(
            config.eta_policy()?,
            config.event_buffer_size,
            api,
            channel,
        ))
    }

    /// 使用给定的预计时间策略创建追踪器。
    pub fn with_policy(
        policy: ResultEtaPolicy,
        event_buffer_size: usize,
        api: Arc<dyn SubmissionApi>,
        channel: Arc<dyn PushChannel>,
    ) -> Self {
        let store = Arc::new(StateStore::new(policy));
        let streams = Arc::new(StreamRegistry::default());
        let event_broadcaster = Arc::new(EventBroadcaster::new(event_buffer_size));
        let (sender, receiver) = mpsc::unbounded_channel();

        let runtime = TrackerRuntime::new(
            api.clone(),
            channel,
            store.clone(),
            streams.clone(),
            event_broadcaster.clone(),
            sender.clone(),
            receiver,
        );
        tokio::spawn(runtime.run());

        Self {
            api,
            store,
            streams,
            event_broadcaster,
            commands: sender,
        }
    }

    /// 使用默认策略创建追踪器。
    pub fn with_defaults(api: Arc<dyn SubmissionApi>, channel: Arc<dyn PushChannel>) -> Self {
        Self::with_policy(
            ResultEtaPolicy::default(),
            DEFAULT_EVENT_BUFFER_SIZE,
            api,
            channel,
        )
    }

    /// 订阅参与的最新待处理提交状态。
    ///
    /// 第一次订阅时向服务器查询一次，之后的订阅共享同一个状态流。
    #[tracing::instrument(skip(self))]
    pub fn subscribe_participation(
        &self,
        participation_id: ParticipationId,
        exercise_id: ExerciseId,
    ) -> StateStream<PendingSubmissionRecord> {
        let (receiver, created) = self.streams.participation(participation_id);
        if created {
            info!(participation_id = %participation_id, "loading latest pending submission");
            self.send(Command::FetchParticipation {
                participation_id,
                exercise_id,
            });
        }
        StateStream::new(receiver)
    }

    /// 订阅练习下所有参与的提交状态。
    ///
    /// 第一次订阅时一次性加载全部待处理提交，加载完成后发布聚合状态，
    /// 之后每次变化都会发布新的快照。
    #[tracing::instrument(skip(self))]
    pub fn subscribe_exercise(&self, exercise_id: ExerciseId) -> StateStream<Arc<ExerciseState>> {
        let (receiver, created) = self.streams.exercise(exercise_id);
        if created {
            info!(exercise_id = %exercise_id, "loading pending submissions of exercise");
            self.send(Command::FetchExercise { exercise_id });
        }
        StateStream::new(receiver)
    }

    /// 订阅预计出结果时间，只在变化时更新。
    pub fn result_eta_stream(&self) -> EtaStream {
        EtaStream::new(self.store.subscribe_eta())
    }

    pub fn current_eta(&self) -> Duration {
        self.store.current_eta()
    }

    /// 练习的当前状态快照。
    pub async fn exercise_state(&self, exercise_id: ExerciseId) -> Arc<ExerciseState> {
        self.store.get(exercise_id).await
    }

    /// 练习中处于 `state` 的参与。
    pub async fn participations_in_state(
        &self,
        exercise_id: ExerciseId,
        state: SubmissionState,
    ) -> Vec<ParticipationId> {
        self.store.get(exercise_id).await.participations_in(state)
    }

    /// 参与是否已有状态流。
    pub fn is_tracking(&self, participation_id: ParticipationId) -> bool {
        self.streams.is_tracking_participation(participation_id)
    }

    /// 订阅所有状态变化事件。
    pub fn subscribe_events(&self) -> EventStream {
        self.event_broadcaster.subscribe()
    }

    #[tracing::instrument(skip(self))]
    pub async fn trigger_build(&self, participation_id: ParticipationId) -> Result<()> {
        info!(participation_id = %participation_id, "triggering build");
        self.api.trigger_build(participation_id).await
    }

    #[tracing::instrument(skip(self))]
    pub async fn trigger_instructor_build(&self, participation_id: ParticipationId) -> Result<()> {
        info!(participation_id = %participation_id, "triggering instructor build");
        self.api.trigger_instructor_build(participation_id).await
    }

    #[tracing::instrument(skip(self))]
    pub async fn trigger_instructor_build_for_all_participations(
        &self,
        exercise_id: ExerciseId,
    ) -> Result<()> {
        info!(exercise_id = %exercise_id, "triggering instructor build for all participations");
        self.api.trigger_instructor_build_all(exercise_id).await
    }

    #[tracing::instrument(skip(self, participation_ids))]
    pub async fn trigger_instructor_build_for_participations(
        &self,
        exercise_id: ExerciseId,
        participation_ids: &[ParticipationId],
    ) -> Result<()> {
        info!(
            exercise_id = %exercise_id,
            count = participation_ids.len(),
            "triggering instructor build for participations"
        );
        self.api
            .trigger_instructor_build_for(exercise_id, participation_ids)
            .await
    }

    /// 停止事件循环，取消所有计时器与推送订阅。
    ///
    /// 之后参与与练习的状态流在读完最后的状态后结束。
    pub fn shutdown(&self) {
        info!("shutting down submission tracker");
        self.send(Command::Shutdown);
    }

    fn send(&self, command: Command) {
        if self.commands.send(command).is_err() {
            warn!("tracker event loop is not running");
        }
    }
}

impl Drop for SubmissionTracker {
    fn drop(&mut self) {
        let _ = self.commands.send(Command::Shutdown);
    }
}
