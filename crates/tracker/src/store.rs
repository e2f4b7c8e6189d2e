//! 练习到参与状态的内存存储。

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use buildwatch_core::{
    ExerciseId, ExerciseState, ParticipationId, PendingSubmissionRecord, ResultEtaPolicy,
    SubmissionState,
};
use tokio::sync::{RwLock, watch};

use crate::error::Result;

/// 一次写入的结果。
#[derive(Debug, Clone)]
pub(crate) struct StoreUpdate {
    pub(crate) snapshot: Arc<ExerciseState>,
    /// 写入改变了预计时间时为新值。
    pub(crate) eta_changed: Option<Duration>,
}

/// 按练习保存状态快照，并根据构建中提交数量推导预计出结果时间。
///
/// 只有事件循环写入。
pub struct StateStore {
    exercises: RwLock<HashMap<ExerciseId, Arc<ExerciseState>>>,
    policy: ResultEtaPolicy,
    eta: watch::Sender<Duration>,
}

impl StateStore {
    pub fn new(policy: ResultEtaPolicy) -> Self {
        let (eta, _) = watch::channel(policy.default_eta());
        Self {
            exercises: RwLock::new(HashMap::new()),
            policy,
            eta,
        }
    }

    /// 练习的当前快照，未追踪的练习返回空快照。
    pub async fn get(&self, exercise_id: ExerciseId) -> Arc<ExerciseState> {
        let exercises = self.exercises.read().await;
        exercises
            .get(&exercise_id)
            .cloned()
            .unwrap_or_else(|| Arc::new(ExerciseState::new(exercise_id)))
    }

    pub async fn record(
        &self,
        exercise_id: ExerciseId,
        participation_id: ParticipationId,
    ) -> Option<PendingSubmissionRecord> {
        let exercises = self.exercises.read().await;
        exercises
            .get(&exercise_id)
            .and_then(|state| state.get(participation_id))
            .cloned()
    }

    /// 用 `record` 替换参与的记录，生成新的练习快照并重新计算预计时间。
    pub(crate) async fn set(
        &self,
        exercise_id: ExerciseId,
        record: PendingSubmissionRecord,
    ) -> Result<StoreUpdate> {
        let mut exercises = self.exercises.write().await;
        let current = exercises
            .get(&exercise_id)
            .cloned()
            .unwrap_or_else(|| Arc::new(ExerciseState::new(exercise_id)));
        let snapshot = Arc::new(current.with_record(record)?);
        exercises.insert(exercise_id, snapshot.clone());

        let building = Self::building_count(&exercises);
        drop(exercises);

        Ok(StoreUpdate {
            snapshot,
            eta_changed: self.publish_eta(building),
        })
    }

    /// 整体替换练习的快照。
    #[cfg(test)]
    pub(crate) async fn replace_exercise(&self, state: ExerciseState) -> StoreUpdate {
        let mut exercises = self.exercises.write().await;
        let snapshot = Arc::new(state);
        exercises.insert(snapshot.exercise_id(), snapshot.clone());

        let building = Self::building_count(&exercises);
        drop(exercises);

        StoreUpdate {
            snapshot,
            eta_changed: self.publish_eta(building),
        }
    }

    /// 所有练习中处于构建中的记录总数。
    pub async fn total_building(&self) -> usize {
        let exercises = self.exercises.read().await;
        Self::building_count(&exercises)
    }

    pub fn current_eta(&self) -> Duration {
        *self.eta.borrow()
    }

    pub(crate) fn subscribe_eta(&self) -> watch::Receiver<Duration> {
        self.eta.subscribe()
    }

    fn building_count(exercises: &HashMap<ExerciseId, Arc<ExerciseState>>) -> usize {
        exercises
            .values()
            .map(|state| state.count_in(SubmissionState::Building))
            .sum()
    }

    fn publish_eta(&self, building: usize) -> Option<Duration> {
        let eta = self.policy.eta_for(building);
        let changed = self.eta.send_if_modified(|current| {
            if *current == eta {
                false
            } else {
                *current = eta;
                true
            }
        });
        changed.then_some(eta)
    }
}
