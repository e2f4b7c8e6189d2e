use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use buildwatch_core::{ExerciseId, ExerciseState, ParticipationId, PendingSubmissionRecord};
use tokio::sync::watch;

/// 订阅方轮询的状态流。
///
/// 先返回当前值，再返回之后的每次更新；数据尚未加载时不会返回。
/// 慢速订阅方只会看到最新状态。
#[derive(Debug, Clone)]
pub struct StateStream<T> {
    receiver: watch::Receiver<Option<T>>,
}

impl<T: Clone> StateStream<T> {
    pub(crate) fn new(mut receiver: watch::Receiver<Option<T>>) -> Self {
        receiver.mark_changed();
        Self { receiver }
    }

    /// 等待下一个状态。追踪器关闭后返回 `None`。
    pub async fn next(&mut self) -> Option<T> {
        loop {
            self.receiver.changed().await.ok()?;
            if let Some(value) = self.receiver.borrow_and_update().clone() {
                return Some(value);
            }
        }
    }

    /// 当前状态，不等待。
    pub fn current(&self) -> Option<T> {
        self.receiver.borrow().clone()
    }
}

/// 预计出结果时间流，只在值变化时更新。
#[derive(Debug, Clone)]
pub struct EtaStream {
    receiver: watch::Receiver<Duration>,
}

impl EtaStream {
    pub(crate) fn new(mut receiver: watch::Receiver<Duration>) -> Self {
        receiver.mark_changed();
        Self { receiver }
    }

    pub async fn next(&mut self) -> Option<Duration> {
        self.receiver.changed().await.ok()?;
        Some(*self.receiver.borrow_and_update())
    }

    pub fn current(&self) -> Duration {
        *self.receiver.borrow()
    }
}

type Slot<T> = watch::Sender<Option<T>>;

/// 按键注册的状态通道。
///
/// 检查与创建在同一把锁内完成，同一个键只会有一个调用方得到 `created = true`，
/// 由它负责发起加载。关闭后只返回已结束的通道。
#[derive(Default)]
pub(crate) struct StreamRegistry {
    participations: Mutex<HashMap<ParticipationId, Slot<PendingSubmissionRecord>>>,
    exercises: Mutex<HashMap<ExerciseId, Slot<Arc<ExerciseState>>>>,
    closed: AtomicBool,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn register<K, T>(
    slots: &Mutex<HashMap<K, Slot<T>>>,
    closed: &AtomicBool,
    key: K,
) -> (watch::Receiver<Option<T>>, bool)
where
    K: std::hash::Hash + Eq,
{
    let mut slots = lock(slots);
    if closed.load(Ordering::SeqCst) {
        let (_, receiver) = watch::channel(None);
        return (receiver, false);
    }
    match slots.get(&key) {
        Some(sender) => (sender.subscribe(), false),
        None => {
            let (sender, receiver) = watch::channel(None);
            slots.insert(key, sender);
            (receiver, true)
        }
    }
}

impl StreamRegistry {
    pub(crate) fn participation(
        &self,
        participation_id: ParticipationId,
    ) -> (watch::Receiver<Option<PendingSubmissionRecord>>, bool) {
        register(&self.participations, &self.closed, participation_id)
    }

    pub(crate) fn exercise(
        &self,
        exercise_id: ExerciseId,
    ) -> (watch::Receiver<Option<Arc<ExerciseState>>>, bool) {
        register(&self.exercises, &self.closed, exercise_id)
    }

    /// 发布参与的新状态，必要时创建通道。
    pub(crate) fn publish_participation(&self, record: PendingSubmissionRecord) {
        let mut slots = lock(&self.participations);
        slots
            .entry(record.participation_id)
            .or_insert_with(|| watch::channel(None).0)
            .send_replace(Some(record));
    }

    /// 练习加载完成后发布聚合快照。
    pub(crate) fn seed_exercise(&self, snapshot: Arc<ExerciseState>) {
        let mut slots = lock(&self.exercises);
        slots
            .entry(snapshot.exercise_id())
            .or_insert_with(|| watch::channel(None).0)
            .send_replace(Some(snapshot));
    }

    /// 仅在练习已加载完成时发布新快照。
    pub(crate) fn publish_exercise(&self, snapshot: Arc<ExerciseState>) {
        let slots = lock(&self.exercises);
        if let Some(sender) = slots.get(&snapshot.exercise_id()) {
            sender.send_if_modified(|current| match current {
                Some(_) => {
                    *current = Some(snapshot);
                    true
                }
                None => false,
            });
        }
    }

    pub(crate) fn is_tracking_participation(&self, participation_id: ParticipationId) -> bool {
        lock(&self.participations).contains_key(&participation_id)
    }

    /// 丢弃所有通道，订阅方读完最后的状态后结束。之后的订阅立即结束。
    pub(crate) fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        lock(&self.participations).clear();
        lock(&self.exercises).clear();
    }
}
