//! 按参与划分的结果等待计时器。

use std::collections::HashMap;
use std::time::Duration;

use buildwatch_core::ParticipationId;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::command::Command;

struct TimerSlot {
    generation: u64,
    handle: JoinHandle<()>,
}

/// 可取消的延时计时器集合，每个参与最多一个。
///
/// 到期时向事件循环发送 `Command::TimerExpired`。每次 `arm` 分配新的代数，
/// 只有当前代数的到期事件会被 `take_expired` 接受。
pub(crate) struct TimerRegistry {
    sender: mpsc::UnboundedSender<Command>,
    slots: HashMap<ParticipationId, TimerSlot>,
    next_generation: u64,
}

impl TimerRegistry {
    pub(crate) fn new(sender: mpsc::UnboundedSender<Command>) -> Self {
        Self {
            sender,
            slots: HashMap::new(),
            next_generation: 0,
        }
    }

    /// 取消已有计时器并重新开始计时，返回新计时器的代数。
    pub(crate) fn arm(&mut self, participation_id: ParticipationId, duration: Duration) -> u64 {
        self.disarm(participation_id);

        self.next_generation += 1;
        let generation = self.next_generation;
        let sender = self.sender.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(duration).await;
            let _ = sender.send(Command::TimerExpired {
                participation_id,
                generation,
            });
        });

        debug!(
            participation_id = %participation_id,
            generation,
            duration_ms = duration.as_millis() as u64,
            "armed result timer"
        );
        self.slots
            .insert(participation_id, TimerSlot { generation, handle });
        generation
    }

    /// 取消计时器，不重新开始。
    pub(crate) fn disarm(&mut self, participation_id: ParticipationId) -> bool {
        match self.slots.remove(&participation_id) {
            Some(slot) => {
                slot.handle.abort();
                true
            }
            None => false,
        }
    }

    /// 接受一次到期事件。
    ///
    /// 事件属于当前计时器时清除该计时器并返回 `true`；
    /// 已被取消或替换的计时器返回 `false`。
    pub(crate) fn take_expired(&mut self, participation_id: ParticipationId, generation: u64) -> bool {
        match self.slots.get(&participation_id) {
            Some(slot) if slot.generation == generation => {
                self.slots.remove(&participation_id);
                true
            }
            _ => false,
        }
    }

    #[cfg(test)]
    pub(crate) fn is_armed(&self, participation_id: ParticipationId) -> bool {
        self.slots.contains_key(&participation_id)
    }

    #[cfg(test)]
    pub(crate) fn armed_count(&self) -> usize {
        self.slots.len()
    }

    pub(crate) fn disarm_all(&mut self) {
        for (_, slot) in self.slots.drain() {
            slot.handle.abort();
        }
    }
}

impl Drop for TimerRegistry {
    fn drop(&mut self) {
        self.disarm_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn expect_expiry(command: Option<Command>) -> (ParticipationId, u64) {
        match command {
            Some(Command::TimerExpired {
                participation_id,
                generation,
            }) => (participation_id, generation),
            other => panic!("expected TimerExpired, got: {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn armed_timer_fires_once_after_duration() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut timers = TimerRegistry::new(tx);
        let id = ParticipationId::new(1);
        let start = tokio::time::Instant::now();

        let generation = timers.arm(id, Duration::from_millis(5_000));
        let (fired_id, fired_generation) = expect_expiry(rx.recv().await);

        assert!(start.elapsed() >= Duration::from_millis(5_000));
        assert!(start.elapsed() < Duration::from_millis(5_010));
        assert_eq!(fired_id, id);
        assert_eq!(fired_generation, generation);
        assert!(timers.take_expired(id, generation));
        assert!(!timers.is_armed(id));
        assert!(!timers.take_expired(id, generation));
    }

    #[tokio::test(start_paused = true)]
    async fn rearming_supersedes_previous_timer() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut timers = TimerRegistry::new(tx);
        let id = ParticipationId::new(1);
        let start = tokio::time::Instant::now();

        let first = timers.arm(id, Duration::from_millis(100));
        let second = timers.arm(id, Duration::from_millis(300));
        assert_ne!(first, second);
        assert_eq!(timers.armed_count(), 1);

        let (_, generation) = expect_expiry(rx.recv().await);
        assert_eq!(generation, second);
        assert!(start.elapsed() >= Duration::from_millis(300));
        assert!(start.elapsed() < Duration::from_millis(310));

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn disarmed_timer_never_fires() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut timers = TimerRegistry::new(tx);
        let id = ParticipationId::new(1);

        timers.arm(id, Duration::from_millis(100));
        assert!(timers.disarm(id));
        assert!(!timers.disarm(id));

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn stale_generation_is_not_accepted() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut timers = TimerRegistry::new(tx);
        let id = ParticipationId::new(1);

        let first = timers.arm(id, Duration::from_millis(100));
        let second = timers.arm(id, Duration::from_millis(100));

        assert!(!timers.take_expired(id, first));
        assert!(timers.is_armed(id));
        assert!(timers.take_expired(id, second));
    }

    #[tokio::test(start_paused = true)]
    async fn timers_are_independent_per_participation() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut timers = TimerRegistry::new(tx);

        timers.arm(ParticipationId::new(1), Duration::from_millis(200));
        timers.arm(ParticipationId::new(2), Duration::from_millis(100));
        assert_eq!(timers.armed_count(), 2);

        let (first, _) = expect_expiry(rx.recv().await);
        let (second, _) = expect_expiry(rx.recv().await);
        assert_eq!(first, ParticipationId::new(2));
        assert_eq!(second, ParticipationId::new(1));
    }
}
