use anyhow::Result;
use buildwatch_core::{ExerciseId, PendingSubmissionRecord};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::warn;

/// 追踪器对外广播的事件类型。
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TrackerEvent {
    /// 某个参与的提交状态发生变化。
    ParticipationStateChanged {
        /// 变化后的记录。
        record: PendingSubmissionRecord,
    },
    /// 练习的待处理提交已全部加载。
    ExerciseSeeded {
        /// 练习 ID。
        exercise_id: ExerciseId,
        /// 加载到的参与数量。
        participation_count: usize,
    },
    /// 预计出结果时间发生变化。
    ResultEtaChanged {
        /// 新的预计时间（毫秒）。
        eta_ms: u64,
    },
}

/// 基于 `tokio::broadcast` 的事件广播器。
#[derive(Debug, Clone)]
pub struct EventBroadcaster {
    sender: broadcast::Sender<TrackerEvent>,
}

impl EventBroadcaster {
    /// 创建事件广播器。
    ///
    /// `capacity` 表示内部广播队列容量。
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// 广播一个事件。
    pub fn emit(&self, event: TrackerEvent) {
        let _ = self.sender.send(event);
    }

    /// 订阅事件流。
    pub fn subscribe(&self) -> EventStream {
        EventStream {
            receiver: self.sender.subscribe(),
        }
    }
}

/// 事件接收流包装器。
#[derive(Debug)]
pub struct EventStream {
    receiver: broadcast::Receiver<TrackerEvent>,
}

impl EventStream {
    /// 异步接收下一条事件。
    ///
    /// 接收方落后时跳过丢失的事件，只在广播器关闭后返回错误。
    pub async fn recv(&mut self) -> Result<TrackerEvent> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => return Ok(event),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "event stream lagged, skipping missed events");
                }
                Err(err) => return Err(err.into()),
            }
        }
    }

    /// 非阻塞尝试接收一条事件。
    pub fn try_recv(&mut self) -> Result<TrackerEvent> {
        Ok(self.receiver.try_recv()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn lagging_stream_skips_to_retained_events() {
        let broadcaster = EventBroadcaster::new(2);
        let mut stream = broadcaster.subscribe();

        for eta_ms in [1, 2, 3] {
            broadcaster.emit(TrackerEvent::ResultEtaChanged { eta_ms });
        }

        match stream.recv().await.expect("stream should recover from lag") {
            TrackerEvent::ResultEtaChanged { eta_ms } => assert_eq!(eta_ms, 2),
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn closed_broadcaster_ends_stream() {
        let broadcaster = EventBroadcaster::new(4);
        let mut stream = broadcaster.subscribe();
        drop(broadcaster);

        assert!(stream.recv().await.is_err());
    }
}
