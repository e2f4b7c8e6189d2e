//! 进程内的主题推送中心。
//!
//! 每个主题在首次订阅时惰性创建一个 `tokio::broadcast` 通道。
//! 发布时在边界处把 JSON 负载解码为带标签的类型。

use std::collections::HashMap;

use async_trait::async_trait;
use buildwatch_api_types::{BuildResult, SubmissionMessage};
use buildwatch_core::ParticipationId;
use tokio::sync::{RwLock, broadcast};
use tracing::debug;

use super::{PushChannel, Topic};
use crate::error::Result;

const DEFAULT_TOPIC_CAPACITY: usize = 100;

/// `PushChannel` 的进程内实现。
pub struct TopicHub {
    submissions: RwLock<HashMap<ParticipationId, broadcast::Sender<SubmissionMessage>>>,
    results: RwLock<HashMap<ParticipationId, broadcast::Sender<BuildResult>>>,
    capacity: usize,
}

impl TopicHub {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_TOPIC_CAPACITY)
    }

    /// `capacity` 为每个主题的广播队列容量。
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            submissions: RwLock::new(HashMap::new()),
            results: RwLock::new(HashMap::new()),
            capacity,
        }
    }

    /// 发布一条原始 JSON 通知，返回收到消息的订阅者数量。
    ///
    /// 主题未知或负载无法解码时返回错误。
    pub async fn publish(&self, topic: &str, payload: &str) -> Result<usize> {
        match topic.parse::<Topic>()? {
            Topic::NewSubmission(participation_id) => {
                let message: SubmissionMessage = serde_json::from_str(payload)?;
                Ok(self.publish_submission(participation_id, message).await)
            }
            Topic::NewResults(participation_id) => {
                let result: BuildResult = serde_json::from_str(payload)?;
                Ok(self.publish_result(participation_id, result).await)
            }
        }
    }

    /// 向参与的新提交主题发布消息。
    ///
    /// 没有订阅者时为空操作。
    pub async fn publish_submission(
        &self,
        participation_id: ParticipationId,
        message: SubmissionMessage,
    ) -> usize {
        let topics = self.submissions.read().await;
        let delivered = topics
            .get(&participation_id)
            .and_then(|sender| sender.send(message).ok())
            .unwrap_or(0);
        debug!(topic = %Topic::NewSubmission(participation_id), delivered, "published submission message");
        delivered
    }

    /// 向参与的结果主题发布构建结果。
    pub async fn publish_result(&self, participation_id: ParticipationId, result: BuildResult) -> usize {
        let topics = self.results.read().await;
        let delivered = topics
            .get(&participation_id)
            .and_then(|sender| sender.send(result).ok())
            .unwrap_or(0);
        debug!(topic = %Topic::NewResults(participation_id), delivered, "published build result");
        delivered
    }

    /// 当前存在的主题数量。
    pub async fn topic_count(&self) -> usize {
        self.submissions.read().await.len() + self.results.read().await.len()
    }
}

impl Default for TopicHub {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PushChannel for TopicHub {
    async fn subscribe_new_submissions(
        &self,
        participation_id: ParticipationId,
    ) -> Result<broadcast::Receiver<SubmissionMessage>> {
        let mut topics = self.submissions.write().await;
        Ok(topics
            .entry(participation_id)
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .subscribe())
    }

    async fn subscribe_results(
        &self,
        participation_id: ParticipationId,
    ) -> Result<broadcast::Receiver<BuildResult>> {
        let mut topics = self.results.write().await;
        Ok(topics
            .entry(participation_id)
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .subscribe())
    }
}

#[cfg(test)]
mod tests {
    use buildwatch_api_types::SubmissionError;
    use tokio::time::{Duration, timeout};

    use super::*;
    use crate::TrackerError;

    #[tokio::test]
    async fn publish_decodes_error_payload_for_subscribers() {
        let hub = TopicHub::new();
        let participation_id = ParticipationId::new(7);
        let mut receiver = hub
            .subscribe_new_submissions(participation_id)
            .await
            .expect("subscribe should succeed");

        let delivered = hub
            .publish(
                "/topic/participation/7/newSubmission",
                r#"{"error":"build failed to start","participationId":7}"#,
            )
            .await
            .expect("publish should succeed");

        assert_eq!(delivered, 1);
        let message = timeout(Duration::from_millis(50), receiver.recv())
            .await
            .expect("message should arrive")
            .expect("channel should be open");
        assert_eq!(
            message,
            SubmissionMessage::Error(SubmissionError {
                error: "build failed to start".to_string(),
                participation_id: 7,
            })
        );
    }

    #[tokio::test]
    async fn publish_without_subscribers_is_a_no_op() {
        let hub = TopicHub::new();

        let delivered = hub
            .publish("/topic/participation/3/newResults", r#"{"id": 1}"#)
            .await
            .expect("publish should succeed");

        assert_eq!(delivered, 0);
        assert_eq!(hub.topic_count().await, 0);
    }

    #[tokio::test]
    async fn publish_rejects_unknown_topic_and_bad_payload() {
        let hub = TopicHub::new();

        let err = hub
            .publish("/topic/exercise/1/newResults", "{}")
            .await
            .expect_err("unknown topic should fail");
        assert!(matches!(err, TrackerError::UnknownTopic(_)));

        let err = hub
            .publish("/topic/participation/1/newResults", "not json")
            .await
            .expect_err("bad payload should fail");
        assert!(matches!(err, TrackerError::Json(_)));
    }

    #[tokio::test]
    async fn results_only_reach_their_participation() {
        let hub = TopicHub::new();
        let mut first = hub
            .subscribe_results(ParticipationId::new(1))
            .await
            .expect("subscribe should succeed");
        let mut second = hub
            .subscribe_results(ParticipationId::new(2))
            .await
            .expect("subscribe should succeed");

        hub.publish("/topic/participation/2/newResults", r#"{"id": 9, "submission": {"id": 4}}"#)
            .await
            .expect("publish should succeed");

        let result = timeout(Duration::from_millis(50), second.recv())
            .await
            .expect("result should arrive")
            .expect("channel should be open");
        assert_eq!(result.submission_id(), Some(4));
        assert!(first.try_recv().is_err());
    }
}
