use std::collections::HashMap;
use std::sync::Arc;

use buildwatch_core::ParticipationId;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use super::spawn_forwarder;
use crate::channel::{PushChannel, Topic};
use crate::command::Command;

/// 构建结果主题的订阅注册表。
///
/// 结果与计时器到期事件进入同一个事件循环，由循环按提交身份决定取舍。
pub(crate) struct ResultSubscriptionRegistry {
    channel: Arc<dyn PushChannel>,
    sender: mpsc::UnboundedSender<Command>,
    forwarders: HashMap<ParticipationId, JoinHandle<()>>,
}

impl ResultSubscriptionRegistry {
    pub(crate) fn new(channel: Arc<dyn PushChannel>, sender: mpsc::UnboundedSender<Command>) -> Self {
        Self {
            channel,
            sender,
            forwarders: HashMap::new(),
        }
    }

    /// 确保参与已订阅结果主题，已订阅时为空操作。
    pub(crate) async fn ensure_subscribed(&mut self, participation_id: ParticipationId) -> bool {
        if self.forwarders.contains_key(&participation_id) {
            return false;
        }

        let topic = Topic::NewResults(participation_id);
        match self.channel.subscribe_results(participation_id).await {
            Ok(receiver) => {
                let handle = spawn_forwarder(
                    topic,
                    receiver,
                    self.sender.clone(),
                    |participation_id, result| Command::ResultArrived {
                        participation_id,
                        result,
                    },
                );
                self.forwarders.insert(participation_id, handle);
                info!(topic = %topic, "subscribed to build results");
                true
            }
            Err(err) => {
                warn!(topic = %topic, error = %err, "failed to subscribe to build results");
                false
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn is_subscribed(&self, participation_id: ParticipationId) -> bool {
        self.forwarders.contains_key(&participation_id)
    }

    pub(crate) fn unsubscribe_all(&mut self) {
        for (_, handle) in self.forwarders.drain() {
            handle.abort();
        }
    }
}

impl Drop for ResultSubscriptionRegistry {
    fn drop(&mut self) {
        self.unsubscribe_all();
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use buildwatch_api_types::{BuildResult, SubmissionMessage, SubmissionRef};
    use tokio::sync::broadcast;
    use tokio::time::{Duration, timeout};

    use super::*;
    use crate::TrackerError;
    use crate::channel::TopicHub;

    struct UnavailableChannel;

    #[async_trait]
    impl PushChannel for UnavailableChannel {
        async fn subscribe_new_submissions(
            &self,
            _participation_id: ParticipationId,
        ) -> crate::Result<broadcast::Receiver<SubmissionMessage>> {
            Err(TrackerError::Channel("offline".to_string()))
        }

        async fn subscribe_results(
            &self,
            _participation_id: ParticipationId,
        ) -> crate::Result<broadcast::Receiver<BuildResult>> {
            Err(TrackerError::Channel("offline".to_string()))
        }
    }

    #[tokio::test]
    async fn forwards_results_as_commands() {
        let hub = Arc::new(TopicHub::new());
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut registry = ResultSubscriptionRegistry::new(hub.clone(), tx);
        let id = ParticipationId::new(9);

        assert!(registry.ensure_subscribed(id).await);
        assert!(!registry.ensure_subscribed(id).await);

        let result = BuildResult {
            id: 1,
            submission: Some(SubmissionRef { id: 42 }),
            successful: true,
            score: Some(100.0),
            completion_date: None,
        };
        hub.publish_result(id, result.clone()).await;

        let command = timeout(Duration::from_millis(50), rx.recv())
            .await
            .expect("command should arrive");
        match command {
            Some(Command::ResultArrived {
                participation_id,
                result: forwarded,
            }) => {
                assert_eq!(participation_id, id);
                assert_eq!(forwarded, result);
            }
            other => panic!("expected ResultArrived, got: {other:?}"),
        }
    }

    #[tokio::test]
    async fn failed_subscription_is_retried_later() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut registry = ResultSubscriptionRegistry::new(Arc::new(UnavailableChannel), tx);
        let id = ParticipationId::new(9);

        assert!(!registry.ensure_subscribed(id).await);
        assert!(!registry.is_subscribed(id));
    }
}
