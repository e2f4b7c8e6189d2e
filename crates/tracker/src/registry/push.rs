use std::collections::HashMap;
use std::sync::Arc;

use buildwatch_core::ParticipationId;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use super::spawn_forwarder;
use crate::channel::{PushChannel, Topic};
use crate::command::Command;

/// 新提交主题的订阅注册表。
pub(crate) struct PushSubscriptionRegistry {
    channel: Arc<dyn PushChannel>,
    sender: mpsc::UnboundedSender<Command>,
    forwarders: HashMap<ParticipationId, JoinHandle<()>>,
}

impl PushSubscriptionRegistry {
    pub(crate) fn new(channel: Arc<dyn PushChannel>, sender: mpsc::UnboundedSender<Command>) -> Self {
        Self {
            channel,
            sender,
            forwarders: HashMap::new(),
        }
    }

    /// 确保参与已订阅新提交主题，已订阅时为空操作。
    ///
    /// 订阅失败时只记录日志，之后的调用会重试。
    pub(crate) async fn ensure_subscribed(&mut self, participation_id: ParticipationId) -> bool {
        if self.forwarders.contains_key(&participation_id) {
            return false;
        }

        let topic = Topic::NewSubmission(participation_id);
        match self.channel.subscribe_new_submissions(participation_id).await {
            Ok(receiver) => {
                let handle = spawn_forwarder(
                    topic,
                    receiver,
                    self.sender.clone(),
                    |participation_id, message| Command::PushMessage {
                        participation_id,
                        message,
                    },
                );
                self.forwarders.insert(participation_id, handle);
                info!(topic = %topic, "subscribed to new submissions");
                true
            }
            Err(err) => {
                warn!(topic = %topic, error = %err, "failed to subscribe to new submissions");
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

impl Drop for PushSubscriptionRegistry {
    fn drop(&mut self) {
        self.unsubscribe_all();
    }
}
