//! 按参与划分的推送订阅注册表。
//!
//! 每个注册表为每个参与最多持有一个转发任务，
//! 转发任务把通道消息转换为事件循环命令。

use buildwatch_core::ParticipationId;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::channel::Topic;
use crate::command::Command;

pub(crate) mod push;
pub(crate) mod result;

pub(crate) use push::PushSubscriptionRegistry;
pub(crate) use result::ResultSubscriptionRegistry;

fn spawn_forwarder<T, F>(
    topic: Topic,
    mut receiver: broadcast::Receiver<T>,
    sender: mpsc::UnboundedSender<Command>,
    to_command: F,
) -> JoinHandle<()>
where
    T: Clone + Send + 'static,
    F: Fn(ParticipationId, T) -> Command + Send + 'static,
{
    tokio::spawn(async move {
        let participation_id = topic.participation_id();
        loop {
            match receiver.recv().await {
                Ok(message) => {
                    if sender.send(to_command(participation_id, message)).is_err() {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(topic = %topic, skipped, "push subscription lagged behind");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
        debug!(topic = %topic, "push subscription ended");
    })
}
