//! 推送通道抽象层。
//!
//! 平台通过按参与划分的主题推送新提交与构建结果，
//! 追踪器通过 `PushChannel` 订阅这些主题。

use async_trait::async_trait;
use buildwatch_api_types::{BuildResult, SubmissionMessage};
use buildwatch_core::ParticipationId;
use tokio::sync::broadcast;

use crate::error::Result;

pub mod hub;
pub mod topic;

pub use hub::TopicHub;
pub use topic::Topic;

/// 按参与订阅平台推送的通道。
#[async_trait]
pub trait PushChannel: Send + Sync {
    /// 订阅参与的新提交主题。
    async fn subscribe_new_submissions(
        &self,
        participation_id: ParticipationId,
    ) -> Result<broadcast::Receiver<SubmissionMessage>>;

    /// 订阅参与的构建结果主题。
    async fn subscribe_results(
        &self,
        participation_id: ParticipationId,
    ) -> Result<broadcast::Receiver<BuildResult>>;
}
