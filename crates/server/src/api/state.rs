//! 统一的应用状态。

use std::sync::Arc;

use submission_tracker::{SubmissionTracker, TopicHub};

/// 统一的应用状态，包含所有服务共享的数据。
#[derive(Clone)]
pub struct AppState {
    /// 提交状态追踪器。
    pub tracker: Arc<SubmissionTracker>,
    /// 进程内推送中心，平台通知经由它进入追踪器。
    pub hub: Arc<TopicHub>,
}

impl AppState {
    /// 创建新的应用状态。
    pub fn new(tracker: Arc<SubmissionTracker>, hub: Arc<TopicHub>) -> Self {
        Self { tracker, hub }
    }
}
