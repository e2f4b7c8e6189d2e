//! 平台 REST 接口抽象层。
//!
//! 追踪器只通过 `SubmissionApi` 访问平台服务器，
//! 便于在测试中替换为内存实现。

use std::collections::HashMap;

use async_trait::async_trait;
use buildwatch_api_types::ProgrammingSubmission;
use buildwatch_core::{ExerciseId, ParticipationId};

use crate::error::Result;

pub mod http;

pub use http::HttpSubmissionApi;

/// 某练习下每个参与的最新待处理提交，没有待处理提交时为 `None`。
pub type PendingSubmissions = HashMap<ParticipationId, Option<ProgrammingSubmission>>;

/// 平台提交接口。
#[async_trait]
pub trait SubmissionApi: Send + Sync {
    /// 查询参与的最新待处理提交。
    ///
    /// 待处理提交指最新的、尚无结果的提交。
    async fn latest_pending_submission(
        &self,
        participation_id: ParticipationId,
    ) -> Result<Option<ProgrammingSubmission>>;

    /// 查询练习下所有参与的最新待处理提交。
    async fn latest_pending_submissions(&self, exercise_id: ExerciseId)
    -> Result<PendingSubmissions>;

    /// 以学生身份重新触发构建。
    async fn trigger_build(&self, participation_id: ParticipationId) -> Result<()>;

    /// 以教师身份重新触发构建。
    async fn trigger_instructor_build(&self, participation_id: ParticipationId) -> Result<()>;

    /// 为练习的所有参与触发教师构建。
    async fn trigger_instructor_build_all(&self, exercise_id: ExerciseId) -> Result<()>;

    /// 为练习的指定参与触发教师构建。
    async fn trigger_instructor_build_for(
        &self,
        exercise_id: ExerciseId,
        participation_ids: &[ParticipationId],
    ) -> Result<()>;
}
