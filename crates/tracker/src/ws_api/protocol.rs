use buildwatch_core::{ExerciseId, ParticipationId, PendingSubmissionRecord};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// 客户端发送的 WebSocket 消息。
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// 订阅参与的提交状态。
    SubscribeParticipation {
        participation_id: ParticipationId,
        exercise_id: ExerciseId,
    },
    /// 订阅练习下所有参与的提交状态。
    SubscribeExercise { exercise_id: ExerciseId },
    /// 为学生参与触发构建。
    TriggerBuild { participation_id: ParticipationId },
    /// 以教师身份为参与触发构建。
    TriggerInstructorBuild { participation_id: ParticipationId },
    /// 为练习的所有参与触发构建。
    TriggerInstructorBuildAll { exercise_id: ExerciseId },
    /// 为练习的部分参与触发构建。
    TriggerInstructorBuildFor {
        exercise_id: ExerciseId,
        participation_ids: Vec<ParticipationId>,
    },
    /// 转发一条平台通知到推送中心。
    Publish { topic: String, payload: Value },
}

/// 服务端发送的 WebSocket 消息。
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// 参与的最新状态。
    ParticipationState { record: PendingSubmissionRecord },
    /// 练习的状态快照。
    ExerciseState {
        exercise_id: ExerciseId,
        records: Vec<PendingSubmissionRecord>,
    },
    /// 预计出结果时间（毫秒）。
    ResultEta { eta_ms: u64 },
    /// 构建已触发。
    BuildTriggered { target: BuildTarget },
    /// 通知已发布。
    Published { topic: String, delivered: usize },
    /// 错误消息。
    Error { message: String },
}

/// 构建触发的范围。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "scope", rename_all = "snake_case")]
pub enum BuildTarget {
    Participation {
        participation_id: ParticipationId,
        instructor: bool,
    },
    Exercise {
        exercise_id: ExerciseId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        participation_ids: Option<Vec<ParticipationId>>,
    },
}
