use buildwatch_core::{ExerciseState, PendingSubmissionRecord};

use super::protocol::ServerMessage;
use crate::events::TrackerEvent;

/// 将追踪器事件转换为 WebSocket 消息。
///
/// 只转发预计时间的变化，参与与练习的状态由各连接自己的订阅转发。
pub fn event_to_server_message(event: TrackerEvent) -> Option<ServerMessage> {
    match event {
        TrackerEvent::ResultEtaChanged { eta_ms } => Some(ServerMessage::ResultEta { eta_ms }),
        TrackerEvent::ParticipationStateChanged { .. } | TrackerEvent::ExerciseSeeded { .. } => {
            None
        }
    }
}

pub fn participation_message(record: PendingSubmissionRecord) -> ServerMessage {
    ServerMessage::ParticipationState { record }
}

pub fn exercise_message(state: &ExerciseState) -> ServerMessage {
    ServerMessage::ExerciseState {
        exercise_id: state.exercise_id(),
        records: state.records().cloned().collect(),
    }
}
