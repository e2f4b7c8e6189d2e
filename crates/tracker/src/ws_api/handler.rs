use std::collections::HashSet;
use std::sync::Arc;

use axum::Router;
use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::IntoResponse;
use axum::routing::get;
use buildwatch_core::{ExerciseId, ParticipationId};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tracing::{error, info, warn};

use super::adapter::{event_to_server_message, exercise_message, participation_message};
use super::protocol::{BuildTarget, ClientMessage, ServerMessage};
use crate::{SubmissionTracker, TopicHub};

/// WebSocket 连接共享的追踪器与推送中心。
#[derive(Clone)]
pub struct WsContext {
    pub tracker: Arc<SubmissionTracker>,
    pub hub: Arc<TopicHub>,
}

impl WsContext {
    pub fn new(tracker: Arc<SubmissionTracker>, hub: Arc<TopicHub>) -> Self {
        Self { tracker, hub }
    }
}

/// 挂载 `/ws` 的路由，带跨域支持。
pub fn router(context: WsContext) -> Router {
    Router::new()
        .route("/ws", get(websocket_handler))
        .with_state(context)
        .layer(ServiceBuilder::new().layer(CorsLayer::permissive()))
}

/// Axum WebSocket 升级 handler。
pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    State(context): State<WsContext>,
) -> impl IntoResponse {
    info!("new WebSocket connection request");
    ws.on_upgrade(move |socket| serve_socket(socket, context))
}

/// 单个连接的订阅状态。
struct Connection {
    context: WsContext,
    out_tx: mpsc::Sender<ServerMessage>,
    participations: HashSet<ParticipationId>,
    exercises: HashSet<ExerciseId>,
    forwarders: Vec<JoinHandle<()>>,
}

/// 处理一个已升级的 WebSocket 连接，直到客户端断开。
pub async fn serve_socket(socket: WebSocket, context: WsContext) {
    let (mut sender, mut receiver) = socket.split();
    let (out_tx, mut out_rx) = mpsc::channel::<ServerMessage>(64);
    info!("WebSocket connection established");

    let writer_task = tokio::spawn(async move {
        while let Some(server_msg) = out_rx.recv().await {
            match serde_json::to_string(&server_msg) {
                Ok(json) => {
                    if sender.send(Message::Text(json.into())).await.is_err() {
                        break;
                    }
                }
                Err(err) => {
                    error!(error = %err, "failed to serialize WebSocket message");
                    break;
                }
            }
        }
    });

    let eta_ms = context.tracker.current_eta().as_millis() as u64;
    let _ = out_tx.send(ServerMessage::ResultEta { eta_ms }).await;

    let mut event_stream = context.tracker.subscribe_events();
    let event_tx = out_tx.clone();
    let event_task = tokio::spawn(async move {
        loop {
            match event_stream.recv().await {
                Ok(event) => {
                    let Some(msg) = event_to_server_message(event) else {
                        continue;
                    };
                    if event_tx.send(msg).await.is_err() {
                        break;
                    }
                }
                Err(err) => {
                    warn!(error = %err, "event stream receive failed");
                    let _ = event_tx
                        .send(ServerMessage::Error {
                            message: format!("event stream error: {err}"),
                        })
                        .await;
                    break;
                }
            }
        }
    });

    let mut connection = Connection {
        context,
        out_tx: out_tx.clone(),
        participations: HashSet::new(),
        exercises: HashSet::new(),
        forwarders: Vec::new(),
    };

    while let Some(msg) = receiver.next().await {
        match msg {
            Ok(Message::Text(text)) => {
                let response = match serde_json::from_str::<ClientMessage>(&text) {
                    Ok(client_msg) => connection.handle(client_msg).await,
                    Err(err) => Some(ServerMessage::Error {
                        message: format!("invalid message: {err}"),
                    }),
                };
                if let Some(response) = response
                    && out_tx.send(response).await.is_err()
                {
                    break;
                }
            }
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(err) => {
                warn!(error = %err, "WebSocket receive error");
                break;
            }
        }
    }

    event_task.abort();
    for forwarder in connection.forwarders.drain(..) {
        forwarder.abort();
    }
    drop(connection);
    drop(out_tx);
    if let Err(err) = writer_task.await {
        warn!(error = %err, "WebSocket writer task exited with join error");
    }

    info!("WebSocket connection closed");
}

impl Connection {
    async fn handle(&mut self, msg: ClientMessage) -> Option<ServerMessage> {
        let tracker = &self.context.tracker;
        match msg {
            ClientMessage::SubscribeParticipation {
                participation_id,
                exercise_id,
            } => {
                if self.participations.insert(participation_id) {
                    let mut stream = tracker.subscribe_participation(participation_id, exercise_id);
                    let out_tx = self.out_tx.clone();
                    self.forwarders.push(tokio::spawn(async move {
                        while let Some(record) = stream.next().await {
                            if out_tx.send(participation_message(record)).await.is_err() {
                                break;
                            }
                        }
                    }));
                }
                None
            }
            ClientMessage::SubscribeExercise { exercise_id } => {
                if self.exercises.insert(exercise_id) {
                    let mut stream = tracker.subscribe_exercise(exercise_id);
                    let out_tx = self.out_tx.clone();
                    self.forwarders.push(tokio::spawn(async move {
                        while let Some(state) = stream.next().await {
                            if out_tx.send(exercise_message(&state)).await.is_err() {
                                break;
                            }
                        }
                    }));
                }
                None
            }
            ClientMessage::TriggerBuild { participation_id } => Some(triggered(
                tracker.trigger_build(participation_id).await,
                BuildTarget::Participation {
                    participation_id,
                    instructor: false,
                },
            )),
            ClientMessage::TriggerInstructorBuild { participation_id } => Some(triggered(
                tracker.trigger_instructor_build(participation_id).await,
                BuildTarget::Participation {
                    participation_id,
                    instructor: true,
                },
            )),
            ClientMessage::TriggerInstructorBuildAll { exercise_id } => Some(triggered(
                tracker
                    .trigger_instructor_build_for_all_participations(exercise_id)
                    .await,
                BuildTarget::Exercise {
                    exercise_id,
                    participation_ids: None,
                },
            )),
            ClientMessage::TriggerInstructorBuildFor {
                exercise_id,
                participation_ids,
            } => Some(triggered(
                tracker
                    .trigger_instructor_build_for_participations(exercise_id, &participation_ids)
                    .await,
                BuildTarget::Exercise {
                    exercise_id,
                    participation_ids: Some(participation_ids),
                },
            )),
            ClientMessage::Publish { topic, payload } => {
                match self.context.hub.publish(&topic, &payload.to_string()).await {
                    Ok(delivered) => Some(ServerMessage::Published { topic, delivered }),
                    Err(err) => Some(ServerMessage::Error {
                        message: format!("publish to {topic} failed: {err}"),
                    }),
                }
            }
        }
    }
}

fn triggered(result: crate::Result<()>, target: BuildTarget) -> ServerMessage {
    match result {
        Ok(()) => ServerMessage::BuildTriggered { target },
        Err(err) => ServerMessage::Error {
            message: format!("trigger build failed: {err}"),
        },
    }
}
