//! WebSocket API 模块，仅在 `ws-api` feature 启用时可用。

mod adapter;
mod handler;
mod protocol;

pub use adapter::{event_to_server_message, exercise_message, participation_message};
pub use handler::{WsContext, router, serve_socket, websocket_handler};
pub use protocol::{BuildTarget, ClientMessage, ServerMessage};
