//! Streaming endpoint.
//!
//! Protocol: the client sends `{"action": "start", "query": "..."}`, the
//! server pushes `started`, one `progress` per step, then `completed` or
//! `error`, and closes the socket.

use async_trait::async_trait;
use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::Response;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, info};

use crate::error::ChannelError;
use crate::workflow::{ProgressEvent, PushChannel};

use super::AppState;

const INVALID_START: &str = "Expected {action: 'start', query: '...'}";

#[derive(Debug, Deserialize)]
struct StartCommand {
    action: Option<String>,
    query: Option<String>,
}

/// Push channel over the sending half of a WebSocket.
pub struct WebSocketChannel {
    sink: Mutex<SplitSink<WebSocket, Message>>,
}

impl WebSocketChannel {
    pub fn new(sink: SplitSink<WebSocket, Message>) -> Self {
        Self {
            sink: Mutex::new(sink),
        }
    }

    async fn close(&self) {
        if let Err(e) = self.sink.lock().await.close().await {
            debug!(error = %e, "WebSocket already closed");
        }
    }
}

#[async_trait]
impl PushChannel for WebSocketChannel {
    async fn send(&self, event: &ProgressEvent) -> Result<(), ChannelError> {
        let json = serde_json::to_string(event).map_err(|e| ChannelError::Send(e.to_string()))?;
        self.sink
            .lock()
            .await
            .send(Message::Text(json.into()))
            .await
            .map_err(|_| ChannelError::Closed)
    }
}

/// GET /ws/research
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let (sink, mut stream) = socket.split();
    let channel = Arc::new(WebSocketChannel::new(sink));

    let Some(query) = read_start_command(&mut stream).await else {
        // The client may already be gone; nothing to do if this fails
        let _ = channel.send(&ProgressEvent::error(INVALID_START)).await;
        channel.close().await;
        return;
    };

    info!(query = %query, "Starting WebSocket research");
    match state.runner.run_streaming(&query, channel.clone()).await {
        Ok(session) => info!(
            session_id = %session.session_id,
            status = %session.status,
            "WebSocket research finished"
        ),
        Err(e) => error!(error = %e, "WebSocket research aborted"),
    }

    channel.close().await;
}

/// First text frame, if it is a valid start command.
async fn read_start_command(stream: &mut SplitStream<WebSocket>) -> Option<String> {
    while let Some(frame) = stream.next().await {
        match frame {
            Ok(Message::Text(text)) => {
                let command: StartCommand = match serde_json::from_str(text.as_str()) {
                    Ok(command) => command,
                    Err(e) => {
                        debug!(error = %e, "Malformed start command");
                        return None;
                    }
                };
                return match (command.action.as_deref(), command.query) {
                    (Some("start"), Some(query)) if !query.trim().is_empty() => Some(query),
                    _ => None,
                };
            }
            Ok(Message::Close(_)) | Err(_) => return None,
            Ok(_) => continue,
        }
    }
    None
}
