use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use crate::events::{ClientEvent, LogLevel, ServerEvent};
use crate::session::BatchSession;
use crate::AppState;

/// One batch session per connection
pub async fn websocket_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> Response {
    info!("🔌 WebSocket connection request");
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    info!("✅ Web client connected");
    let (mut sender, mut receiver) = socket.split();
    let (outbox, mut events) = mpsc::unbounded_channel::<ServerEvent>();

    // Forward session events to the client
    let writer = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            let text = match serde_json::to_string(&event) {
                Ok(text) => text,
                Err(e) => {
                    error!("❌ Failed to serialize event: {}", e);
                    continue;
                }
            };
            if let Err(e) = sender.send(Message::Text(text.into())).await {
                warn!("❌ Failed to send WebSocket message: {}", e);
                break;
            }
        }
    });

    let mut session = BatchSession::new(state.launcher.clone(), state.config.clone(), outbox);
    session.log(LogLevel::Info, "Web Client Connected");

    while let Some(msg) = receiver.next().await {
        match msg {
            Ok(Message::Text(text)) => match serde_json::from_str::<ClientEvent>(text.as_str()) {
                Ok(event) => session.handle(event).await,
                Err(e) => {
                    warn!("⚠️ Unrecognized client message: {}", e);
                    session.log(LogLevel::Error, format!("Unrecognized message: {e}"));
                }
            },
            Ok(Message::Close(_)) => {
                info!("🔌 WebSocket close received");
                break;
            }
            Err(e) => {
                warn!("❌ WebSocket error: {}", e);
                break;
            }
            _ => {}
        }
    }

    // An abandoned batch releases its ticket and browser
    session.shutdown().await;
    drop(session);
    if let Err(e) = writer.await {
        warn!("Event writer ended abnormally: {}", e);
    }
    info!("🔌 Web client disconnected");
}
