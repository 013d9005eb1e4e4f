//! WebSocket handler for real-time lifecycle events.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
};
use futures_util::{stream::SplitSink, SinkExt, StreamExt};
use tracing::debug;

use super::handlers::AppState;
use super::types::WsMessage;

/// WebSocket upgrade handler.
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Forward lifecycle events until either side goes away.
async fn handle_socket(socket: WebSocket, state: AppState) {
    let mut subscription = state.session.subscribe();
    let observer = subscription.id();
    let (mut sink, mut stream) = socket.split();

    'conn: loop {
        tokio::select! {
            event = subscription.recv() => {
                let Some(event) = event else { break };
                for frame in WsMessage::from_event(&event) {
                    if send_json(&mut sink, &frame).await.is_err() {
                        break 'conn;
                    }
                }
            }
            msg = stream.next() => {
                let text = match msg {
                    Some(Ok(Message::Text(text))) => text,
                    Some(Ok(Message::Ping(data))) => {
                        let _ = sink.send(Message::Pong(data)).await;
                        continue;
                    }
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    Some(Ok(_)) => continue,
                };

                let reply = match serde_json::from_str::<WsMessage>(text.as_str()) {
                    Ok(WsMessage::Ping) => WsMessage::Pong,
                    Ok(_) => continue,
                    Err(e) => WsMessage::Error {
                        code: "PARSE_ERROR".to_string(),
                        message: format!("Invalid message format: {}", e),
                    },
                };
                if send_json(&mut sink, &reply).await.is_err() {
                    break;
                }
            }
        }
    }

    state.session.broadcaster().unsubscribe(observer);
    debug!("Event socket for {} closed", observer);
}

async fn send_json(
    sink: &mut SplitSink<WebSocket, Message>,
    msg: &WsMessage,
) -> Result<(), axum::Error> {
    match serde_json::to_string(msg) {
        Ok(json) => sink.send(Message::Text(json.into())).await,
        Err(_) => Ok(()),
    }
}
