//! WebSocket upgrade and per-connection handler. Streams each sampled snapshot.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use futures_util::{SinkExt, StreamExt};
use tracing::debug;

use crate::state::AppState;

pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    // Registration lives as long as this function; dropping it unsubscribes.
    let mut subscription = state.broadcaster.subscribe();
    let id = subscription.id();
    let (mut sender, mut receiver) = socket.split();

    loop {
        tokio::select! {
            snapshot = subscription.recv() => {
                // None: the broadcaster evicted us for falling behind.
                let Some(snapshot) = snapshot else { break };
                let Ok(js) = serde_json::to_string(snapshot.as_ref()) else { continue };
                if sender.send(Message::Text(js)).await.is_err() {
                    break;
                }
            }
            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) if text == "get_history" => {
                        if let Ok(js) = serde_json::to_string(&state.history()) {
                            if sender.send(Message::Text(js)).await.is_err() {
                                break;
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    _ => {}
                }
            }
        }
    }
    debug!(subscriber = id, "stream closed");
}
