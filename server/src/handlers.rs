use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::logic::{apply_text, Flow};
use crate::state::{AppState, Outbound};

pub async fn ws_handler(State(state): State<AppState>, ws: WebSocketUpgrade) -> impl IntoResponse {
    ws.protocols(["v12.stomp", "v11.stomp", "v10.stomp"])
        .on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let (mut socket_sender, mut socket_receiver) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<Outbound>();
    let connection_id = Uuid::new_v4();

    {
        let mut broker = state.broker.lock().await;
        broker.join(connection_id, tx);
        tracing::info!(conn = %connection_id, peers = broker.peers.len(), "ws connected");
    }

    let send_task = tokio::spawn(async move {
        while let Some(item) = rx.recv().await {
            match item {
                Outbound::Text(text) => {
                    if socket_sender.send(Message::Text(text)).await.is_err() {
                        break;
                    }
                }
                Outbound::Close => {
                    let _ = socket_sender.send(Message::Close(None)).await;
                    break;
                }
            }
        }
    });

    while let Some(Ok(message)) = socket_receiver.next().await {
        match message {
            Message::Text(text) => {
                let flow = {
                    let mut broker = state.broker.lock().await;
                    apply_text(&mut broker, connection_id, &text)
                };
                if flow == Flow::Close {
                    break;
                }
            }
            Message::Close(frame) => {
                if let Some(frame) = frame {
                    tracing::debug!(conn = %connection_id, code = frame.code, reason = %frame.reason, "close frame");
                }
                break;
            }
            Message::Binary(_) => {
                tracing::debug!(conn = %connection_id, "binary message ignored");
            }
            _ => {}
        }
    }

    {
        let mut broker = state.broker.lock().await;
        broker.leave(connection_id);
        tracing::info!(conn = %connection_id, peers = broker.peers.len(), "ws disconnected");
    }
    // dropping the sender lets queued frames (ERROR, RECEIPT) flush first
    let _ = send_task.await;
}
